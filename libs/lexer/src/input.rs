use serde::{Deserialize, Serialize};

/// Reference into the raw input bytes. `end` is exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
  pub start: u32,
  pub end: u32,
}

impl ByteRange {
  pub fn len(&self) -> usize {
    (self.end - self.start) as usize
  }

  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }
}

/// Growable operation input with a read cursor and position tracking.
///
/// Bytes are immutable once written except by append; append only extends,
/// so token ranges emitted before an append stay valid afterwards.
#[derive(Debug)]
pub struct Input {
  bytes: Vec<u8>,
  pos: usize,
  line: u32,
  column: u32,
}

impl Default for Input {
  fn default() -> Self {
    Input {
      bytes: Vec::new(),
      pos: 0,
      line: 1,
      column: 1,
    }
  }
}

impl Input {
  pub fn new() -> Self {
    Input::default()
  }

  /// Replaces the content and resets the read cursor and positions.
  pub fn reset_input_bytes(&mut self, bytes: &[u8]) {
    self.bytes.clear();
    self.bytes.extend_from_slice(bytes);
    self.pos = 0;
    self.line = 1;
    self.column = 1;
  }

  /// Extends the content without touching the cursor or earlier bytes.
  pub fn append_input_bytes(&mut self, bytes: &[u8]) {
    self.bytes.extend_from_slice(bytes);
  }

  /// Borrowed view into the raw bytes. The caller must not mutate.
  pub fn byte_slice(&self, range: ByteRange) -> &[u8] {
    &self.bytes[range.start as usize..range.end as usize]
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  pub(crate) fn pos(&self) -> usize {
    self.pos
  }

  pub(crate) fn line(&self) -> u32 {
    self.line
  }

  pub(crate) fn column(&self) -> u32 {
    self.column
  }

  pub(crate) fn peek(&self, offset: usize) -> Option<u8> {
    self.bytes.get(self.pos + offset).copied()
  }

  /// Consumes one byte, keeping line/column in sync. A lone `\r` counts as a
  /// line terminator; `\r\n` counts once, on the `\n`.
  pub(crate) fn advance(&mut self) -> Option<u8> {
    let byte = self.bytes.get(self.pos).copied()?;
    self.pos += 1;

    match byte {
      b'\n' => {
        self.line += 1;
        self.column = 1;
      }
      b'\r' => {
        if self.bytes.get(self.pos) != Some(&b'\n') {
          self.line += 1;
          self.column = 1;
        }
      }
      _ => self.column += 1,
    }

    Some(byte)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn append_extends_without_invalidating_ranges() {
    let mut input = Input::new();
    input.reset_input_bytes(b"foo");
    let first = ByteRange { start: 0, end: 3 };
    assert_eq!(input.byte_slice(first), b"foo");

    input.append_input_bytes(b" bar");
    assert_eq!(input.len(), 7);
    assert_eq!(input.byte_slice(first), b"foo");
    assert_eq!(input.byte_slice(ByteRange { start: 4, end: 7 }), b"bar");
  }

  #[test]
  fn reset_rewinds_cursor_and_positions() {
    let mut input = Input::new();
    input.reset_input_bytes(b"a\nb");
    input.advance();
    input.advance();
    assert_eq!(input.line(), 2);

    input.reset_input_bytes(b"x");
    assert_eq!(input.pos(), 0);
    assert_eq!(input.line(), 1);
    assert_eq!(input.column(), 1);
  }

  #[test]
  fn advance_tracks_lines_and_columns() {
    let mut input = Input::new();
    input.reset_input_bytes(b"ab\ncd\r\ne");

    input.advance();
    input.advance();
    assert_eq!((input.line(), input.column()), (1, 3));

    input.advance();
    assert_eq!((input.line(), input.column()), (2, 1));

    input.advance();
    input.advance();
    input.advance();
    input.advance();
    assert_eq!((input.line(), input.column()), (3, 1));
  }
}
