use crate::input::{ByteRange, Input};
use crate::keyword::Keyword;
use crate::token::{TextPosition, Token};

/// Lazy token stream over an [`Input`].
///
/// `read` never fails: malformed input yields the closest-fit token so the
/// parser can produce a precise diagnostic. Not safe for concurrent use.
#[derive(Debug, Default)]
pub struct Lexer {
  input: Input,
}

impl Lexer {
  pub fn new() -> Self {
    Lexer::default()
  }

  pub fn set_input(&mut self, input: Input) {
    self.input = input;
  }

  pub fn input(&self) -> &Input {
    &self.input
  }

  pub fn reset_input_bytes(&mut self, bytes: &[u8]) {
    self.input.reset_input_bytes(bytes);
  }

  pub fn append_input_bytes(&mut self, bytes: &[u8]) {
    self.input.append_input_bytes(bytes);
  }

  pub fn byte_slice(&self, range: ByteRange) -> &[u8] {
    self.input.byte_slice(range)
  }

  /// Number of ignored characters (space, tab, line terminator, comma) up to
  /// the next significant byte.
  pub fn peek_whitespace_length(&self) -> usize {
    let mut count = 0;
    while matches!(
      self.input.peek(count),
      Some(b' ' | b'\t' | b'\n' | b'\r' | b',')
    ) {
      count += 1;
    }
    count
  }

  /// Reads the next token. Idempotent at EOF.
  pub fn read(&mut self) -> Token {
    self.skip_ignored();

    let start_pos = self.input.pos() as u32;
    let line_start = self.input.line();
    let char_start = self.input.column();

    let byte = match self.input.peek(0) {
      Some(byte) => byte,
      None => {
        return Token {
          keyword: Keyword::Eof,
          literal: ByteRange {
            start: start_pos,
            end: start_pos,
          },
          position: TextPosition {
            line_start,
            char_start,
            line_end: line_start,
            char_end: char_start,
          },
        }
      }
    };

    let (keyword, literal) = match byte {
      b'#' => self.read_comment(start_pos),
      b'"' => self.read_string(),
      b'0'..=b'9' => self.read_number(start_pos),
      b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.read_identifier(start_pos),
      b'.' => self.read_dot(start_pos),
      _ => {
        self.input.advance();
        let range = self.range_from(start_pos);
        let keyword = match byte {
          b'|' => Keyword::Pipe,
          b'$' => Keyword::Dollar,
          b'@' => Keyword::At,
          b'=' => Keyword::Equals,
          b':' => Keyword::Colon,
          b'!' => Keyword::Bang,
          b'(' => Keyword::LParen,
          b')' => Keyword::RParen,
          b'[' => Keyword::LBrack,
          b']' => Keyword::RBrack,
          b'{' => Keyword::LBrace,
          b'}' => Keyword::RBrace,
          b'&' => Keyword::And,
          b'-' => Keyword::Sub,
          // closest fit for a byte the grammar has no token for
          _ => Keyword::Ident,
        };
        (keyword, range)
      }
    };

    Token {
      keyword,
      literal,
      position: TextPosition {
        line_start,
        char_start,
        line_end: self.input.line(),
        char_end: self.input.column(),
      },
    }
  }

  fn skip_ignored(&mut self) {
    while matches!(self.input.peek(0), Some(b' ' | b'\t' | b'\n' | b'\r' | b',')) {
      self.input.advance();
    }
  }

  fn range_from(&self, start: u32) -> ByteRange {
    ByteRange {
      start,
      end: self.input.pos() as u32,
    }
  }

  fn read_identifier(&mut self, start: u32) -> (Keyword, ByteRange) {
    while matches!(
      self.input.peek(0),
      Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-')
    ) {
      self.input.advance();
    }
    let range = self.range_from(start);
    (Keyword::from_identifier(self.input.byte_slice(range)), range)
  }

  fn read_number(&mut self, start: u32) -> (Keyword, ByteRange) {
    while matches!(self.input.peek(0), Some(b'0'..=b'9')) {
      self.input.advance();
    }

    if self.input.peek(0) != Some(b'.') {
      return (Keyword::Integer, self.range_from(start));
    }

    // a trailing dot with no digits still yields a FLOAT whose literal
    // includes the dot
    self.input.advance();
    while matches!(self.input.peek(0), Some(b'0'..=b'9')) {
      self.input.advance();
    }
    (Keyword::Float, self.range_from(start))
  }

  fn read_dot(&mut self, start: u32) -> (Keyword, ByteRange) {
    if self.input.peek(1) == Some(b'.') && self.input.peek(2) == Some(b'.') {
      self.input.advance();
      self.input.advance();
      self.input.advance();
      return (Keyword::Spread, self.range_from(start));
    }
    self.input.advance();
    (Keyword::Dot, self.range_from(start))
  }

  fn read_comment(&mut self, start: u32) -> (Keyword, ByteRange) {
    loop {
      match self.input.peek(0) {
        None => break,
        Some(b'\n') => {
          // consecutive comment lines merge into one token
          if self.input.peek(1) == Some(b'#') {
            self.input.advance();
            continue;
          }
          break;
        }
        Some(b'\r') => {
          if self.input.peek(1) == Some(b'#') {
            self.input.advance();
            continue;
          }
          if self.input.peek(1) == Some(b'\n') && self.input.peek(2) == Some(b'#') {
            self.input.advance();
            self.input.advance();
            continue;
          }
          break;
        }
        Some(_) => {
          self.input.advance();
        }
      }
    }
    (Keyword::Comment, self.range_from(start))
  }

  fn read_string(&mut self) -> (Keyword, ByteRange) {
    if self.input.peek(1) == Some(b'"') && self.input.peek(2) == Some(b'"') {
      return self.read_block_string();
    }

    self.input.advance();
    let content_start = self.input.pos() as u32;
    let mut content_end;
    let mut previous = 0u8;

    loop {
      match self.input.peek(0) {
        None => {
          content_end = self.input.pos() as u32;
          break;
        }
        Some(b'"') if previous != b'\\' => {
          content_end = self.input.pos() as u32;
          self.input.advance();
          break;
        }
        Some(byte) => {
          previous = byte;
          self.input.advance();
        }
      }
    }

    let trimmed = self.trim_range(content_start, &mut content_end, false);
    (Keyword::String, trimmed)
  }

  fn read_block_string(&mut self) -> (Keyword, ByteRange) {
    self.input.advance();
    self.input.advance();
    self.input.advance();

    let content_start = self.input.pos() as u32;
    let mut content_end;
    let mut previous = 0u8;

    loop {
      match self.input.peek(0) {
        None => {
          content_end = self.input.pos() as u32;
          break;
        }
        // terminates only at an unescaped triple quote
        Some(b'"')
          if previous != b'\\'
            && self.input.peek(1) == Some(b'"')
            && self.input.peek(2) == Some(b'"') =>
        {
          content_end = self.input.pos() as u32;
          self.input.advance();
          self.input.advance();
          self.input.advance();
          break;
        }
        Some(byte) => {
          previous = byte;
          self.input.advance();
        }
      }
    }

    let trimmed = self.trim_range(content_start, &mut content_end, true);
    (Keyword::BlockString, trimmed)
  }

  fn trim_range(&self, mut start: u32, end: &mut u32, line_terminators: bool) -> ByteRange {
    let is_trimmable = |byte: u8| -> bool {
      byte == b' ' || byte == b'\t' || (line_terminators && (byte == b'\n' || byte == b'\r'))
    };

    while start < *end && is_trimmable(self.input.byte_slice(ByteRange { start, end: start + 1 })[0])
    {
      start += 1;
    }
    while *end > start
      && is_trimmable(
        self.input.byte_slice(ByteRange {
          start: *end - 1,
          end: *end,
        })[0],
      )
    {
      *end -= 1;
    }

    ByteRange { start, end: *end }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lexer_for(input: &str) -> Lexer {
    let mut lexer = Lexer::new();
    lexer.reset_input_bytes(input.as_bytes());
    lexer
  }

  fn assert_read(lexer: &mut Lexer, keyword: Keyword, literal: &str) {
    let token = lexer.read();
    assert_eq!(token.keyword, keyword, "unexpected keyword for {literal:?}");
    assert_eq!(
      lexer.byte_slice(token.literal),
      literal.as_bytes(),
      "unexpected literal"
    );
  }

  fn assert_position(lexer: &mut Lexer, expected: (u32, u32, u32, u32)) {
    let token = lexer.read();
    let position = token.position;
    assert_eq!(
      (
        position.line_start,
        position.char_start,
        position.line_end,
        position.char_end
      ),
      expected
    );
  }

  #[test]
  fn peek_whitespace_length() {
    assert_eq!(lexer_for("   foo").peek_whitespace_length(), 3);
    assert_eq!(lexer_for("   \tfoo").peek_whitespace_length(), 4);
    assert_eq!(lexer_for("   \nfoo").peek_whitespace_length(), 4);
    assert_eq!(lexer_for("   ,foo").peek_whitespace_length(), 4);
  }

  #[test]
  fn read_correct_when_resetting_input() {
    let mut lexer = lexer_for("x");
    assert_read(&mut lexer, Keyword::Ident, "x");
    lexer.reset_input_bytes(b"y");
    assert_read(&mut lexer, Keyword::Ident, "y");
  }

  #[test]
  fn read_eof_multiple_times() {
    let mut lexer = lexer_for("x");
    assert_read(&mut lexer, Keyword::Ident, "x");
    assert_read(&mut lexer, Keyword::Eof, "");
    assert_read(&mut lexer, Keyword::Eof, "");
  }

  #[test]
  fn read_integers() {
    let mut lexer = lexer_for("1337");
    assert_read(&mut lexer, Keyword::Integer, "1337");

    let mut lexer = lexer_for("-1337");
    assert_read(&mut lexer, Keyword::Sub, "-");
    assert_read(&mut lexer, Keyword::Integer, "1337");

    let mut lexer = lexer_for("1337,");
    assert_read(&mut lexer, Keyword::Integer, "1337");
    assert_read(&mut lexer, Keyword::Eof, "");
  }

  #[test]
  fn read_floats() {
    assert_read(&mut lexer_for("13.37"), Keyword::Float, "13.37");
    assert_read(&mut lexer_for("1.1)"), Keyword::Float, "1.1");
    assert_read(&mut lexer_for("13.37 "), Keyword::Float, "13.37");
    assert_read(&mut lexer_for("13.37\t"), Keyword::Float, "13.37");
    assert_read(&mut lexer_for("13.37\n"), Keyword::Float, "13.37");
    assert_read(&mut lexer_for("13.37,"), Keyword::Float, "13.37");

    let mut lexer = lexer_for("-13.37");
    assert_read(&mut lexer, Keyword::Sub, "-");
    assert_read(&mut lexer, Keyword::Float, "13.37");
  }

  #[test]
  fn read_incomplete_float_keeps_the_dot() {
    assert_read(&mut lexer_for("13."), Keyword::Float, "13.");
  }

  #[test]
  fn read_single_line_strings() {
    assert_read(&mut lexer_for("\"foo\""), Keyword::String, "foo");
    assert_read(&mut lexer_for("\" \tfoo\t \""), Keyword::String, "foo");
    // unterminated string still emits what was captured
    assert_read(&mut lexer_for("\"foo"), Keyword::String, "foo");
    assert_read(
      &mut lexer_for("\"foo \\\" bar\""),
      Keyword::String,
      "foo \\\" bar",
    );
    assert_read(
      &mut lexer_for("\"foo \\\\ bar\""),
      Keyword::String,
      "foo \\\\ bar",
    );
  }

  #[test]
  fn read_block_strings() {
    assert_read(
      &mut lexer_for("\"\"\"foo \\\" bar\"\"\""),
      Keyword::BlockString,
      "foo \\\" bar",
    );
    assert_read(
      &mut lexer_for("\"\"\"foo \"\" bar\"\"\""),
      Keyword::BlockString,
      "foo \"\" bar",
    );
    assert_read(
      &mut lexer_for("\"\"\"\nfoo\nbar\"\"\""),
      Keyword::BlockString,
      "foo\nbar",
    );
    assert_read(
      &mut lexer_for("\"\"\"foo \\\\ bar\"\"\""),
      Keyword::BlockString,
      "foo \\\\ bar",
    );
    assert_read(&mut lexer_for(r#"""" foo """"#), Keyword::BlockString, "foo");
    assert_read(
      &mut lexer_for("\"\"\"\tfoo\t\"\"\""),
      Keyword::BlockString,
      "foo",
    );
    assert_read(
      &mut lexer_for("\"\"\"\n\t  foo \n\"\"\""),
      Keyword::BlockString,
      "foo",
    );
  }

  #[test]
  fn block_string_terminates_only_at_unescaped_triple_quote() {
    assert_read(
      &mut lexer_for("\"\"\"block string uses \\\"\"\"\n\"\"\""),
      Keyword::BlockString,
      "block string uses \\\"\"\"",
    );
  }

  #[test]
  fn read_punctuation() {
    assert_read(&mut lexer_for("|"), Keyword::Pipe, "|");
    assert_read(&mut lexer_for("."), Keyword::Dot, ".");
    assert_read(&mut lexer_for("..."), Keyword::Spread, "...");
    assert_read(&mut lexer_for("@"), Keyword::At, "@");
    assert_read(&mut lexer_for("="), Keyword::Equals, "=");
    assert_read(&mut lexer_for(":"), Keyword::Colon, ":");
    assert_read(&mut lexer_for("!"), Keyword::Bang, "!");
    assert_read(&mut lexer_for("("), Keyword::LParen, "(");
    assert_read(&mut lexer_for(")"), Keyword::RParen, ")");
    assert_read(&mut lexer_for("["), Keyword::LBrack, "[");
    assert_read(&mut lexer_for("]"), Keyword::RBrack, "]");
    assert_read(&mut lexer_for("{"), Keyword::LBrace, "{");
    assert_read(&mut lexer_for("}"), Keyword::RBrace, "}");
    assert_read(&mut lexer_for("&"), Keyword::And, "&");
  }

  #[test]
  fn two_dots_emit_two_dot_tokens() {
    let mut lexer = lexer_for("..");
    assert_read(&mut lexer, Keyword::Dot, ".");
    assert_read(&mut lexer, Keyword::Dot, ".");
  }

  #[test]
  fn read_variables() {
    let mut lexer = lexer_for("$123");
    assert_read(&mut lexer, Keyword::Dollar, "$");
    assert_read(&mut lexer, Keyword::Integer, "123");

    let mut lexer = lexer_for("$foo");
    assert_read(&mut lexer, Keyword::Dollar, "$");
    assert_read(&mut lexer, Keyword::Ident, "foo");

    let mut lexer = lexer_for("$_foo");
    assert_read(&mut lexer, Keyword::Dollar, "$");
    assert_read(&mut lexer, Keyword::Ident, "_foo");

    let mut lexer = lexer_for("$ foo");
    assert_read(&mut lexer, Keyword::Dollar, "$");
    assert_read(&mut lexer, Keyword::Ident, "foo");
  }

  #[test]
  fn read_identifiers() {
    assert_read(&mut lexer_for("foo"), Keyword::Ident, "foo");
    assert_read(&mut lexer_for("foo:"), Keyword::Ident, "foo");
    assert_read(&mut lexer_for("foo-bar"), Keyword::Ident, "foo-bar");
    assert_read(&mut lexer_for("inputValue"), Keyword::Ident, "inputValue");
  }

  #[test]
  fn read_reserved_identifiers() {
    assert_read(&mut lexer_for("true"), Keyword::True, "true");
    assert_read(&mut lexer_for(" true "), Keyword::True, "true");
    assert_read(&mut lexer_for("false"), Keyword::False, "false");
    assert_read(&mut lexer_for("null"), Keyword::Null, "null");
    assert_read(&mut lexer_for("query"), Keyword::Query, "query");
    assert_read(&mut lexer_for("mutation"), Keyword::Mutation, "mutation");
    assert_read(
      &mut lexer_for("subscription"),
      Keyword::Subscription,
      "subscription",
    );
    assert_read(&mut lexer_for("fragment"), Keyword::Fragment, "fragment");
    assert_read(&mut lexer_for("\n\n fragment"), Keyword::Fragment, "fragment");
    assert_read(&mut lexer_for("implements"), Keyword::Implements, "implements");
    assert_read(&mut lexer_for("schema"), Keyword::Schema, "schema");
    assert_read(&mut lexer_for("scalar"), Keyword::Scalar, "scalar");
    assert_read(&mut lexer_for("type"), Keyword::Type, "type");
    assert_read(&mut lexer_for("interface"), Keyword::Interface, "interface");
    assert_read(&mut lexer_for("union"), Keyword::Union, "union");
    assert_read(&mut lexer_for("enum"), Keyword::Enum, "enum");
    assert_read(&mut lexer_for("input"), Keyword::Input, "input");
    assert_read(&mut lexer_for("directive"), Keyword::Directive, "directive");
    assert_read(&mut lexer_for("extend"), Keyword::Extend, "extend");
    assert_read(&mut lexer_for("on"), Keyword::On, "on");
    assert_read(&mut lexer_for("on "), Keyword::On, "on");
  }

  #[test]
  fn ignored_runs_are_never_emitted() {
    assert_read(&mut lexer_for(","), Keyword::Eof, "");
    assert_read(&mut lexer_for(" "), Keyword::Eof, "");
    assert_read(&mut lexer_for("\t"), Keyword::Eof, "");
    assert_read(&mut lexer_for("\n"), Keyword::Eof, "");
  }

  #[test]
  fn read_comments() {
    assert_read(
      &mut lexer_for("# A connection to a list of items."),
      Keyword::Comment,
      "# A connection to a list of items.",
    );
    assert_read(
      &mut lexer_for("#\tA connection to a list of items."),
      Keyword::Comment,
      "#\tA connection to a list of items.",
    );

    let mut lexer = lexer_for("# A connection to a list of items.\nident");
    assert_read(
      &mut lexer,
      Keyword::Comment,
      "# A connection to a list of items.",
    );
    assert_read(&mut lexer, Keyword::Ident, "ident");
  }

  #[test]
  fn consecutive_comment_lines_merge() {
    assert_read(
      &mut lexer_for("#1\n#2\n#three"),
      Keyword::Comment,
      "#1\n#2\n#three",
    );
  }

  #[test]
  fn multi_read_ident_colon() {
    let mut lexer = lexer_for("foo:");
    assert_read(&mut lexer, Keyword::Ident, "foo");
    assert_read(&mut lexer, Keyword::Colon, ":");
  }

  #[test]
  fn multi_read_comma_separated_integers() {
    let mut lexer = lexer_for("1,2,3");
    assert_read(&mut lexer, Keyword::Integer, "1");
    assert_read(&mut lexer, Keyword::Integer, "2");
    assert_read(&mut lexer, Keyword::Integer, "3");
    assert_read(&mut lexer, Keyword::Eof, "");
  }

  #[test]
  fn multi_read_spread_on_type() {
    let mut lexer = lexer_for("...on Foo");
    assert_read(&mut lexer, Keyword::Spread, "...");
    assert_read(&mut lexer, Keyword::On, "on");
    assert_read(&mut lexer, Keyword::Ident, "Foo");
  }

  #[test]
  fn multi_read_positions() {
    let mut lexer = lexer_for(
      "foo bar baz\nbal\n bas \"\"\"\nx\"\"\"\n\"foo bar baz \"\n ...\n$foo \n 1337 ",
    );
    assert_position(&mut lexer, (1, 1, 1, 4));
    assert_position(&mut lexer, (1, 5, 1, 8));
    assert_position(&mut lexer, (1, 9, 1, 12));
    assert_position(&mut lexer, (2, 1, 2, 4));
    assert_position(&mut lexer, (3, 2, 3, 5));
    assert_position(&mut lexer, (3, 6, 4, 5));
    assert_position(&mut lexer, (5, 1, 5, 15));
    assert_position(&mut lexer, (6, 2, 6, 5));
    assert_position(&mut lexer, (7, 1, 7, 2));
    assert_position(&mut lexer, (7, 2, 7, 5));
    assert_position(&mut lexer, (8, 2, 8, 6));
  }

  #[test]
  fn multi_read_nested_structure() {
    let mut lexer = lexer_for(
      "Goland {\n\t... on GoWater {\n\t\t... on GoAir {\n\t\t\tgo\n\t\t}\n\t}\n}",
    );
    assert_read(&mut lexer, Keyword::Ident, "Goland");
    assert_read(&mut lexer, Keyword::LBrace, "{");
    assert_read(&mut lexer, Keyword::Spread, "...");
    assert_read(&mut lexer, Keyword::On, "on");
    assert_read(&mut lexer, Keyword::Ident, "GoWater");
    assert_read(&mut lexer, Keyword::LBrace, "{");
    assert_read(&mut lexer, Keyword::Spread, "...");
    assert_read(&mut lexer, Keyword::On, "on");
    assert_read(&mut lexer, Keyword::Ident, "GoAir");
    assert_read(&mut lexer, Keyword::LBrace, "{");
    assert_read(&mut lexer, Keyword::Ident, "go");
    assert_read(&mut lexer, Keyword::RBrace, "}");
    assert_read(&mut lexer, Keyword::RBrace, "}");
    assert_read(&mut lexer, Keyword::RBrace, "}");
  }

  #[test]
  fn multi_read_many_idents_and_strings() {
    let mut lexer = lexer_for(
      "1337 1338 1339 \"foo\" \"bar\" \"\"\"foo bar\"\"\" \"\"\"foo\nbar\"\"\" \"\"\"foo\nbar\nbaz\n\"\"\"\n13.37",
    );
    assert_read(&mut lexer, Keyword::Integer, "1337");
    assert_read(&mut lexer, Keyword::Integer, "1338");
    assert_read(&mut lexer, Keyword::Integer, "1339");
    assert_read(&mut lexer, Keyword::String, "foo");
    assert_read(&mut lexer, Keyword::String, "bar");
    assert_read(&mut lexer, Keyword::BlockString, "foo bar");
    assert_read(&mut lexer, Keyword::BlockString, "foo\nbar");
    assert_read(&mut lexer, Keyword::BlockString, "foo\nbar\nbaz");
    assert_read(&mut lexer, Keyword::Float, "13.37");
  }

  #[test]
  fn append_input() {
    let mut lexer = lexer_for("foo");

    let foo = lexer.read();
    assert_eq!(lexer.byte_slice(foo.literal), b"foo");

    lexer.append_input_bytes(b" bar");
    let bar = lexer.read();
    assert_eq!(lexer.byte_slice(bar.literal), b"bar");

    lexer.append_input_bytes(b" baz");
    let baz = lexer.read();
    assert_eq!(lexer.byte_slice(baz.literal), b"baz");

    // tokens from the first run still resolve to the same bytes
    assert_eq!(lexer.byte_slice(foo.literal), b"foo");
    assert_read(&mut lexer, Keyword::Eof, "");
  }

  #[test]
  fn eof_after_append_resumes_reading() {
    let mut lexer = lexer_for("foo");
    assert_read(&mut lexer, Keyword::Ident, "foo");
    assert_read(&mut lexer, Keyword::Eof, "");

    lexer.append_input_bytes(b" 42");
    assert_read(&mut lexer, Keyword::Integer, "42");
    assert_read(&mut lexer, Keyword::Eof, "");
  }
}
