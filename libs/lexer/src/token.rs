use crate::input::ByteRange;
use crate::keyword::Keyword;
use serde::{Deserialize, Serialize};

/// 1-based source coordinates of a token. `char_end` is exclusive of the
/// next character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPosition {
  pub line_start: u32,
  pub char_start: u32,
  pub line_end: u32,
  pub char_end: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
  pub keyword: Keyword,
  pub literal: ByteRange,
  pub position: TextPosition,
}
