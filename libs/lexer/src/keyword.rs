use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The closed set of token kinds the lexer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Keyword {
  #[default]
  Eof,
  Ident,
  Integer,
  Float,
  String,
  BlockString,
  Comment,
  Pipe,
  Dot,
  Spread,
  Dollar,
  At,
  Equals,
  Colon,
  Bang,
  LParen,
  RParen,
  LBrack,
  RBrack,
  LBrace,
  RBrace,
  And,
  Sub,
  True,
  False,
  Null,
  Query,
  Mutation,
  Subscription,
  Fragment,
  Implements,
  Schema,
  Scalar,
  Type,
  Interface,
  Union,
  Enum,
  Input,
  Directive,
  Extend,
  On,
}

impl Keyword {
  /// Maps a scanned identifier to its reserved keyword, or `Ident`.
  pub fn from_identifier(literal: &[u8]) -> Keyword {
    match literal {
      b"true" => Keyword::True,
      b"false" => Keyword::False,
      b"null" => Keyword::Null,
      b"query" => Keyword::Query,
      b"mutation" => Keyword::Mutation,
      b"subscription" => Keyword::Subscription,
      b"fragment" => Keyword::Fragment,
      b"implements" => Keyword::Implements,
      b"schema" => Keyword::Schema,
      b"scalar" => Keyword::Scalar,
      b"type" => Keyword::Type,
      b"interface" => Keyword::Interface,
      b"union" => Keyword::Union,
      b"enum" => Keyword::Enum,
      b"input" => Keyword::Input,
      b"directive" => Keyword::Directive,
      b"extend" => Keyword::Extend,
      b"on" => Keyword::On,
      _ => Keyword::Ident,
    }
  }
}

impl Display for Keyword {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}", self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reserved_identifiers_map_to_keywords() {
    assert_eq!(Keyword::from_identifier(b"on"), Keyword::On);
    assert_eq!(Keyword::from_identifier(b"extend"), Keyword::Extend);
    assert_eq!(Keyword::from_identifier(b"inputValue"), Keyword::Ident);
    assert_eq!(Keyword::from_identifier(b"Query"), Keyword::Ident);
  }
}
