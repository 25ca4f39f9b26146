pub mod input;
pub mod keyword;
pub mod lexer;
pub mod token;

pub use input::{ByteRange, Input};
pub use keyword::Keyword;
pub use lexer::Lexer;
pub use token::{TextPosition, Token};
