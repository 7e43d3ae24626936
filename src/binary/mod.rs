//! Types for reading and writing binary stream bodies
//!
//! A binary body is a sequence of blocks. Each block starts with a 32 bit
//! token id, a 32 bit length of the bytes that follow it, and a label
//! prefixed by its UTF-16 character count. Values inside a block carry no
//! type information, so they are decoded with the help of the grammar.

mod lexer;
mod reader;
mod resolver;
mod writer;

pub use self::lexer::{LexError, Lexer, LexerError};
pub use self::reader::{read_tokens, BinaryReader};
pub use self::resolver::{TokenResolver, TokenTable};
pub use self::writer::{write_tokens, BinaryWriter};

/// Largest string or buffer accepted in a binary body
pub(crate) const MAX_VALUE_LENGTH: usize = 10_000;
