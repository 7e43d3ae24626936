//! Types for reading and writing text stream bodies
//!
//! A text body is made of parenthesized blocks, `type [label] ( ... )`, that
//! contain whitespace separated values and further blocks. Values are bare
//! words or quoted strings; their types are inferred from the candidates the
//! grammar allows at that point.

mod lexer;
mod reader;
mod writer;

pub use self::lexer::{LexError, Lexeme, Lexer, LexerError};
pub use self::reader::{read_tokens, TextReader};
pub use self::writer::{write_tokens, TextWriter, TextWriterBuilder};

use crate::cursor::{Candidate, CandidateKind};
use crate::token::{PrimitiveType, ValueData};

#[inline]
fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|x| x.is_ascii_digit())
}

fn parse_primitive(primitive: PrimitiveType, text: &str, quoted: bool) -> Option<ValueData> {
    match primitive {
        _ if quoted && primitive != PrimitiveType::Buffer => None,
        PrimitiveType::Uint if is_digits(text) => text.parse().ok().map(ValueData::Uint),
        PrimitiveType::Word if is_digits(text) => text.parse().ok().map(ValueData::Word),
        PrimitiveType::Byte if is_digits(text) => text.parse().ok().map(ValueData::Byte),
        PrimitiveType::Sint if is_digits(text.strip_prefix(|c| c == '-' || c == '+').unwrap_or(text)) => {
            text.parse().ok().map(ValueData::Sint)
        }
        PrimitiveType::Dword if text.len() == 8 && text.bytes().all(|x| x.is_ascii_hexdigit()) => {
            u32::from_str_radix(text, 16).ok().map(ValueData::Dword)
        }
        PrimitiveType::Float
            if !text.is_empty()
                && text
                    .bytes()
                    .all(|x| matches!(x, b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E')) =>
        {
            text.parse().ok().map(ValueData::Float)
        }
        PrimitiveType::Buffer => hex::decode(text).ok().map(ValueData::Buffer),
        _ => None,
    }
}

/// Infer the value a word or quoted string stands for.
///
/// Literals are tried first, then the primitives in grammar order with
/// strings last.
pub(crate) fn infer_value<'g>(
    candidates: &[Candidate<'g>],
    text: &str,
    quoted: bool,
) -> Option<(Candidate<'g>, ValueData)> {
    let literal = candidates
        .iter()
        .find(|x| x.kind() == CandidateKind::Literal && x.name() == text);
    if let Some(literal) = literal {
        return Some((*literal, ValueData::String(text.to_string())));
    }

    let parsed = candidates.iter().find_map(|x| {
        let primitive = x.primitive()?;
        parse_primitive(primitive, text, quoted).map(|data| (*x, data))
    });
    if parsed.is_some() {
        return parsed;
    }

    candidates
        .iter()
        .find(|x| x.primitive() == Some(PrimitiveType::String))
        .map(|x| (*x, ValueData::String(text.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(PrimitiveType::Uint, "42", Some(ValueData::Uint(42)))]
    #[case(PrimitiveType::Uint, "-42", None)]
    #[case(PrimitiveType::Uint, "4294967296", None)]
    #[case(PrimitiveType::Sint, "-42", Some(ValueData::Sint(-42)))]
    #[case(PrimitiveType::Sint, "+42", Some(ValueData::Sint(42)))]
    #[case(PrimitiveType::Uint, "+42", None)]
    #[case(PrimitiveType::Uint, "007", Some(ValueData::Uint(7)))]
    #[case(PrimitiveType::Word, "65535", Some(ValueData::Word(65535)))]
    #[case(PrimitiveType::Byte, "256", None)]
    #[case(PrimitiveType::Dword, "0000ff00", Some(ValueData::Dword(0xff00)))]
    #[case(PrimitiveType::Dword, "ff00", None)]
    #[case(PrimitiveType::Float, "-1.5e-3", Some(ValueData::Float(-1.5e-3)))]
    #[case(PrimitiveType::Float, "inf", None)]
    #[case(PrimitiveType::Buffer, "0a0b", Some(ValueData::Buffer(vec![0x0a, 0x0b])))]
    #[case(PrimitiveType::Buffer, "DeadBeef", Some(ValueData::Buffer(vec![0xde, 0xad, 0xbe, 0xef])))]
    #[case(PrimitiveType::Buffer, "", Some(ValueData::Buffer(vec![])))]
    #[case(PrimitiveType::Buffer, "abc", None)]
    #[case(PrimitiveType::Buffer, "zz", None)]
    #[case(PrimitiveType::String, "abc", None)]
    fn test_parse_bare(
        #[case] primitive: PrimitiveType,
        #[case] text: &str,
        #[case] expected: Option<ValueData>,
    ) {
        assert_eq!(parse_primitive(primitive, text, false), expected);
    }

    #[test]
    fn test_quoted_numbers_are_not_numbers() {
        assert_eq!(parse_primitive(PrimitiveType::Uint, "42", true), None);
        assert_eq!(
            parse_primitive(PrimitiveType::Buffer, "ff", true),
            Some(ValueData::Buffer(vec![0xff]))
        );
    }
}
