use crate::util::{decode_utf16le, get_split};
use std::fmt;

#[inline]
pub(crate) fn read_u8(data: &[u8]) -> Result<(u8, &[u8]), LexError> {
    let (&first, rest) = data.split_first().ok_or(LexError::Eof)?;
    Ok((first, rest))
}

#[inline]
pub(crate) fn read_u16(data: &[u8]) -> Result<(u16, &[u8]), LexError> {
    let (head, rest) = get_split::<2>(data).ok_or(LexError::Eof)?;
    Ok((u16::from_le_bytes(head), rest))
}

#[inline]
pub(crate) fn read_u32(data: &[u8]) -> Result<(u32, &[u8]), LexError> {
    let (head, rest) = get_split::<4>(data).ok_or(LexError::Eof)?;
    Ok((u32::from_le_bytes(head), rest))
}

#[inline]
pub(crate) fn read_i32(data: &[u8]) -> Result<(i32, &[u8]), LexError> {
    let (head, rest) = get_split::<4>(data).ok_or(LexError::Eof)?;
    Ok((i32::from_le_bytes(head), rest))
}

#[inline]
pub(crate) fn read_f32(data: &[u8]) -> Result<(f32, &[u8]), LexError> {
    let (head, rest) = get_split::<4>(data).ok_or(LexError::Eof)?;
    Ok((f32::from_le_bytes(head), rest))
}

#[inline]
pub(crate) fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8]), LexError> {
    if len <= data.len() {
        Ok(data.split_at(len))
    } else {
        Err(LexError::Eof)
    }
}

/// Read `chars` UTF-16LE code units
#[inline]
pub(crate) fn read_utf16(data: &[u8], chars: usize) -> Result<(String, &[u8]), LexError> {
    let (text, rest) = read_bytes(data, chars * 2)?;
    let text = decode_utf16le(text).ok_or(LexError::InvalidUtf16)?;
    Ok((text, rest))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    Eof,
    InvalidUtf16,
}

impl std::error::Error for LexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LexError::Eof => write!(f, "unexpected end of stream"),
            LexError::InvalidUtf16 => write!(f, "invalid utf-16 text encountered"),
        }
    }
}

impl LexError {
    #[inline]
    #[must_use]
    pub fn at(self, position: usize) -> LexerError {
        LexerError {
            position,
            kind: self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerError {
    position: usize,
    kind: LexError,
}

impl LexerError {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn kind(&self) -> &LexError {
        &self.kind
    }
}

impl std::error::Error for LexerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            LexError::Eof => write!(f, "not enough data to read at {}", self.position),
            LexError::InvalidUtf16 => write!(f, "invalid utf-16 text at {}", self.position),
        }
    }
}

/// Reads little endian primitives off a binary stream body while tracking
/// the position
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    original_length: usize,
}

impl<'a> Lexer<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            original_length: data.len(),
        }
    }

    #[inline]
    pub fn remainder(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.original_length - self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn err_position(&self, err: LexError) -> LexerError {
        err.at(self.position())
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, LexerError> {
        let (result, rest) = read_u8(self.data).map_err(|e| self.err_position(e))?;
        self.data = rest;
        Ok(result)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, LexerError> {
        let (result, rest) = read_u16(self.data).map_err(|e| self.err_position(e))?;
        self.data = rest;
        Ok(result)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, LexerError> {
        let (result, rest) = read_u32(self.data).map_err(|e| self.err_position(e))?;
        self.data = rest;
        Ok(result)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, LexerError> {
        let (result, rest) = read_i32(self.data).map_err(|e| self.err_position(e))?;
        self.data = rest;
        Ok(result)
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, LexerError> {
        let (result, rest) = read_f32(self.data).map_err(|e| self.err_position(e))?;
        self.data = rest;
        Ok(result)
    }

    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], LexerError> {
        let (result, rest) = read_bytes(self.data, len).map_err(|e| self.err_position(e))?;
        self.data = rest;
        Ok(result)
    }

    #[inline]
    pub fn read_utf16(&mut self, chars: usize) -> Result<String, LexerError> {
        let (result, rest) = read_utf16(self.data, chars).map_err(|e| self.err_position(e))?;
        self.data = rest;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [
            0x2a, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x80,
            0x3f,
        ];
        let mut lexer = Lexer::new(&data);
        assert_eq!(lexer.read_u8(), Ok(42));
        assert_eq!(lexer.read_u16(), Ok(0x1234));
        assert_eq!(lexer.read_u32(), Ok(0x12345678));
        assert_eq!(lexer.read_i32(), Ok(-1));
        assert_eq!(lexer.read_f32(), Ok(1.0));
        assert!(lexer.is_empty());
        assert_eq!(lexer.position(), data.len());
    }

    #[test]
    fn test_eof_reports_position() {
        let mut lexer = Lexer::new(&[0x01, 0x02, 0x03]);
        assert_eq!(lexer.read_u16(), Ok(0x0201));
        let err = lexer.read_u32().unwrap_err();
        assert_eq!(err.position(), 2);
        assert_eq!(err.kind(), &LexError::Eof);
        assert_eq!(lexer.position(), 2);
    }

    #[test]
    fn test_read_utf16() {
        let data = [b'h', 0, b'i', 0, 0xff];
        let mut lexer = Lexer::new(&data);
        assert_eq!(lexer.read_utf16(2).as_deref(), Ok("hi"));
        assert_eq!(lexer.remainder(), &[0xff]);
        assert!(lexer.read_utf16(1).is_err());
    }
}
