use super::{reader::value_repr, TokenResolver, MAX_VALUE_LENGTH};
use crate::cursor::{value_candidate, Cursor};
use crate::format::SimisFormat;
use crate::token::{Token, Value, ValueData};
use crate::util::{encode_utf16le, OutputTail};
use crate::{Error, ErrorKind};
use std::io::{Seek, SeekFrom, Write};

/// Writes tokens as a binary stream body.
///
/// Every token is validated against the grammar before it is written. Block
/// lengths are unknown when a header is written, so a placeholder is written
/// and patched once the block ends.
#[derive(Debug)]
pub struct BinaryWriter<'g, W, R> {
    writer: W,
    cursor: Cursor<'g>,
    resolver: R,
    lengths: Vec<u64>,
    wrote_buffer: bool,
    scratch: Vec<u8>,
    tail: OutputTail,
}

impl<'g, W, R> BinaryWriter<'g, W, R>
where
    W: Write + Seek,
    R: TokenResolver,
{
    pub fn new(format: &'g SimisFormat, resolver: R, writer: W) -> Self {
        BinaryWriter {
            writer,
            cursor: Cursor::new(format),
            resolver,
            lengths: Vec::new(),
            wrote_buffer: false,
            scratch: Vec::new(),
            tail: OutputTail::default(),
        }
    }

    pub fn cursor(&self) -> &Cursor<'g> {
        &self.cursor
    }

    fn unexpected(&self, found: String) -> Error {
        let expected = self.cursor.valid_next_references().into_iter().collect();
        Error::new(ErrorKind::UnexpectedToken { expected, found })
    }

    /// Number of body bytes written so far
    pub fn position(&self) -> usize {
        self.tail.position()
    }

    fn fail(&self, err: Error) -> Error {
        err.at_output(self.tail.position(), self.tail.recent())
    }

    /// Validate and write a token. Errors carry the body offset the token
    /// would have been written at.
    pub fn write_token(&mut self, token: &Token) -> Result<(), Error> {
        self.write_token_inner(token).map_err(|e| self.fail(e))
    }

    fn write_token_inner(&mut self, token: &Token) -> Result<(), Error> {
        if self.wrote_buffer && *token != Token::BlockEnd {
            return Err(Error::bounds("a buffer must be the last value of its block"));
        }

        match token {
            Token::BlockHeader { type_name, label } => {
                self.write_block_header(type_name, label.as_deref())
            }
            Token::BlockBegin => Ok(self.cursor.enter_block()?),
            Token::BlockEnd => self.write_block_end(),
            Token::Value(value) => self.write_value(value),
        }
    }

    fn write_block_header(&mut self, type_name: &str, label: Option<&str>) -> Result<(), Error> {
        let candidate = self
            .cursor
            .candidates()
            .into_iter()
            .find(|x| x.is_production() && x.name().eq_ignore_ascii_case(type_name))
            .ok_or_else(|| self.unexpected(type_name.to_string()))?;

        let id = self
            .resolver
            .lookup(type_name)
            .ok_or_else(|| Error::framing(format!("no token id for block {}", type_name)))?;

        let label = label.unwrap_or("");
        let label_len = label.encode_utf16().count();
        let label_len = u8::try_from(label_len).map_err(|_| {
            Error::bounds(format!("block label of {} characters is too long", label_len))
        })?;

        self.cursor.move_to_candidate(&candidate)?;

        self.writer.write_all(&id.to_le_bytes())?;
        self.tail.push(&id.to_le_bytes());
        let position = self.writer.stream_position()?;
        self.scratch.clear();
        self.scratch.extend(0u32.to_le_bytes());
        self.scratch.push(label_len);
        encode_utf16le(label, &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.tail.push(&self.scratch);
        self.lengths.push(position);
        Ok(())
    }

    fn write_block_end(&mut self) -> Result<(), Error> {
        self.cursor.leave_block()?;
        self.wrote_buffer = false;

        let position = self
            .lengths
            .pop()
            .ok_or_else(|| self.unexpected(String::from("block end")))?;
        let end = self.writer.stream_position()?;
        let length = u32::try_from(end - position - 4)
            .map_err(|_| Error::bounds("block is larger than 4 GiB"))?;

        self.writer.seek(SeekFrom::Start(position))?;
        self.writer.write_all(&length.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> Result<(), Error> {
        let candidates = self.cursor.candidates();
        if candidates.is_empty() {
            return Err(self.unexpected(value.data.primitive().to_string()));
        }

        // a value is only readable back if the grammar leaves no doubt about
        // its encoding
        value_repr(&candidates)?;
        let candidate = value_candidate(&candidates, &value.data).ok_or_else(|| {
            Error::new(ErrorKind::TypeInference {
                candidates: candidates.iter().map(|x| x.name().to_string()).collect(),
                found: value.data.primitive().to_string(),
            })
        })?;

        self.scratch.clear();
        match &value.data {
            ValueData::Uint(x) | ValueData::Dword(x) => self.scratch.extend(x.to_le_bytes()),
            ValueData::Sint(x) => self.scratch.extend(x.to_le_bytes()),
            ValueData::Word(x) => self.scratch.extend(x.to_le_bytes()),
            ValueData::Byte(x) => self.scratch.push(*x),
            ValueData::Float(x) => self.scratch.extend(x.to_le_bytes()),
            ValueData::String(x) => {
                let len = x.encode_utf16().count();
                if len > MAX_VALUE_LENGTH {
                    let msg = format!("string length {} exceeds {}", len, MAX_VALUE_LENGTH);
                    return Err(Error::bounds(msg));
                }

                self.scratch.extend((len as u16).to_le_bytes());
                encode_utf16le(x, &mut self.scratch);
            }
            ValueData::Buffer(x) => {
                if x.is_empty() {
                    return Err(Error::bounds("an empty buffer cannot be written to a binary body"));
                }

                if x.len() > MAX_VALUE_LENGTH {
                    let msg = format!("buffer length {} exceeds {}", x.len(), MAX_VALUE_LENGTH);
                    return Err(Error::bounds(msg));
                }

                self.scratch.extend_from_slice(x);
                self.wrote_buffer = true;
            }
        }

        self.cursor.move_to_candidate(&candidate)?;
        self.writer.write_all(&self.scratch)?;
        self.tail.push(&self.scratch);
        Ok(())
    }

    /// Check the stream is complete and return the underlying writer
    pub fn finish(self) -> Result<W, Error> {
        if !self.cursor.is_complete() {
            return Err(self.fail(self.unexpected(String::from("end of stream"))));
        }

        Ok(self.writer)
    }
}

/// Write every token as a binary stream body
pub fn write_tokens<'t, W, R, I>(format: &SimisFormat, resolver: R, writer: W, tokens: I) -> Result<W, Error>
where
    W: Write + Seek,
    R: TokenResolver,
    I: IntoIterator<Item = &'t Token>,
{
    let mut out = BinaryWriter::new(format, resolver, writer);
    for token in tokens {
        out.write_token(token)?;
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::TokenTable;
    use std::io::Cursor as IoCursor;

    const GRAMMAR: &str = r#"
        FILE = :p | :d .
        FILE_NAME = "Blocks" .
        FILE_EXT = "p" .
        FILE_TYPE = "p" .
        FILE_TYPE_VER = "1" .
        p ==> [:uint] :float .
        d ==> :buffer .
    "#;

    fn write(tokens: &[Token]) -> Result<Vec<u8>, Error> {
        let format = SimisFormat::from_grammar_text(GRAMMAR).unwrap();
        let mut table = TokenTable::new();
        table.insert(0x0001_0000, "p");
        table.insert(0x0001_0001, "d");
        let out = write_tokens(&format, &table, IoCursor::new(Vec::new()), tokens)?;
        Ok(out.into_inner())
    }

    fn header(name: &str) -> Token {
        Token::BlockHeader {
            type_name: name.to_string(),
            label: None,
        }
    }

    #[test]
    fn test_buffer_block() {
        let tokens = [
            header("d"),
            Token::BlockBegin,
            Token::Value(Value::new(ValueData::Buffer(vec![0xab, 0xcd]))),
            Token::BlockEnd,
        ];
        let data = write(&tokens).unwrap();
        assert_eq!(data, [0x01, 0x00, 0x01, 0x00, 3, 0, 0, 0, 0, 0xab, 0xcd]);
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let tokens = [
            header("d"),
            Token::BlockBegin,
            Token::Value(Value::new(ValueData::Buffer(Vec::new()))),
            Token::BlockEnd,
        ];
        let err = write(&tokens).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Bounds(_)));
        assert_eq!(err.offset(), Some(9));
    }

    #[test]
    fn test_errors_carry_output_position() {
        let tokens = [
            header("p"),
            Token::BlockBegin,
            Token::Value(Value::new(ValueData::Sint(1))),
        ];
        let err = write(&tokens).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TypeInference { .. }));
        let ctx = err.context().unwrap();
        assert_eq!(ctx.offset(), 9);
        assert_eq!(ctx.prefix(), &[0x00, 0x00, 0x01, 0x00, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_incomplete_stream_carries_position() {
        let err = write(&[header("d"), Token::BlockBegin]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedToken { .. }));
        assert_eq!(err.offset(), Some(9));
    }
}
