use super::{lexer::LexError, Lexer, LexerError, TokenResolver, MAX_VALUE_LENGTH};
use crate::cursor::{Candidate, CandidateKind, Cursor};
use crate::format::SimisFormat;
use crate::token::{BinaryRepr, PrimitiveType, Token, Value, ValueData};
use crate::{Error, ErrorKind};

/// Size of a block's id and length fields
const BLOCK_HEADER_LEN: usize = 8;

/// Reads the tokens of a binary stream body, validating each one against the
/// format's grammar.
///
/// Binary blocks carry their length, so a block ends when its last byte has
/// been consumed. Values carry no type, so the reader asks the grammar which
/// primitives are valid next and decodes the bytes according to them.
#[derive(Debug)]
pub struct BinaryReader<'a, 'g, R> {
    data: &'a [u8],
    lexer: Lexer<'a>,
    cursor: Cursor<'g>,
    resolver: R,
    ends: Vec<usize>,
    pending_begin: bool,
}

impl<'a, 'g, R> BinaryReader<'a, 'g, R>
where
    R: TokenResolver,
{
    pub fn new(format: &'g SimisFormat, resolver: R, data: &'a [u8]) -> Self {
        BinaryReader {
            data,
            lexer: Lexer::new(data),
            cursor: Cursor::new(format),
            resolver,
            ends: Vec::new(),
            pending_begin: false,
        }
    }

    /// The grammar position after the last token that was read
    pub fn cursor(&self) -> &Cursor<'g> {
        &self.cursor
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    /// End of the innermost open block, or of the stream
    #[inline]
    fn limit(&self) -> usize {
        self.ends.last().copied().unwrap_or(self.data.len())
    }

    fn fail(&self, err: Error, start: usize) -> Error {
        err.at(self.data, start..self.lexer.position())
    }

    fn lex_error(&self, err: LexerError, start: usize) -> Error {
        let inner = match err.kind() {
            LexError::Eof => Error::bounds("unexpected end of stream"),
            LexError::InvalidUtf16 => Error::framing("invalid utf-16 text"),
        };
        inner.at(self.data, start..err.position())
    }

    fn unexpected(&self, found: String, start: usize) -> Error {
        let expected = self.cursor.valid_next_references().into_iter().collect();
        self.fail(Error::new(ErrorKind::UnexpectedToken { expected, found }), start)
    }

    /// Fail with a bounds error if `len` bytes do not fit in the innermost
    /// block
    fn ensure(&self, len: usize, what: &str) -> Result<(), Error> {
        let start = self.lexer.position();
        if start.saturating_add(len) > self.limit() {
            let msg = format!("{} of {} bytes overruns its enclosing block", what, len);
            Err(Error::bounds(msg).at(self.data, start..self.limit()))
        } else {
            Ok(())
        }
    }

    /// Read the next token. Returns `None` once the root block has been
    /// closed and the stream is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        let start = self.lexer.position();
        if self.pending_begin {
            self.pending_begin = false;
            self.cursor
                .enter_block()
                .map_err(|e| self.fail(e.into(), start))?;
            return Ok(Some(Token::BlockBegin));
        }

        if let Some(&end) = self.ends.last() {
            if start >= end {
                self.cursor
                    .leave_block()
                    .map_err(|e| self.fail(e.into(), start))?;
                self.ends.pop();
                tracing::trace!(position = start, depth = self.ends.len(), "block end");
                return Ok(Some(Token::BlockEnd));
            }
        }

        if self.cursor.is_complete() {
            if self.lexer.is_empty() {
                return Ok(None);
            }

            let found = format!("{} trailing bytes", self.lexer.remainder().len());
            return Err(self.unexpected(found, start));
        }

        if self.lexer.is_empty() {
            return Err(self.unexpected(String::from("end of stream"), start));
        }

        let candidates = self.cursor.candidates();
        if candidates.is_empty() {
            return Err(self.unexpected(String::from("data"), start));
        }

        let token = if candidates.iter().any(|x| x.is_production()) {
            self.read_block(start)?
        } else {
            self.read_value(&candidates, start)?
        };

        Ok(Some(token))
    }

    fn read_block(&mut self, start: usize) -> Result<Token, Error> {
        self.ensure(BLOCK_HEADER_LEN + 1, "block header")?;
        let id = self.lexer.read_u32().map_err(|e| self.lex_error(e, start))?;
        let length = self.lexer.read_u32().map_err(|e| self.lex_error(e, start))?;

        let body = self.lexer.position();
        let end = body.saturating_add(length as usize);
        if end > self.limit() {
            let msg = format!("block length {} overruns its enclosing block", length);
            return Err(Error::bounds(msg).at(self.data, start..self.limit()));
        }

        let label_len = self.lexer.read_u8().map_err(|e| self.lex_error(e, start))?;
        let label_bytes = usize::from(label_len) * 2;
        if body + 1 + label_bytes > end {
            let msg = format!("block label of {} characters overruns its block", label_len);
            return Err(Error::bounds(msg).at(self.data, start..end));
        }

        let label = self
            .lexer
            .read_utf16(usize::from(label_len))
            .map_err(|e| self.lex_error(e, start))?;

        let name = match self.resolver.resolve(id) {
            Some(name) => name.to_string(),
            None => return Err(self.unexpected(format!("unknown token id 0x{:08x}", id), start)),
        };

        let candidate = self
            .cursor
            .candidates()
            .into_iter()
            .find(|x| x.is_production() && x.name().eq_ignore_ascii_case(&name));
        let candidate = match candidate {
            Some(x) => x,
            None => return Err(self.unexpected(name, start)),
        };

        self.cursor
            .move_to_candidate(&candidate)
            .map_err(|e| self.fail(e.into(), start))?;

        tracing::trace!(block = candidate.name(), position = start, length, "block start");
        self.ends.push(end);
        self.pending_begin = true;

        Ok(Token::BlockHeader {
            type_name: self.cursor.production().unwrap_or(candidate.name()).to_string(),
            label: if label.is_empty() { None } else { Some(label) },
        })
    }

    fn read_value(&mut self, candidates: &[Candidate<'g>], start: usize) -> Result<Token, Error> {
        let repr = value_repr(candidates).map_err(|e| e.at(self.data, start..start))?;

        let (candidate, data) = match repr {
            BinaryRepr::String => {
                self.ensure(2, "string length")?;
                let len = self.lexer.read_u16().map_err(|e| self.lex_error(e, start))?;
                let len = usize::from(len);
                if len > MAX_VALUE_LENGTH {
                    let msg = format!("string length {} exceeds {}", len, MAX_VALUE_LENGTH);
                    return Err(self.fail(Error::bounds(msg), start));
                }

                self.ensure(len * 2, "string")?;
                let text = self
                    .lexer
                    .read_utf16(len)
                    .map_err(|e| self.lex_error(e, start))?;

                let literal = candidates
                    .iter()
                    .find(|x| x.kind() == CandidateKind::Literal && x.name() == text);
                let primitive = candidates
                    .iter()
                    .find(|x| x.primitive() == Some(PrimitiveType::String));
                match literal.or(primitive) {
                    Some(candidate) => (*candidate, ValueData::String(text)),
                    None => return Err(self.unexpected(format!("{:?}", text), start)),
                }
            }
            BinaryRepr::Buffer => {
                let len = self.limit() - start;
                if len > MAX_VALUE_LENGTH {
                    let msg = format!("buffer length {} exceeds {}", len, MAX_VALUE_LENGTH);
                    return Err(Error::bounds(msg).at(self.data, start..self.limit()));
                }

                let data = self
                    .lexer
                    .read_bytes(len)
                    .map_err(|e| self.lex_error(e, start))?;
                (candidates[0], ValueData::Buffer(data.to_vec()))
            }
            _ => {
                let candidate = candidates[0];
                let primitive = candidate.primitive().unwrap_or(PrimitiveType::Uint);
                let data = self.read_scalar(primitive, start)?;
                (candidate, data)
            }
        };

        self.cursor
            .move_to_candidate(&candidate)
            .map_err(|e| self.fail(e.into(), start))?;

        let value = match candidate.label() {
            Some(label) => Value::named(label, data),
            None => Value::new(data),
        };
        Ok(Token::Value(value))
    }

    fn read_scalar(&mut self, primitive: PrimitiveType, start: usize) -> Result<ValueData, Error> {
        let len = match primitive.binary_repr() {
            BinaryRepr::U8 => 1,
            BinaryRepr::U16 => 2,
            _ => 4,
        };
        self.ensure(len, primitive.name())?;

        let lexer = &mut self.lexer;
        let data = match primitive {
            PrimitiveType::Uint => lexer.read_u32().map(ValueData::Uint),
            PrimitiveType::Dword => lexer.read_u32().map(ValueData::Dword),
            PrimitiveType::Sint => lexer.read_i32().map(ValueData::Sint),
            PrimitiveType::Word => lexer.read_u16().map(ValueData::Word),
            PrimitiveType::Byte => lexer.read_u8().map(ValueData::Byte),
            PrimitiveType::Float => lexer.read_f32().map(ValueData::Float),
            PrimitiveType::String | PrimitiveType::Buffer => {
                unreachable!("variable length values are read by the caller")
            }
        };

        data.map_err(|e| self.lex_error(e, start))
    }
}

/// The binary representation shared by every value candidate. Literals are
/// stored as strings.
pub(crate) fn value_repr(candidates: &[Candidate]) -> Result<BinaryRepr, Error> {
    let repr = |x: &Candidate| match x.kind() {
        CandidateKind::Primitive(p) => Some(p.binary_repr()),
        CandidateKind::Literal => Some(BinaryRepr::String),
        CandidateKind::Production => None,
    };

    let mut reprs = candidates.iter().map(repr);
    let first = reprs.next().flatten();
    match first {
        Some(first) if reprs.all(|x| x == Some(first)) => Ok(first),
        _ => Err(Error::new(ErrorKind::TypeInference {
            candidates: candidates.iter().map(|x| x.name().to_string()).collect(),
            found: String::from("binary value"),
        })),
    }
}

/// Read every token of a binary stream body
pub fn read_tokens<R>(format: &SimisFormat, resolver: R, data: &[u8]) -> Result<Vec<Token>, Error>
where
    R: TokenResolver,
{
    let mut reader = BinaryReader::new(format, resolver, data);
    let mut tokens = Vec::new();
    while let Some(token) = reader.next_token()? {
        tokens.push(token);
    }

    tracing::debug!(tokens = tokens.len(), bytes = data.len(), "read binary stream");
    Ok(tokens)
}
