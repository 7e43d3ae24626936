use super::{infer_value, Lexeme, Lexer, LexerError};
use crate::cursor::Cursor;
use crate::format::SimisFormat;
use crate::token::{Token, Value};
use crate::{Error, ErrorKind};
use std::ops::Range;

/// Reads the tokens of a decoded text stream body, validating each one
/// against the format's grammar.
#[derive(Debug)]
pub struct TextReader<'a, 'g> {
    data: &'a str,
    lexer: Lexer<'a>,
    cursor: Cursor<'g>,
    pending_begin: Option<Range<usize>>,
}

impl<'a, 'g> TextReader<'a, 'g> {
    pub fn new(format: &'g SimisFormat, data: &'a str) -> Self {
        TextReader {
            data,
            lexer: Lexer::new(data),
            cursor: Cursor::new(format),
            pending_begin: None,
        }
    }

    pub fn cursor(&self) -> &Cursor<'g> {
        &self.cursor
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    fn fail(&self, err: Error, range: Range<usize>) -> Error {
        err.at(self.data.as_bytes(), range)
    }

    fn lex_error(&self, err: LexerError) -> Error {
        let position = err.position();
        self.fail(Error::framing(err.to_string()), position..self.data.len())
    }

    fn unexpected(&self, found: String, range: Range<usize>) -> Error {
        let expected = self.cursor.valid_next_references().into_iter().collect();
        self.fail(Error::new(ErrorKind::UnexpectedToken { expected, found }), range)
    }

    fn next_lexeme(&mut self) -> Result<Option<(Range<usize>, Lexeme<'a>)>, Error> {
        self.lexer.next_lexeme().map_err(|e| self.lex_error(e))
    }

    /// Read the next token. Returns `None` once the root block has been
    /// closed and the body is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        if let Some(range) = self.pending_begin.take() {
            self.cursor
                .enter_block()
                .map_err(|e| self.fail(e.into(), range))?;
            return Ok(Some(Token::BlockBegin));
        }

        let (range, lexeme) = match self.next_lexeme()? {
            Some(x) => x,
            None if self.cursor.is_complete() => return Ok(None),
            None => {
                let end = self.data.len();
                return Err(self.unexpected(String::from("end of stream"), end..end));
            }
        };

        if self.cursor.is_complete() {
            return Err(self.unexpected(lexeme.to_string(), range));
        }

        match lexeme {
            Lexeme::Close => {
                self.cursor
                    .leave_block()
                    .map_err(|e| self.fail(e.into(), range))?;
                Ok(Some(Token::BlockEnd))
            }
            Lexeme::Open => Err(self.unexpected(String::from("("), range)),
            Lexeme::Word(word) => {
                if let Some(token) = self.read_block_header(word, range.clone())? {
                    return Ok(Some(token));
                }
                self.read_value(word, false, range).map(Some)
            }
            Lexeme::Quoted(text) => self.read_value(&text, true, range).map(Some),
        }
    }

    /// Read `word [label] (` if the word names a production the grammar
    /// allows here. Returns `None` without consuming anything otherwise.
    fn read_block_header(&mut self, word: &str, range: Range<usize>) -> Result<Option<Token>, Error> {
        let candidate = self
            .cursor
            .candidates()
            .into_iter()
            .find(|x| x.is_production() && x.name().eq_ignore_ascii_case(word));
        let candidate = match candidate {
            Some(x) => x,
            None => return Ok(None),
        };

        let mut ahead = self.lexer.clone();
        let peek = |lexer: &mut Lexer<'a>| lexer.next_lexeme().map_err(|e| self.lex_error(e));
        let (label, open) = match peek(&mut ahead)? {
            Some((open, Lexeme::Open)) => (None, open),
            Some((_, Lexeme::Word(label))) => match peek(&mut ahead)? {
                Some((open, Lexeme::Open)) => (Some(label.to_string()), open),
                _ => return Ok(None),
            },
            Some((_, Lexeme::Quoted(label))) => match peek(&mut ahead)? {
                Some((open, Lexeme::Open)) => (Some(label), open),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };

        self.cursor
            .move_to_candidate(&candidate)
            .map_err(|e| self.fail(e.into(), range.clone()))?;
        self.lexer = ahead;
        self.pending_begin = Some(open);
        tracing::trace!(block = candidate.name(), position = range.start, "block start");

        Ok(Some(Token::BlockHeader {
            type_name: self.cursor.production().unwrap_or(candidate.name()).to_string(),
            label,
        }))
    }

    fn read_value(&mut self, text: &str, quoted: bool, range: Range<usize>) -> Result<Token, Error> {
        let candidates = self.cursor.candidates();
        let values: Vec<_> = candidates.into_iter().filter(|x| !x.is_production()).collect();
        if values.is_empty() {
            let found = if quoted { format!("{:?}", text) } else { text.to_string() };
            return Err(self.unexpected(found, range));
        }

        let (candidate, data) = match infer_value(&values, text, quoted) {
            Some(x) => x,
            None => {
                let err = Error::new(ErrorKind::TypeInference {
                    candidates: values.iter().map(|x| x.name().to_string()).collect(),
                    found: text.to_string(),
                });
                return Err(self.fail(err, range));
            }
        };

        self.cursor
            .move_to_candidate(&candidate)
            .map_err(|e| self.fail(e.into(), range))?;

        let value = match candidate.label() {
            Some(label) => Value::named(label, data),
            None => Value::new(data),
        };
        Ok(Token::Value(value))
    }
}

/// Read every token of a decoded text stream body
pub fn read_tokens(format: &SimisFormat, data: &str) -> Result<Vec<Token>, Error> {
    let mut reader = TextReader::new(format, data);
    let mut tokens = Vec::new();
    while let Some(token) = reader.next_token()? {
        tokens.push(token);
    }

    tracing::debug!(tokens = tokens.len(), bytes = data.len(), "read text stream");
    Ok(tokens)
}
