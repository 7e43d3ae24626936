use std::fmt;
use std::ops::Range;

/// A lexical unit of a text stream body
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Lexeme<'a> {
    Open,
    Close,

    /// A bare run of characters up to whitespace, a parenthesis, or a quote
    Word(&'a str),

    /// A quoted string with escapes resolved and `+` concatenations joined
    Quoted(String),
}

impl<'a> fmt::Display for Lexeme<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Lexeme::Open => f.write_str("("),
            Lexeme::Close => f.write_str(")"),
            Lexeme::Word(x) => f.write_str(x),
            Lexeme::Quoted(x) => write!(f, "{:?}", x),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LexError {
    UnterminatedString,
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

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            LexError::UnterminatedString => {
                write!(f, "unterminated string starting at {}", self.position)
            }
        }
    }
}

#[inline]
pub(crate) fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')' && c != '"'
}

/// Splits a decoded text stream body into lexemes
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a str) -> Self {
        Lexer { data, position: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.data[self.position..];
        let trimmed = rest.trim_start();
        self.position += rest.len() - trimmed.len();
    }

    /// The next lexeme without consuming it
    pub fn peek(&self) -> Result<Option<(Range<usize>, Lexeme<'a>)>, LexerError> {
        self.clone().next_lexeme()
    }

    pub fn next_lexeme(&mut self) -> Result<Option<(Range<usize>, Lexeme<'a>)>, LexerError> {
        self.skip_whitespace();
        let start = self.position;
        let rest = &self.data[start..];
        let lexeme = match rest.chars().next() {
            None => return Ok(None),
            Some('(') => {
                self.position += 1;
                Lexeme::Open
            }
            Some(')') => {
                self.position += 1;
                Lexeme::Close
            }
            Some('"') => Lexeme::Quoted(self.quoted()?),
            Some(_) => {
                let len = rest.find(|c| !is_word_char(c)).unwrap_or(rest.len());
                self.position += len;
                Lexeme::Word(&rest[..len])
            }
        };

        Ok(Some((start..self.position, lexeme)))
    }

    /// Read a quoted string and any `+ "..."` continuations
    fn quoted(&mut self) -> Result<String, LexerError> {
        let mut result = String::new();
        loop {
            self.quoted_part(&mut result)?;

            let mut ahead = self.clone();
            ahead.skip_whitespace();
            if !ahead.data[ahead.position..].starts_with('+') {
                return Ok(result);
            }

            ahead.position += 1;
            ahead.skip_whitespace();
            if !ahead.data[ahead.position..].starts_with('"') {
                return Ok(result);
            }

            self.position = ahead.position;
        }
    }

    fn quoted_part(&mut self, out: &mut String) -> Result<(), LexerError> {
        let start = self.position;
        let mut chars = self.data[start + 1..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.position = start + 1 + i + 1;
                    return Ok(());
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, other)) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                c => out.push(c),
            }
        }

        Err(LexError::UnterminatedString.at(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(data: &str) -> Vec<Lexeme> {
        let mut lexer = Lexer::new(data);
        let mut result = Vec::new();
        while let Some((_, lexeme)) = lexer.next_lexeme().unwrap() {
            result.push(lexeme);
        }
        result
    }

    #[test]
    fn test_words_and_parens() {
        assert_eq!(
            lex("shape ( point(1.5 -2) )"),
            vec![
                Lexeme::Word("shape"),
                Lexeme::Open,
                Lexeme::Word("point"),
                Lexeme::Open,
                Lexeme::Word("1.5"),
                Lexeme::Word("-2"),
                Lexeme::Close,
                Lexeme::Close,
            ]
        );
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(
            lex(r#""a\"b\\c\td\ne""#),
            vec![Lexeme::Quoted(String::from("a\"b\\c\td\ne"))]
        );
    }

    #[test]
    fn test_quoted_concatenation() {
        assert_eq!(
            lex("\"abc\" +\r\n\t\"def\" + \"g\" 12"),
            vec![Lexeme::Quoted(String::from("abcdefg")), Lexeme::Word("12")]
        );
    }

    #[test]
    fn test_plus_without_string_is_a_word() {
        assert_eq!(
            lex("\"abc\" +1"),
            vec![Lexeme::Quoted(String::from("abc")), Lexeme::Word("+1")]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("a \"bcd");
        assert!(lexer.next_lexeme().is_ok());
        let err = lexer.next_lexeme().unwrap_err();
        assert_eq!(err.position(), 2);
        assert_eq!(err.kind(), &LexError::UnterminatedString);
    }

    #[test]
    fn test_ranges() {
        let mut lexer = Lexer::new("  ab (");
        assert_eq!(
            lexer.next_lexeme().unwrap(),
            Some((2..4, Lexeme::Word("ab")))
        );
        assert_eq!(lexer.peek().unwrap(), Some((5..6, Lexeme::Open)));
        assert_eq!(lexer.position(), 4);
    }
}
