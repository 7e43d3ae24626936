use std::error;
use std::fmt;

/// Number of bytes of grammar text captured on either side of an error
pub(crate) const CONTEXT_WINDOW: usize = 128;

/// Specific kind of grammar or token table error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarErrorKind {
    /// A character that cannot start any grammar token
    UnexpectedCharacter(char),

    /// A `/*` comment without a closing `*/`
    UnterminatedComment,

    /// A `"` literal without a closing quote
    UnterminatedLiteral,

    /// A token that is not valid at this point of a rule
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },

    /// A `]` or `}` without its opener, an opener without its closer, or a
    /// closer of the wrong kind
    UnbalancedBracket,

    /// A rule with no body
    EmptyRule(String),

    /// A symbol defined more than once
    DuplicateSymbol(String),

    /// One of the required `FILE*` pseudo productions is absent
    MissingPseudoProduction(&'static str),

    /// A `FILE*` pseudo production has a body of the wrong shape
    InvalidPseudoProduction(&'static str),

    /// A reference that is neither a definition, a production, nor a primitive
    UnresolvedReference(String),

    /// A definition that expands into itself
    RecursiveDefinition(String),

    /// A malformed line in a token table
    InvalidTokenDefinition(String),
}

/// An error encountered while loading a grammar description or token table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarError {
    kind: GrammarErrorKind,
    offset: usize,
    context: String,
}

impl GrammarError {
    pub(crate) fn new(kind: GrammarErrorKind, text: &str, offset: usize) -> GrammarError {
        GrammarError {
            kind,
            offset,
            context: context_window(text, offset),
        }
    }

    /// Return the specific type of error
    pub fn kind(&self) -> &GrammarErrorKind {
        &self.kind
    }

    /// Byte offset into the grammar text
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Up to 128 bytes of grammar text on either side of the offset
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns true if the grammar is well formed but is missing the `FILE*`
    /// pseudo productions that make it a loadable format
    pub fn is_missing_pseudo_production(&self) -> bool {
        matches!(self.kind, GrammarErrorKind::MissingPseudoProduction(_))
    }
}

fn context_window(text: &str, offset: usize) -> String {
    let offset = offset.min(text.len());
    let mut start = offset.saturating_sub(CONTEXT_WINDOW);
    while !text.is_char_boundary(start) {
        start -= 1;
    }

    let mut end = offset.saturating_add(CONTEXT_WINDOW).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }

    text[start..end].to_string()
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            GrammarErrorKind::UnexpectedCharacter(c) => {
                write!(f, "unexpected character {:?}", c)?
            }
            GrammarErrorKind::UnterminatedComment => write!(f, "unterminated comment")?,
            GrammarErrorKind::UnterminatedLiteral => write!(f, "unterminated literal")?,
            GrammarErrorKind::UnexpectedToken {
                expected,
                ref found,
            } => write!(f, "expected {} but found {}", expected, found)?,
            GrammarErrorKind::UnbalancedBracket => write!(f, "unbalanced bracket")?,
            GrammarErrorKind::EmptyRule(ref x) => write!(f, "rule {} has no body", x)?,
            GrammarErrorKind::DuplicateSymbol(ref x) => {
                write!(f, "symbol {} is defined more than once", x)?
            }
            GrammarErrorKind::MissingPseudoProduction(x) => {
                write!(f, "required pseudo production {} is missing", x)?
            }
            GrammarErrorKind::InvalidPseudoProduction(x) => {
                write!(f, "pseudo production {} is malformed", x)?
            }
            GrammarErrorKind::UnresolvedReference(ref x) => {
                write!(f, "reference to undefined symbol {}", x)?
            }
            GrammarErrorKind::RecursiveDefinition(ref x) => {
                write!(f, "definition {} expands into itself", x)?
            }
            GrammarErrorKind::InvalidTokenDefinition(ref x) => {
                write!(f, "invalid token definition: {}", x)?
            }
        }

        write!(f, " (offset: {}) near: {}", self.offset, self.context)
    }
}

impl error::Error for GrammarError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}
