use crate::cursor::CursorError;
use crate::grammar::GrammarError;
use std::fmt;
use std::ops::Range;

/// Bytes surrounding the location where a stream error occurred.
///
/// The window is split into the bytes before the fault, the bytes that make up
/// the faulting token, and the bytes after it. Each side is bounded by
/// [`ErrorContext::WINDOW`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    offset: usize,
    prefix: Vec<u8>,
    fault: Vec<u8>,
    suffix: Vec<u8>,
}

impl ErrorContext {
    /// Maximum number of bytes captured on either side of the fault
    pub const WINDOW: usize = 128;

    pub(crate) fn from_slice(data: &[u8], range: Range<usize>) -> ErrorContext {
        let start = range.start.min(data.len());
        let end = range.end.clamp(start, data.len());
        let prefix_start = start.saturating_sub(Self::WINDOW);
        let suffix_end = end.saturating_add(Self::WINDOW).min(data.len());
        ErrorContext {
            offset: start,
            prefix: data[prefix_start..start].to_vec(),
            fault: data[start..end].to_vec(),
            suffix: data[end..suffix_end].to_vec(),
        }
    }

    /// Context for a fault at `offset` of an output, where only the bytes
    /// written before it are known
    pub(crate) fn from_output(offset: usize, written: &[u8]) -> ErrorContext {
        let start = written.len().saturating_sub(Self::WINDOW);
        ErrorContext {
            offset,
            prefix: written[start..].to_vec(),
            fault: Vec::new(),
            suffix: Vec::new(),
        }
    }

    /// Byte offset of the fault within the stream, or within the output
    /// written so far for write errors
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes immediately preceding the fault
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Bytes of the token at fault (may be empty)
    pub fn fault(&self) -> &[u8] {
        &self.fault
    }

    /// Bytes immediately following the fault
    pub fn suffix(&self) -> &[u8] {
        &self.suffix
    }
}

/// An error that can occur when loading grammars or reading and writing streams
#[derive(Debug)]
pub struct Error(Box<ErrorInner>);

#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    context: Option<ErrorContext>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error(Box::new(ErrorInner {
            kind,
            context: None,
        }))
    }

    pub(crate) fn framing<T: Into<String>>(msg: T) -> Error {
        Error::new(ErrorKind::Framing(msg.into()))
    }

    pub(crate) fn bounds<T: Into<String>>(msg: T) -> Error {
        Error::new(ErrorKind::Bounds(msg.into()))
    }

    /// Attach the context window if the error does not have one yet
    #[must_use]
    pub(crate) fn at(mut self, data: &[u8], range: Range<usize>) -> Error {
        if self.0.context.is_none() {
            self.0.context = Some(ErrorContext::from_slice(data, range));
        }
        self
    }

    /// Shift the context of an error raised on a sub slice so its offset is
    /// relative to the enclosing data
    #[must_use]
    pub(crate) fn offset_by(mut self, base: usize) -> Error {
        if let Some(ctx) = self.0.context.as_mut() {
            ctx.offset += base;
        }
        self
    }

    /// Attach the output position and the bytes written before it if the
    /// error does not have a context yet
    #[must_use]
    pub(crate) fn at_output(mut self, offset: usize, written: &[u8]) -> Error {
        if self.0.context.is_none() {
            self.0.context = Some(ErrorContext::from_output(offset, written));
        }
        self
    }

    /// Return the specific type of error
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Consume the error and return the specific type of error
    pub fn into_kind(self) -> ErrorKind {
        self.0.kind
    }

    /// Returns the byte offset that the error occurs (if available)
    pub fn offset(&self) -> Option<usize> {
        match (&self.0.context, &self.0.kind) {
            (Some(ctx), _) => Some(ctx.offset()),
            (None, ErrorKind::Grammar(err)) => Some(err.offset()),
            _ => None,
        }
    }

    /// The bytes surrounding the fault (if available)
    pub fn context(&self) -> Option<&ErrorContext> {
        self.0.context.as_ref()
    }
}

/// Specific type of error
#[derive(Debug)]
pub enum ErrorKind {
    /// A grammar or token table could not be loaded
    Grammar(GrammarError),

    /// The grammar does not allow the token at this position
    UnexpectedToken { expected: Vec<String>, found: String },

    /// A stream signature or compression header is invalid
    Framing(String),

    /// The type of a primitive value could not be determined from the grammar
    TypeInference {
        candidates: Vec<String>,
        found: String,
    },

    /// A length exceeds the stream, its enclosing block, or a sanity limit
    Bounds(String),

    /// An error from the underlying reader or writer
    Io(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.0.kind {
            ErrorKind::Grammar(ref err) => Some(err),
            ErrorKind::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.kind {
            ErrorKind::Grammar(ref err) => write!(f, "grammar error: {}", err)?,
            ErrorKind::UnexpectedToken {
                ref expected,
                ref found,
            } => {
                if expected.is_empty() {
                    write!(f, "unexpected token {}", found)?
                } else {
                    write!(
                        f,
                        "unexpected token {}, expected one of: {}",
                        found,
                        expected.join(", ")
                    )?
                }
            }
            ErrorKind::Framing(ref msg) => write!(f, "invalid stream framing: {}", msg)?,
            ErrorKind::TypeInference {
                ref candidates,
                ref found,
            } => write!(
                f,
                "unable to infer value type of {} from candidates: {}",
                found,
                candidates.join(", ")
            )?,
            ErrorKind::Bounds(ref msg) => write!(f, "out of bounds: {}", msg)?,
            ErrorKind::Io(ref err) => write!(f, "io error: {}", err)?,
        }

        if let Some(ctx) = &self.0.context {
            write!(f, " (offset: {})", ctx.offset())?;
        }

        Ok(())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::new(ErrorKind::Io(error))
    }
}

impl From<GrammarError> for Error {
    fn from(error: GrammarError) -> Self {
        Error::new(ErrorKind::Grammar(error))
    }
}

impl From<CursorError> for Error {
    fn from(error: CursorError) -> Self {
        let (expected, found) = error.into_parts();
        Error::new(ErrorKind::UnexpectedToken { expected, found })
    }
}
