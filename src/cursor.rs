use crate::format::SimisFormat;
use crate::fsm::{Fsm, StateId, StateKind};
use crate::token::{PrimitiveType, ValueData};
use std::collections::BTreeSet;
use std::error;
use std::fmt;

/// Pseudo reference reported when a block must be opened
pub const BEGIN_BLOCK: &str = "<begin-block>";

/// Pseudo reference reported when the current block may be closed
pub const END_BLOCK: &str = "<end-block>";

/// The step the grammar did not allow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorError {
    expected: Vec<String>,
    found: String,
}

impl CursorError {
    /// The references that were valid, ordered
    pub fn expected(&self) -> &[String] {
        &self.expected
    }

    /// The reference that was attempted
    pub fn found(&self) -> &str {
        &self.found
    }

    pub fn into_parts(self) -> (Vec<String>, String) {
        (self.expected, self.found)
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} is not valid here, expected one of: {}",
            self.found,
            self.expected.join(", ")
        )
    }
}

impl error::Error for CursorError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

/// What a candidate reference resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Primitive(PrimitiveType),
    Production,
    Literal,
}

/// A reference the cursor may move to next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'g> {
    name: &'g str,
    label: Option<&'g str>,
    kind: CandidateKind,
    state: Option<StateId>,
}

impl<'g> Candidate<'g> {
    /// Referenced symbol, or the text of a literal
    pub fn name(&self) -> &'g str {
        self.name
    }

    /// Grammar label of the reference
    pub fn label(&self) -> Option<&'g str> {
        self.label
    }

    pub fn kind(&self) -> CandidateKind {
        self.kind
    }

    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self.kind {
            CandidateKind::Primitive(x) => Some(x),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        self.kind == CandidateKind::Production
    }
}

#[derive(Debug, Clone)]
struct Frame<'g> {
    production: &'g str,
    fsm: &'g Fsm,
    state: StateId,
}

/// Tracks the position within a format's grammar while a stream is read or
/// written.
///
/// A cursor starts out expecting one of the format's root productions. Moving
/// to a production reference pushes a frame that must be entered with
/// [`Cursor::enter_block`] and later closed with [`Cursor::leave_block`].
/// Once the root block is closed the cursor is complete.
///
/// ```
/// use simis::{Cursor, SimisFormat};
///
/// let format = SimisFormat::from_grammar_text(r#"
///     FILE = :point .
///     FILE_NAME = "Point" .
///     FILE_EXT = "pt" .
///     FILE_TYPE = "p" .
///     FILE_TYPE_VER = "1" .
///     point ==> :float,X :float,Y .
/// "#).unwrap();
///
/// let mut cursor = Cursor::new(&format);
/// cursor.move_to("point").unwrap();
/// cursor.enter_block().unwrap();
/// cursor.move_to("float").unwrap();
/// assert!(cursor.leave_block().is_err());
/// cursor.move_to("float").unwrap();
/// cursor.leave_block().unwrap();
/// assert!(cursor.is_complete());
/// ```
#[derive(Debug, Clone)]
pub struct Cursor<'g> {
    format: &'g SimisFormat,
    frames: Vec<Frame<'g>>,
    started: bool,
    awaiting_begin: bool,
}

impl<'g> Cursor<'g> {
    pub fn new(format: &'g SimisFormat) -> Cursor<'g> {
        Cursor {
            format,
            frames: Vec::new(),
            started: false,
            awaiting_begin: false,
        }
    }

    pub fn format(&self) -> &'g SimisFormat {
        self.format
    }

    /// Number of open frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Name of the innermost production
    pub fn production(&self) -> Option<&'g str> {
        self.frames.last().map(|x| x.production)
    }

    /// The root block has been opened and closed
    pub fn is_complete(&self) -> bool {
        self.started && self.frames.is_empty()
    }

    /// A block header was accepted and its begin marker is expected next
    pub fn must_begin_block(&self) -> bool {
        self.awaiting_begin
    }

    /// The innermost block may be closed now
    pub fn can_end_block(&self) -> bool {
        match self.frames.last() {
            Some(frame) => !self.awaiting_begin && frame.fsm.can_finish(frame.state),
            None => false,
        }
    }

    /// The references the cursor may move to next
    pub fn candidates(&self) -> Vec<Candidate<'g>> {
        let format = self.format;
        if !self.started {
            return format
                .info()
                .roots()
                .iter()
                .map(|name| Candidate {
                    name: name.as_str(),
                    label: None,
                    kind: CandidateKind::Production,
                    state: None,
                })
                .collect();
        }

        let frame = match self.frames.last() {
            Some(frame) if !self.awaiting_begin => frame,
            _ => return Vec::new(),
        };

        let fsm = frame.fsm;
        fsm.state(frame.state)
            .next()
            .iter()
            .filter_map(|&id| {
                let (name, label, kind) = match fsm.state(id).kind() {
                    StateKind::Reference { name, label } => {
                        (name.as_str(), label.as_deref(), self.reference_kind(name))
                    }
                    StateKind::Literal(text) => (text.as_str(), None, CandidateKind::Literal),
                    StateKind::Start | StateKind::Finish => return None,
                };

                Some(Candidate {
                    name,
                    label,
                    kind,
                    state: Some(id),
                })
            })
            .collect()
    }

    fn reference_kind(&self, name: &str) -> CandidateKind {
        if self.format.grammar().is_production(name) {
            CandidateKind::Production
        } else {
            PrimitiveType::from_name(name)
                .map(CandidateKind::Primitive)
                .unwrap_or(CandidateKind::Production)
        }
    }

    /// Every reference or pseudo reference that is valid next
    pub fn valid_next_references(&self) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        if self.is_complete() {
            return result;
        }

        if self.awaiting_begin {
            result.insert(String::from(BEGIN_BLOCK));
            return result;
        }

        result.extend(self.candidates().iter().map(|x| x.name.to_string()));
        if self.can_end_block() {
            result.insert(String::from(END_BLOCK));
        }

        result
    }

    fn error(&self, found: &str) -> CursorError {
        CursorError {
            expected: self.valid_next_references().into_iter().collect(),
            found: found.to_string(),
        }
    }

    /// Move to the first candidate whose name matches, ignoring ASCII case.
    /// Moving to a production pushes a frame that awaits its begin marker.
    pub fn move_to(&mut self, name: &str) -> Result<Candidate<'g>, CursorError> {
        let candidate = self
            .candidates()
            .into_iter()
            .find(|x| x.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| self.error(name))?;

        self.move_to_candidate(&candidate)?;
        Ok(candidate)
    }

    /// Move to a candidate previously returned by [`Cursor::candidates`]
    pub fn move_to_candidate(&mut self, candidate: &Candidate<'g>) -> Result<(), CursorError> {
        if !self.candidates().contains(candidate) {
            return Err(self.error(candidate.name));
        }

        if candidate.is_production() {
            let format = self.format;
            let fsm = format
                .fsm(candidate.name)
                .ok_or_else(|| self.error(candidate.name))?;
            let production = format
                .grammar()
                .production(candidate.name)
                .map_or(candidate.name, |x| x.symbol());

            if let (Some(frame), Some(state)) = (self.frames.last_mut(), candidate.state) {
                frame.state = state;
            }

            self.frames.push(Frame {
                production,
                fsm,
                state: fsm.start(),
            });
            self.started = true;
            self.awaiting_begin = true;
        } else if let (Some(frame), Some(state)) = (self.frames.last_mut(), candidate.state) {
            frame.state = state;
        }

        Ok(())
    }

    /// Consume the begin marker of the block announced by the last move
    pub fn enter_block(&mut self) -> Result<(), CursorError> {
        if !self.awaiting_begin {
            return Err(self.error(BEGIN_BLOCK));
        }

        self.awaiting_begin = false;
        Ok(())
    }

    /// Consume the end marker of the innermost block
    pub fn leave_block(&mut self) -> Result<(), CursorError> {
        if !self.can_end_block() {
            return Err(self.error(END_BLOCK));
        }

        self.frames.pop();
        Ok(())
    }
}

/// The candidate a value is written against: a matching literal, or the
/// first primitive of the value's type
pub(crate) fn value_candidate<'g>(
    candidates: &[Candidate<'g>],
    data: &ValueData,
) -> Option<Candidate<'g>> {
    if let ValueData::String(text) = data {
        let literal = candidates
            .iter()
            .find(|x| x.kind == CandidateKind::Literal && x.name == text);
        if let Some(literal) = literal {
            return Some(*literal);
        }
    }

    let primitive = data.primitive();
    candidates
        .iter()
        .find(|x| x.primitive() == Some(primitive))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAMMAR: &str = r#"
        FILE = :shape .
        FILE_NAME = "Shape" .
        FILE_EXT = "s" .
        FILE_TYPE = "s" .
        FILE_TYPE_VER = "1" .
        shape ==> :uint,Version [:name] {:point} .
        name ==> :string .
        point ==> :float :float | "none" .
    "#;

    fn format() -> SimisFormat {
        SimisFormat::from_grammar_text(GRAMMAR).unwrap()
    }

    fn names(cursor: &Cursor) -> Vec<String> {
        cursor.valid_next_references().into_iter().collect()
    }

    #[test]
    fn walks_a_stream() {
        let format = format();
        let mut cursor = Cursor::new(&format);
        assert_eq!(names(&cursor), vec!["shape"]);

        cursor.move_to("SHAPE").unwrap();
        assert_eq!(names(&cursor), vec![BEGIN_BLOCK]);
        assert!(cursor.candidates().is_empty());
        cursor.enter_block().unwrap();

        let uint = cursor.move_to("uint").unwrap();
        assert_eq!(uint.label(), Some("Version"));
        assert_eq!(uint.primitive(), Some(PrimitiveType::Uint));
        assert_eq!(names(&cursor), vec![END_BLOCK, "name", "point"]);

        cursor.move_to("point").unwrap();
        assert_eq!(cursor.production(), Some("point"));
        cursor.enter_block().unwrap();
        assert_eq!(names(&cursor), vec!["float", "none"]);
        cursor.move_to("none").unwrap();
        cursor.leave_block().unwrap();

        assert_eq!(cursor.depth(), 1);
        assert_eq!(names(&cursor), vec![END_BLOCK, "point"]);
        cursor.leave_block().unwrap();
        assert!(cursor.is_complete());
        assert!(cursor.valid_next_references().is_empty());
    }

    #[test]
    fn rejects_invalid_moves() {
        let format = format();
        let mut cursor = Cursor::new(&format);
        let err = cursor.move_to("point").unwrap_err();
        assert_eq!(err.found(), "point");
        assert_eq!(err.expected(), &[String::from("shape")]);

        cursor.move_to("shape").unwrap();
        assert!(cursor.move_to("uint").is_err());
        assert!(cursor.leave_block().is_err());
        cursor.enter_block().unwrap();
        assert!(cursor.enter_block().is_err());

        let err = cursor.leave_block().unwrap_err();
        assert_eq!(err.found(), END_BLOCK);
        assert_eq!(err.expected(), &[String::from("uint")]);
    }

    #[test]
    fn failed_move_leaves_cursor_unchanged() {
        let format = format();
        let mut cursor = Cursor::new(&format);
        cursor.move_to("shape").unwrap();
        cursor.enter_block().unwrap();
        let before = names(&cursor);
        assert!(cursor.move_to("float").is_err());
        assert_eq!(names(&cursor), before);
    }

    #[test]
    fn never_empty_while_frames_are_open() {
        let format = format();
        let mut cursor = Cursor::new(&format);
        let steps = ["shape", BEGIN_BLOCK, "uint", "name", BEGIN_BLOCK, "string"];
        for step in steps {
            match step {
                BEGIN_BLOCK => cursor.enter_block().unwrap(),
                name => {
                    cursor.move_to(name).unwrap();
                }
            }
            assert!(!cursor.valid_next_references().is_empty());
        }
    }
}
