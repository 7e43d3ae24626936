use super::infer_value;
use crate::cursor::{value_candidate, Candidate, Cursor};
use crate::format::SimisFormat;
use crate::token::{Token, Value, ValueData};
use crate::util::OutputTail;
use crate::{Error, ErrorKind};
use std::fmt::Write as _;
use std::io::Write;

const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Strings longer than this many characters are split into `+` concatenations
const STRING_PIECE: usize = 80;

/// Write tokens as a text stream body.
///
/// Every token is validated against the grammar before it is written, and
/// every value is checked to read back as the same type.
///
/// Instantiated via `TextWriterBuilder`
#[derive(Debug)]
pub struct TextWriter<'g, W> {
    writer: W,
    cursor: Cursor<'g>,
    scratch: String,
    depth: Vec<BlockLayout>,
    indent_char: u8,
    indent_factor: u8,
    max_width: usize,
    column: usize,
    just_wrote_line_terminator: bool,
    tail: OutputTail,
}

#[derive(Debug, Clone, Copy, Default)]
struct BlockLayout {
    /// The closing parenthesis goes on its own line
    multiline: bool,

    /// The last thing written in this block was a child block
    after_child: bool,
}

/// Construct a customized text writer
///
/// ```
/// use simis::{SimisFormat, Token, TextWriterBuilder, Value, ValueData};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let format = SimisFormat::from_grammar_text(r#"
///     FILE = :point .
///     FILE_NAME = "Point" .
///     FILE_EXT = "pt" .
///     FILE_TYPE = "p" .
///     FILE_TYPE_VER = "1" .
///     point ==> :float,X :float,Y .
/// "#)?;
///
/// let mut out: Vec<u8> = Vec::new();
/// let mut writer = TextWriterBuilder::new().from_writer(&format, &mut out);
/// writer.write_token(&Token::BlockHeader { type_name: "point".into(), label: None })?;
/// writer.write_token(&Token::BlockBegin)?;
/// writer.write_token(&Token::Value(Value::named("X", ValueData::Float(1.5))))?;
/// writer.write_token(&Token::Value(Value::named("Y", ValueData::Float(-2.0))))?;
/// writer.write_token(&Token::BlockEnd)?;
/// writer.finish()?;
/// assert_eq!(std::str::from_utf8(&out).unwrap(), "point ( 1.5 -2.0 )\r\n");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TextWriterBuilder {
    indent_char: u8,
    indent_factor: u8,
    max_width: usize,
}

impl<'g, W> TextWriter<'g, W>
where
    W: Write,
{
    /// Get inner writer, keeping ownership
    pub fn inner(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn cursor(&self) -> &Cursor<'g> {
        &self.cursor
    }

    /// Number of bytes written so far
    pub fn position(&self) -> usize {
        self.tail.position()
    }

    fn unexpected(&self, found: String) -> Error {
        let expected = self.cursor.valid_next_references().into_iter().collect();
        Error::new(ErrorKind::UnexpectedToken { expected, found })
    }

    fn fail(&self, err: Error) -> Error {
        err.at_output(self.tail.position(), self.tail.recent())
    }

    /// Validate and write a token. Errors carry the offset the token would
    /// have been written at.
    pub fn write_token(&mut self, token: &Token) -> Result<(), Error> {
        self.write_token_inner(token).map_err(|e| self.fail(e))
    }

    fn write_token_inner(&mut self, token: &Token) -> Result<(), Error> {
        match token {
            Token::BlockHeader { type_name, label } => {
                self.write_block_header(type_name, label.as_deref())
            }
            Token::BlockBegin => self.write_block_begin(),
            Token::BlockEnd => self.write_block_end(),
            Token::Value(value) => self.write_value(value),
        }
    }

    fn emit(&mut self, data: &[u8]) -> Result<(), Error> {
        self.writer.write_all(data)?;
        self.tail.push(data);
        Ok(())
    }

    fn write_raw(&mut self, data: &str) -> Result<(), Error> {
        self.emit(data.as_bytes())?;
        self.column += data.chars().count();
        self.just_wrote_line_terminator = false;
        Ok(())
    }

    fn write_line_terminator(&mut self) -> Result<(), Error> {
        if !self.just_wrote_line_terminator {
            self.emit(LINE_TERMINATOR)?;
            self.just_wrote_line_terminator = true;
            self.column = 0;
        }

        Ok(())
    }

    /// Write the indent characters
    fn write_indent(&mut self, depth: usize) -> Result<(), Error> {
        for _ in 0..depth * usize::from(self.indent_factor) {
            self.emit(&[self.indent_char])?;
        }

        self.column += depth * usize::from(self.indent_factor);
        Ok(())
    }

    fn new_line(&mut self, depth: usize) -> Result<(), Error> {
        self.write_line_terminator()?;
        self.write_indent(depth)
    }

    fn write_block_header(&mut self, type_name: &str, label: Option<&str>) -> Result<(), Error> {
        let candidate = self
            .cursor
            .candidates()
            .into_iter()
            .find(|x| x.is_production() && x.name().eq_ignore_ascii_case(type_name))
            .ok_or_else(|| self.unexpected(type_name.to_string()))?;
        self.cursor.move_to_candidate(&candidate)?;

        let depth = self.depth.len();
        if let Some(parent) = self.depth.last_mut() {
            parent.multiline = true;
            parent.after_child = false;
        }

        if depth > 0 || self.column > 0 {
            self.new_line(depth)?;
        }

        self.write_raw(type_name)?;
        if let Some(label) = label {
            self.scratch.clear();
            if !label.is_empty() && label.chars().all(super::lexer::is_word_char) {
                self.scratch.push_str(label);
            } else {
                push_quoted(&mut self.scratch, label);
            }

            let label = std::mem::take(&mut self.scratch);
            self.write_raw(" ")?;
            self.write_raw(&label)?;
            self.scratch = label;
        }

        Ok(())
    }

    fn write_block_begin(&mut self) -> Result<(), Error> {
        self.cursor.enter_block()?;
        self.write_raw(" (")?;
        self.depth.push(BlockLayout::default());
        Ok(())
    }

    fn write_block_end(&mut self) -> Result<(), Error> {
        self.cursor.leave_block()?;
        let layout = self.depth.pop().unwrap_or_default();
        if layout.multiline {
            let depth = self.depth.len();
            self.new_line(depth)?;
            self.write_raw(")")?;
        } else {
            self.write_raw(" )")?;
        }

        match self.depth.last_mut() {
            Some(parent) => parent.after_child = true,
            None => self.write_line_terminator()?,
        }

        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> Result<(), Error> {
        let candidates: Vec<_> = self
            .cursor
            .candidates()
            .into_iter()
            .filter(|x| !x.is_production())
            .collect();
        if candidates.is_empty() {
            return Err(self.unexpected(value.data.primitive().to_string()));
        }

        let mismatch = |candidates: &[Candidate]| {
            Error::new(ErrorKind::TypeInference {
                candidates: candidates.iter().map(|x| x.name().to_string()).collect(),
                found: value.data.primitive().to_string(),
            })
        };

        let candidate = value_candidate(&candidates, &value.data).ok_or_else(|| mismatch(&candidates))?;

        // try each spelling of the value until one reads back as the same
        // candidate
        let quoted = matches!(value.data, ValueData::String(_) | ValueData::Buffer(_));
        let mut spelling = 0;
        loop {
            self.scratch.clear();
            if !push_spelling(&mut self.scratch, &value.data, spelling) {
                return Err(mismatch(&candidates));
            }

            match infer_value(&candidates, &self.scratch, quoted) {
                Some((inferred, _)) if inferred == candidate => break,
                _ => spelling += 1,
            }
        }

        self.cursor.move_to_candidate(&candidate)?;

        let text = std::mem::take(&mut self.scratch);
        let result = if quoted {
            self.write_quoted_value(&text)
        } else {
            self.write_word(&text)
        };
        self.scratch = text;
        result
    }

    /// Start a value on the current line, or on a new one if it would not
    /// fit or follows a child block
    fn value_preamble(&mut self, width: usize) -> Result<(), Error> {
        let depth = self.depth.len();
        let max_width = self.max_width;
        let column = self.column;
        let layout = match self.depth.last_mut() {
            Some(x) => x,
            None => return self.write_raw(" "),
        };

        if layout.after_child || column + 1 + width > max_width {
            layout.after_child = false;
            layout.multiline = true;
            self.new_line(depth)
        } else {
            self.write_raw(" ")
        }
    }

    fn write_word(&mut self, text: &str) -> Result<(), Error> {
        self.value_preamble(text.len())?;
        self.write_raw(text)
    }

    fn write_quoted_value(&mut self, text: &str) -> Result<(), Error> {
        let mut piece = String::new();
        let mut chars = text.chars().peekable();
        let mut first = true;
        loop {
            piece.clear();
            let mut raw = String::new();
            for c in chars.by_ref().take(STRING_PIECE) {
                raw.push(c);
            }
            push_quoted(&mut piece, &raw);

            if first {
                self.value_preamble(piece.chars().count())?;
                first = false;
            } else {
                self.write_raw(" +")?;
                let depth = self.depth.len();
                self.new_line(depth)?;
                if let Some(layout) = self.depth.last_mut() {
                    layout.multiline = true;
                }
            }

            self.write_raw(&piece)?;
            if chars.peek().is_none() {
                return Ok(());
            }
        }
    }

    /// Check the stream is complete and return the underlying writer
    pub fn finish(mut self) -> Result<W, Error> {
        if !self.cursor.is_complete() {
            return Err(self.fail(self.unexpected(String::from("end of stream"))));
        }

        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Write the `n`th spelling of a value. Plain numbers can read back as an
/// earlier candidate of another type, so unsigned integers also have a zero
/// padded spelling and non-negative signed integers a `+` prefixed one.
/// Returns false once the spellings run out.
fn push_spelling(out: &mut String, data: &ValueData, n: usize) -> bool {
    match (data, n) {
        (ValueData::Uint(x), 0) => push_int(out, *x),
        (ValueData::Uint(x), 1) => {
            out.push('0');
            push_int(out, *x)
        }
        (ValueData::Word(x), 0) => push_int(out, *x),
        (ValueData::Byte(x), 0) => push_int(out, *x),
        (ValueData::Sint(x), 0) => push_int(out, *x),
        (ValueData::Sint(x), 1) if *x >= 0 => {
            out.push('+');
            push_int(out, *x)
        }
        (ValueData::Dword(x), 0) => {
            let _ = write!(out, "{:08x}", x);
            true
        }
        (ValueData::Float(x), 0) => push_float(out, *x),
        (ValueData::Buffer(x), 0) => {
            out.push_str(&hex::encode(x));
            true
        }
        (ValueData::String(x), 0) => {
            out.push_str(x);
            true
        }
        _ => false,
    }
}

#[cfg(feature = "faster_writer")]
fn push_int<T: itoa::Integer>(out: &mut String, x: T) -> bool {
    let mut buffer = itoa::Buffer::new();
    out.push_str(buffer.format(x));
    true
}

#[cfg(not(feature = "faster_writer"))]
fn push_int<T: std::fmt::Display>(out: &mut String, x: T) -> bool {
    let _ = write!(out, "{}", x);
    true
}

/// Shortest round trip decimal, with exponent form outside `[1e-4, 1e9)`.
/// Integral values keep a `.0` so they never read back as integers.
/// Returns false for values a text stream cannot hold.
fn push_float(out: &mut String, x: f32) -> bool {
    if !x.is_finite() {
        return false;
    }

    let start = out.len();
    if x == 0.0 {
        out.push_str(if x.is_sign_negative() { "-0" } else { "0" });
    } else if (1e-4..1e9).contains(&x.abs()) {
        let _ = write!(out, "{}", x);
    } else {
        let _ = write!(out, "{:e}", x);
    }

    if !out[start..].contains(|c| c == '.' || c == 'e') {
        out.push_str(".0");
    }

    true
}

#[inline]
fn push_quoted(out: &mut String, data: &str) {
    out.push('"');
    for c in data.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
}

impl TextWriterBuilder {
    /// Construct a new TextWriterBuilder with default values
    pub fn new() -> TextWriterBuilder {
        TextWriterBuilder::default()
    }

    /// The character to indent line.
    ///
    /// The default is a tab.
    pub fn indent_char(&mut self, indent_char: u8) -> &mut TextWriterBuilder {
        self.indent_char = indent_char;
        self
    }

    /// The number of indents per increased depth
    ///
    /// The default is 1
    pub fn indent_factor(&mut self, indent_factor: u8) -> &mut TextWriterBuilder {
        self.indent_factor = indent_factor;
        self
    }

    /// The line width after which values wrap onto a new line
    ///
    /// The default is 120
    pub fn max_width(&mut self, max_width: usize) -> &mut TextWriterBuilder {
        self.max_width = max_width;
        self
    }

    /// Construct a text writer from a builder, a format, and a writer.
    pub fn from_writer<'g, W>(&self, format: &'g SimisFormat, writer: W) -> TextWriter<'g, W>
    where
        W: Write,
    {
        TextWriter {
            writer,
            cursor: Cursor::new(format),
            scratch: String::new(),
            depth: Vec::with_capacity(16),
            indent_char: self.indent_char,
            indent_factor: self.indent_factor,
            max_width: self.max_width,
            column: 0,
            just_wrote_line_terminator: false,
            tail: OutputTail::default(),
        }
    }
}

impl Default for TextWriterBuilder {
    fn default() -> Self {
        TextWriterBuilder {
            indent_char: b'\t',
            indent_factor: 1,
            max_width: 120,
        }
    }
}

/// Write every token as a text stream body
pub fn write_tokens<'t, W, I>(format: &SimisFormat, writer: W, tokens: I) -> Result<W, Error>
where
    W: Write,
    I: IntoIterator<Item = &'t Token>,
{
    let mut out = TextWriterBuilder::new().from_writer(format, writer);
    for token in tokens {
        out.write_token(token)?;
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::error::Error;

    const GRAMMAR: &str = r#"
        FILE = :shape .
        FILE_NAME = "Shape" .
        FILE_EXT = "s" .
        FILE_TYPE = "s" .
        FILE_TYPE_VER = "1" .
        shape ==> :dword,Flags {:point} [:name] .
        point ==> :float,X :float,Y | "none" .
        name ==> :string {:uint} .
    "#;

    fn format() -> SimisFormat {
        SimisFormat::from_grammar_text(GRAMMAR).unwrap()
    }

    fn header(name: &str, label: Option<&str>) -> Token {
        Token::BlockHeader {
            type_name: name.to_string(),
            label: label.map(String::from),
        }
    }

    fn value(data: ValueData) -> Token {
        Token::Value(Value::new(data))
    }

    fn write(builder: &TextWriterBuilder, tokens: &[Token]) -> Result<String, crate::Error> {
        let format = format();
        let mut out: Vec<u8> = Vec::new();
        let mut writer = builder.from_writer(&format, &mut out);
        for token in tokens {
            writer.write_token(token)?;
        }
        writer.finish()?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn write_nested_blocks() -> Result<(), Box<dyn Error>> {
        let tokens = vec![
            header("shape", None),
            Token::BlockBegin,
            value(ValueData::Dword(0xff)),
            header("point", Some("first one")),
            Token::BlockBegin,
            value(ValueData::Float(1.5)),
            value(ValueData::Float(1e-5)),
            Token::BlockEnd,
            header("point", None),
            Token::BlockBegin,
            value(ValueData::String(String::from("none"))),
            Token::BlockEnd,
            Token::BlockEnd,
        ];
        let out = write(&TextWriterBuilder::new(), &tokens)?;
        assert_eq!(
            out,
            "shape ( 000000ff\r\n\tpoint \"first one\" ( 1.5 1e-5 )\r\n\tpoint ( \"none\" )\r\n)\r\n"
        );
        Ok(())
    }

    #[test]
    fn write_values_after_child_block() -> Result<(), Box<dyn Error>> {
        let tokens = vec![
            header("shape", None),
            Token::BlockBegin,
            value(ValueData::Dword(0)),
            header("name", None),
            Token::BlockBegin,
            value(ValueData::String(String::from("say \"hi\"\n"))),
            value(ValueData::Uint(7)),
            Token::BlockEnd,
            Token::BlockEnd,
        ];
        let out = write(&TextWriterBuilder::new(), &tokens)?;
        assert_eq!(
            out,
            "shape ( 00000000\r\n\tname ( \"say \\\"hi\\\"\\n\" 7 )\r\n)\r\n"
        );
        Ok(())
    }

    #[test]
    fn write_wraps_long_lines() -> Result<(), Box<dyn Error>> {
        let mut tokens = vec![
            header("shape", None),
            Token::BlockBegin,
            value(ValueData::Dword(0)),
            header("name", None),
            Token::BlockBegin,
            value(ValueData::String(String::from("n"))),
        ];
        tokens.extend((0..4).map(|x| value(ValueData::Uint(x))));
        tokens.push(Token::BlockEnd);
        tokens.push(Token::BlockEnd);

        let out = write(TextWriterBuilder::new().max_width(16), &tokens)?;
        assert_eq!(
            out,
            "shape ( 00000000\r\n\tname ( \"n\" 0 1\r\n\t\t2 3\r\n\t)\r\n)\r\n"
        );
        Ok(())
    }

    #[test]
    fn write_splits_long_strings() -> Result<(), Box<dyn Error>> {
        let long = "x".repeat(STRING_PIECE + 3);
        let tokens = vec![
            header("shape", None),
            Token::BlockBegin,
            value(ValueData::Dword(0)),
            header("name", None),
            Token::BlockBegin,
            value(ValueData::String(long.clone())),
            Token::BlockEnd,
            Token::BlockEnd,
        ];
        let out = write(&TextWriterBuilder::new(), &tokens)?;
        let expected = format!(
            "shape ( 00000000\r\n\tname ( \"{}\" +\r\n\t\t\"xxx\"\r\n\t)\r\n)\r\n",
            "x".repeat(STRING_PIECE)
        );
        assert_eq!(out, expected);
        Ok(())
    }

    #[test]
    fn write_with_alternate_indent() -> Result<(), Box<dyn Error>> {
        let tokens = vec![
            header("shape", None),
            Token::BlockBegin,
            value(ValueData::Dword(1)),
            header("point", None),
            Token::BlockBegin,
            value(ValueData::String(String::from("none"))),
            Token::BlockEnd,
            Token::BlockEnd,
        ];
        let out = write(TextWriterBuilder::new().indent_char(b' ').indent_factor(2), &tokens)?;
        assert_eq!(out, "shape ( 00000001\r\n  point ( \"none\" )\r\n)\r\n");
        Ok(())
    }

    #[test]
    fn write_rejects_invalid_tokens() {
        let tokens = vec![header("point", None)];
        let err = write(&TextWriterBuilder::new(), &tokens).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedToken { .. }));

        let tokens = vec![header("shape", None), Token::BlockBegin, value(ValueData::Uint(1))];
        let err = write(&TextWriterBuilder::new(), &tokens).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TypeInference { .. }));
    }

    #[test]
    fn write_rejects_non_finite_floats() {
        let tokens = vec![
            header("shape", None),
            Token::BlockBegin,
            value(ValueData::Dword(1)),
            header("point", None),
            Token::BlockBegin,
            value(ValueData::Float(f32::NAN)),
        ];
        let err = write(&TextWriterBuilder::new(), &tokens).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TypeInference { .. }));
    }

    #[test]
    fn write_incomplete_stream() {
        let tokens = vec![header("shape", None), Token::BlockBegin];
        let err = write(&TextWriterBuilder::new(), &tokens).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedToken { .. }));
    }

    const AMBIGUOUS: &str = r#"
        FILE = :f | :d | :s | :w .
        FILE_NAME = "Numbers" .
        FILE_EXT = "n" .
        FILE_TYPE = "n" .
        FILE_TYPE_VER = "1" .
        f ==> [:uint] :float .
        d ==> [:dword] :uint .
        s ==> [:uint] :sint .
        w ==> [:uint] :word .
    "#;

    /// Write a single value block and read the output back
    fn spell(name: &str, data: ValueData) -> Result<(String, Vec<Token>), crate::Error> {
        let format = SimisFormat::from_grammar_text(AMBIGUOUS).unwrap();
        let tokens = vec![header(name, None), Token::BlockBegin, value(data), Token::BlockEnd];
        let out = write_tokens(&format, Vec::new(), &tokens)?;
        let out = String::from_utf8(out).unwrap();
        let read = crate::text::read_tokens(&format, &out)?;
        assert_eq!(read, tokens);
        Ok((out, read))
    }

    #[test]
    fn integral_floats_keep_their_type() {
        let (out, _) = spell("f", ValueData::Float(1.0)).unwrap();
        assert_eq!(out, "f ( 1.0 )\r\n");
        let (out, _) = spell("f", ValueData::Float(-2.0)).unwrap();
        assert_eq!(out, "f ( -2.0 )\r\n");
    }

    #[test]
    fn ambiguous_integers_use_another_spelling() {
        let (out, _) = spell("d", ValueData::Uint(12345678)).unwrap();
        assert_eq!(out, "d ( 012345678 )\r\n");
        let (out, _) = spell("d", ValueData::Uint(1234567)).unwrap();
        assert_eq!(out, "d ( 1234567 )\r\n");
        let (out, _) = spell("s", ValueData::Sint(5)).unwrap();
        assert_eq!(out, "s ( +5 )\r\n");
        let (out, _) = spell("s", ValueData::Sint(-5)).unwrap();
        assert_eq!(out, "s ( -5 )\r\n");
    }

    #[test]
    fn values_without_a_distinct_spelling_are_rejected() {
        let err = spell("w", ValueData::Word(5)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TypeInference { .. }));
        assert_eq!(err.offset(), Some(3));
        assert_eq!(err.context().unwrap().prefix(), b"w (");
    }

    #[test]
    fn write_errors_carry_output_position() {
        let tokens = vec![header("shape", None), Token::BlockBegin, value(ValueData::Uint(1))];
        let err = write(&TextWriterBuilder::new(), &tokens).unwrap_err();
        let ctx = err.context().unwrap();
        assert_eq!(ctx.offset(), 7);
        assert_eq!(ctx.prefix(), b"shape (");
    }

    #[test]
    fn float_formatting() {
        let cases = [
            (0.0f32, "0.0"),
            (-0.0, "-0.0"),
            (1.0, "1.0"),
            (-2.0, "-2.0"),
            (12345678.0, "12345678.0"),
            (0.0001, "0.0001"),
            (0.00001, "1e-5"),
            (123456.5, "123456.5"),
            (1e9, "1e9"),
            (-2.5e10, "-2.5e10"),
        ];
        for (input, expected) in cases {
            let mut out = String::new();
            assert!(push_float(&mut out, input));
            assert_eq!(out, expected);
        }
    }

    #[quickcheck]
    fn float_text_equality(x: f32) -> bool {
        let mut out = String::new();
        if !push_float(&mut out, x) {
            return !x.is_finite();
        }

        out.parse::<f32>().map(|y| y.to_bits() == x.to_bits()).unwrap_or(false)
    }
}
