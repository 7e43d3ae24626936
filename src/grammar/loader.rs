use super::errors::{GrammarError, GrammarErrorKind};
use super::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuleKind {
    /// `SYMBOL = body .`
    Definition,

    /// `SYMBOL ==> body .`
    Production,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedRule {
    pub symbol: String,
    pub kind: RuleKind,
    pub body: Operator,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme<'a> {
    Symbol(&'a str),
    Reference(&'a str, Option<&'a str>),
    Literal(String),
    Define,
    Produce,
    OpenOptional,
    CloseOptional,
    OpenRepeat,
    CloseRepeat,
    Or,
    End,
}

impl<'a> Lexeme<'a> {
    fn describe(&self) -> String {
        match self {
            Lexeme::Symbol(x) => format!("symbol {}", x),
            Lexeme::Reference(x, _) => format!("reference :{}", x),
            Lexeme::Literal(x) => format!("literal {:?}", x),
            Lexeme::Define => String::from("'='"),
            Lexeme::Produce => String::from("'==>'"),
            Lexeme::OpenOptional => String::from("'['"),
            Lexeme::CloseOptional => String::from("']'"),
            Lexeme::OpenRepeat => String::from("'{'"),
            Lexeme::CloseRepeat => String::from("'}'"),
            Lexeme::Or => String::from("'|'"),
            Lexeme::End => String::from("'.'"),
        }
    }
}

#[inline]
fn is_symbol_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct GrammarLexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> GrammarLexer<'a> {
    fn new(text: &'a str) -> Self {
        GrammarLexer { text, pos: 0 }
    }

    fn err(&self, kind: GrammarErrorKind, offset: usize) -> GrammarError {
        GrammarError::new(kind, self.text, offset)
    }

    fn skip_trivia(&mut self) -> Result<(), GrammarError> {
        let data = self.text.as_bytes();
        loop {
            while self.pos < data.len() && data[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }

            if data[self.pos..].starts_with(b"/*") {
                let start = self.pos;
                match self.text[start + 2..].find("*/") {
                    Some(end) => self.pos = start + 2 + end + 2,
                    None => return Err(self.err(GrammarErrorKind::UnterminatedComment, start)),
                }
            } else {
                return Ok(());
            }
        }
    }

    fn symbol(&mut self) -> &'a str {
        let data = self.text.as_bytes();
        let start = self.pos;
        while self.pos < data.len() && is_symbol_byte(data[self.pos]) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn literal(&mut self, start: usize) -> Result<String, GrammarError> {
        let mut result = String::new();
        let mut chars = self.text[start + 1..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos = start + 1 + i + 1;
                    return Ok(result);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => result.push('\n'),
                    Some((_, 't')) => result.push('\t'),
                    Some((_, x)) => result.push(x),
                    None => break,
                },
                x => result.push(x),
            }
        }

        Err(self.err(GrammarErrorKind::UnterminatedLiteral, start))
    }

    fn next(&mut self) -> Result<Option<(usize, Lexeme<'a>)>, GrammarError> {
        self.skip_trivia()?;
        let data = self.text.as_bytes();
        let start = self.pos;
        let Some(&b) = data.get(start) else {
            return Ok(None);
        };

        let lexeme = match b {
            b'[' => Lexeme::OpenOptional,
            b']' => Lexeme::CloseOptional,
            b'{' => Lexeme::OpenRepeat,
            b'}' => Lexeme::CloseRepeat,
            b'|' => Lexeme::Or,
            b'.' => Lexeme::End,
            b'=' if data[start..].starts_with(b"==>") => {
                self.pos += 3;
                return Ok(Some((start, Lexeme::Produce)));
            }
            b'=' => Lexeme::Define,
            b'"' => {
                let literal = self.literal(start)?;
                return Ok(Some((start, Lexeme::Literal(literal))));
            }
            b':' => {
                self.pos += 1;
                let name = self.symbol();
                if name.is_empty() {
                    return Err(self.unexpected_char(self.pos));
                }

                let label = if data.get(self.pos) == Some(&b',') {
                    self.pos += 1;
                    let label = self.symbol();
                    if label.is_empty() {
                        return Err(self.unexpected_char(self.pos));
                    }
                    Some(label)
                } else {
                    None
                };

                return Ok(Some((start, Lexeme::Reference(name, label))));
            }
            x if is_symbol_byte(x) => {
                let symbol = self.symbol();
                return Ok(Some((start, Lexeme::Symbol(symbol))));
            }
            _ => return Err(self.unexpected_char(start)),
        };

        self.pos += 1;
        Ok(Some((start, lexeme)))
    }

    fn unexpected_char(&self, offset: usize) -> GrammarError {
        let c = self.text[offset..].chars().next().unwrap_or('\0');
        self.err(GrammarErrorKind::UnexpectedCharacter(c), offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Optional(usize),
    Repeat(usize),
    And,
    Or,
}

/// Operand and operator stacks for one rule body
struct BodyParser<'a> {
    text: &'a str,
    operands: Vec<Operator>,
    operators: Vec<Pending>,
}

impl<'a> BodyParser<'a> {
    fn new(text: &'a str) -> Self {
        BodyParser {
            text,
            operands: Vec::new(),
            operators: Vec::new(),
        }
    }

    /// Combine the top two operands with the top binary operator
    fn reduce(&mut self, offset: usize) -> Result<(), GrammarError> {
        let op = self.operators.pop();
        let right = self.operands.pop();
        let left = self.operands.pop();
        match (op, left, right) {
            (Some(Pending::And), Some(left), Some(right)) => {
                self.operands.push(Operator::and(left, right));
                Ok(())
            }
            (Some(Pending::Or), Some(left), Some(right)) => {
                self.operands.push(Operator::or(left, right));
                Ok(())
            }
            _ => Err(GrammarError::new(
                GrammarErrorKind::UnexpectedToken {
                    expected: "an operand",
                    found: String::from("an operator"),
                },
                self.text,
                offset,
            )),
        }
    }

    /// Reduce pending binary operators with at least the given precedence
    fn reduce_while(&mut self, offset: usize, include_or: bool) -> Result<(), GrammarError> {
        while let Some(&top) = self.operators.last() {
            match top {
                Pending::And => self.reduce(offset)?,
                Pending::Or if include_or => self.reduce(offset)?,
                _ => break,
            }
        }
        Ok(())
    }

    fn push_and(&mut self, offset: usize) -> Result<(), GrammarError> {
        self.reduce_while(offset, false)?;
        self.operators.push(Pending::And);
        Ok(())
    }

    fn close_bracket(&mut self, offset: usize, repeat: bool) -> Result<(), GrammarError> {
        self.reduce_while(offset, true)?;
        let inner = match (self.operators.pop(), repeat) {
            (Some(Pending::Optional(_)), false) | (Some(Pending::Repeat(_)), true) => {
                self.operands.pop()
            }
            _ => None,
        };

        let inner = inner.ok_or_else(|| {
            GrammarError::new(GrammarErrorKind::UnbalancedBracket, self.text, offset)
        })?;

        let wrapped = if repeat {
            Operator::repeat(inner)
        } else {
            Operator::optional(inner)
        };

        self.operands.push(wrapped);
        Ok(())
    }

    fn finish(mut self, offset: usize) -> Result<Operator, GrammarError> {
        self.reduce_while(offset, true)?;
        match self.operators.last() {
            Some(Pending::Optional(x)) | Some(Pending::Repeat(x)) => {
                return Err(GrammarError::new(
                    GrammarErrorKind::UnbalancedBracket,
                    self.text,
                    *x,
                ))
            }
            _ => {}
        }

        match (self.operands.pop(), self.operands.is_empty()) {
            (Some(op), true) => Ok(op),
            _ => Err(GrammarError::new(
                GrammarErrorKind::UnexpectedToken {
                    expected: "a single rule body",
                    found: String::from("dangling operands"),
                },
                self.text,
                offset,
            )),
        }
    }
}

fn parse_body(
    lexer: &mut GrammarLexer,
    symbol: &str,
    rule_offset: usize,
) -> Result<Operator, GrammarError> {
    let mut parser = BodyParser::new(lexer.text);
    let mut after_operand = false;

    loop {
        let (offset, lexeme) = match lexer.next()? {
            Some(x) => x,
            None => {
                return Err(lexer.err(
                    GrammarErrorKind::UnexpectedToken {
                        expected: "'.'",
                        found: String::from("end of grammar"),
                    },
                    lexer.text.len(),
                ))
            }
        };

        match lexeme {
            Lexeme::Reference(_, _) | Lexeme::Literal(_) => {
                if after_operand {
                    parser.push_and(offset)?;
                }

                let operand = match lexeme {
                    Lexeme::Reference(name, Some(label)) => Operator::named(name, label),
                    Lexeme::Reference(name, None) => Operator::reference(name),
                    Lexeme::Literal(text) => Operator::Literal(text),
                    _ => unreachable!("matched above"),
                };
                parser.operands.push(operand);
                after_operand = true;
            }
            Lexeme::OpenOptional | Lexeme::OpenRepeat => {
                if after_operand {
                    parser.push_and(offset)?;
                }

                parser.operators.push(match lexeme {
                    Lexeme::OpenOptional => Pending::Optional(offset),
                    _ => Pending::Repeat(offset),
                });
                after_operand = false;
            }
            Lexeme::CloseOptional | Lexeme::CloseRepeat if after_operand => {
                parser.close_bracket(offset, lexeme == Lexeme::CloseRepeat)?;
            }
            Lexeme::Or if after_operand => {
                parser.reduce_while(offset, true)?;
                parser.operators.push(Pending::Or);
                after_operand = false;
            }
            Lexeme::End if after_operand => return parser.finish(offset),
            Lexeme::End if parser.operands.is_empty() && parser.operators.is_empty() => {
                return Err(lexer.err(
                    GrammarErrorKind::EmptyRule(symbol.to_string()),
                    rule_offset,
                ))
            }
            other => {
                return Err(lexer.err(
                    GrammarErrorKind::UnexpectedToken {
                        expected: "a reference, literal, or bracket",
                        found: other.describe(),
                    },
                    offset,
                ))
            }
        }
    }
}

/// Parse the whole grammar description into rules in file order
pub(crate) fn parse(text: &str) -> Result<Vec<ParsedRule>, GrammarError> {
    let mut lexer = GrammarLexer::new(text);
    let mut rules = Vec::new();

    while let Some((offset, lexeme)) = lexer.next()? {
        let symbol = match lexeme {
            Lexeme::Symbol(x) => x,
            other => {
                return Err(lexer.err(
                    GrammarErrorKind::UnexpectedToken {
                        expected: "a rule symbol",
                        found: other.describe(),
                    },
                    offset,
                ))
            }
        };

        let kind = match lexer.next()? {
            Some((_, Lexeme::Define)) => RuleKind::Definition,
            Some((_, Lexeme::Produce)) => RuleKind::Production,
            Some((at, other)) => {
                return Err(lexer.err(
                    GrammarErrorKind::UnexpectedToken {
                        expected: "'=' or '==>'",
                        found: other.describe(),
                    },
                    at,
                ))
            }
            None => {
                return Err(lexer.err(
                    GrammarErrorKind::UnexpectedToken {
                        expected: "'=' or '==>'",
                        found: String::from("end of grammar"),
                    },
                    text.len(),
                ))
            }
        };

        let body = parse_body(&mut lexer, symbol, offset)?;
        rules.push(ParsedRule {
            symbol: symbol.to_string(),
            kind,
            body,
            offset,
        });
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn body(text: &str) -> Operator {
        let rules = parse(text).unwrap();
        assert_eq!(rules.len(), 1);
        rules.into_iter().next().unwrap().body
    }

    fn r(x: &str) -> Operator {
        Operator::reference(x)
    }

    #[test]
    fn juxtaposition_is_left_associative() {
        assert_eq!(
            body("x ==> :a :b :c ."),
            Operator::and(Operator::and(r("a"), r("b")), r("c"))
        );
    }

    #[test]
    fn sequence_binds_tighter_than_alternation() {
        assert_eq!(
            body("x ==> :a :b | :c ."),
            Operator::or(Operator::and(r("a"), r("b")), r("c"))
        );
        assert_eq!(
            body("x ==> :a | :b :c ."),
            Operator::or(r("a"), Operator::and(r("b"), r("c")))
        );
        assert_eq!(
            body("x ==> :a | :b | :c ."),
            Operator::or(Operator::or(r("a"), r("b")), r("c"))
        );
    }

    #[test]
    fn brackets_wrap_their_contents() {
        assert_eq!(
            body("x ==> :a [:b | :c] {:d :e} ."),
            Operator::and(
                Operator::and(r("a"), Operator::optional(Operator::or(r("b"), r("c")))),
                Operator::repeat(Operator::and(r("d"), r("e")))
            )
        );
    }

    #[test]
    fn named_references_and_literals() {
        assert_eq!(
            body("x = :uint,Count \"rgb\" ."),
            Operator::and(Operator::named("uint", "Count"), Operator::literal("rgb"))
        );
    }

    #[test]
    fn comments_and_rule_kinds() {
        let rules = parse("/* header */ a = :b . /* x */ b ==> :uint .").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].kind, RuleKind::Definition);
        assert_eq!(rules[1].kind, RuleKind::Production);
        assert_eq!(rules[1].symbol, "b");
        assert_eq!(rules[1].offset, 30);
    }

    #[rstest]
    #[case("x ==> [:a .", 6)]
    #[case("x ==> :a ] .", 9)]
    #[case("x ==> {:a] .", 9)]
    fn unbalanced_brackets(#[case] text: &str, #[case] offset: usize) {
        let err = parse(text).unwrap_err();
        assert_eq!(err.kind(), &GrammarErrorKind::UnbalancedBracket);
        assert_eq!(err.offset(), offset);
    }

    #[rstest]
    #[case("x ==> :a | .")]
    #[case("x ==> [] .")]
    #[case("x ==> | :a .")]
    #[case("x :a .")]
    #[case("x ==> :a")]
    fn malformed_rules(#[case] text: &str) {
        let err = parse(text).unwrap_err();
        assert!(matches!(err.kind(), GrammarErrorKind::UnexpectedToken { .. }));
    }

    #[test]
    fn empty_rule() {
        let err = parse("x ==> .").unwrap_err();
        assert_eq!(err.kind(), &GrammarErrorKind::EmptyRule(String::from("x")));
    }

    #[test]
    fn unterminated_tokens() {
        let err = parse("/* oops").unwrap_err();
        assert_eq!(err.kind(), &GrammarErrorKind::UnterminatedComment);

        let err = parse("x = \"abc .").unwrap_err();
        assert_eq!(err.kind(), &GrammarErrorKind::UnterminatedLiteral);
        assert_eq!(err.offset(), 4);
    }

    #[test]
    fn unexpected_character() {
        let err = parse("x = :a ; .").unwrap_err();
        assert_eq!(err.kind(), &GrammarErrorKind::UnexpectedCharacter(';'));
        assert_eq!(err.offset(), 7);
    }
}
