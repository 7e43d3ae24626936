//! Loading grammar descriptions.
//!
//! A grammar description is a list of rules. `SYMBOL = body .` declares a
//! definition, a macro that is inlined wherever it is referenced.
//! `SYMBOL ==> body .` declares a production, which corresponds to a named
//! block in a stream. Bodies are built from:
//!
//! - `:name` and `:name,Label` references to definitions, productions, or the
//!   primitive types `uint`, `sint`, `dword`, `word`, `byte`, `float`, `string`
//!   and `buffer`
//! - `"text"` literals
//! - `[ ... ]` optional and `{ ... }` repeated groups
//! - juxtaposition for sequences and `|` for alternatives
//!
//! Five pseudo rules describe the file format itself:
//!
//! ```text
//! FILE          = :shape .
//! FILE_NAME     = "Shape" .
//! FILE_EXT      = "s" .
//! FILE_TYPE     = "s" .
//! FILE_TYPE_VER = "1" .
//! ```

mod errors;
mod loader;
mod operator;

pub use self::errors::{GrammarError, GrammarErrorKind};
pub use self::operator::Operator;

use self::loader::RuleKind;
use crate::fsm::Fsm;
use crate::token::PrimitiveType;
use std::collections::BTreeMap;

/// A named rule of a grammar
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    symbol: String,
    body: Operator,
    offset: usize,
}

impl Rule {
    /// The symbol as spelled in the grammar description
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The unexpanded rule body
    pub fn body(&self) -> &Operator {
        &self.body
    }

    /// Byte offset of the rule in the grammar description
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Format level information declared by the `FILE*` pseudo productions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatInfo {
    name: String,
    extension: String,
    file_type: char,
    version: char,
    roots: Vec<String>,
}

impl FormatInfo {
    /// Human readable name of the format (`FILE_NAME`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File extension without the dot (`FILE_EXT`)
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Type character of the `JINX0` signature (`FILE_TYPE`)
    pub fn file_type(&self) -> char {
        self.file_type
    }

    /// Version character of the `JINX0` signature (`FILE_TYPE_VER`)
    pub fn version(&self) -> char {
        self.version
    }

    /// Productions that may appear as the root block of a stream (`FILE`)
    pub fn roots(&self) -> &[String] {
        &self.roots
    }
}

const PSEUDO_FILE: &str = "FILE";
const PSEUDO_NAME: &str = "FILE_NAME";
const PSEUDO_EXT: &str = "FILE_EXT";
const PSEUDO_TYPE: &str = "FILE_TYPE";
const PSEUDO_VERSION: &str = "FILE_TYPE_VER";
const PSEUDO_RULES: [&str; 5] = [
    PSEUDO_FILE,
    PSEUDO_NAME,
    PSEUDO_EXT,
    PSEUDO_TYPE,
    PSEUDO_VERSION,
];

/// A loaded grammar: definitions, productions, and format information.
///
/// Symbols are matched without regard to ASCII case.
///
/// ```
/// use simis::Grammar;
///
/// let grammar = Grammar::load(r#"
///     FILE = :color .
///     FILE_NAME = "Color" .
///     FILE_EXT = "col" .
///     FILE_TYPE = "c" .
///     FILE_TYPE_VER = "1" .
///     rgb = :byte,R :byte,G :byte,B .
///     color ==> :rgb [:byte,A] .
/// "#).unwrap();
///
/// assert_eq!(grammar.info().name(), "Color");
/// assert!(grammar.is_production("COLOR"));
/// assert!(grammar.definition("rgb").is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    definitions: BTreeMap<String, Rule>,
    productions: BTreeMap<String, Rule>,
    info: FormatInfo,
    source: String,
}

#[inline]
fn key(symbol: &str) -> String {
    symbol.to_ascii_lowercase()
}

impl Grammar {
    /// Parse and validate a grammar description
    pub fn load(text: &str) -> Result<Grammar, GrammarError> {
        let rules = loader::parse(text)?;

        let mut definitions = BTreeMap::new();
        let mut productions = BTreeMap::new();
        let mut pseudo: BTreeMap<&'static str, Rule> = BTreeMap::new();

        for parsed in rules {
            let rule = Rule {
                symbol: parsed.symbol,
                body: parsed.body,
                offset: parsed.offset,
            };

            let duplicate = || {
                GrammarError::new(
                    GrammarErrorKind::DuplicateSymbol(rule.symbol.clone()),
                    text,
                    rule.offset,
                )
            };

            if let Some(name) = PSEUDO_RULES
                .iter()
                .find(|x| x.eq_ignore_ascii_case(&rule.symbol))
            {
                if pseudo.contains_key(name) {
                    return Err(duplicate());
                }
                pseudo.insert(*name, rule);
                continue;
            }

            let k = key(&rule.symbol);
            if definitions.contains_key(&k) || productions.contains_key(&k) {
                return Err(duplicate());
            }

            match parsed.kind {
                RuleKind::Definition => definitions.insert(k, rule),
                RuleKind::Production => productions.insert(k, rule),
            };
        }

        let info = format_info(text, &pseudo)?;
        let grammar = Grammar {
            definitions,
            productions,
            info,
            source: text.to_string(),
        };

        grammar.validate(text, &pseudo)?;
        Ok(grammar)
    }

    fn validate(&self, text: &str, pseudo: &BTreeMap<&'static str, Rule>) -> Result<(), GrammarError> {
        for rule in self.definitions.values().chain(self.productions.values()) {
            let mut unresolved = None;
            rule.body.visit_references(&mut |name| {
                if unresolved.is_none() && !self.resolves(name) {
                    unresolved = Some(name.to_string());
                }
            });

            if let Some(name) = unresolved {
                return Err(GrammarError::new(
                    GrammarErrorKind::UnresolvedReference(name),
                    text,
                    rule.offset,
                ));
            }
        }

        for rule in self.definitions.values() {
            self.expand_with(&rule.body, &mut vec![key(&rule.symbol)])
                .map_err(|name| {
                    GrammarError::new(GrammarErrorKind::RecursiveDefinition(name), text, rule.offset)
                })?;
        }

        if let Some(root) = self.info.roots.iter().find(|x| !self.is_production(x)) {
            let offset = pseudo.get(PSEUDO_FILE).map_or(0, |x| x.offset);
            return Err(GrammarError::new(
                GrammarErrorKind::UnresolvedReference(root.clone()),
                text,
                offset,
            ));
        }

        Ok(())
    }

    fn resolves(&self, name: &str) -> bool {
        let k = key(name);
        self.definitions.contains_key(&k)
            || self.productions.contains_key(&k)
            || PrimitiveType::from_name(name).is_some()
    }

    /// Format information from the pseudo productions
    pub fn info(&self) -> &FormatInfo {
        &self.info
    }

    /// Look up a definition by symbol
    pub fn definition(&self, symbol: &str) -> Option<&Rule> {
        self.definitions.get(&key(symbol))
    }

    /// Look up a production by symbol
    pub fn production(&self, symbol: &str) -> Option<&Rule> {
        self.productions.get(&key(symbol))
    }

    /// Returns true if the symbol names a production
    pub fn is_production(&self, symbol: &str) -> bool {
        self.productions.contains_key(&key(symbol))
    }

    /// All definitions ordered by lowercase symbol
    pub fn definitions(&self) -> impl Iterator<Item = &Rule> {
        self.definitions.values()
    }

    /// All productions ordered by lowercase symbol
    pub fn productions(&self) -> impl Iterator<Item = &Rule> {
        self.productions.values()
    }

    /// Inline every definition reference in the operator tree.
    ///
    /// Production references are left in place, so mutually recursive
    /// productions do not expand forever.
    pub fn expand(&self, op: &Operator) -> Result<Operator, GrammarError> {
        self.expand_with(op, &mut Vec::new()).map_err(|name| {
            let offset = self.definition(&name).map_or(0, |x| x.offset);
            GrammarError::new(GrammarErrorKind::RecursiveDefinition(name), &self.source, offset)
        })
    }

    fn expand_with(&self, op: &Operator, stack: &mut Vec<String>) -> Result<Operator, String> {
        match op {
            Operator::Reference(name) | Operator::NamedReference(name, _) => {
                let k = key(name);
                match self.definitions.get(&k) {
                    Some(rule) => {
                        if stack.contains(&k) {
                            return Err(rule.symbol.clone());
                        }
                        stack.push(k);
                        let expanded = self.expand_with(&rule.body, stack);
                        stack.pop();
                        expanded
                    }
                    None => Ok(op.clone()),
                }
            }
            Operator::Literal(_) => Ok(op.clone()),
            Operator::Optional(inner) => Ok(Operator::optional(self.expand_with(inner, stack)?)),
            Operator::Repeat(inner) => Ok(Operator::repeat(self.expand_with(inner, stack)?)),
            Operator::And(left, right) => Ok(Operator::and(
                self.expand_with(left, stack)?,
                self.expand_with(right, stack)?,
            )),
            Operator::Or(left, right) => Ok(Operator::or(
                self.expand_with(left, stack)?,
                self.expand_with(right, stack)?,
            )),
        }
    }

    /// Expand a production's body and compile it into a state machine
    pub fn compile(&self, production: &str) -> Result<Fsm, GrammarError> {
        let rule = self.production(production).ok_or_else(|| {
            GrammarError::new(
                GrammarErrorKind::UnresolvedReference(production.to_string()),
                &self.source,
                0,
            )
        })?;

        let expanded = self.expand(&rule.body)?;
        Ok(Fsm::new(Some(&expanded)))
    }
}

fn format_info(text: &str, pseudo: &BTreeMap<&'static str, Rule>) -> Result<FormatInfo, GrammarError> {
    let rule = |name: &'static str| {
        pseudo.get(name).ok_or_else(|| {
            GrammarError::new(GrammarErrorKind::MissingPseudoProduction(name), text, text.len())
        })
    };

    let literal = |name: &'static str| -> Result<String, GrammarError> {
        let rule = rule(name)?;
        match &rule.body {
            Operator::Literal(x) => Ok(x.clone()),
            _ => Err(GrammarError::new(
                GrammarErrorKind::InvalidPseudoProduction(name),
                text,
                rule.offset,
            )),
        }
    };

    let single = |name: &'static str| -> Result<char, GrammarError> {
        let value = literal(name)?;
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_graphic() => Ok(c),
            _ => Err(GrammarError::new(
                GrammarErrorKind::InvalidPseudoProduction(name),
                text,
                rule(name)?.offset,
            )),
        }
    };

    let file = rule(PSEUDO_FILE)?;
    let name = literal(PSEUDO_NAME)?;
    let extension = literal(PSEUDO_EXT)?;
    let file_type = single(PSEUDO_TYPE)?;
    let version = single(PSEUDO_VERSION)?;

    let mut roots = Vec::new();
    let mut only_references = true;
    root_references(&file.body, &mut roots, &mut only_references);
    if !only_references || roots.is_empty() {
        return Err(GrammarError::new(
            GrammarErrorKind::InvalidPseudoProduction(PSEUDO_FILE),
            text,
            file.offset,
        ));
    }

    Ok(FormatInfo {
        name,
        extension,
        file_type,
        version,
        roots,
    })
}

/// Collect the references of a `FILE` body, which may only alternate them
fn root_references(op: &Operator, roots: &mut Vec<String>, valid: &mut bool) {
    match op {
        Operator::Reference(name) | Operator::NamedReference(name, _) => {
            if !roots.iter().any(|x| x.eq_ignore_ascii_case(name)) {
                roots.push(name.clone());
            }
        }
        Operator::Or(left, right) => {
            root_references(left, roots, valid);
            root_references(right, roots, valid);
        }
        _ => *valid = false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"
        FILE = :a | :b .
        FILE_NAME = "Test" .
        FILE_EXT = "t" .
        FILE_TYPE = "t" .
        FILE_TYPE_VER = "1" .
    "#;

    fn load(body: &str) -> Result<Grammar, GrammarError> {
        Grammar::load(&format!("{}{}", HEADER, body))
    }

    #[test]
    fn loads_format_info() {
        let grammar = load("a ==> :uint . b ==> :a :pair . pair = :sint :sint .").unwrap();
        let info = grammar.info();
        assert_eq!(info.name(), "Test");
        assert_eq!(info.extension(), "t");
        assert_eq!(info.file_type(), 't');
        assert_eq!(info.version(), '1');
        assert_eq!(info.roots(), &["a", "b"]);
        assert_eq!(grammar.productions().count(), 2);
        assert_eq!(grammar.definitions().count(), 1);
    }

    #[test]
    fn expand_inlines_definitions_only() {
        let grammar = load("a ==> :uint . b ==> :a :pair . pair = :sint :float,Y .").unwrap();
        let expanded = grammar.expand(grammar.production("b").unwrap().body()).unwrap();
        assert_eq!(
            expanded,
            Operator::and(
                Operator::reference("a"),
                Operator::and(Operator::reference("sint"), Operator::named("float", "Y"))
            )
        );
    }

    #[test]
    fn missing_file_name() {
        let text = r#"
            FILE = :a .
            FILE_EXT = "t" .
            FILE_TYPE = "t" .
            FILE_TYPE_VER = "1" .
            a ==> :uint .
        "#;
        let err = Grammar::load(text).unwrap_err();
        assert_eq!(
            err.kind(),
            &GrammarErrorKind::MissingPseudoProduction("FILE_NAME")
        );
        assert!(err.is_missing_pseudo_production());
        assert_eq!(err.offset(), text.len());
    }

    #[test]
    fn duplicate_production() {
        let err = load("a ==> :uint . b ==> :uint . A ==> :sint .").unwrap_err();
        assert_eq!(
            err.kind(),
            &GrammarErrorKind::DuplicateSymbol(String::from("A"))
        );
    }

    #[test]
    fn duplicate_across_definition_and_production() {
        let err = load("a ==> :uint . b ==> :uint . a = :sint .").unwrap_err();
        assert!(matches!(err.kind(), GrammarErrorKind::DuplicateSymbol(_)));
    }

    #[test]
    fn duplicate_pseudo_production() {
        let err = load("a ==> :uint . b ==> :uint . FILE_EXT = \"x\" .").unwrap_err();
        assert!(matches!(err.kind(), GrammarErrorKind::DuplicateSymbol(_)));
    }

    #[test]
    fn unresolved_reference() {
        let err = load("a ==> :uint . b ==> :nothing .").unwrap_err();
        assert_eq!(
            err.kind(),
            &GrammarErrorKind::UnresolvedReference(String::from("nothing"))
        );
    }

    #[test]
    fn root_must_be_production() {
        let err = load("a ==> :uint . b = :uint .").unwrap_err();
        assert_eq!(
            err.kind(),
            &GrammarErrorKind::UnresolvedReference(String::from("b"))
        );
    }

    #[test]
    fn recursive_definition() {
        let err = load("a ==> :x . b ==> :uint . x = :uint [:y] . y = :x .").unwrap_err();
        assert!(matches!(
            err.kind(),
            GrammarErrorKind::RecursiveDefinition(_)
        ));
    }

    #[test]
    fn recursive_productions_are_allowed() {
        let grammar = load("a ==> :uint [:b] . b ==> [:a] .").unwrap();
        assert!(grammar.compile("a").is_ok());
        assert!(grammar.compile("b").is_ok());
    }

    #[test]
    fn compile_errors_show_the_grammar() {
        let grammar = load("a ==> :uint . b ==> :uint .").unwrap();
        let err = grammar.compile("nope").unwrap_err();
        assert_eq!(
            err.kind(),
            &GrammarErrorKind::UnresolvedReference(String::from("nope"))
        );
        assert_eq!(err.offset(), 0);
        assert!(err.context().contains("FILE = :a | :b ."));
    }

    #[test]
    fn file_type_must_be_one_character() {
        let text = HEADER.replace("FILE_TYPE = \"t\"", "FILE_TYPE = \"tt\"");
        let err = Grammar::load(&format!("{} a ==> :uint . b ==> :uint .", text)).unwrap_err();
        assert_eq!(
            err.kind(),
            &GrammarErrorKind::InvalidPseudoProduction("FILE_TYPE")
        );
    }
}
