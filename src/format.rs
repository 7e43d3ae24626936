use crate::fsm::Fsm;
use crate::grammar::{FormatInfo, Grammar, GrammarError};
use std::collections::BTreeMap;

/// A grammar together with the compiled state machine of every production
#[derive(Debug, Clone)]
pub struct SimisFormat {
    grammar: Grammar,
    fsms: BTreeMap<String, Fsm>,
}

impl SimisFormat {
    /// Compile every production of a loaded grammar
    pub fn new(grammar: Grammar) -> Result<SimisFormat, GrammarError> {
        let mut fsms = BTreeMap::new();
        for rule in grammar.productions() {
            let fsm = grammar.compile(rule.symbol())?;
            tracing::trace!(production = rule.symbol(), states = fsm.len(), "compiled production");
            fsms.insert(rule.symbol().to_ascii_lowercase(), fsm);
        }

        Ok(SimisFormat { grammar, fsms })
    }

    /// Load a grammar description and compile it
    ///
    /// ```
    /// use simis::SimisFormat;
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
    /// assert_eq!(
    ///     format.fsm("Point").unwrap().to_string(),
    ///     "start -> float,X -> float,Y -> finish"
    /// );
    /// ```
    pub fn from_grammar_text(text: &str) -> Result<SimisFormat, GrammarError> {
        SimisFormat::new(Grammar::load(text)?)
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn info(&self) -> &FormatInfo {
        self.grammar.info()
    }

    /// The state machine of a production, ignoring ASCII case
    pub fn fsm(&self, production: &str) -> Option<&Fsm> {
        self.fsms.get(&production.to_ascii_lowercase())
    }

    /// Productions and their machines ordered by lowercase name
    pub fn fsms(&self) -> impl Iterator<Item = (&str, &Fsm)> {
        self.fsms.iter().map(|(k, v)| (k.as_str(), v))
    }
}
