use std::fmt;

/// A node of a grammar rule body.
///
/// `And` and `Or` are binary and associate to the left as the loader builds
/// them, so `:a :b :c` is `And(And(a, b), c)`.
///
/// ```
/// use simis::Operator;
///
/// let op = Operator::and(
///     Operator::reference("vector"),
///     Operator::optional(Operator::named("float", "Radius")),
/// );
/// assert_eq!(op.to_string(), ":vector [:float,Radius]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// `:name`
    Reference(String),

    /// `:name,label`
    NamedReference(String, String),

    /// `"text"`
    Literal(String),

    /// `[inner]`
    Optional(Box<Operator>),

    /// `{inner}`
    Repeat(Box<Operator>),

    /// Juxtaposition
    And(Box<Operator>, Box<Operator>),

    /// `left | right`
    Or(Box<Operator>, Box<Operator>),
}

impl Operator {
    pub fn reference<T: Into<String>>(name: T) -> Operator {
        Operator::Reference(name.into())
    }

    pub fn named<T: Into<String>, U: Into<String>>(name: T, label: U) -> Operator {
        Operator::NamedReference(name.into(), label.into())
    }

    pub fn literal<T: Into<String>>(text: T) -> Operator {
        Operator::Literal(text.into())
    }

    pub fn optional(inner: Operator) -> Operator {
        Operator::Optional(Box::new(inner))
    }

    pub fn repeat(inner: Operator) -> Operator {
        Operator::Repeat(Box::new(inner))
    }

    pub fn and(left: Operator, right: Operator) -> Operator {
        Operator::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Operator, right: Operator) -> Operator {
        Operator::Or(Box::new(left), Box::new(right))
    }

    /// The referenced symbol if this is a (named) reference
    pub fn reference_name(&self) -> Option<&str> {
        match self {
            Operator::Reference(name) | Operator::NamedReference(name, _) => Some(name),
            _ => None,
        }
    }

    /// Calls `f` with every referenced symbol in left to right order
    pub fn visit_references<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a str),
    {
        match self {
            Operator::Reference(name) | Operator::NamedReference(name, _) => f(name),
            Operator::Literal(_) => {}
            Operator::Optional(inner) | Operator::Repeat(inner) => inner.visit_references(f),
            Operator::And(left, right) | Operator::Or(left, right) => {
                left.visit_references(f);
                right.visit_references(f);
            }
        }
    }

    fn is_or(&self) -> bool {
        matches!(self, Operator::Or(_, _))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operator::Reference(name) => write!(f, ":{}", name),
            Operator::NamedReference(name, label) => write!(f, ":{},{}", name, label),
            Operator::Literal(text) => write!(f, "{:?}", text),
            Operator::Optional(inner) => write!(f, "[{}]", inner),
            Operator::Repeat(inner) => write!(f, "{{{}}}", inner),
            Operator::And(left, right) => {
                // the grammar language has no grouping, so an alternation
                // nested in a sequence is shown in parentheses
                for (i, side) in [left, right].into_iter().enumerate() {
                    if i != 0 {
                        f.write_str(" ")?;
                    }

                    if side.is_or() {
                        write!(f, "({})", side)?;
                    } else {
                        write!(f, "{}", side)?;
                    }
                }
                Ok(())
            }
            Operator::Or(left, right) => write!(f, "{} | {}", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nested() {
        let op = Operator::and(
            Operator::or(Operator::reference("a"), Operator::reference("b")),
            Operator::repeat(Operator::literal("c")),
        );
        assert_eq!(op.to_string(), "(:a | :b) {\"c\"}");
    }

    #[test]
    fn references_in_order() {
        let op = Operator::and(
            Operator::reference("a"),
            Operator::optional(Operator::or(
                Operator::named("uint", "Count"),
                Operator::literal("x"),
            )),
        );
        let mut names = Vec::new();
        op.visit_references(&mut |x| names.push(x));
        assert_eq!(names, vec!["a", "uint"]);
    }
}
