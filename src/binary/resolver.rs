use crate::grammar::{GrammarError, GrammarErrorKind};
use std::collections::HashMap;

/// Resolves binary 32bit block ids to block type names and back.
///
/// An id packs the token type in the high 16 bits and the index within that
/// type in the low 16 bits.
///
/// One can create their own `TokenResolver` or rely on the HashMap implementation
///
/// ```
/// use std::collections::HashMap;
/// use simis::TokenResolver;
///
/// let mut map = HashMap::new();
/// map.insert(0x0000_0047u32, String::from("shape"));
///
/// assert_eq!(map.resolve(0x0047), Some("shape"));
/// assert_eq!(map.lookup("Shape"), Some(0x0047));
/// ```
pub trait TokenResolver {
    /// Return the block type name of the id if found
    fn resolve(&self, id: u32) -> Option<&str>;

    /// Return the id of a block type name, ignoring ASCII case
    fn lookup(&self, name: &str) -> Option<u32>;
}

impl<S, V> TokenResolver for HashMap<u32, V, S>
where
    S: ::std::hash::BuildHasher,
    V: AsRef<str>,
{
    fn resolve(&self, id: u32) -> Option<&str> {
        self.get(&id).map(|x| x.as_ref())
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.iter()
            .find(|(_, v)| v.as_ref().eq_ignore_ascii_case(name))
            .map(|(k, _)| *k)
    }
}

impl<'a, R> TokenResolver for &'a R
where
    R: TokenResolver + ?Sized,
{
    fn resolve(&self, id: u32) -> Option<&str> {
        (**self).resolve(id)
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        (**self).lookup(name)
    }
}

/// Block ids declared by `.tok` token tables
///
/// ```
/// use simis::{TokenResolver, TokenTable};
///
/// let table = TokenTable::parse(r#"
/// SID_DEFINE_FIRST_ID(0x0000)
/// SIDDEF("comment")
/// SIDDEF("point")
/// "#).unwrap();
///
/// assert_eq!(table.resolve(0x0001), Some("point"));
/// assert_eq!(table.lookup("COMMENT"), Some(0x0000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenTable {
    names: HashMap<u32, String>,
    ids: HashMap<String, u32>,
}

const DEFINE_FIRST: &str = "SID_DEFINE_FIRST_ID";
const DEFINE: &str = "SIDDEF";

impl TokenTable {
    pub fn new() -> TokenTable {
        TokenTable::default()
    }

    /// Parse a token table. `SID_DEFINE_FIRST_ID(0xNNNN)` selects the token
    /// type and restarts the index at zero. Each `SIDDEF("name")` takes the
    /// next index. Every other line is ignored.
    pub fn parse(text: &str) -> Result<TokenTable, GrammarError> {
        let mut table = TokenTable::new();
        let mut token_type: Option<u32> = None;
        let mut index: u32 = 0;

        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let line_offset = offset;
            offset += line.len();

            let trimmed = line.trim();
            let invalid = || {
                GrammarError::new(
                    GrammarErrorKind::InvalidTokenDefinition(trimmed.to_string()),
                    text,
                    line_offset,
                )
            };

            if let Some(arg) = call_argument(trimmed, DEFINE_FIRST) {
                let hex = arg
                    .strip_prefix("0x")
                    .or_else(|| arg.strip_prefix("0X"))
                    .ok_or_else(invalid)?;
                let value = u16::from_str_radix(hex, 16).map_err(|_| invalid())?;
                token_type = Some(u32::from(value));
                index = 0;
            } else if let Some(arg) = call_argument(trimmed, DEFINE) {
                let name = arg
                    .strip_prefix('"')
                    .and_then(|x| x.strip_suffix('"'))
                    .filter(|x| !x.is_empty())
                    .ok_or_else(invalid)?;
                let token_type = token_type.ok_or_else(invalid)?;
                if index > u32::from(u16::MAX) {
                    return Err(invalid());
                }

                table.insert(token_type << 16 | index, name);
                index += 1;
            }
        }

        tracing::debug!(tokens = table.len(), "parsed token table");
        Ok(table)
    }

    pub fn insert<T: Into<String>>(&mut self, id: u32, name: T) {
        let name = name.into();
        self.ids.insert(name.to_ascii_lowercase(), id);
        self.names.insert(id, name);
    }

    /// Add every token of `other`, replacing ids already present
    pub fn merge(&mut self, other: TokenTable) {
        for (id, name) in other.names {
            self.insert(id, name);
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl TokenResolver for TokenTable {
    fn resolve(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(|x| x.as_str())
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.ids.get(&name.to_ascii_lowercase()).copied()
    }
}

/// The argument of `NAME(arg)` if the line is a call to `name`
fn call_argument<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.trim_start();
    let rest = rest.strip_prefix('(')?;
    let end = rest.rfind(')')?;
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_table() {
        let text = "// shapes\r\nSID_DEFINE_FIRST_ID(0x0000)\r\nSIDDEF(\"comment\")\r\n\r\nSIDDEF(\"shape\")\r\nSID_DEFINE_FIRST_ID(0x0001)\r\nSIDDEF(\"material\")\r\n";
        let table = TokenTable::parse(text).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve(0x0000_0000), Some("comment"));
        assert_eq!(table.resolve(0x0000_0001), Some("shape"));
        assert_eq!(table.resolve(0x0001_0000), Some("material"));
        assert_eq!(table.lookup("Material"), Some(0x0001_0000));
        assert_eq!(table.lookup("missing"), None);
    }

    #[test]
    fn test_define_before_type_is_invalid() {
        let err = TokenTable::parse("SIDDEF(\"comment\")\n").unwrap_err();
        assert!(matches!(
            err.kind(),
            GrammarErrorKind::InvalidTokenDefinition(_)
        ));
    }

    #[test]
    fn test_bad_hex_is_invalid() {
        let err = TokenTable::parse("SIDDEF(\"a\")\nSID_DEFINE_FIRST_ID(0xzz)\n").unwrap_err();
        assert_eq!(err.offset(), 0);

        let err = TokenTable::parse("SID_DEFINE_FIRST_ID(0xzz)\n").unwrap_err();
        assert_eq!(
            err.kind(),
            &GrammarErrorKind::InvalidTokenDefinition(String::from("SID_DEFINE_FIRST_ID(0xzz)"))
        );
    }

    #[test]
    fn test_merge() {
        let mut a = TokenTable::new();
        a.insert(1, "one");
        let mut b = TokenTable::new();
        b.insert(2, "two");
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.lookup("TWO"), Some(2));
    }
}
