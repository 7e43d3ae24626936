use std::fmt;

/// The primitive value types a grammar may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    /// Unsigned 32 bit integer
    Uint,

    /// Signed 32 bit integer
    Sint,

    /// Unsigned 32 bit integer shown as hex in text streams
    Dword,

    /// Unsigned 16 bit integer
    Word,

    /// Unsigned 8 bit integer
    Byte,

    /// 32 bit float
    Float,

    /// UTF-16 string
    String,

    /// Raw bytes running to the end of the enclosing block
    Buffer,
}

/// How a primitive is laid out in a binary stream. Two primitives with the
/// same representation cannot be told apart when reading binary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryRepr {
    U32,
    I32,
    U16,
    U8,
    F32,
    String,
    Buffer,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 8] = [
        PrimitiveType::Uint,
        PrimitiveType::Sint,
        PrimitiveType::Dword,
        PrimitiveType::Word,
        PrimitiveType::Byte,
        PrimitiveType::Float,
        PrimitiveType::String,
        PrimitiveType::Buffer,
    ];

    /// Look up a primitive by its grammar name, ignoring ASCII case
    ///
    /// ```
    /// use simis::PrimitiveType;
    /// assert_eq!(PrimitiveType::from_name("UINT"), Some(PrimitiveType::Uint));
    /// assert_eq!(PrimitiveType::from_name("vector"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<PrimitiveType> {
        PrimitiveType::ALL
            .iter()
            .copied()
            .find(|x| x.name().eq_ignore_ascii_case(name))
    }

    /// The lowercase grammar name
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Uint => "uint",
            PrimitiveType::Sint => "sint",
            PrimitiveType::Dword => "dword",
            PrimitiveType::Word => "word",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Float => "float",
            PrimitiveType::String => "string",
            PrimitiveType::Buffer => "buffer",
        }
    }

    pub fn binary_repr(&self) -> BinaryRepr {
        match self {
            PrimitiveType::Uint | PrimitiveType::Dword => BinaryRepr::U32,
            PrimitiveType::Sint => BinaryRepr::I32,
            PrimitiveType::Word => BinaryRepr::U16,
            PrimitiveType::Byte => BinaryRepr::U8,
            PrimitiveType::Float => BinaryRepr::F32,
            PrimitiveType::String => BinaryRepr::String,
            PrimitiveType::Buffer => BinaryRepr::Buffer,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The payload of a primitive value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize),
    serde(tag = "type", content = "value", rename_all = "lowercase")
)]
pub enum ValueData {
    Uint(u32),
    Sint(i32),
    Dword(u32),
    Word(u16),
    Byte(u8),
    Float(f32),
    String(String),
    Buffer(Vec<u8>),
}

impl ValueData {
    pub fn primitive(&self) -> PrimitiveType {
        match self {
            ValueData::Uint(_) => PrimitiveType::Uint,
            ValueData::Sint(_) => PrimitiveType::Sint,
            ValueData::Dword(_) => PrimitiveType::Dword,
            ValueData::Word(_) => PrimitiveType::Word,
            ValueData::Byte(_) => PrimitiveType::Byte,
            ValueData::Float(_) => PrimitiveType::Float,
            ValueData::String(_) => PrimitiveType::String,
            ValueData::Buffer(_) => PrimitiveType::Buffer,
        }
    }

    /// The value as a string if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueData::String(x) => Some(x),
            _ => None,
        }
    }
}

/// A primitive value together with the grammar label it was matched against
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Value {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    pub data: ValueData,
}

impl Value {
    pub fn new(data: ValueData) -> Value {
        Value { name: None, data }
    }

    pub fn named<T: Into<String>>(name: T, data: ValueData) -> Value {
        Value {
            name: Some(name.into()),
            data,
        }
    }
}

/// A unit of a parsed stream.
///
/// Every block is announced by a `BlockHeader`, followed by a `BlockBegin`,
/// its contents, and a `BlockEnd`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Type and optional label of the block that follows
    BlockHeader {
        type_name: String,
        label: Option<String>,
    },

    BlockBegin,

    BlockEnd,

    /// A primitive value within a block
    Value(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names_round_trip() {
        for primitive in PrimitiveType::ALL {
            assert_eq!(PrimitiveType::from_name(primitive.name()), Some(primitive));
        }
    }

    #[test]
    fn uint_and_dword_share_a_representation() {
        assert_eq!(
            PrimitiveType::Uint.binary_repr(),
            PrimitiveType::Dword.binary_repr()
        );
        assert_ne!(
            PrimitiveType::Uint.binary_repr(),
            PrimitiveType::Sint.binary_repr()
        );
    }
}
