use crate::Error;
use std::io::Write;

/// How a stream body is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Length prefixed blocks of little endian values (`b`)
    Binary,

    /// Parenthesized blocks of whitespace separated values (`t`)
    Text,
}

impl StreamMode {
    /// Creates a StreamMode from its signature character
    pub fn new(kind: u8) -> Option<StreamMode> {
        match kind {
            b'b' => Some(StreamMode::Binary),
            b't' => Some(StreamMode::Text),
            _ => None,
        }
    }

    /// Returns the signature character of this mode
    pub fn value(&self) -> u8 {
        match self {
            StreamMode::Binary => b'b',
            StreamMode::Text => b't',
        }
    }
}

/// Body encoding and compression of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    pub mode: StreamMode,
    pub compressed: bool,
}

impl StreamFormat {
    pub const TEXT: StreamFormat = StreamFormat {
        mode: StreamMode::Text,
        compressed: false,
    };

    pub const BINARY: StreamFormat = StreamFormat {
        mode: StreamMode::Binary,
        compressed: false,
    };

    pub const COMPRESSED_BINARY: StreamFormat = StreamFormat {
        mode: StreamMode::Binary,
        compressed: true,
    };
}

/// The `JINX0` signature line that precedes every stream body
///
/// ```
/// use simis::{JinxHeader, StreamMode};
///
/// let header = JinxHeader::from_slice(b"JINX0s1t______\r\nshape ( )").unwrap();
/// assert_eq!(header.file_type(), 's');
/// assert_eq!(header.version(), '1');
/// assert_eq!(header.mode(), StreamMode::Text);
/// assert_eq!(header.header_len(), 16);
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JinxHeader {
    file_type: u8,
    version: u8,
    mode: StreamMode,
    header_len: usize,
}

impl JinxHeader {
    pub(crate) const SIZE: usize = 14;

    /// A header terminated by `\r\n`
    pub fn new(file_type: char, version: char, mode: StreamMode) -> Result<Self, Error> {
        let ascii = |c: char, what: &str| {
            u8::try_from(c)
                .ok()
                .filter(|x| x.is_ascii_graphic())
                .ok_or_else(|| Error::framing(format!("{} {:?} is not a printable ascii character", what, c)))
        };

        Ok(JinxHeader {
            file_type: ascii(file_type, "file type")?,
            version: ascii(version, "file version")?,
            mode,
            header_len: Self::SIZE + 2,
        })
    }

    /// Parse the signature line at the start of the data
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        let (head, rest) = crate::util::get_split::<{ Self::SIZE }>(data).ok_or_else(|| {
            Error::framing(format!("{} bytes is too short for a JINX0 signature", data.len()))
                .at(data, 0..data.len())
        })?;

        if &head[..5] != b"JINX0" {
            return Err(Error::framing("missing JINX0 signature").at(data, 0..5));
        }

        let mode = StreamMode::new(head[7]).ok_or_else(|| {
            Error::framing(format!("unknown stream mode {:?}", char::from(head[7]))).at(data, 7..8)
        })?;

        if &head[8..14] != b"______" {
            return Err(Error::framing("malformed JINX0 signature padding").at(data, 8..14));
        }

        let header_len = match rest.get(..2) {
            Some(b"\r\n") => Self::SIZE + 2,
            Some([b'\n', _]) => Self::SIZE + 1,
            None if rest == b"\n" => Self::SIZE + 1,
            _ => {
                let msg = "JINX0 signature is not followed by a line break";
                return Err(Error::framing(msg).at(data, Self::SIZE..Self::SIZE + 2));
            }
        };

        Ok(JinxHeader {
            file_type: head[5],
            version: head[6],
            mode,
            header_len,
        })
    }

    /// Returns the file type character
    pub fn file_type(&self) -> char {
        char::from(self.file_type)
    }

    /// Returns the file version character
    pub fn version(&self) -> char {
        char::from(self.version)
    }

    /// Returns the body encoding
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Returns the length of the signature line in bytes
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Writes the signature line
    pub fn write<W>(&self, mut writer: W) -> std::io::Result<()>
    where
        W: Write,
    {
        writer.write_all(b"JINX0")?;
        writer.write_all(&[self.file_type, self.version, self.mode.value()])?;
        writer.write_all(b"______")?;
        if self.header_len == Self::SIZE + 2 {
            writer.write_all(b"\r")?;
        }
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl std::fmt::Display for JinxHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut buf = Vec::new();
        self.write(&mut buf).map_err(|_| std::fmt::Error)?;
        let s = std::str::from_utf8(&buf).map_err(|_| std::fmt::Error)?;
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_header() {
        let data = b"JINX0w2b______\r\n\x01\x02";
        let header = JinxHeader::from_slice(&data[..]).unwrap();
        assert_eq!(header.file_type(), 'w');
        assert_eq!(header.version(), '2');
        assert_eq!(header.mode(), StreamMode::Binary);
        assert_eq!(header.header_len(), 16);
    }

    #[test]
    fn test_line_feed_terminator() {
        let header = JinxHeader::from_slice(b"JINX0s1t______\nshape").unwrap();
        assert_eq!(header.header_len(), 15);

        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        assert_eq!(out.as_slice(), b"JINX0s1t______\n");
    }

    #[test]
    fn test_write_roundtrip() {
        let header = JinxHeader::new('t', '1', StreamMode::Text).unwrap();
        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        assert_eq!(out.as_slice(), b"JINX0t1t______\r\n");
        assert_eq!(JinxHeader::from_slice(&out).unwrap(), header);
        assert_eq!(header.to_string(), "JINX0t1t______\r\n");
    }

    #[test]
    fn test_rejects_bad_signatures() {
        assert!(JinxHeader::from_slice(b"JINX0s1").is_err());
        assert!(JinxHeader::from_slice(b"JINX1s1t______\r\n").is_err());
        assert!(JinxHeader::from_slice(b"JINX0s1x______\r\n").is_err());
        assert!(JinxHeader::from_slice(b"JINX0s1t_____-\r\n").is_err());
        assert!(JinxHeader::from_slice(b"JINX0s1t______ab").is_err());
    }

    #[test]
    fn test_errors_point_at_the_bad_field() {
        let err = JinxHeader::from_slice(b"JINX0s1z______\r\n").unwrap_err();
        assert_eq!(err.offset(), Some(7));
        assert_eq!(err.context().unwrap().fault(), b"z");

        let err = JinxHeader::from_slice(b"JINX0s1t___x__\r\n").unwrap_err();
        assert_eq!(err.offset(), Some(8));
        assert_eq!(err.context().unwrap().fault(), b"___x__");

        let err = JinxHeader::from_slice(b"JINX0s1t______ab").unwrap_err();
        assert_eq!(err.offset(), Some(14));
        assert_eq!(err.context().unwrap().prefix(), b"JINX0s1t______");
    }

    #[test]
    fn test_new_rejects_non_ascii() {
        assert!(JinxHeader::new('\u{e9}', '1', StreamMode::Text).is_err());
        assert!(JinxHeader::new(' ', '1', StreamMode::Text).is_err());
    }
}
