//! Simis stream framing.
//!
//! Every Simis stream starts with an outer signature followed by the payload:
//!
//! ```text
//! SIMISA@@@@@@@@@@ <payload>
//! SIMISA@F <u32 uncompressed length> @@@@ <zlib compressed payload>
//! ```
//!
//! The payload itself starts with a `JINX0` signature line naming the file
//! type, its version, and whether the body that follows is binary (`b`) or
//! text (`t`). Text streams are stored as UTF-16LE with a byte order mark,
//! which is detected before the outer signature is examined.
//!
//! ```text
//! Envelope
//! ├── header() → JinxHeader
//! ├── format() → StreamFormat
//! └── body()   → Body
//!     ├── Binary(Vec<u8>)
//!     └── Text(String)
//! ```

mod header;

pub use header::*;

use crate::util::{decode_utf16le, encode_utf16le};
use crate::Error;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Seek, SeekFrom, Write};

const SIGNATURE: &[u8; 6] = b"SIMISA";
const UNCOMPRESSED: &str = "SIMISA@@@@@@@@@@";
const COMPRESSED: &[u8; 8] = b"SIMISA@F";
const COMPRESSED_PAD: &[u8; 4] = b"@@@@";
const BOM: [u8; 2] = [0xff, 0xfe];

/// The decoded body of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Binary(Vec<u8>),
    Text(String),
}

/// A stream with its framing removed
#[derive(Debug, Clone)]
pub struct Envelope {
    header: JinxHeader,
    compressed: bool,
    body: Body,
}

/// Sniff whether the data is UTF-16LE: either a byte order mark or the high
/// byte of the first few characters being zero
fn is_utf16(data: &[u8]) -> bool {
    if data.starts_with(&BOM) {
        return true;
    }

    data.len() >= 2 && data.len() % 2 == 0 && data.iter().skip(1).step_by(2).take(8).all(|&x| x == 0)
}

impl Envelope {
    /// Remove the framing from a stream
    pub fn parse(data: &[u8]) -> Result<Envelope, Error> {
        if is_utf16(data) {
            return Self::parse_utf16(data);
        }

        if let Some(rest) = data.strip_prefix(UNCOMPRESSED.as_bytes()) {
            Self::from_payload(rest, false)
        } else if let Some(rest) = data.strip_prefix(COMPRESSED.as_slice()) {
            let (len, rest) = crate::util::get_split::<4>(rest).ok_or_else(|| {
                Error::framing("truncated compression header").at(data, COMPRESSED.len()..data.len())
            })?;
            let expected = u32::from_le_bytes(len) as usize;
            let rest = rest.strip_prefix(COMPRESSED_PAD.as_slice()).ok_or_else(|| {
                Error::framing("malformed compression header").at(data, 12..UNCOMPRESSED.len())
            })?;

            let mut payload = Vec::with_capacity(expected);
            ZlibDecoder::new(rest)
                .read_to_end(&mut payload)
                .map_err(|e| {
                    Error::framing(format!("unable to inflate stream: {}", e))
                        .at(data, UNCOMPRESSED.len()..data.len())
                })?;

            if payload.len() != expected {
                let msg = format!(
                    "inflated {} bytes but the header declared {}",
                    payload.len(),
                    expected
                );
                return Err(Error::framing(msg).at(data, COMPRESSED.len()..12));
            }

            tracing::debug!(compressed = rest.len(), inflated = payload.len(), "inflated stream");
            Self::from_payload(&payload, true)
        } else if data.starts_with(SIGNATURE) {
            let end = data.len().min(UNCOMPRESSED.len());
            Err(Error::framing("unrecognized SIMISA signature").at(data, SIGNATURE.len()..end))
        } else {
            let end = data.len().min(SIGNATURE.len());
            Err(Error::framing("missing SIMISA signature").at(data, 0..end))
        }
    }

    fn parse_utf16(data: &[u8]) -> Result<Envelope, Error> {
        let data = data.strip_prefix(&BOM).unwrap_or(data);
        let text = decode_utf16le(data)
            .ok_or_else(|| Error::framing("invalid UTF-16LE stream").at(data, 0..data.len()))?;
        let rest = text.strip_prefix(UNCOMPRESSED).ok_or_else(|| {
            let end = text.len().min(UNCOMPRESSED.len());
            Error::framing("missing SIMISA signature in UTF-16 stream").at(text.as_bytes(), 0..end)
        })?;

        let base = UNCOMPRESSED.len();
        let header = JinxHeader::from_slice(rest.as_bytes()).map_err(|e| e.offset_by(base))?;
        if header.mode() != StreamMode::Text {
            let err = Error::framing("a UTF-16 stream must have a text body");
            return Err(err.at(text.as_bytes(), base + 7..base + 8));
        }

        let body = rest[header.header_len()..].to_string();
        tracing::debug!(file_type = %header.file_type(), chars = body.len(), "decoded UTF-16 stream");
        Ok(Envelope {
            header,
            compressed: false,
            body: Body::Text(body),
        })
    }

    fn from_payload(payload: &[u8], compressed: bool) -> Result<Envelope, Error> {
        // payload offsets are reported as if the stream were uncompressed
        let base = UNCOMPRESSED.len();
        let header = JinxHeader::from_slice(payload).map_err(|e| e.offset_by(base))?;
        let len = header.header_len();
        let rest = &payload[len..];
        let body = match header.mode() {
            StreamMode::Binary => Body::Binary(rest.to_vec()),
            StreamMode::Text if compressed => {
                let err = Error::framing("compressed streams must have a binary body");
                return Err(err.at(payload, 7..8).offset_by(base));
            }
            StreamMode::Text => {
                let text = std::str::from_utf8(rest).map_err(|e| {
                    let at = len + e.valid_up_to();
                    Error::framing(format!("text body is not valid UTF-8: {}", e))
                        .at(payload, at..at + 1)
                        .offset_by(base)
                })?;
                Body::Text(text.to_string())
            }
        };

        Ok(Envelope {
            header,
            compressed,
            body,
        })
    }

    pub fn header(&self) -> &JinxHeader {
        &self.header
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat {
            mode: self.header.mode(),
            compressed: self.compressed,
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }
}

#[derive(Debug)]
enum Sink<W: Write> {
    Plain(W),
    Zlib(ZlibEncoder<W>),
}

/// Writes the framing of a binary stream around a body.
///
/// A compressed stream's length is unknown until the body is complete, so
/// a placeholder is written and [`EnvelopeWriter::finish`] patches it.
#[derive(Debug)]
pub struct EnvelopeWriter<W: Write> {
    sink: Sink<W>,
    start: u64,
    written: u64,
}

impl<W> EnvelopeWriter<W>
where
    W: Write + Seek,
{
    /// Write the outer and inner signatures of a binary stream
    pub fn binary(mut writer: W, header: &JinxHeader, compressed: bool) -> Result<Self, Error> {
        if header.mode() != StreamMode::Binary {
            return Err(Error::framing("envelope writer only writes binary bodies"));
        }

        let start = writer.stream_position()?;
        let sink = if compressed {
            writer.write_all(COMPRESSED)?;
            writer.write_all(&0u32.to_le_bytes())?;
            writer.write_all(COMPRESSED_PAD)?;
            Sink::Zlib(ZlibEncoder::new(writer, Compression::default()))
        } else {
            writer.write_all(UNCOMPRESSED.as_bytes())?;
            Sink::Plain(writer)
        };

        let mut out = EnvelopeWriter {
            sink,
            start,
            written: 0,
        };
        header.write(&mut out)?;
        Ok(out)
    }

    /// Flush the body and patch the uncompressed length of a compressed
    /// stream
    pub fn finish(self) -> Result<W, Error> {
        match self.sink {
            Sink::Plain(mut writer) => {
                writer.flush()?;
                Ok(writer)
            }
            Sink::Zlib(encoder) => {
                let mut writer = encoder.finish()?;
                let length = u32::try_from(self.written)
                    .map_err(|_| Error::bounds("payload is larger than 4 GiB"))?;
                let end = writer.stream_position()?;
                writer.seek(SeekFrom::Start(self.start + COMPRESSED.len() as u64))?;
                writer.write_all(&length.to_le_bytes())?;
                writer.seek(SeekFrom::Start(end))?;
                writer.flush()?;
                tracing::debug!(inflated = length, compressed = end - self.start, "wrote compressed stream");
                Ok(writer)
            }
        }
    }
}

impl<W: Write> Write for EnvelopeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = match &mut self.sink {
            Sink::Plain(x) => x.write(buf)?,
            Sink::Zlib(x) => x.write(buf)?,
        };
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.sink {
            Sink::Plain(x) => x.flush(),
            Sink::Zlib(x) => x.flush(),
        }
    }
}

/// Write a complete text stream: a byte order mark followed by the
/// signatures and body, all in UTF-16LE
pub fn write_text<W: Write>(mut writer: W, header: &JinxHeader, body: &str) -> Result<W, Error> {
    if header.mode() != StreamMode::Text {
        return Err(Error::framing("text streams require a text JINX0 signature"));
    }

    let mut buf = Vec::with_capacity((body.len() + 32) * 2);
    buf.extend_from_slice(&BOM);
    encode_utf16le(UNCOMPRESSED, &mut buf);
    encode_utf16le(&header.to_string(), &mut buf);
    encode_utf16le(body, &mut buf);
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(writer)
}
