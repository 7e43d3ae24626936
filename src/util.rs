use crate::ErrorContext;

/// A simplified and const generic version of arrayref
#[inline]
fn take<const N: usize>(data: &[u8]) -> [u8; N] {
    debug_assert!(data.len() >= N);
    unsafe { *(data.as_ptr() as *const [u8; N]) }
}

#[inline]
pub(crate) fn get_split<const N: usize>(data: &[u8]) -> Option<([u8; N], &[u8])> {
    data.get(N..).map(|d| (take::<N>(data), d))
}

/// Decode UTF-16LE bytes, returning `None` on unpaired surrogates or an odd
/// byte count
pub(crate) fn decode_utf16le(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }

    let (text, had_errors) = encoding_rs::UTF_16LE.decode_without_bom_handling(data);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

pub(crate) fn encode_utf16le(text: &str, out: &mut Vec<u8>) {
    out.reserve(text.len() * 2);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
}

/// Counts the bytes handed to an output and keeps the most recent of them
/// for error context
#[derive(Debug, Default)]
pub(crate) struct OutputTail {
    position: usize,
    recent: Vec<u8>,
}

impl OutputTail {
    pub(crate) fn push(&mut self, data: &[u8]) {
        self.position += data.len();
        self.recent.extend_from_slice(data);
        if self.recent.len() > 2 * ErrorContext::WINDOW {
            let cut = self.recent.len() - ErrorContext::WINDOW;
            self.recent.drain(..cut);
        }
    }

    /// Number of bytes written so far
    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn recent(&self) -> &[u8] {
        &self.recent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_output_tail() {
        let mut tail = OutputTail::default();
        tail.push(b"abc");
        assert_eq!(tail.position(), 3);
        assert_eq!(tail.recent(), b"abc");

        for _ in 0..100 {
            tail.push(&[b'x'; 7]);
        }
        assert_eq!(tail.position(), 703);
        assert!(tail.recent().len() <= 2 * ErrorContext::WINDOW);
        assert!(tail.recent().len() >= ErrorContext::WINDOW);
    }

    #[test]
    fn test_utf16le() {
        let mut data = Vec::new();
        encode_utf16le("Zürich ✓", &mut data);
        assert_eq!(&data[..4], &[b'Z', 0, 0xfc, 0]);
        assert_eq!(decode_utf16le(&data).as_deref(), Some("Zürich ✓"));
        assert_eq!(decode_utf16le(&data[..3]), None);
        assert_eq!(decode_utf16le(&[0x00, 0xd8]), None);
    }

    #[test]
    fn test_get_split() {
        let data = [1u8, 2, 3, 4, 5];
        let (head, rest) = get_split::<4>(&data).unwrap();
        assert_eq!(u32::from_le_bytes(head), 0x04030201);
        assert_eq!(rest, &[5]);
        assert!(get_split::<8>(&data).is_none());
    }

    #[quickcheck]
    fn utf16le_equality(data: String) -> bool {
        let mut out = Vec::new();
        encode_utf16le(&data, &mut out);
        decode_utf16le(&out) == Some(data)
    }
}
