use crate::binary::TokenTable;
use crate::envelope::Envelope;
use crate::format::SimisFormat;
use crate::grammar::Grammar;
use crate::tree::SimisFile;
use crate::Error;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

/// Every format of a resource directory together with the merged token
/// table shared by their binary streams.
#[derive(Debug, Clone, Default)]
pub struct GrammarSet {
    formats: BTreeMap<(char, char), SimisFormat>,
    tokens: TokenTable,
}

/// Decode a resource file, honoring a UTF-8 or UTF-16 byte order mark
fn decode_resource(data: &[u8]) -> String {
    match encoding_rs::Encoding::for_bom(data) {
        Some((encoding, bom_len)) => encoding
            .decode_without_bom_handling(&data[bom_len..])
            .0
            .into_owned(),
        None => encoding_rs::UTF_8.decode_without_bom_handling(data).0.into_owned(),
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|x| x.to_str())
        .is_some_and(|x| x.eq_ignore_ascii_case(extension))
}

fn load_format(path: &Path) -> Result<Option<SimisFormat>, Error> {
    let text = decode_resource(&std::fs::read(path)?);
    match Grammar::load(&text) {
        Ok(grammar) => Ok(Some(SimisFormat::new(grammar)?)),
        Err(e) if e.is_missing_pseudo_production() => {
            tracing::warn!(path = %path.display(), "skipping grammar without format productions");
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed grammar");
            Err(e.into())
        }
    }
}

impl GrammarSet {
    pub fn new(tokens: TokenTable) -> GrammarSet {
        GrammarSet {
            formats: BTreeMap::new(),
            tokens,
        }
    }

    /// Add a format, replacing any with the same file type and version
    pub fn insert(&mut self, format: SimisFormat) -> Option<SimisFormat> {
        let info = format.info();
        self.formats.insert((info.file_type(), info.version()), format)
    }

    /// Load every `.bnf` grammar and `.tok` token table of a directory.
    ///
    /// Grammars are compiled in parallel. A grammar missing its `FILE*`
    /// productions is skipped; any other malformed grammar fails the load.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<GrammarSet, Error> {
        let dir = dir.as_ref();
        let _span = tracing::debug_span!("load_dir", dir = %dir.display()).entered();

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            paths.push(entry?.path());
        }
        paths.sort();

        let mut tokens = TokenTable::new();
        for path in paths.iter().filter(|x| has_extension(x, "tok")) {
            let text = decode_resource(&std::fs::read(path)?);
            let table = TokenTable::parse(&text)?;
            tracing::debug!(path = %path.display(), tokens = table.len(), "loaded token table");
            tokens.merge(table);
        }

        let grammars: Vec<&PathBuf> = paths.iter().filter(|x| has_extension(x, "bnf")).collect();
        let formats = grammars
            .par_iter()
            .map(|path| load_format(path))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut set = GrammarSet::new(tokens);
        for format in formats.into_iter().flatten() {
            let name = format.info().name().to_string();
            if let Some(previous) = set.insert(format) {
                tracing::warn!(
                    format = %name,
                    replaced = previous.info().name(),
                    "formats share a file type and version"
                );
            }
        }

        tracing::info!(
            formats = set.formats.len(),
            grammars = grammars.len(),
            tokens = set.tokens.len(),
            "loaded grammar set"
        );
        Ok(set)
    }

    /// Start loading a directory on a background thread
    pub fn spawn_load<P: Into<PathBuf>>(dir: P) -> PendingGrammarSet {
        let dir = dir.into();
        PendingGrammarSet {
            handle: std::thread::spawn(move || GrammarSet::load_dir(dir)),
        }
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    /// The format for a file type and version signature
    pub fn format(&self, file_type: char, version: char) -> Option<&SimisFormat> {
        self.formats.get(&(file_type, version))
    }

    /// The format registered under a name, ignoring ASCII case
    pub fn format_by_name(&self, name: &str) -> Option<&SimisFormat> {
        self.formats.values().find(|x| x.info().name().eq_ignore_ascii_case(name))
    }

    pub fn formats(&self) -> impl Iterator<Item = &SimisFormat> {
        self.formats.values()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// The format named by a stream's signature
    pub fn format_of(&self, envelope: &Envelope) -> Result<&SimisFormat, Error> {
        let header = envelope.header();
        self.format(header.file_type(), header.version()).ok_or_else(|| {
            Error::framing(format!(
                "no grammar for file type {}{}",
                header.file_type(),
                header.version()
            ))
        })
    }

    /// Parse a framed stream with the format its signature names
    pub fn parse(&self, data: &[u8]) -> Result<SimisFile, Error> {
        let envelope = Envelope::parse(data)?;
        let format = self.format_of(&envelope)?;
        SimisFile::from_envelope(format, &self.tokens, envelope)
    }

    /// Write a file with the format its signature names
    pub fn serialize<W>(&self, file: &SimisFile, writer: W) -> Result<W, Error>
    where
        W: Write + Seek,
    {
        let header = file.header();
        let format = self.format(header.file_type(), header.version()).ok_or_else(|| {
            Error::framing(format!(
                "no grammar for file type {}{}",
                header.file_type(),
                header.version()
            ))
        })?;
        file.serialize(format, &self.tokens, writer)
    }
}

/// A grammar set loading in the background. Nothing can be parsed until it
/// has been joined.
#[derive(Debug)]
pub struct PendingGrammarSet {
    handle: JoinHandle<Result<GrammarSet, Error>>,
}

impl PendingGrammarSet {
    /// Wait for loading to complete
    pub fn join(self) -> Result<GrammarSet, Error> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const POINT: &str = r#"
        FILE = :point .
        FILE_NAME = "Point" .
        FILE_EXT = "pt" .
        FILE_TYPE = "p" .
        FILE_TYPE_VER = "1" .
        point ==> :float,X :float,Y .
    "#;

    const TOKENS: &str = "SID_DEFINE_FIRST_ID(0x0000)\nSIDDEF(\"comment\")\nSIDDEF(\"point\")\n";

    #[test]
    fn test_decode_resource() {
        assert_eq!(decode_resource(b"\xef\xbb\xbfabc"), "abc");
        assert_eq!(decode_resource(b"\xff\xfea\x00b\x00"), "ab");
        assert_eq!(decode_resource(b"abc"), "abc");
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("point.bnf"), POINT).unwrap();
        std::fs::write(dir.path().join("shared.bnf"), "vector ==> :float :float .").unwrap();
        std::fs::write(dir.path().join("tokens.tok"), TOKENS).unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let set = GrammarSet::spawn_load(dir.path()).join().unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.format('p', '1').is_some());
        assert!(set.format_by_name("POINT").is_some());
        assert_eq!(set.tokens().len(), 2);
    }

    #[test]
    fn test_malformed_grammar_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("point.bnf"), POINT).unwrap();
        std::fs::write(dir.path().join("broken.bnf"), "FILE = :point").unwrap();

        let err = GrammarSet::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Grammar(_)));
    }

    #[test]
    fn test_unknown_file_type() {
        let set = GrammarSet::default();
        let err = set.parse(b"SIMISA@@@@@@@@@@JINX0q1t______\r\npoint ( 1 2 )").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Framing(_)));
    }
}
