use rayon::prelude::*;
use simis::{Envelope, GrammarSet, SimisFile, StreamFormat};
use std::collections::BTreeMap;
use std::error;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Tally {
    passed: usize,
    failed: usize,
}

fn collect_files(path: &Path, extensions: &[String], out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            collect_files(&entry?.path(), extensions, out)?;
        }
    } else if path
        .extension()
        .and_then(|x| x.to_str())
        .is_some_and(|x| extensions.iter().any(|ext| ext.eq_ignore_ascii_case(x)))
    {
        out.push(path.to_path_buf());
    }

    Ok(())
}

/// Parse a file, write it back out in its own encoding, and parse it again.
/// Uncompressed binary files must also come back byte for byte.
fn validate(set: &GrammarSet, path: &Path) -> (String, Result<(), String>) {
    let data = match std::fs::read(path) {
        Ok(x) => x,
        Err(e) => return (String::from("unreadable"), Err(e.to_string())),
    };

    let envelope = match Envelope::parse(&data) {
        Ok(x) => x,
        Err(e) => return (String::from("unframed"), Err(e.to_string())),
    };

    let format = match set.format_of(&envelope) {
        Ok(x) => x,
        Err(e) => return (String::from("unknown"), Err(e.to_string())),
    };

    let name = format.info().name().to_string();

    // only plain binary streams are compared byte for byte
    let exact = envelope.format() == StreamFormat::BINARY;
    let roundtrip = || -> Result<Option<&'static str>, simis::Error> {
        let file = SimisFile::from_envelope(format, set.tokens(), envelope)?;
        let out = file.serialize(format, set.tokens(), Cursor::new(Vec::new()))?;
        if exact && out.get_ref() != &data {
            return Ok(Some("binary stream changed after writing it back"));
        }

        let reparsed = SimisFile::parse(format, set.tokens(), out.get_ref())?;
        if reparsed.root() != file.root() {
            return Ok(Some("tree changed after writing and reading it back"));
        }

        Ok(None)
    };

    let result = match roundtrip() {
        Ok(None) => Ok(()),
        Ok(Some(msg)) => Err(String::from(msg)),
        Err(e) => Err(e.to_string()),
    };
    tracing::debug!(path = %path.display(), format = %name, ok = result.is_ok(), "validated");
    (name, result)
}

fn main() -> Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        return Err("usage: simis-validate <resources dir> <file or dir>...".into());
    }

    let set = GrammarSet::spawn_load(&args[1]).join()?;
    let extensions: Vec<String> = set.formats().map(|x| x.info().extension().to_string()).collect();

    let mut files = Vec::new();
    for path in &args[2..] {
        collect_files(Path::new(path), &extensions, &mut files)?;
    }
    files.sort();

    let tallies: Mutex<BTreeMap<String, Tally>> = Mutex::new(BTreeMap::new());
    files.par_iter().for_each(|path| {
        let (name, result) = validate(&set, path);
        if let Err(e) = &result {
            eprintln!("{}: {}", path.display(), e);
        }

        let mut tallies = tallies.lock().unwrap_or_else(|e| e.into_inner());
        let tally = tallies.entry(name).or_default();
        match result {
            Ok(()) => tally.passed += 1,
            Err(_) => tally.failed += 1,
        }
    });

    let tallies = tallies.into_inner().unwrap_or_else(|e| e.into_inner());
    let mut failed = 0;
    for (name, tally) in &tallies {
        println!("{:<24} {:>8} passed {:>8} failed", name, tally.passed, tally.failed);
        failed += tally.failed;
    }

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
