use std::error;
use std::io::{self, Read};

fn main() -> Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let resources = std::env::args()
        .nth(1)
        .ok_or("usage: simis-json <resources dir> < file")?;

    let pending = simis::GrammarSet::spawn_load(resources);
    let mut data = Vec::new();
    io::stdin().read_to_end(&mut data)?;

    let set = pending.join()?;
    let file = set.parse(&data)?;

    let stdout = io::stdout();
    let mut lock = stdout.lock();
    serde_json::to_writer_pretty(&mut lock, file.root())?;
    println!();
    Ok(())
}
