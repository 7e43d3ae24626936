use std::error;

fn main() -> Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let path = args
        .get(1)
        .ok_or("usage: simis-fsm <grammar.bnf> [production]")?;

    let data = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&data);
    let format = simis::SimisFormat::from_grammar_text(&text)?;

    match args.get(2) {
        Some(production) => {
            let fsm = format
                .fsm(production)
                .ok_or_else(|| format!("{} is not a production of {}", production, path))?;
            println!("{}", fsm);
        }
        None => {
            for (name, fsm) in format.fsms() {
                println!("{}: {}", name, fsm);
            }
        }
    }

    Ok(())
}
