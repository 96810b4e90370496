use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use incparse::{Session, SessionConfig};

/// Loads a grammar, parses a program with it and runs the result.
#[derive(Parser, Debug)]
#[command(name = "incparse")]
#[command(version, about = "Grammar-driven incremental parser and interpreter", long_about = None)]
struct Cli {
    /// Grammar file: non-terminals, terminals and rules
    #[arg(value_name = "GRAMMAR")]
    grammar: PathBuf,

    /// Program file; read from stdin when omitted
    #[arg(value_name = "PROGRAM")]
    program: Option<PathBuf>,

    /// YAML session configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the FIRST and FOLLOW sets of the grammar
    #[arg(long)]
    print_sets: bool,

    /// Print the compiled statement listing before running
    #[arg(long)]
    listing: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "FILTER", default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => SessionConfig::from_yaml_file(path)?,
        None => SessionConfig::default(),
    };
    let mut session = Session::new(config);

    let grammar = fs::read_to_string(&cli.grammar)
        .with_context(|| format!("Reading {}", cli.grammar.display()))?;
    let loaded = session.load_grammar(&grammar);
    for line in session.error_report() {
        eprintln!("{line}");
    }
    loaded.with_context(|| format!("Loading grammar {}", cli.grammar.display()))?;
    if session.stage() != incparse::SessionStage::Program {
        bail!("Grammar {} has no end marker", cli.grammar.display());
    }

    if cli.print_sets {
        for line in session.first_sets()? {
            println!("{line}");
        }
        for line in session.follow_sets()? {
            println!("{line}");
        }
    }

    let source = match &cli.program {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading stdin")?;
            buffer
        }
    };
    session.load_program(&source).context("Parsing program")?;

    if cli.listing {
        session.compile().context("Compiling program")?;
        if let Some(listing) = session.listing() {
            print!("{listing}");
        }
    }

    let output = session.run().context("Running program")?;
    if !output.is_empty() {
        println!("{}", output.join("\n"));
    }
    Ok(())
}
