//! edxml-miner CLI: mines concept instances from EDXML events.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};

use edxml_miner::config::MinerConfig;
use edxml_miner::event::Event;
use edxml_miner::knowledge::KnowledgeBase;
use edxml_miner::ontology::Ontology;

#[derive(Parser)]
#[command(name = "edxml-miner", version, about = "Concept mining for EDXML events")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine concept instances and print the knowledge base as JSON.
    Mine {
        /// Ontology file (.toml or .json).
        #[arg(long)]
        ontology: PathBuf,

        /// Events as JSON lines, one event per line.
        #[arg(long)]
        events: PathBuf,

        /// Seed node ID. Mines every object node when omitted.
        #[arg(long)]
        seed: Option<String>,

        /// Minimum confidence for following an inference.
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Maximum number of hops from a seed.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Mine seeds in parallel.
        #[arg(long)]
        parallel: bool,

        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
    },

    /// Validate an ontology file.
    Validate {
        /// Ontology file (.toml or .json).
        #[arg(long)]
        ontology: PathBuf,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MinerConfig::load(path)?,
        None => MinerConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    match cli.command {
        Commands::Mine {
            ontology,
            events,
            seed,
            min_confidence,
            max_depth,
            parallel,
            pretty,
        } => {
            let mut mining = config.mining.clone();
            if let Some(min_confidence) = min_confidence {
                mining.min_confidence = min_confidence;
            }
            if let Some(max_depth) = max_depth {
                mining.max_depth = max_depth;
            }
            mining.parallel |= parallel;

            let mut kb = KnowledgeBase::new();
            kb.add_ontology(&Ontology::load(&ontology)?)?;
            let count = read_events(&events, &mut kb)?;
            tracing::info!(events = count, path = %events.display(), "events added");

            kb.mine(seed.as_deref(), &mining)?;
            let json = if pretty { kb.to_json_pretty()? } else { kb.to_json()? };
            println!("{json}");
        }

        Commands::Validate { ontology } => {
            let loaded = Ontology::load(&ontology)?;
            loaded.validate()?;
            println!(
                "{}: {} event types, ok",
                ontology.display(),
                loaded.event_types.len()
            );
        }
    }

    Ok(())
}

/// Feed JSON lines events into the knowledge base. Blank lines are skipped.
fn read_events(path: &Path, kb: &mut KnowledgeBase) -> Result<usize> {
    let file = std::fs::File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to open events file {}", path.display()))?;

    let mut count = 0;
    for (number, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.into_diagnostic()?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line)
            .into_diagnostic()
            .wrap_err_with(|| format!("invalid event on line {}", number + 1))?;
        kb.add_event(&event)?;
        count += 1;
    }
    Ok(count)
}
