//! bibgraph CLI: ingest a bibliography dump and query it.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use bibgraph::config::{BibConfig, CONFIG_FILE};
use bibgraph::ingest::{YearMode, ingest_into_data_dir};
use bibgraph::query::QueryService;
use bibgraph::store::DurableStore;

#[derive(Parser)]
#[command(name = "bibgraph", version, about = "Bibliography ingestion and coauthor graphs")]
struct Cli {
    /// Config file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Data directory for the database (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest an XML dump into the data directory.
    Ingest {
        /// Path to the XML file, or "-" for stdin.
        #[arg(long)]
        input: PathBuf,

        /// Parse on a separate thread while writing.
        #[arg(long)]
        pipelined: bool,

        /// Year used for keyword statistics: from-record or force-zero.
        #[arg(long)]
        year_mode: Option<YearMode>,
    },

    /// Look up an author name, or title keywords.
    Query {
        /// Author name or title text.
        text: String,
    },

    /// Summaries for a list of hex record keys.
    Entries {
        /// Hex record keys.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Full record for one hex key.
    Entry {
        /// Hex record key.
        key: String,
    },

    /// Corpus features computed at the end of ingestion.
    Features,

    /// Coauthor graph around an author.
    Colab {
        /// Author name, exactly as in the dump.
        name: String,

        /// Seed for the neighbor sampler, for reproducible graphs.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show or create the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Write the default configuration to the config path.
    Init,
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

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = BibConfig::load_or_default(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Ingest {
            input,
            pipelined,
            year_mode,
        } => {
            if let Some(mode) = year_mode {
                config.ingest.year_mode = mode;
            }
            let reader = open_input(&input)?;
            if let Some(summary) = ingest_into_data_dir(&config, reader, pipelined)? {
                print_json(&summary)?;
            }
        }

        Commands::Query { text } => {
            let service = open_service(&config)?;
            print_json(&service.query(&text)?)?;
        }

        Commands::Entries { keys } => {
            let service = open_service(&config)?;
            print_json(&service.entry_summaries(&keys)?)?;
        }

        Commands::Entry { key } => {
            let service = open_service(&config)?;
            match service.full_entry(&key)? {
                Some(entry) => print_json(&entry)?,
                None => miette::bail!("no record with key {key}"),
            }
        }

        Commands::Features => {
            let service = open_service(&config)?;
            print_json(&service.features()?)?;
        }

        Commands::Colab { name, seed } => {
            let service = open_service(&config)?;
            let graph = match seed {
                Some(seed) => {
                    service.coauthor_graph_with_rng(&name, &mut StdRng::seed_from_u64(seed))?
                }
                None => service.coauthor_graph(&name)?,
            };
            print_json(&graph)?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", config.to_toml().map_err(|e| miette::miette!("{e}"))?);
            }
            ConfigAction::Init => {
                if cli.config.exists() {
                    miette::bail!("{} already exists", cli.config.display());
                }
                config.save(&cli.config)?;
                println!("Wrote {}", cli.config.display());
            }
        },
    }

    Ok(())
}

fn open_service(config: &BibConfig) -> Result<QueryService<DurableStore>> {
    Ok(QueryService::open(config)?)
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    const READ_BUFFER: usize = 1 << 20;
    if path == Path::new("-") {
        return Ok(Box::new(std::io::BufReader::with_capacity(
            READ_BUFFER,
            std::io::stdin(),
        )));
    }
    let file = std::fs::File::open(path)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("cannot open {}", path.display())))?;
    Ok(Box::new(std::io::BufReader::with_capacity(READ_BUFFER, file)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
