//! escriba – generate PDF documents from template packages.
//!
//! Usage:
//!   escriba [--config FILE] [--templates-dir DIR] list
//!   escriba ... describe NAME
//!   escriba ... generate NAME PAYLOAD.json [-o OUT.pdf] [--landscape]
//!   escriba ... check
//!
//! `PAYLOAD.json` may be `-` to read the payload from stdin. Logging is
//! controlled with `RUST_LOG`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use thiserror::Error as ThisError;

use escriba::{DocumentService, Error, PageOrientation, ServiceConfig};

#[derive(Parser)]
#[command(name = "escriba")]
#[command(about = "Template registry and PDF document generation")]
struct Cli {
    /// Service configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the template packages (overrides the config)
    #[arg(short, long)]
    templates_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the available templates
    List,
    /// Print the required fields and an example payload of a template
    Describe { name: String },
    /// Render a template with a JSON payload
    Generate {
        name: String,
        /// Payload file, or `-` for stdin
        payload: PathBuf,
        /// Output path (default: NAME.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Use landscape page orientation
        #[arg(long)]
        landscape: bool,
    },
    /// Load every package and report the ones that fail
    Check,
}

#[derive(Debug, ThisError)]
enum CliError {
    #[error(transparent)]
    Core(#[from] Error),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: payload is not valid JSON: {source}", .path.display())]
    Payload {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        report(&e);
        process::exit(1);
    }
}

fn report(e: &CliError) {
    let fields = match e {
        CliError::Core(core) => core.field_errors(),
        _ => None,
    };
    match fields {
        Some(fields) => {
            eprintln!("Error: payload validation failed");
            for field in fields {
                eprintln!("  {field}");
            }
        }
        None => eprintln!("Error: {e}"),
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(dir) = cli.templates_dir {
        config.templates_dir = dir;
    }

    match cli.command {
        Command::List => {
            let service = DocumentService::open(&config)?;
            for name in service.list_templates() {
                println!("{name}");
            }
        }
        Command::Describe { name } => {
            let service = DocumentService::open(&config)?;
            let schema = service.schema(&name)?;
            println!("{}", to_pretty_json(&schema));
        }
        Command::Generate {
            name,
            payload,
            output,
            landscape,
        } => {
            if landscape {
                config.page.orientation = PageOrientation::Landscape;
            }
            let raw = read_payload(&payload)?;
            let service = DocumentService::open(&config)?;
            let bytes = service.generate(&name, &raw)?;

            let output = output.unwrap_or_else(|| PathBuf::from(format!("{name}.pdf")));
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(io_error(&output))?;
                }
            }
            fs::write(&output, &bytes).map_err(io_error(&output))?;
            eprintln!("Wrote '{}' ({} bytes)", output.display(), bytes.len());
        }
        Command::Check => {
            let service = DocumentService::open(&config)?;
            let snapshot = service.snapshot();
            for descriptor in snapshot.templates() {
                println!(
                    "ok      {} ({} asset(s))",
                    descriptor.name(),
                    descriptor.asset_paths().len()
                );
            }
            for skipped in snapshot.skipped() {
                println!("skipped {}: {}", skipped.name, skipped.reason);
            }
            if !snapshot.skipped().is_empty() {
                process::exit(1);
            }
        }
    }
    Ok(())
}

fn read_payload(path: &Path) -> Result<serde_json::Value, CliError> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(io_error(path))?;
        text
    } else {
        fs::read_to_string(path).map_err(io_error(path))?
    };
    serde_json::from_str(&text).map_err(|source| CliError::Payload {
        path: path.to_path_buf(),
        source,
    })
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
