//! # docsift CLI
//!
//! The `docsift` binary extracts text from documents, ingests folders into an
//! in-memory corpus and searches it with regular expressions.
//!
//! ## Usage
//!
//! ```bash
//! docsift --config ./config/docsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsift extract <file>` | Print the extracted text of one file |
//! | `docsift ingest <paths...>` | Ingest files and directories, print the outcome of each |
//! | `docsift search <pattern> <paths...>` | Ingest, then print highlighted snippets |
//! | `docsift completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Text of a Word document
//! docsift extract ./contracts/lease.docx
//!
//! # Machine-readable outcome report
//! docsift ingest ./mailbox --json
//!
//! # Snippets with 40 characters of context on each side
//! docsift search "net\s+30" ./invoices --context 40
//!
//! # Whole document with every hit highlighted
//! docsift search "net\s+30" ./invoices --view invoices/march.pdf
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use docsift::config::{self, Config};
use docsift::connector_fs;
use docsift::error::ExtractError;
use docsift::extract::Extracted;
use docsift::ingest::{normalize_text, Pipeline};
use docsift::models::IngestReport;
use docsift::progress::ProgressMode;
use docsift::search::SearchEngine;
use docsift::session::Session;

const DEFAULT_CONFIG: &str = "./config/docsift.toml";

/// docsift: text extraction, deduplication and regex search over office documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without it, `./config/docsift.toml` is used when present and
/// built-in defaults otherwise.
#[derive(Parser)]
#[command(
    name = "docsift",
    about = "Extract, deduplicate and search text from office documents",
    version,
    long_about = "docsift reads DOCX, XLSX, PPTX, PDF, Outlook MSG, HTML and TXT files, \
    keeps one copy of each distinct document in memory, and searches them with \
    case-insensitive regular expressions."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docsift.toml`; if that file does not exist the
    /// built-in defaults are used. An explicitly given path must exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ingest progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the extracted text of a single file.
    ///
    /// The format is chosen by extension. Message attachments are listed on
    /// stderr but not extracted.
    Extract {
        /// File to read.
        file: PathBuf,
    },

    /// Ingest files and directories and print the outcome of every file.
    ///
    /// Directories are walked recursively using the `[scan]` globs. Outlook
    /// messages contribute their attachments as additional files. Duplicates
    /// (same file name, same text) are skipped.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ingest, then search the corpus for a regular expression.
    ///
    /// Matching is case-insensitive. Each hit is shown with surrounding
    /// context; a hit already visible in the previous snippet is not repeated.
    Search {
        /// Regular expression to search for.
        pattern: String,

        /// Files or directories to search.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Characters of context on each side of a match (overrides `[search]`).
        #[arg(long)]
        context: Option<usize>,

        /// Print one document in full with every snippet highlighted.
        #[arg(long)]
        view: Option<String>,

        /// Print matches as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "docsift", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = load(cli.config.as_deref())?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Extract { file } => run_extract(&cfg, &file).await?,
        Commands::Ingest { paths, json } => {
            let (_, report) = ingest(&cfg, &paths, progress).await?;
            print_report(&report, json)?;
        }
        Commands::Search {
            pattern,
            paths,
            context,
            view,
            json,
        } => {
            let (session, _) = ingest(&cfg, &paths, progress).await?;
            let mut engine = cfg.search_engine();
            if let Some(context) = context {
                if context == 0 {
                    bail!("--context must be > 0");
                }
                engine = SearchEngine::new(context).with_highlight(cfg.search.highlight());
            }
            run_search(&engine, &session, &pattern, view.as_deref(), json)?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

/// Cancels the returned token on Ctrl-C so queued files are skipped.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; skipping queued files");
            child.cancel();
        }
    });
    token
}

async fn run_extract(cfg: &Config, file: &Path) -> Result<()> {
    let dispatcher = cfg.dispatcher()?;
    let name = file.to_string_lossy();
    let format = dispatcher.resolve(&name)?;
    let size = std::fs::metadata(file)
        .with_context(|| format!("Failed to stat {}", file.display()))?
        .len();
    if let Some(&limit) = cfg.limits.get(format.extension()) {
        if size > limit {
            return Err(ExtractError::OverSizeLimit {
                extension: format.extension().to_string(),
                size,
                limit,
            }
            .into());
        }
    }
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let Extracted { text, attachments } = dispatcher.extract(format, Arc::from(bytes)).await?;
    println!("{}", normalize_text(&text));
    for attachment in attachments {
        eprintln!(
            "attachment: {} ({} bytes)",
            attachment.file_name,
            attachment.content.len()
        );
    }
    Ok(())
}

async fn ingest(
    cfg: &Config,
    paths: &[PathBuf],
    progress: ProgressMode,
) -> Result<(Session, IngestReport)> {
    let files = connector_fs::scan_paths(paths, &cfg.scan, &cfg.limits)?;
    let pipeline = Pipeline::from_config(cfg, Arc::from(progress.reporter()))?;
    let cancel = cancel_on_ctrl_c();

    let mut session = Session::new();
    let report = pipeline.ingest(&mut session, files, &cancel).await;
    Ok((session, report))
}

fn print_report(report: &IngestReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("ingest");
    for outcome in &report.outcomes {
        println!("  {}  {}", outcome.key, outcome.outcome);
    }
    println!("  succeeded: {}", report.succeeded().count());
    println!("  failed: {}", report.failed().count());
    println!("  skipped: {}", report.skipped().count());
    println!("ok");
    Ok(())
}

fn run_search(
    engine: &SearchEngine,
    session: &Session,
    pattern: &str,
    view: Option<&str>,
    json: bool,
) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let mut results = engine.search_cancellable(session, pattern, &cancel)?;

    if let Some(key) = view {
        let rendered = results
            .document_view(session, key)
            .with_context(|| format!("No document with key '{}'", key))?;
        println!("{}", rendered);
        return Ok(());
    }

    if json {
        let items: Vec<serde_json::Value> = results
            .matches()
            .iter()
            .map(|m| {
                serde_json::json!({
                    "match": m,
                    "snippet": results.snippet(session, m),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for m in results.matches() {
        let snippet = results.snippet(session, m).unwrap_or_default();
        println!("{}:{}  {}", m.key, m.match_index, snippet.replace('\n', " "));
    }
    println!("{} matches", results.len());
    Ok(())
}
