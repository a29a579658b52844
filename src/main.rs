//! # docchat CLI
//!
//! Extracts text from PDF, Word, Excel and plain-text files and lets you ask
//! questions about it through a chat-completions API.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat extract <files>` | Process files and list the results |
//! | `docchat ask <files> --query <q>` | Ask one question about the files |
//! | `docchat chat <files>` | Interactive chat about the files |
//! | `docchat modes` | List analysis modes |
//! | `docchat completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # See what was extracted, including per-sheet errors
//! docchat extract report.pdf budget.xlsx
//!
//! # Dump the combined text sent to the model
//! docchat extract report.pdf budget.xlsx --corpus
//!
//! # One-shot summary
//! MISTRAL_API_KEY=... docchat ask report.pdf --query "key risks?" --mode summarize
//! ```

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use docchat::progress::ProgressMode;
use docchat::{commands, config, repl};

/// docchat: chat with your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "docchat: extract text from documents and ask questions about it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from files and print the processed-file listing.
    Extract {
        /// Files to process (.pdf, .docx, .xlsx, .txt).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the combined corpus instead of the listing.
        #[arg(long, conflicts_with = "json")]
        corpus: bool,

        /// Print the processed records as JSON.
        #[arg(long)]
        json: bool,

        /// Progress output on stderr (default: human on a TTY, else off).
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Ask a single question about the files.
    Ask {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// The question.
        #[arg(long, short)]
        query: String,

        /// Analysis mode (see `docchat modes`).
        #[arg(long, short, default_value = "General Analysis")]
        mode: String,
    },

    /// Start an interactive chat about the files.
    Chat {
        files: Vec<PathBuf>,

        #[arg(long, short, default_value = "General Analysis")]
        mode: String,
    },

    /// List the analysis modes.
    Modes,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Modes => {
            commands::run_modes();
            return Ok(());
        }
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "docchat", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Extract {
            files,
            corpus,
            json,
            progress,
        } => {
            commands::run_extract(&cfg, &files, corpus, json, progress)?;
        }
        Commands::Ask { files, query, mode } => {
            commands::run_ask(&cfg, &files, &query, &mode).await?;
        }
        Commands::Chat { files, mode } => {
            let mut app = commands::open_session(&cfg, &files)?;
            app.set_mode(docchat::gateway::AnalysisMode::from_label(&mode));
            repl::run_chat(app).await?;
        }
        Commands::Modes | Commands::Completions { .. } => {}
    }

    Ok(())
}
