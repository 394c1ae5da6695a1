//! # CoachBot CLI (`coachbot`)
//!
//! ## Usage
//!
//! ```bash
//! coachbot --config ./config/coachbot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `coachbot init` | Create the SQLite database and run schema migrations |
//! | `coachbot serve` | Start the HTTP API (and scheduled polling, if configured) |
//! | `coachbot ingest <experience> <path>` | Add a text or PDF file as training data |
//! | `coachbot poll <experience>` | Answer new mentions in the experience's channel once |
//! | `coachbot ask <experience> "<question>"` | Print the reply the bot would give |
//!
//! Secrets come from the environment (`OPENAI_API_KEY`, `WHOP_API_KEY`,
//! `WHOP_WEBHOOK_SECRET`); a `.env` file in the working directory is
//! loaded first if present.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use coachbot::config::{self, Secrets};
use coachbot::extract::MIME_PDF;
use coachbot::migrate;
use coachbot::server;
use coachbot::services::Services;
use coachbot::training::TrainingUpload;
use coachbot_core::models::BotConfig;

/// CoachBot: answers questions in community chat from uploaded training
/// material.
#[derive(Parser)]
#[command(name = "coachbot", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/coachbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP server.
    Serve,

    /// Ingest a text or PDF file as training data for an experience.
    Ingest {
        experience_id: String,

        /// File to read. `.pdf` files are text-extracted; anything else is
        /// read as UTF-8.
        path: PathBuf,

        /// Replace an existing training document instead of adding one.
        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Poll the experience's channel once and answer new mentions.
    Poll { experience_id: String },

    /// Generate a reply to a question without posting it.
    Ask {
        experience_id: String,
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let services = Arc::new(Services::connect(cfg, Secrets::from_env()).await?);

    match cli.command {
        Commands::Init => {}
        Commands::Serve => {
            server::run_server(services).await?;
        }
        Commands::Ingest {
            experience_id,
            path,
            doc_id,
        } => {
            let bytes = tokio::fs::read(&path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            let is_pdf = path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            let upload = TrainingUpload::File {
                name,
                content_type: is_pdf.then(|| MIME_PDF.to_string()),
                bytes,
            };
            let saved = services
                .training
                .save(&experience_id, upload, doc_id.as_deref())
                .await?;
            println!(
                "{} document {} ({} chunks)",
                if saved.replaced { "Updated" } else { "Stored" },
                saved.doc_id,
                saved.chunks
            );
        }
        Commands::Poll { experience_id } => {
            let outcome = services.reconciler.poll(&experience_id).await?;
            println!("{}", outcome.message);
        }
        Commands::Ask {
            experience_id,
            question,
        } => {
            let bot = services
                .store
                .get_bot_config(&experience_id)
                .await?
                .unwrap_or_else(|| BotConfig::defaults_for(&experience_id));
            let reply = services
                .generator
                .generate(&question, &experience_id, bot.personality, &bot.bot_name)
                .await?;
            println!("{}", reply);
        }
    }

    Ok(())
}
