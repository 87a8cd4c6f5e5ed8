//! # ragdesk CLI
//!
//! ```bash
//! ragdesk --config ./config/ragdesk.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdesk init` | Create the SQLite database and schema |
//! | `ragdesk import <dir>` | Import `<dir>/<topic>/*.txt` and rebuild |
//! | `ragdesk add --topic <t> [--title <n>] <file>` | Add one document and rebuild |
//! | `ragdesk delete <topic>` | Delete a topic and rebuild |
//! | `ragdesk topics` | List topics |
//! | `ragdesk rebuild` | Rebuild the index |
//! | `ragdesk ask --user <id> --topic <t> "<question>"` | Route one question |
//! | `ragdesk serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered by `RUST_LOG` (default `info`).

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragdesk::admin::{AdminReport, RebuildOutcome};
use ragdesk::admission::InboundMessage;
use ragdesk::app::App;
use ragdesk::config;
use ragdesk::ingest;
use ragdesk::migrate;
use ragdesk::server;

/// Topic-scoped retrieval-augmented help desk.
#[derive(Parser)]
#[command(name = "ragdesk", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Import a directory of topics and rebuild the index.
    ///
    /// Each subdirectory is a topic; each `*.txt` file in it is a document
    /// titled by its file name without extension.
    Import {
        dir: PathBuf,
    },

    /// Add a single text file as a document and rebuild.
    Add {
        /// Topic to file the document under. Defaults to the file stem.
        #[arg(long)]
        topic: Option<String>,

        /// Document title. Defaults to the topic.
        #[arg(long)]
        title: Option<String>,

        file: PathBuf,
    },

    /// Delete every document of a topic and rebuild.
    Delete {
        topic: String,
    },

    /// List topics in the document store.
    Topics,

    /// Rebuild the index from the document store.
    Rebuild,

    /// Ask one question as a user, going through admission and quota.
    Ask {
        #[arg(long, default_value_t = 0)]
        user: i64,

        #[arg(long)]
        topic: String,

        question: String,
    },

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { dir } => {
            let (app, _operator_rx) = App::open(cfg).await?;
            let report = ingest::import_dir(app.store.as_ref(), &dir).await?;
            println!(
                "Imported {} documents into {} topics ({} skipped).",
                report.documents,
                report.topics.len(),
                report.skipped
            );
            let report = app.admin.rebuild().await?;
            println!(
                "Index generation {}: {} chunks across {} topics.",
                report.generation, report.chunks, report.topics
            );
        }
        Commands::Add { topic, title, file } => {
            let (app, _operator_rx) = App::open(cfg).await?;
            let report = match topic {
                Some(topic) => {
                    let text = tokio::fs::read_to_string(&file)
                        .await
                        .with_context(|| format!("failed to read {}", file.display()))?;
                    let title = title.unwrap_or_default();
                    app.admin.add_document(&topic, &title, &text).await?
                }
                None => {
                    let bytes = tokio::fs::read(&file)
                        .await
                        .with_context(|| format!("failed to read {}", file.display()))?;
                    let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                    app.admin.add_file(name, &bytes).await?
                }
            };
            print_admin_report("Added", &report);
        }
        Commands::Delete { topic } => {
            let (app, _operator_rx) = App::open(cfg).await?;
            let report = app.admin.delete_topic(&topic).await?;
            print_admin_report("Deleted", &report);
        }
        Commands::Topics => {
            let (app, _operator_rx) = App::open(cfg).await?;
            let topics = app.admin.topics().await?;
            if topics.is_empty() {
                println!("No topics.");
            }
            for topic in topics {
                println!("{}", topic);
            }
        }
        Commands::Rebuild => {
            let (app, _operator_rx) = App::open(cfg).await?;
            let report = app.admin.rebuild().await?;
            println!(
                "Index generation {}: {} documents, {} chunks across {} topics in {}ms.",
                report.generation, report.documents, report.chunks, report.topics, report.elapsed_ms
            );
        }
        Commands::Ask {
            user,
            topic,
            question,
        } => {
            let (app, _operator_rx) = App::open(cfg).await?;
            if app.index.snapshot().generation() == 0 {
                app.admin.rebuild().await?;
            }
            app.admission.select_topic(user, &topic).await;
            let route = app
                .admission
                .classify_and_route(user, InboundMessage::Text(question))
                .await;
            println!("{}", route.reply());
        }
        Commands::Serve => {
            let (app, operator_rx) = App::open(cfg).await?;
            server::run_server(app, operator_rx).await?;
        }
    }

    Ok(())
}

fn print_admin_report(action: &str, report: &AdminReport) {
    println!("{} {} document(s).", action, report.rows);
    match &report.rebuild {
        RebuildOutcome::Rebuilt(r) => println!(
            "Index generation {}: {} chunks across {} topics.",
            r.generation, r.chunks, r.topics
        ),
        RebuildOutcome::AlreadyRunning => println!("A rebuild is already running; it will pick this up."),
        RebuildOutcome::Failed { message } => println!("Rebuild failed: {}", message),
    }
}
