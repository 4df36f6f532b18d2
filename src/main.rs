//! # Carebot CLI (`carebot`)
//!
//! Interactive assistant for health care insurance documents.
//!
//! ```bash
//! # .env in the working directory is loaded first
//! carebot
//! ```
//!
//! | Option | Description |
//! |--------|-------------|
//! | `1` | Ingest the PDF files under `DATA_DIR` |
//! | `2` | Ask questions about the ingested documents |
//! | `3` | Count logged runs between two dates |
//! | `4` | Delete every stored vector |
//! | `5` | Exit |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `carebot=info,carebot_core=info`).

use clap::Parser;

use carebot::app::App;
use carebot::config::Settings;
use carebot::shell::Shell;
use carebot::terminal::TerminalInput;

/// Carebot, a retrieval-augmented assistant for health care insurance
/// documents.
///
/// All settings are read from environment variables, optionally seeded
/// from a `.env` file in the working directory.
#[derive(Parser)]
#[command(
    name = "carebot",
    about = "Carebot, a retrieval-augmented assistant for health care insurance documents",
    version,
    long_about = "Carebot ingests PDF documents into a Pinecone index using Hugging Face \
    embeddings, answers questions about them with a Mistral chat model, and logs every \
    answer to LangSmith for monitoring. Configuration is read from environment variables \
    (MISTRAL_API_KEY, PINECONE_API_KEY, PINECONE_INDEX_NAME, PINECONE_ENVIRONMENT, \
    LANGCHAIN_API_KEY, ...), optionally from a .env file."
)]
struct Cli {}

fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();

    if let Err(e) = dotenv::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env: {}", e);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carebot=info,carebot_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let app = App::initialize(&settings).await;
    let mut shell = Shell::new(app, TerminalInput::spawn(), std::io::stdout());
    shell.run().await
}
