use clap::{Parser, Subcommand};
use pdf_rag::Result;
use pdf_rag::commands::{ask_question, configure, ingest_document, list_documents, show_status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "A PDF question-answering system with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure provider endpoints and API keys
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a PDF document for question answering
    Ingest {
        /// Storage bucket the document lives in
        bucket: String,
        /// Path of the document within the bucket
        storage_path: String,
        /// Optional display title; defaults to the file name
        #[arg(long)]
        title: Option<String>,
        /// Stage a local file into the bucket before ingesting
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Ask a question about an ingested document
    Ask {
        /// Document ID to ask about
        document: String,
        /// The question
        question: String,
        /// Continue an existing chat session
        #[arg(long)]
        session: Option<String>,
    },
    /// List all ingested documents
    List,
    /// Show detailed status for a document
    Status {
        /// Document ID to inspect
        document: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            configure(show)?;
        }
        Commands::Ingest {
            bucket,
            storage_path,
            title,
            file,
        } => {
            ingest_document(bucket, storage_path, title, file.as_deref()).await?;
        }
        Commands::Ask {
            document,
            question,
            session,
        } => {
            ask_question(document, question, session).await?;
        }
        Commands::List => {
            list_documents().await?;
        }
        Commands::Status { document } => {
            show_status(document).await?;
        }
    }

    Ok(())
}
