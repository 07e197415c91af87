use clap::Parser;
use tracing::error;

use policybot_cli::{init_logging, load_settings};
use policybot_embed::get_default_embedder;
use policybot_ingest::run_ingestion;

#[derive(Parser)]
#[command(name = "policybot-indexer")]
#[command(about = "Rebuild the vector store from the policy PDF and the FAQ spreadsheet")]
#[command(after_help = "The embedding model is loaded from embedding.model_dir (default models/all-MiniLM-L6-v2 next to the executable). Fetch it once with:\n  huggingface-cli download sentence-transformers/all-MiniLM-L6-v2 config.json tokenizer.json model.safetensors --local-dir <model_dir>")]
struct Cli {
    /// Configuration environment (dev, test, prod); defaults to RUST_ENV
    #[arg(long)]
    config_env: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config_env.as_deref())?;
    init_logging(&settings.logging.filter);

    println!("PolicyBot indexer\n=================");
    println!("PDF:         {}", settings.pdf_path().display());
    println!("Spreadsheet: {}", settings.spreadsheet_path().display());
    println!("Store:       {}", settings.db_dir().display());

    let embedder = get_default_embedder(&settings.embedding, &settings.model_dir())?;
    let summary = run_ingestion(&settings, embedder).await.map_err(|e| {
        error!(error = %e, "ingestion aborted");
        e
    })?;

    println!("\n✅ Index rebuilt");
    println!("📄 {}", summary.extraction);
    println!("📦 {} chunks, {}-dim vectors ({})", summary.index.chunk_count, summary.index.dim, summary.index.embedder_id);
    println!("\n💡 Try it: cargo run --bin policybot-search -- '<question>'");
    Ok(())
}
