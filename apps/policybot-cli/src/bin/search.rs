use clap::Parser;

use policybot_cli::{init_logging, load_settings};
use policybot_core::traits::Retriever;
use policybot_embed::get_default_embedder;
use policybot_vector::VectorStore;

#[derive(Parser)]
#[command(name = "policybot-search")]
#[command(about = "Show the chunks the assistant would retrieve for a question", long_about = None)]
struct Cli {
    /// Question to look up
    query: String,
    /// Number of chunks to return; defaults to retrieval.top_k
    #[arg(short, long)]
    limit: Option<usize>,
    #[arg(long)]
    config_env: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config_env.as_deref())?;
    init_logging(&settings.logging.filter);

    let embedder = get_default_embedder(&settings.embedding, &settings.model_dir())?;
    let store = VectorStore::open(&settings.db_dir(), &settings.data.table_name, embedder).await?;
    let limit = cli.limit.unwrap_or(settings.retrieval.top_k);
    let hits = store.retrieve(&cli.query, limit).await?;

    println!("🔍 '{}' ({} of {} stored chunks)", cli.query, hits.len(), store.count().await?);
    for (i, hit) in hits.iter().enumerate() {
        let page = hit.chunk.page.map_or_else(String::new, |p| format!(" p.{p}"));
        println!("\n{}. [{:.3}] {}{} ({}/{})", i + 1, hit.score, hit.chunk.source, page, hit.chunk.chunk_index + 1, hit.chunk.total_chunks);
        println!("{}", hit.chunk.content.trim());
    }
    Ok(())
}
