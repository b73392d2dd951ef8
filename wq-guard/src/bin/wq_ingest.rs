//! Discovers source CSV files, cleans them and writes the cleaned table.
//!
//! Configuration comes from the `WQ_*` environment variables; flags override them.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use wq_guard::config::ServiceConfig;
use wq_guard::ingest::IngestPipeline;
use wq_guard::logging::setup::init_logging;
use wq_guard::store::DataFusionStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source glob pattern, repeatable
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Path of the cleaned CSV
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = ServiceConfig::from_env()?;
    init_logging(config.logging.clone())?;

    let mut ingest = config.ingest.clone();
    if !args.sources.is_empty() {
        ingest = ingest.with_source_patterns(args.sources);
    }
    if let Some(output) = args.output {
        ingest = ingest.with_output_path(output);
    }

    let store = Arc::new(DataFusionStore::new(config.store.clone())?);
    let pipeline = IngestPipeline::new(ingest, store);
    let outcome = pipeline.run().await?;

    println!("Loaded {} source file(s):", outcome.files.len());
    for file in &outcome.files {
        println!("  {}", file.display());
    }
    let report = outcome.report;
    println!("Total rows:             {}", report.total);
    println!("Removed as outliers:    {}", report.removed);
    println!("Dropped as incomplete:  {}", report.incomplete);
    println!("Remaining:              {}", report.remaining);
    println!(
        "Cleaned data written to {}",
        pipeline.config().output_path.display()
    );
    Ok(())
}
