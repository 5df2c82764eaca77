use clap::Parser;
use rag_eval::Config;
use rag_eval::output::{self, OutputFormat};
use rag_eval::runner::Runner;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RAG Evaluation CLI - Score a retrieval/generation pipeline against a ground-truth dataset
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    run_file: PathBuf,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - show progress and per-call diagnostics
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "rag_eval=debug" } else { "rag_eval=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::from_file(&args.run_file)?;
    let runner = Runner::new(config);

    let results = runner.run().await?;

    output::print_results(&results, args.output);

    Ok(())
}
