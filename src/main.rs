use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use quillpass_lib::models::AnalyzeRequest;
use quillpass_lib::services::{ConfigStore, Pipeline, PARAPHRASE_PROVIDER};

#[derive(Parser)]
#[command(
    name = "quillpass",
    about = "Score text originality and machine-likeness, then rewrite it to lower both",
    version
)]
struct Cli {
    /// Input file (reads stdin if omitted)
    file: Option<PathBuf>,

    /// Keyword that must survive rewriting (repeatable)
    #[arg(short, long = "keyword")]
    keywords: Vec<String>,

    /// Stop once detection score / 100 is at or below this value
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Seed for reproducible quirks, typos and fallback edits
    #[arg(long)]
    seed: Option<u64>,

    /// Skip web retrieval and the paraphrase model
    #[arg(long)]
    offline: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the full analysis report instead of the response object
    #[arg(long)]
    report: bool,

    /// Store the paraphrase API key in the config file and exit
    #[arg(long, value_name = "KEY")]
    store_api_key: Option<String>,

    /// Remove the stored paraphrase API key and exit
    #[arg(long, conflicts_with = "store_api_key")]
    delete_api_key: bool,
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    quillpass_lib::init_logging();
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => Some(ConfigStore::with_file(path.clone())),
        None => ConfigStore::default_config_dir().map(ConfigStore::new),
    };

    if let Some(key) = &cli.store_api_key {
        let Some(store) = &store else {
            bail!("No config directory available; pass --config");
        };
        store
            .set_api_key(PARAPHRASE_PROVIDER, key.trim())
            .map_err(anyhow::Error::msg)?;
        eprintln!("Stored API key in {}", store.config_file().display());
        return Ok(());
    }

    if cli.delete_api_key {
        let Some(store) = &store else {
            bail!("No config directory available; pass --config");
        };
        store
            .delete_api_key(PARAPHRASE_PROVIDER)
            .map_err(anyhow::Error::msg)?;
        eprintln!("Removed API key from {}", store.config_file().display());
        return Ok(());
    }

    let config = match &store {
        Some(s) => s.load().map_err(anyhow::Error::msg)?,
        None => Default::default(),
    };

    let pipeline = if cli.offline {
        Pipeline::offline(config)
    } else {
        Pipeline::from_config(config, store.as_ref())?
    };

    let request = AnalyzeRequest {
        content: read_input(cli.file.as_ref())?,
        keywords: cli.keywords,
        threshold: cli.threshold,
        seed: cli.seed,
    };

    if cli.report {
        let report = pipeline.analyze(request).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let response = Arc::new(pipeline).handle(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
