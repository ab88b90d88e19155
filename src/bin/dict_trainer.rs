//! Dictionary Trainer: retrains a zstd dictionary for a collection every cooldown period,
//! publishes it to both mirrors and serves the catalog over HTTP.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use archive_dict_trainer::catalog::Catalog;
use archive_dict_trainer::config::PipelineConfig;
use archive_dict_trainer::dashboard;
use archive_dict_trainer::pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Archive collection whose newest index is sampled
    #[arg(short, long)]
    collection: String,

    /// Project name the dictionaries are catalogued under
    #[arg(short = 'n', long)]
    name: String,

    /// Dashboard port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON config file
    #[arg(long)]
    config: Option<String>,

    /// Catalog path (overrides the config file)
    #[arg(long)]
    catalog: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log compression numbers after each training run
    #[arg(long)]
    evaluate: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path).with_context(|| format!("reading config {}", path))?,
        None => PipelineConfig::default(),
    }
    .apply_env();
    if let Some(port) = args.port {
        config.dashboard_port = port;
    }
    if let Some(catalog) = &args.catalog {
        config.catalog_path = catalog.clone();
    }
    config.evaluate |= args.evaluate;

    let catalog = Arc::new(Catalog::open(&config.catalog_path));
    info!(
        "[Dictionary Trainer] collection={} project={} catalog={}",
        args.collection,
        args.name,
        catalog.path().display()
    );

    let addr = format!("0.0.0.0:{}", config.dashboard_port);
    let dashboard_catalog = Arc::clone(&catalog);
    thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Dashboard runtime failed to start: {}", e);
                return;
            }
        };
        if let Err(e) = runtime.block_on(dashboard::serve(&addr, dashboard_catalog)) {
            error!("Dashboard stopped: {}", e);
        }
    });

    let pipeline = Pipeline::from_config(config, catalog)?;
    if args.once {
        let summary = pipeline.run_once(&args.collection, &args.name)?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    pipeline.run_forever(&args.collection, &args.name)
}
