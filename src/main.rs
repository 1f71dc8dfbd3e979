use anyhow::Context;
use artmatch::RunConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Match query items against each value of a label, then render the matches
#[derive(Parser, Debug)]
#[command(name = "artmatch")]
#[command(about = "Conditional nearest-neighbor matching with comparison grids", long_about = None)]
struct Args {
    /// JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feature store file (.json, .jsonl, .ndjson, optionally .gz)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Query entity id (repeatable)
    #[arg(short = 'q', long = "query-id")]
    query_ids: Vec<String>,

    /// Label field to condition on
    #[arg(long)]
    field: Option<String>,

    /// Label value to match against (repeatable; default: all values)
    #[arg(long = "value")]
    values: Vec<String>,

    /// Matches per condition
    #[arg(short, long)]
    k: Option<usize>,

    /// Output image path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the result table as JSON lines
    #[arg(long)]
    export: Option<PathBuf>,

    /// Skip rendering the comparison grid
    #[arg(long)]
    no_render: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        if let Some(store) = self.store {
            config.store.path = Some(store);
        }
        if !self.query_ids.is_empty() {
            config.queries = self.query_ids;
        }
        if let Some(field) = self.field {
            config.condition.field = field;
        }
        if !self.values.is_empty() {
            config.condition.values = self.values;
        }
        if let Some(k) = self.k {
            config.matching.k = k;
        }
        if let Some(output) = self.output {
            config.render.output = output;
        }
        if self.export.is_some() {
            config.export = self.export;
        }
        if self.no_render {
            config.render.enabled = false;
        }

        config.validate().context("invalid run configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting artmatch v{}", env!("CARGO_PKG_VERSION"));

    let config = args.into_config()?;
    info!(
        queries = config.queries.len(),
        field = %config.condition.field,
        k = config.matching.k,
        "run configured"
    );

    let summary = artmatch::run(&config).await?;

    if let Some(path) = &summary.exported {
        info!("Result table: {}", path.display());
    }
    if let Some(report) = &summary.render {
        info!(
            "Grid: {} ({} ok, {} empty, {} failed), manifest: {}",
            report.output.display(),
            report.ok,
            report.empty,
            report.failed,
            report.manifest.display()
        );
    }
    Ok(())
}
