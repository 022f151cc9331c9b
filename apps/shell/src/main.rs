use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tourline_domain::context::LoadContext;
use tourline_kernel::config::load_config;
use tourline_logger::Logger;
use tourline_shell::{RunOptions, ShellConfig};

/// Warm the tour pipeline for a context and load tours from a definition directory.
#[derive(Debug, Parser)]
#[command(name = "tourline", version, about)]
struct Cli {
    /// Config file; defaults to an optional `tourline.*` in the working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `tours_dir` from the config.
    #[arg(short, long)]
    tours_dir: Option<PathBuf>,

    /// Load context as JSON, e.g. `{"role":"admin","device":"mobile"}`.
    #[arg(long, value_parser = parse_context)]
    context: Option<LoadContext>,

    /// Current page path; overrides the page in `--context`.
    #[arg(short, long)]
    page: Option<String>,

    /// Print the final performance report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Tour ids to load after initialization.
    tours: Vec<String>,
}

fn parse_context(raw: &str) -> Result<LoadContext, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid load context: {e}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config: ShellConfig =
        load_config(cli.config.as_deref()).context("Critical: Configuration is malformed")?;
    if let Some(dir) = cli.tours_dir {
        config.tours_dir = dir;
    }

    let _log = Logger::from_settings(env!("CARGO_PKG_NAME"), &config.logging)?;

    let mut context = cli.context.unwrap_or_default();
    if let Some(page) = cli.page {
        context = context.page(page);
    }

    let summary = tourline_shell::run(&config, &RunOptions { context, tours: cli.tours }).await?;
    tracing::info!(
        catalog = summary.catalog_size,
        preloaded = summary.preloaded.len(),
        loaded = summary.loaded.len(),
        missing = summary.missing.len(),
        strategy = %summary.strategy,
        "Run complete"
    );

    if cli.json {
        let mut out = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, &summary.report)?;
        writeln!(out)?;
    }

    Ok(())
}
