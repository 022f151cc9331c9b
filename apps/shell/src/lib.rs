//! # Tourline Shell
//!
//! Runs the tour pipeline against a directory of JSON definitions: discovers the catalog,
//! warms the pipeline for a caller-described context, loads the requested tours and reports
//! how the adaptive strategy settled.
//!
//! Catalog layout: `<tours_dir>/<category>/<id>.json`. Files placed directly in `tours_dir`
//! land in the [`DEFAULT_CATEGORY`].
//!
//! ## Example
//! ```no_run
//! use tourline_shell::{RunOptions, ShellConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ShellConfig { tours_dir: "./tours".into(), ..ShellConfig::default() };
//!     let summary = tourline_shell::run(&config, &RunOptions::default()).await?;
//!     println!("{:?}", summary.report.strategy);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tourline_domain::bundle::BundleConfig;
use tourline_domain::config::PipelineConfig;
use tourline_domain::context::LoadContext;
use tourline_kernel::state::AppState;
use tourline_logger::LogSettings;
use tourline_tours::orchestrator::{PerformanceReport, PreloadStrategy};
use tourline_tours::registry::{ResolveError, TourRegistry};
use tourline_tours::{TourPipeline, Tours};
use tracing::{info, warn};

/// Category for definitions placed directly in the catalog root.
pub const DEFAULT_CATEGORY: &str = "general";
const DEFINITION_EXTENSION: &str = "json";

/// Process configuration, merged from `tourline.*` and `TOURLINE__*` variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub tours_dir: PathBuf,
    pub bundles: Vec<BundleConfig>,
    pub pipeline: PipelineConfig,
    pub logging: LogSettings,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            tours_dir: PathBuf::from("tours"),
            bundles: Vec::new(),
            pipeline: PipelineConfig::default(),
            logging: LogSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub context: LoadContext,
    /// Tour ids to load after initialization.
    pub tours: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub catalog_size: usize,
    pub preloaded: Vec<String>,
    pub loaded: Vec<String>,
    pub missing: Vec<String>,
    pub strategy: PreloadStrategy,
    pub report: PerformanceReport,
}

/// A definition file found in the catalog directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CatalogEntry {
    pub category: String,
    pub id: String,
    pub path: PathBuf,
}

/// Lists `*.json` definitions, one directory level deep, sorted by category then id.
///
/// # Errors
/// Fails when `dir` (or one of its category directories) cannot be read.
pub async fn discover_catalog(dir: &Path) -> Result<Vec<CatalogEntry>> {
    let mut found = Vec::new();
    let mut root = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read tours directory {}", dir.display()))?;

    while let Some(entry) = root.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            let Some(category) = path.file_name().and_then(|name| name.to_str()).map(str::to_owned)
            else {
                continue;
            };
            let mut members = tokio::fs::read_dir(&path)
                .await
                .with_context(|| format!("Failed to read category directory {}", path.display()))?;
            while let Some(member) = members.next_entry().await? {
                if let Some(entry) = catalog_entry(&category, member.path()) {
                    found.push(entry);
                }
            }
        } else if let Some(entry) = catalog_entry(DEFAULT_CATEGORY, path) {
            found.push(entry);
        }
    }

    found.sort();
    Ok(found)
}

fn catalog_entry(category: &str, path: PathBuf) -> Option<CatalogEntry> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(DEFINITION_EXTENSION) {
        return None;
    }
    let id = path.file_stem()?.to_str()?.to_owned();
    Some(CatalogEntry { category: category.to_owned(), id, path })
}

/// Registers one file-backed resolver per entry. Files are re-read on every fetch.
#[must_use]
pub fn build_registry(entries: &[CatalogEntry]) -> TourRegistry {
    entries
        .iter()
        .fold(TourRegistry::builder(), |builder, entry| {
            let path = entry.path.clone();
            builder.tour(entry.id.clone(), entry.category.clone(), move || {
                let path = path.clone();
                async move {
                    let raw = tokio::fs::read(&path).await?;
                    Ok::<Value, ResolveError>(serde_json::from_slice(&raw)?)
                }
            })
        })
        .build()
}

/// Assembles the application state around a freshly built pipeline.
///
/// # Errors
/// Fails on an inconsistent bundle registry.
pub fn assemble(config: &ShellConfig, registry: TourRegistry) -> Result<AppState> {
    let pipeline = TourPipeline::builder()
        .registry(registry)
        .bundles(config.bundles.iter().cloned())
        .config(config.pipeline.clone());

    let state = AppState::builder()
        .config(config.pipeline.clone())
        .register_slice(tourline_tours::init(pipeline)?)
        .build()?;

    Ok(state)
}

/// Discovers the catalog, warms the pipeline for `options.context` and loads the requested
/// tours.
///
/// # Errors
/// Fails when the catalog cannot be read or the pipeline cannot be assembled. Individual
/// tour failures are reported in [`RunSummary::missing`].
pub async fn run(config: &ShellConfig, options: &RunOptions) -> Result<RunSummary> {
    let entries = discover_catalog(&config.tours_dir).await?;
    info!(dir = %config.tours_dir.display(), tours = entries.len(), "Catalog discovered");

    let state = assemble(config, build_registry(&entries))?;
    let tours = state.try_get_slice::<Tours>()?;
    let _maintenance = tours.orchestrator.spawn_maintenance(config.pipeline.loader.sweep_interval());

    let init = tours.orchestrator.initialize_for_context(&options.context).await;
    info!(
        strategy = %init.strategy,
        preloaded = init.preloaded.len(),
        bundles = ?init.recommended_bundles,
        saved_ms = init.estimated_time_saved.as_millis(),
        "Pipeline initialized"
    );

    let loaded = tours.orchestrator.load_tours(&options.tours, Some(&options.context)).await;
    let missing: Vec<String> =
        options.tours.iter().filter(|id| !loaded.contains_key(id.as_str())).cloned().collect();
    if !missing.is_empty() {
        warn!(?missing, "Some tours could not be loaded");
    }

    let optimization = tours.orchestrator.optimize_performance();
    info!(
        from = %optimization.strategy_before,
        to = %optimization.strategy_after,
        swept = optimization.expired_swept,
        split = optimization.bundles.split.len(),
        promoted = optimization.bundles.promoted.len(),
        "Optimization pass complete"
    );

    let mut loaded_ids: Vec<String> = loaded.into_keys().collect();
    loaded_ids.sort();

    Ok(RunSummary {
        catalog_size: entries.len(),
        preloaded: init.preloaded.iter().map(|tour| tour.id.clone()).collect(),
        loaded: loaded_ids,
        missing,
        strategy: tours.orchestrator.strategy(),
        report: tours.orchestrator.performance_metrics(),
    })
}
