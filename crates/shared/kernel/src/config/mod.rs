use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default config file stem, resolved against the working directory.
pub const DEFAULT_CONFIG: &str = "tourline";
/// Environment prefix for overrides (`TOURLINE__LOADER__MAX_CACHE_SIZE=10`).
pub const ENV_PREFIX: &str = "TOURLINE";

/// Custom error type for config loading.
#[tourline_derive::tourline_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// A reusable configuration loader that combines file-based settings with environment overrides.
///
/// Layering, lowest precedence first:
/// 1. **Base File**: `path` if given (must exist), otherwise an optional `tourline.*` file in
///    the working directory. Any format the `config` crate recognizes by extension works.
/// 2. **Environment Overrides**: variables prefixed with `TOURLINE__`; nested keys use double
///    underscores (`TOURLINE__ORCHESTRATOR__RECENT_WINDOW` maps to `orchestrator.recent_window`).
///
/// Fields missing from every source fall back to the target type's serde defaults.
///
/// # Errors
/// Returns [`ConfigError::Config`] if an explicitly requested file is missing, a source is
/// malformed, or the merged values do not fit `T`.
///
/// # Example
/// ```rust
/// use tourline_kernel::config::load_config;
///
/// #[derive(Default, serde::Deserialize)]
/// struct AppConfig {
///     tours_dir: String,
/// }
///
/// let cfg: AppConfig = load_config(Some("config/local")).unwrap_or_default();
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let (effective_path, required) = path.map_or_else(
        || (PathBuf::from(DEFAULT_CONFIG), false),
        |p| (p.as_ref().to_path_buf(), true),
    );

    let builder = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .convert_case(config::Case::Snake),
        );

    info!(path = %effective_path.display(), required, "Loading config");

    let config = builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}
