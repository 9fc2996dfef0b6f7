use crate::domain::analysis::DEFAULT_CONFIDENCE_LEVEL;
use crate::domain::history::DEFAULT_MAX_HISTORY_ENTRIES;
use crate::domain::measurement::PassCriterion;
use serde::Deserialize;
use std::path::Path;

const CONFIG_FILE: &str = "config/force_results";
const ENV_PREFIX: &str = "FORCE_RESULTS";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub visualizer: VisualizerSettings,
    pub pass_criterion: PassCriterionSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    /// Path template; `${testId}` is replaced with the URL-encoded test id.
    pub dataset_path: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisualizerSettings {
    pub max_history_entries: usize,
    pub comparison_mode: bool,
    pub incremental_updates: bool,
    pub confidence_level: f64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PassCriterionSettings {
    pub min_force: f64,
    pub max_force: f64,
    pub tolerance: f64,
}

impl From<PassCriterionSettings> for PassCriterion {
    fn from(s: PassCriterionSettings) -> Self {
        PassCriterion::new(s.min_force, s.max_force, s.tolerance)
    }
}

fn builder_with_defaults() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("server.bind_addr", "0.0.0.0:8080")?
        .set_default("backend.base_url", "http://localhost:8000")?
        .set_default("backend.dataset_path", "/api/tests/${testId}/force-data")?
        .set_default("backend.timeout_secs", 30_i64)?
        .set_default("visualizer.max_history_entries", DEFAULT_MAX_HISTORY_ENTRIES as i64)?
        .set_default("visualizer.comparison_mode", true)?
        .set_default("visualizer.incremental_updates", true)?
        .set_default("visualizer.confidence_level", DEFAULT_CONFIDENCE_LEVEL)?
        .set_default("pass_criterion.min_force", 0.0)?
        .set_default("pass_criterion.max_force", 1000.0)?
        .set_default("pass_criterion.tolerance", 0.1)?)
}

/// Defaults, then `config/force_results.*` if present, then
/// `FORCE_RESULTS__SECTION__KEY` environment variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = builder_with_defaults()?
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Defaults overlaid with a single explicit file.
pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let settings = builder_with_defaults()?
        .add_source(config::File::from(path))
        .build()?;

    Ok(settings.try_deserialize()?)
}
