//! YAML configuration loading for the pipeline.
//!
//! Loads [`PipelineConfig`] from a YAML file on disk, falling back to defaults
//! for every field the file leaves out.

use pyramid_core::PipelineConfig;
use std::path::Path;

/// Load and validate a [`PipelineConfig`] from a YAML file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the YAML is invalid, or the
/// resulting configuration fails validation.
pub fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
    let config: PipelineConfig = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {}", e))?;
    config.validate()?;
    Ok(config)
}
