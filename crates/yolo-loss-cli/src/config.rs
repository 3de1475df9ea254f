//! JSON persistence for [`YoloLossConfig`].

use std::{fs, path::Path};

use anyhow::{Context, Result};
use yolo_loss::YoloLossConfig;

/// Loads a loss configuration from a JSON file and validates it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if a
/// hyperparameter is out of range.
pub fn load_config(path: impl AsRef<Path>) -> Result<YoloLossConfig> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("failed to read loss configuration {}", path.display()))?;
    let config = parse_config(&config_str)
        .with_context(|| format!("invalid loss configuration {}", path.display()))?;
    Ok(config)
}

/// Parses and validates a loss configuration from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or a hyperparameter is out of range.
pub fn parse_config(json: &str) -> Result<YoloLossConfig> {
    let config: YoloLossConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Renders a configuration as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_config(config: &YoloLossConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

/// Writes a configuration to a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_config(config: &YoloLossConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, render_config(config)?)
        .with_context(|| format!("failed to write loss configuration {}", path.display()))
}
