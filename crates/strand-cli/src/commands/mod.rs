//! Subcommand implementations

pub mod analyze;
pub mod compile;
pub mod eval;

use anyhow::Context;
use std::path::Path;
use strand_backend::{BackendConfig, Unit};

pub fn load_unit(path: &Path) -> anyhow::Result<Unit> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read unit {}", path.display()))?;
    Unit::from_json(&text).with_context(|| format!("Failed to parse unit {}", path.display()))
}

/// The file's configuration, or the defaults when no file is given
pub fn load_config(path: Option<&Path>) -> anyhow::Result<BackendConfig> {
    match path {
        Some(path) => BackendConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(BackendConfig::default()),
    }
}
