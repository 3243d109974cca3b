//! Subcommand implementations

pub mod config;
pub mod demo;
pub mod request;

use anyhow::Context;
use safs_embedded::EmbeddedConfig;
use std::path::Path;

/// Load `path`, or the defaults when no file was given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EmbeddedConfig> {
    match path {
        Some(path) => EmbeddedConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(EmbeddedConfig::default()),
    }
}
