//! `safs config`: print the effective configuration.

use safs_embedded::EmbeddedConfig;

pub fn execute(config: &EmbeddedConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
