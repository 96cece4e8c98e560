use std::fs;
use std::path::Path;

use crate::config::validator::validate;
use crate::config::Config;
use crate::error::{GatewayError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let path = p.as_ref();
    let txt = fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    parse_config(&txt)
}

pub fn parse_config(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))?;

    validate(&cfg).map_err(GatewayError::Config)?;

    Ok(cfg)
}

/// Render the effective configuration the way it would be written to disk
pub fn dump_config(cfg: &Config) -> Result<String> {
    toml::to_string_pretty(cfg)
        .map_err(|e| GatewayError::Config(format!("Failed to serialize config: {e}")))
}
