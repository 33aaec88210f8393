use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub fn database_file_path() -> Result<PathBuf> {
    if let Some(custom) = non_empty(env::var_os("JELLYMPV_DB")) {
        return Ok(PathBuf::from(custom));
    }
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("jellympv").join("jellympv.db"))
}

pub fn config_file_path() -> Result<PathBuf> {
    if let Some(custom) = non_empty(env::var_os("JELLYMPV_CONFIG")) {
        return Ok(PathBuf::from(custom));
    }
    let base = dirs::config_dir().context("unable to resolve config directory")?;
    Ok(base.join("jellympv").join("config.toml"))
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
    value.filter(|value| !value.is_empty())
}
