//! Runtime configuration, loaded from an optional `myfs.toml` the way the
//! kernel crate's `build/config.rs` turns a TOML file into settings — just
//! at process start instead of at compile time, since this service has no
//! cross-compilation boot step to hang a `build.rs` off of.

use serde::Deserialize;
use std::{fs, path::Path};

fn default_listen_addr() -> String {
    "127.0.0.1:7890".to_string()
}

fn default_disk_addr() -> String {
    "127.0.0.1:7891".to_string()
}

fn default_ninodes() -> u32 {
    1024
}

fn default_max_sessions() -> usize {
    1024
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub disk_addr: String,
    pub ninodes: u32,
    pub max_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: default_listen_addr(),
            disk_addr: default_disk_addr(),
            ninodes: default_ninodes(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Config {
    /// Loads `path` if given, falling back to built-in defaults if it does
    /// not exist. A present-but-invalid file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p,
            None => Path::new("myfs.toml"),
        };
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
