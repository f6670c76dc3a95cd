//! Configuration for the modelsmith client.
//!
//! Read from `~/.modelsmith/config.toml`. Every section is optional:
//!
//! ```toml
//! [engine]
//! host = "${MODELSMITH_HOST}"
//! port = 1314
//!
//! [connection]
//! max_retries = 5
//! initial_delay_ms = 250
//! max_delay_ms = 8000
//! jitter_factor = 0.25
//! send_queue_capacity = 8
//!
//! [generation]
//! timeout_secs = 600
//! random_seed = 42
//! ```
//!
//! Environment variables win over the file: `MODELSMITH_ENGINE_HOST`,
//! `MODELSMITH_ENGINE_PORT` and `MODELSMITH_GENERATION_TIMEOUT_SEC`.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;

use modelsmith_session::{ConnectionConfig, DEFAULT_PORT, GenerationConfig, SessionConfig};

pub const DEFAULT_HOST: &str = "localhost";

const HOST_ENV: &str = "MODELSMITH_ENGINE_HOST";
const PORT_ENV: &str = "MODELSMITH_ENGINE_PORT";
const TIMEOUT_ENV: &str = "MODELSMITH_GENERATION_TIMEOUT_SEC";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelsmithConfig {
    pub engine: Option<EngineConfig>,
    pub connection: Option<ConnectionConfig>,
    pub generation: Option<GenerationConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    /// Supports `${VAR}` expansion.
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Fully resolved settings: file values, then env overrides, then defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
}

/// Replace `${VAR}` with the variable's value; unset variables expand to "".
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    expand_vars_with(value, |name| env::var(name).ok())
}

fn expand_vars_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &after[..close];
        if !name.is_empty() {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

impl ModelsmithConfig {
    /// Load the user config. `Ok(None)` when there is no config file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {err}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {}: {err}", path.display());
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn resolve(&self) -> Settings {
        self.resolve_with(|name| env::var(name).ok())
    }

    fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Settings {
        let engine = self.engine.as_ref();

        let host = lookup(HOST_ENV)
            .filter(|h| !h.trim().is_empty())
            .or_else(|| {
                engine
                    .and_then(|e| e.host.as_deref())
                    .map(|h| expand_vars_with(h, &lookup))
                    .filter(|h| !h.trim().is_empty())
            })
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = env_number(&lookup, PORT_ENV)
            .or_else(|| engine.and_then(|e| e.port))
            .unwrap_or(DEFAULT_PORT);

        let mut generation = self.generation.clone().unwrap_or_default();
        if let Some(secs) = env_number(&lookup, TIMEOUT_ENV) {
            generation.timeout_secs = secs;
        }

        Settings {
            host,
            port,
            session: SessionConfig {
                connection: self.connection.clone().unwrap_or_default(),
                generation,
            },
        }
    }
}

fn env_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {name}={raw:?}: not a valid number");
            None
        }
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".modelsmith").join("config.toml"))
}
