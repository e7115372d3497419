//! The optional `retrace.config.json5` file in a workspace directory.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::engine::CreateUndoPolicy;
use crate::history::DEFAULT_HISTORY_LIMIT;

pub const CONFIG_FILE_NAME: &str = "retrace.config.json5";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Error parsing config file {}: {source}", .path.display())]
    Json5 {
        #[source]
        source: json5::Error,
        path: PathBuf,
    },

    #[error("Invalid config file {}: {message}", .path.display())]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ElevationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Program and leading arguments placed in front of privileged commands.
    #[serde(default = "default_helper")]
    pub helper: Vec<String>,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            helper: default_helper(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// How many entries each history stack keeps.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// When set, every operation must stay inside this directory. Relative
    /// roots are resolved against the workspace directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Whether to watch the workspace for outside changes.
    #[serde(default = "default_true")]
    pub watch: bool,

    #[serde(default)]
    pub create_undo: CreateUndoPolicy,

    #[serde(default)]
    pub elevation: ElevationConfig,

    /// `none`, `off`, `error`, `warn`, `info`, `debug` or `trace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            root: None,
            watch: true,
            create_undo: CreateUndoPolicy::default(),
            elevation: ElevationConfig::default(),
            file_log_level: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_helper() -> Vec<String> {
    if cfg!(unix) {
        vec!["sudo".to_owned(), "-n".to_owned()]
    } else {
        Vec::new()
    }
}

impl Config {
    /// Loads the config file in `dir`. A missing file means defaults.
    pub fn load_from_dir(dir: &Path) -> Result<Config, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);

        let contents = match fs_err::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("No config file at {}, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut config = Config::load_from_str(&contents, &path)?;
        if let Some(root) = config.root.take() {
            config.root = Some(if root.is_absolute() {
                root
            } else {
                dir.join(root)
            });
        }

        Ok(config)
    }

    pub fn load_from_str(contents: &str, path: &Path) -> Result<Config, ConfigError> {
        let config: Config = json5::from_str(contents).map_err(|source| ConfigError::Json5 {
            source,
            path: path.to_path_buf(),
        })?;
        config.check(path)?;
        Ok(config)
    }

    fn check(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: message.to_owned(),
        };

        if self.history_limit == 0 {
            return Err(invalid("historyLimit must be at least 1"));
        }
        if let Some(level) = &self.file_log_level {
            if parse_file_log_level(level).is_none() {
                return Err(invalid(&format!("unknown fileLogLevel '{level}'")));
            }
        }

        Ok(())
    }

    /// The level for the log file, or `None` when file logging is turned
    /// off. Defaults to `trace`.
    pub fn file_log_level(&self) -> Option<LevelFilter> {
        match &self.file_log_level {
            Some(level) => parse_file_log_level(level).flatten(),
            None => Some(LevelFilter::TRACE),
        }
    }
}

/// `Some(None)` means logging is disabled; `None` means the level is not
/// recognized.
fn parse_file_log_level(level: &str) -> Option<Option<LevelFilter>> {
    Some(match level.to_lowercase().as_str() {
        "none" | "off" => None,
        "error" => Some(LevelFilter::ERROR),
        "warn" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "debug" => Some(LevelFilter::DEBUG),
        "trace" => Some(LevelFilter::TRACE),
        _ => return None,
    })
}
