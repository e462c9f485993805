use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "check-progress.toml";

/// Top-level configuration loaded from check-progress.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ProgressConfig {
    pub tool: ToolConfig,
    pub spawn: SpawnConfig,
    pub check: CheckConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub command: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub delay_secs: u32,
    pub session: String,
}

// --- Default implementations ---

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: "openclaw".to_string(),
        }
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            model: "openrouter/xiaomi/mimo-v2-flash".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            delay_secs: 60,
            session: "main".to_string(),
        }
    }
}

impl ProgressConfig {
    /// Load config from `path`.
    ///
    /// A missing file is only tolerated when `required` is false (the caller
    /// did not name the file explicitly); defaults are used in that case.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !path.exists() && !required {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}
