//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CATALIST_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "catalist.db";

/// Default model used for extraction and refinement
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";

/// Registry entries older than this are dropped on load
pub const DEFAULT_RETENTION_DAYS: i64 = 15;

/// Maximum number of whole-batch snapshots kept for undo/redo
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// CSV uploads are truncated to this many non-blank rows
pub const DEFAULT_MAX_CSV_ROWS: usize = 5;

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset ("trace".."error")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Contents of `catalist.toml`
///
/// Every field is optional in the file; missing values take the compiled
/// defaults so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// API key for the hosted extraction model
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    #[serde(default = "default_max_csv_rows")]
    pub max_csv_rows: usize,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            logging: LoggingConfig::default(),
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            bind_address: default_bind_address(),
            retention_days: default_retention_days(),
            history_depth: default_history_depth(),
            max_csv_rows: default_max_csv_rows(),
        }
    }
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_history_depth() -> usize {
    DEFAULT_HISTORY_DEPTH
}

fn default_max_csv_rows() -> usize {
    DEFAULT_MAX_CSV_ROWS
}

impl TomlConfig {
    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retention_days <= 0 {
            return Err(Error::Config(format!(
                "retention_days must be positive, got {}",
                self.retention_days
            )));
        }
        if self.history_depth == 0 || self.history_depth > DEFAULT_HISTORY_DEPTH {
            return Err(Error::Config(format!(
                "history_depth must be between 1 and {}, got {}",
                DEFAULT_HISTORY_DEPTH, self.history_depth
            )));
        }
        if self.max_csv_rows == 0 {
            return Err(Error::Config("max_csv_rows must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Parse and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Load the config file if one exists, otherwise return defaults
pub fn load_or_default() -> Result<TomlConfig> {
    match config_file_path() {
        Some(path) if path.exists() => {
            tracing::info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        _ => {
            tracing::debug!("No config file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Platform config file location (`<config_dir>/catalist/catalist.toml`)
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("catalist").join("catalist.toml"))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database file inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Create the root folder if it does not exist yet
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        tracing::info!("Created root folder: {}", root_folder.display());
    }
    Ok(())
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("catalist"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/catalist"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("catalist"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/catalist"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("catalist"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\catalist"))
    } else {
        PathBuf::from("./catalist_data")
    }
}
