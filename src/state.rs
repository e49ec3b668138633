use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::db::{AuditDb, DbError};
use crate::types::Config;

/// Shared process state: loaded config and the store handle.
///
/// The store is optional so the host keeps running (with linking disabled)
/// when the database cannot be opened.
pub struct AppState {
    pub config: Config,
    pub db: Mutex<Option<AuditDb>>,
}

impl AppState {
    pub fn new() -> Self {
        let config = match load_config() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{e}. Using default configuration.");
                Config::default()
            }
        };
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let db = match open_db(&config) {
            Ok(db) => Some(db),
            Err(e) => {
                log::warn!("Failed to open transaction database: {e}. Linking disabled.");
                None
            }
        };
        Self {
            config,
            db: Mutex::new(db),
        }
    }

    /// Run `f` against the open store. Errors if the store failed to open.
    pub fn with_db<T>(&self, f: impl FnOnce(&AuditDb) -> T) -> Result<T, String> {
        let guard = self.db.lock();
        let db = guard.as_ref().ok_or("Database not initialized")?;
        Ok(f(db))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Path to ~/.txaudit/config.json
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".txaudit").join("config.json"))
}

/// Load configuration from ~/.txaudit/config.json
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

/// Load configuration from `path`. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Open the store named by the config, or the default location.
pub fn open_db(config: &Config) -> Result<AuditDb, DbError> {
    match config.db_path.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => AuditDb::open_at(PathBuf::from(path)),
        None => AuditDb::open(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_from(&dir.path().join("config.json")).expect("load");
        assert!(config.auto_link.address_filter);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").expect("write");
        let err = load_config_from(&path).expect_err("malformed");
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn test_with_config_opens_configured_db() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("audit.db");
        let config = Config {
            db_path: Some(db_path.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let state = AppState::with_config(config);
        let user_email = state
            .with_db(|db| db.get_user_email("nobody"))
            .expect("db open")
            .expect("query");
        assert_eq!(user_email, None);
        assert!(db_path.exists());
    }
}
