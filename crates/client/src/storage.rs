//! Persistent credential storage.
//!
//! Tokens are JSON files in the platform-appropriate config directory:
//! - Linux: `~/.config/jobfair/`
//! - macOS: `~/Library/Application Support/jobfair/`
//! - Windows: `%APPDATA%\jobfair\`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

pub const ACCESS_TOKEN_KEY: &str = "jobfair_access_token";
pub const REFRESH_TOKEN_KEY: &str = "jobfair_refresh_token";

const APP_DIR: &str = "jobfair";

/// Key/value store backed by one file per key.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    /// Store under the user's config directory.
    pub fn open_default() -> Option<Self> {
        Some(Self::at(dirs::config_dir()?.join(APP_DIR)))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn access_token(&self) -> Option<String> {
        self.load(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.load(REFRESH_TOKEN_KEY)
    }

    /// Persist both tokens. Returns `true` if both were written.
    pub fn set_tokens(&self, access: &str, refresh: &str) -> bool {
        self.save(ACCESS_TOKEN_KEY, &access) && self.save(REFRESH_TOKEN_KEY, &refresh)
    }

    pub fn clear_tokens(&self) {
        self.remove(ACCESS_TOKEN_KEY);
        self.remove(REFRESH_TOKEN_KEY);
    }

    /// Save a value. Returns `true` if the operation succeeded.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.save_raw(key, &json),
            Err(_) => false,
        }
    }

    /// Load a value; `None` if the key doesn't exist or deserialization fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.load_raw(key)?;
        serde_json::from_str(&json).ok()
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }

    fn save_raw(&self, key: &str, value: &str) -> bool {
        if !self.dir.exists() && std::fs::create_dir_all(&self.dir).is_err() {
            crate::log_warn!("Cannot create storage directory {}", self.dir.display());
            return false;
        }
        std::fs::write(self.file_path(key), value).is_ok()
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }
}
