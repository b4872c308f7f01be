use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The handful of values that survive a restart: credential, server URL,
/// last active view. Saving is best-effort; a broken settings file must
/// never keep the dashboard from starting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_view: Option<String>,
}

/// File-backed store for [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults on a missing or unreadable
    /// file.
    pub fn load(&self) -> Settings {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "ignoring malformed settings file");
                    Settings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not read settings file");
                Settings::default()
            }
        }
    }

    /// Persist settings; failures are logged and swallowed.
    pub fn save(&self, settings: &Settings) {
        let serialized = match serde_json::to_string_pretty(settings) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(error = %e, "could not serialize settings");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(path = %parent.display(), error = %e, "could not create settings directory");
                    return;
                }
            }
        }
        if let Err(e) = fs::write(&self.path, serialized) {
            tracing::warn!(path = %self.path.display(), error = %e, "could not write settings file");
        }
    }

    /// Drop the persisted credential (logout).
    pub fn forget_credential(&self) {
        let mut settings = self.load();
        if settings.api_key.take().is_some() {
            self.save(&settings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> SettingsStore {
        let mut path = std::env::temp_dir();
        path.push(format!("skylight-settings-{name}-{}", std::process::id()));
        let _ = fs::remove_file(&path);
        SettingsStore::new(path)
    }

    #[test]
    fn missing_file_loads_defaults() {
        let store = temp_store("missing");
        let settings = store.load();
        assert!(settings.api_key.is_none());
        assert!(settings.active_view.is_none());
    }

    #[test]
    fn round_trips_and_forgets_credential() {
        let store = temp_store("roundtrip");
        store.save(&Settings {
            api_key: Some("k".to_string()),
            server_url: Some("http://127.0.0.1:8000".to_string()),
            active_view: Some("logs".to_string()),
        });
        let loaded = store.load();
        assert_eq!(loaded.api_key.as_deref(), Some("k"));
        assert_eq!(loaded.active_view.as_deref(), Some("logs"));

        store.forget_credential();
        let after = store.load();
        assert!(after.api_key.is_none());
        assert_eq!(after.server_url.as_deref(), Some("http://127.0.0.1:8000"));

        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn malformed_file_is_ignored() {
        let store = temp_store("malformed");
        fs::write(store.path(), "{not json").unwrap();
        let settings = store.load();
        assert!(settings.api_key.is_none());
        let _ = fs::remove_file(store.path());
    }
}
