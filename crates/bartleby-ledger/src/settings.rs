use std::io::Write;
use std::path::Path;

use bartleby_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Runtime settings stored in `.bartleby/settings.json`.
///
/// These tune the local process only; project configuration lives in the
/// event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite busy timeout for the store connection.
    pub busy_timeout_ms: u32,
    /// Maximum results returned by card search.
    pub search_limit: usize,
    /// Card type used when the caller does not name one.
    pub default_card_type: String,
    /// `tracing` filter directive used when `BARTLEBY_LOG` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            search_limit: 50,
            default_card_type: "note".to_string(),
            log_filter: None,
        }
    }
}

impl Settings {
    /// Read settings; a missing file yields the defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            CoreError::InvalidArgument(format!("malformed settings {}: {e}", path.display()))
        })
    }

    /// Write settings atomically.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Set one field from its string form (`settings set <key> <value>`).
    pub fn set(&mut self, key: &str, value: &str) -> CoreResult<()> {
        let bad = |e: &dyn std::fmt::Display| {
            CoreError::InvalidArgument(format!("invalid value for {key}: {e}"))
        };
        match key {
            "busy_timeout_ms" => self.busy_timeout_ms = value.parse().map_err(|e| bad(&e))?,
            "search_limit" => self.search_limit = value.parse().map_err(|e| bad(&e))?,
            "default_card_type" => {
                if value.trim().is_empty() {
                    return Err(bad(&"must not be empty"));
                }
                self.default_card_type = value.trim().to_string();
            }
            "log_filter" => {
                self.log_filter = match value {
                    "" | "none" => None,
                    v => Some(v.to_string()),
                }
            }
            other => {
                return Err(CoreError::InvalidArgument(format!(
                    "unknown setting '{other}'"
                )))
            }
        }
        Ok(())
    }

    /// `(key, rendered value)` pairs for display.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("busy_timeout_ms", self.busy_timeout_ms.to_string()),
            ("search_limit", self.search_limit.to_string()),
            ("default_card_type", self.default_card_type.clone()),
            (
                "log_filter",
                self.log_filter.clone().unwrap_or_else(|| "(unset)".to_string()),
            ),
        ]
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> CoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| CoreError::Storage(format!("no parent dir for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| CoreError::Storage(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let s = Settings::load(&tmp.path().join("settings.json")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.search_limit, 50);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"search_limit": 10}"#).unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.search_limit, 10);
        assert_eq!(s.busy_timeout_ms, 5000);
        assert_eq!(s.default_card_type, "note");
    }

    #[test]
    fn save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("settings.json");
        let mut s = Settings::default();
        s.set("default_card_type", "scene").unwrap();
        s.set("log_filter", "bartleby=debug").unwrap();
        s.save(&path).unwrap();
        let back = Settings::load(&path).unwrap();
        assert_eq!(back.default_card_type, "scene");
        assert_eq!(back.log_filter.as_deref(), Some("bartleby=debug"));
    }

    #[test]
    fn set_rejects_unknown_and_malformed() {
        let mut s = Settings::default();
        assert!(s.set("colour", "red").is_err());
        assert!(s.set("search_limit", "many").is_err());
        assert!(s.set("default_card_type", "  ").is_err());
    }

    #[test]
    fn malformed_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path).unwrap_err().code(), "INVALID_ARGUMENT");
    }
}
