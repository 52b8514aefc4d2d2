//! App-Konfiguration aus Umgebungsvariablen

use crate::chat::PacingDelay;
use crate::remote_config::SiteMediaStore;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default Entry Link des headless Runners
pub const DEFAULT_ORIGIN: &str = "http://localhost:1420";

/// Pfad des Placeholder-Videos relativ zum Origin
const PLACEHOLDER_VIDEO_PATH: &str = "/media/placeholder.mp4";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid number in {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Typing delay minimum ({min_ms} ms) exceeds maximum ({max_ms} ms)")]
    InvalidPacing { min_ms: u64, max_ms: u64 },

    #[error("Could not determine app data directory")]
    NoDataDir,
}

// ============================================================================
// APP CONFIG
// ============================================================================

/// Einstellungen für eine Page-Instanz
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub origin: Url,
    pub placeholder_video: Url,
    pub db_path: PathBuf,
    pub pacing: PacingDelay,
}

impl AppConfig {
    /// Liest die Konfiguration aus der Prozess-Umgebung
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Liest die Konfiguration über eine beliebige Lookup-Funktion
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let origin_raw = lookup("LIVECALL_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let origin = Url::parse(&origin_raw).map_err(|source| ConfigError::InvalidUrl {
            var: "LIVECALL_ORIGIN",
            source,
        })?;

        let placeholder_video = match lookup("LIVECALL_PLACEHOLDER_VIDEO") {
            Some(raw) => Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
                var: "LIVECALL_PLACEHOLDER_VIDEO",
                source,
            })?,
            None => origin
                .join(PLACEHOLDER_VIDEO_PATH)
                .map_err(|source| ConfigError::InvalidUrl {
                    var: "LIVECALL_ORIGIN",
                    source,
                })?,
        };

        let db_path = match lookup("LIVECALL_DB_PATH") {
            Some(raw) => PathBuf::from(raw),
            None => SiteMediaStore::default_path().ok_or(ConfigError::NoDataDir)?,
        };

        let default_pacing = PacingDelay::DEFAULT;
        let min_ms = read_millis(&lookup, "LIVECALL_TYPING_MIN_MS", default_pacing.min())?;
        let max_ms = read_millis(&lookup, "LIVECALL_TYPING_MAX_MS", default_pacing.max())?;
        let pacing = PacingDelay::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
            .ok_or(ConfigError::InvalidPacing { min_ms, max_ms })?;

        Ok(Self {
            origin,
            placeholder_video,
            db_path,
            pacing,
        })
    }
}

fn read_millis<F>(lookup: &F, var: &'static str, default: Duration) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(default.as_millis() as u64),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("LIVECALL_DB_PATH", "/tmp/livecall.db")]).unwrap();
        assert_eq!(config.origin.as_str(), "http://localhost:1420/");
        assert_eq!(
            config.placeholder_video.as_str(),
            "http://localhost:1420/media/placeholder.mp4"
        );
        assert_eq!(config.pacing, PacingDelay::DEFAULT);
        assert_eq!(config.db_path, PathBuf::from("/tmp/livecall.db"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LIVECALL_ORIGIN", "https://call.example"),
            ("LIVECALL_DB_PATH", "/tmp/x.db"),
            ("LIVECALL_TYPING_MIN_MS", "100"),
            ("LIVECALL_TYPING_MAX_MS", "200"),
        ])
        .unwrap();
        assert_eq!(
            config.placeholder_video.as_str(),
            "https://call.example/media/placeholder.mp4"
        );
        assert_eq!(config.pacing.min(), Duration::from_millis(100));
        assert_eq!(config.pacing.max(), Duration::from_millis(200));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("LIVECALL_ORIGIN", "not a url"), ("LIVECALL_DB_PATH", "/tmp/x.db")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config_from(&[
                ("LIVECALL_DB_PATH", "/tmp/x.db"),
                ("LIVECALL_TYPING_MIN_MS", "900"),
            ]),
            Err(ConfigError::InvalidPacing { .. })
        ));
        assert!(matches!(
            config_from(&[
                ("LIVECALL_DB_PATH", "/tmp/x.db"),
                ("LIVECALL_TYPING_MAX_MS", "soon"),
            ]),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }
}
