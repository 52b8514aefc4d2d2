//! Remote Config Module - Medienquellen pro Site
//!
//! Dieses Modul verwaltet:
//! - Den Lookup der Remote-Konfiguration über den Site-Identifier
//! - Die Auflösung auf Built-in Defaults (Placeholder-Video, keine
//!   separate Tonspur, Default-Limit)
//! - Einen SQLite-Store als Implementierung des Lookups
//!

mod store;

pub use store::SiteMediaStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum RemoteConfigError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Remote config unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// CONFIG TYPES
// ============================================================================

/// Ein Datensatz der Remote-Konfiguration (alle Felder optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMediaConfig {
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<i64>,
}

/// Aufgelöste Medienquellen für den Remote-Playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRemoteMedia {
    pub video_source: Url,
    pub audio_source: Option<Url>,
}

impl RemoteMediaConfig {
    /// Löst die Medienquellen auf; ungültige URLs gelten als nicht gesetzt
    pub fn resolve(&self, placeholder_video: &Url) -> ResolvedRemoteMedia {
        ResolvedRemoteMedia {
            video_source: parse_source(self.video_url.as_deref())
                .unwrap_or_else(|| placeholder_video.clone()),
            audio_source: parse_source(self.audio_url.as_deref()),
        }
    }

    /// Dauer in Sekunden, nur wenn positiv und im `u32` Bereich
    pub fn duration_limit(&self) -> Option<u32> {
        self.duration_seconds
            .filter(|s| *s > 0)
            .and_then(|s| u32::try_from(s).ok())
    }
}

fn parse_source(raw: Option<&str>) -> Option<Url> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!("Ignoring invalid media source '{}': {}", raw, e);
            None
        }
    }
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// Lookup der Remote-Konfiguration (read-only für den Core)
///
/// Kein Datensatz ist kein Fehler, sondern `Ok(None)`.
#[async_trait]
pub trait RemoteConfigSource: Send + Sync {
    async fn fetch(&self, site_id: &str) -> Result<Option<RemoteMediaConfig>, RemoteConfigError>;
}

// ============================================================================
// TESTS
// ============================================================================
