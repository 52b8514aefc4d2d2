//! Site Media Store
//!
//! SQLite-Datenbank mit den Medienquellen pro Site.
//! Der Core liest nur; Schreiben ist der administrative Pfad.

use super::{RemoteConfigError, RemoteConfigSource, RemoteMediaConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

// ============================================================================
// DATABASE
// ============================================================================

/// SQLite-Store für Site-Konfigurationen (Thread-safe durch Mutex)
pub struct SiteMediaStore {
    conn: Mutex<Connection>,
}

impl SiteMediaStore {
    /// Öffnet oder erstellt die Datenbank unter `path`
    pub fn open(path: &Path) -> Result<Self, RemoteConfigError> {
        // Parent-Verzeichnis erstellen
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening site media database at {:?}", path);

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// In-Memory Datenbank für Tests
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, RemoteConfigError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Standard-Pfad der Datenbank-Datei im App-Datenverzeichnis
    pub fn default_path() -> Option<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("com", "livecall", "livecall")?;
        let mut path = proj_dirs.data_dir().to_path_buf();
        path.push("site_media.db");
        Some(path)
    }

    /// Initialisiert das Datenbank-Schema
    fn init_schema(&self) -> Result<(), RemoteConfigError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS site_media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id TEXT NOT NULL UNIQUE,
                video_url TEXT,
                audio_url TEXT,
                duration_seconds INTEGER,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            [],
        )?;
        Ok(())
    }

    /// Liest die Konfiguration einer Site (höchstens ein Datensatz)
    pub fn get_site_media(&self, site_id: &str) -> Result<Option<RemoteMediaConfig>, RemoteConfigError> {
        let conn = self.conn.lock();
        let config = conn
            .query_row(
                r#"
                SELECT video_url, audio_url, duration_seconds
                FROM site_media
                WHERE site_id = ?1
                "#,
                params![site_id],
                |row| {
                    Ok(RemoteMediaConfig {
                        video_url: row.get(0)?,
                        audio_url: row.get(1)?,
                        duration_seconds: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(config)
    }

    /// Legt die Konfiguration einer Site an oder ersetzt sie (Admin)
    pub fn upsert_site_media(
        &self,
        site_id: &str,
        config: &RemoteMediaConfig,
    ) -> Result<(), RemoteConfigError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO site_media (site_id, video_url, audio_url, duration_seconds)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(site_id) DO UPDATE SET
                video_url = excluded.video_url,
                audio_url = excluded.audio_url,
                duration_seconds = excluded.duration_seconds,
                updated_at = datetime('now')
            "#,
            params![
                site_id,
                config.video_url,
                config.audio_url,
                config.duration_seconds
            ],
        )?;
        Ok(())
    }

    /// Löscht die Konfiguration einer Site (Admin)
    pub fn delete_site_media(&self, site_id: &str) -> Result<(), RemoteConfigError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            DELETE FROM site_media
            WHERE site_id = ?1
            "#,
            params![site_id],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RemoteConfigSource for SiteMediaStore {
    async fn fetch(&self, site_id: &str) -> Result<Option<RemoteMediaConfig>, RemoteConfigError> {
        self.get_site_media(site_id)
    }
}

impl std::fmt::Debug for SiteMediaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteMediaStore").finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_site_is_none() {
        let store = SiteMediaStore::open_in_memory().unwrap();
        assert_eq!(store.get_site_media("call.example").unwrap(), None);
    }

    #[test]
    fn test_upsert_and_get() {
        let store = SiteMediaStore::open_in_memory().unwrap();

        let config = RemoteMediaConfig {
            video_url: Some("https://cdn.example/v.mp4".to_string()),
            audio_url: None,
            duration_seconds: Some(900),
        };
        store.upsert_site_media("call.example", &config).unwrap();
        assert_eq!(store.get_site_media("call.example").unwrap(), Some(config));

        // Zweiter Upsert ersetzt alle Felder
        let updated = RemoteMediaConfig {
            video_url: None,
            audio_url: Some("https://cdn.example/a.mp3".to_string()),
            duration_seconds: None,
        };
        store.upsert_site_media("call.example", &updated).unwrap();
        assert_eq!(store.get_site_media("call.example").unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_fetch_and_delete() {
        let store = SiteMediaStore::open_in_memory().unwrap();
        store
            .upsert_site_media(
                "localhost:1420",
                &RemoteMediaConfig {
                    duration_seconds: Some(120),
                    ..RemoteMediaConfig::default()
                },
            )
            .unwrap();

        let fetched = store.fetch("localhost:1420").await.unwrap().unwrap();
        assert_eq!(fetched.duration_limit(), Some(120));

        store.delete_site_media("localhost:1420").unwrap();
        assert_eq!(store.fetch("localhost:1420").await.unwrap(), None);
    }
}
