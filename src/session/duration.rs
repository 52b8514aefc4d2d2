//! Duration Limit Resolver
//!
//! Bestimmt das Zeitlimit eines Anrufs aus drei Quellen:
//! 1. `seconds` Parameter im Entry Link (gewinnt immer)
//! 2. Dauer aus der Remote-Konfiguration (höchstens einmal übernommen)
//! 3. Fester Default von 30 Minuten

use crate::link;
use once_cell::sync::OnceCell;
use url::Url;

/// Default-Limit wenn keine Quelle eine Dauer liefert (30 Minuten)
pub const DEFAULT_LIMIT_SECONDS: u32 = 30 * 60;

/// Resolver für das Gesprächslimit einer Seite
///
/// Wird einmal pro Page Load erstellt. Der Remote-Wert kann nur einmal
/// gesetzt werden, spätere Config-Loads ändern ein bereits aufgelöstes
/// Limit nicht mehr.
#[derive(Debug, Default)]
pub struct DurationLimitResolver {
    link_seconds: Option<u32>,
    remote_seconds: OnceCell<u32>,
}

impl DurationLimitResolver {
    /// Erstellt den Resolver aus einem bereits geparsten Link-Wert
    pub fn new(link_seconds: Option<u32>) -> Self {
        Self {
            link_seconds: link_seconds.filter(|s| *s > 0),
            remote_seconds: OnceCell::new(),
        }
    }

    /// Erstellt den Resolver direkt aus dem Entry Link
    pub fn from_entry_link(entry: &Url) -> Self {
        Self::new(link::explicit_seconds(entry))
    }

    /// `true` wenn der Entry Link eine gültige Dauer trägt (Direct Call Mode)
    pub fn has_explicit_duration(&self) -> bool {
        self.link_seconds.is_some()
    }

    /// Übernimmt die Dauer aus der Remote-Konfiguration
    ///
    /// Gibt `true` zurück wenn der Wert übernommen wurde. Ignoriert wird er,
    /// wenn der Link eine Dauer trägt, der Wert fehlt oder nicht positiv ist,
    /// oder ein früherer Config-Load das Limit schon gesetzt hat.
    pub fn apply_remote(&self, remote_seconds: Option<u32>) -> bool {
        if self.link_seconds.is_some() {
            return false;
        }
        let Some(seconds) = remote_seconds.filter(|s| *s > 0) else {
            return false;
        };
        let applied = self.remote_seconds.set(seconds).is_ok();
        if applied {
            tracing::info!("Duration limit resolved from remote config: {}s", seconds);
        } else {
            tracing::debug!("Remote duration {}s ignored, limit already resolved", seconds);
        }
        applied
    }

    /// Gibt das aktuell wirksame Limit in Sekunden zurück
    pub fn effective_seconds(&self) -> u32 {
        self.link_seconds
            .or_else(|| self.remote_seconds.get().copied())
            .unwrap_or(DEFAULT_LIMIT_SECONDS)
    }
}

// ============================================================================
// TESTS
// ============================================================================
