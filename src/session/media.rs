//! Local Media - Kamera und Mikrofon
//!
//! Abstraktion über die lokale Geräte-Capture. Die Session besitzt den
//! `LocalMediaStream` exklusiv und gibt ihn beim Beenden wieder frei.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Ziel-Auflösung der lokalen Kamera (Breite)
pub const TARGET_VIDEO_WIDTH: u32 = 1280;

/// Ziel-Auflösung der lokalen Kamera (Höhe)
pub const TARGET_VIDEO_HEIGHT: u32 = 720;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission to access camera or microphone was denied")]
    PermissionDenied,

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Capture request was cancelled by the user")]
    Cancelled,
}

impl CaptureError {
    /// `true` für Geräte-/Berechtigungsfehler (nicht für Abbruch)
    pub fn is_device_error(&self) -> bool {
        !matches!(self, CaptureError::Cancelled)
    }
}

// ============================================================================
// TRACKS & STREAM
// ============================================================================

/// Art eines lokalen Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Ein lokal aufgenommener Geräte-Track
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    /// Gibt das Gerät frei. Mehrfacher Aufruf ist erlaubt.
    fn stop(&self);
}

/// Constraints für die Capture-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video_width: u32,
    pub video_height: u32,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video_width: TARGET_VIDEO_WIDTH,
            video_height: TARGET_VIDEO_HEIGHT,
            audio: true,
        }
    }
}

/// Local Media Handle: alle Tracks einer Capture-Anfrage
#[derive(Clone, Default)]
pub struct LocalMediaStream {
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl LocalMediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// Alle Tracks einer Art
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    /// Setzt `enabled` auf jedem Track der Art
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks_of(kind) {
            track.set_enabled(enabled);
        }
    }

    /// Stoppt alle Tracks
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl std::fmt::Debug for LocalMediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaStream")
            .field("audio_tracks", &self.tracks_of(TrackKind::Audio).count())
            .field("video_tracks", &self.tracks_of(TrackKind::Video).count())
            .finish()
    }
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Zugriff auf lokale Kamera und Mikrofon
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn capture(&self, constraints: MediaConstraints)
        -> Result<LocalMediaStream, CaptureError>;
}

/// Lokale Vorschau des eigenen Kamerabilds
pub trait PreviewSurface: Send + Sync {
    /// Bindet den Stream. `muted` ist für die eigene Vorschau immer gesetzt.
    fn attach(&self, stream: &LocalMediaStream, muted: bool);
    fn detach(&self);
}

/// Vorschau die nichts rendert
#[derive(Debug, Default)]
pub struct NoPreview;

impl PreviewSurface for NoPreview {
    fn attach(&self, _stream: &LocalMediaStream, _muted: bool) {}
    fn detach(&self) {}
}
