//! Session Module - Call-Session und Medien
//!
//! Dieses Modul verwaltet:
//! - Auflösung des Gesprächslimits (Link, Remote-Config, Default)
//! - Lokale Kamera/Mikrofon Capture
//! - Simulierten Remote-Stream mit synchronisierter Tonspur
//! - Den Call Session Controller mit Timer und Toggles

mod controller;
mod duration;
mod media;
mod remote;

pub use controller::{
    CallSessionController, CallSessionState, SessionError, SessionEvent, SessionPhase,
    TickOutcome, LIMIT_REACHED_REASON, PERMISSION_ERROR_MESSAGE, TICK_INTERVAL,
};
pub use duration::{DurationLimitResolver, DEFAULT_LIMIT_SECONDS};
pub use media::{
    CaptureError, LocalMediaStream, MediaConstraints, MediaDevices, MediaTrack, NoPreview,
    PreviewSurface, TrackKind, TARGET_VIDEO_HEIGHT, TARGET_VIDEO_WIDTH,
};
pub use remote::{
    MediaElement, PlaybackError, RemoteMediaSynchronizer, RemotePlayback, VideoEvent,
};
