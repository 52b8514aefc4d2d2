//! Remote Media - simulierter Gesprächspartner
//!
//! Der "Remote Stream" ist ein vorab aufgenommenes Video. Optional kommt
//! die Tonspur aus einer separaten Quelle; der `RemoteMediaSynchronizer`
//! hält dieses Audio-Element dann an Play-State und Position des Videos.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Playback blocked by autoplay policy")]
    AutoplayBlocked,

    #[error("No media source set")]
    NoSource,

    #[error("Playback failed: {0}")]
    Failed(String),
}

// ============================================================================
// MEDIA ELEMENT
// ============================================================================

/// Ein abspielendes Medien-Element (Video oder Audio)
pub trait MediaElement: Send + Sync {
    fn set_source(&self, source: Option<&Url>);
    fn play(&self) -> Result<(), PlaybackError>;
    fn pause(&self);
    fn is_paused(&self) -> bool;
    /// Position in Sekunden
    fn current_time(&self) -> f64;
    fn set_current_time(&self, seconds: f64);
}

/// Zustandsänderungen des Video-Elements
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoEvent {
    Play,
    Pause,
    TimeUpdate(f64),
}

// ============================================================================
// SYNCHRONIZER
// ============================================================================

/// Spiegelt Play-State und Position des Videos auf das Audio-Element
///
/// Es gibt keine Drift-Korrektur: zwischen zwei Position-Updates darf das
/// Audio abweichen, korrigiert wird nur durch direktes Setzen der Position.
pub struct RemoteMediaSynchronizer {
    audio: Arc<dyn MediaElement>,
}

impl RemoteMediaSynchronizer {
    pub fn new(audio: Arc<dyn MediaElement>) -> Self {
        Self { audio }
    }

    /// Überträgt ein Video-Event auf das Audio-Element
    pub fn handle(&self, event: VideoEvent) {
        match event {
            VideoEvent::Play => {
                // Autoplay-Sperren werden geschluckt, das Video läuft weiter
                if let Err(e) = self.audio.play() {
                    tracing::debug!("Remote audio play failed (ignored): {}", e);
                }
            }
            VideoEvent::Pause => self.audio.pause(),
            VideoEvent::TimeUpdate(position) => self.audio.set_current_time(position),
        }
    }

    /// Gleicht das Audio einmalig an ein bereits laufendes Video an
    pub fn align_with(&self, video: &dyn MediaElement) {
        self.handle(VideoEvent::TimeUpdate(video.current_time()));
        if video.is_paused() {
            self.handle(VideoEvent::Pause);
        } else {
            self.handle(VideoEvent::Play);
        }
    }
}

// ============================================================================
// REMOTE PLAYBACK
// ============================================================================

/// Video-Element des Remote-Partners plus optionale separate Tonspur
pub struct RemotePlayback {
    video: Arc<dyn MediaElement>,
    audio: Arc<dyn MediaElement>,
    synchronizer: RwLock<Option<RemoteMediaSynchronizer>>,
    /// Zwischen `start()` und `stop()` gesetzt
    playing: AtomicBool,
}

impl RemotePlayback {
    /// Erstellt die Playback-Einheit mit dem Placeholder-Video als Quelle
    pub fn new(
        video: Arc<dyn MediaElement>,
        audio: Arc<dyn MediaElement>,
        placeholder_video: &Url,
    ) -> Self {
        video.set_source(Some(placeholder_video));
        audio.set_source(None);
        Self {
            video,
            audio,
            synchronizer: RwLock::new(None),
            playing: AtomicBool::new(false),
        }
    }

    /// Setzt die Quellen aus der Remote-Konfiguration
    ///
    /// Der Synchronizer ist nur aktiv, wenn eine separate Audio-Quelle
    /// konfiguriert ist. Läuft der Playback bereits, spielt das Video nach
    /// dem Quellenwechsel weiter.
    pub fn set_sources(&self, video_source: &Url, audio_source: Option<&Url>) {
        self.video.set_source(Some(video_source));
        self.audio.set_source(audio_source);

        if self.playing.load(Ordering::SeqCst) && self.video.is_paused() {
            if let Err(e) = self.video.play() {
                tracing::warn!("Remote video could not resume after source change: {}", e);
            }
        }

        let synchronizer = audio_source.map(|_| {
            let sync = RemoteMediaSynchronizer::new(Arc::clone(&self.audio));
            sync.align_with(self.video.as_ref());
            sync
        });

        tracing::info!(
            "Remote sources set: video={}, separate audio={}",
            video_source,
            synchronizer.is_some()
        );
        *self.synchronizer.write() = synchronizer;
    }

    /// `true` wenn eine separate Tonspur synchronisiert wird
    pub fn has_separate_audio(&self) -> bool {
        self.synchronizer.read().is_some()
    }

    /// Startet das Remote-Video von vorne
    pub fn start(&self) {
        self.playing.store(true, Ordering::SeqCst);
        self.video.set_current_time(0.0);
        self.on_video_event(VideoEvent::TimeUpdate(0.0));
        match self.video.play() {
            Ok(()) => self.on_video_event(VideoEvent::Play),
            Err(e) => tracing::warn!("Remote video could not start: {}", e),
        }
    }

    /// Pausiert das Remote-Video
    pub fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.video.pause();
        self.on_video_event(VideoEvent::Pause);
    }

    /// Leitet ein Video-Event an den Synchronizer weiter (falls aktiv)
    pub fn on_video_event(&self, event: VideoEvent) {
        if let Some(sync) = self.synchronizer.read().as_ref() {
            sync.handle(event);
        }
    }

    pub fn video(&self) -> &Arc<dyn MediaElement> {
        &self.video
    }
}

impl std::fmt::Debug for RemotePlayback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePlayback")
            .field("video_paused", &self.video.is_paused())
            .field("separate_audio", &self.has_separate_audio())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
