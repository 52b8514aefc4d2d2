//! Simulierte Collaborators
//!
//! In-Process Implementierungen für Geräte, Medien-Elemente, Vorschau und
//! Navigation. Werden vom Headless-Binary und in Tests verwendet.

use crate::chat::Navigator;
use crate::session::{
    CaptureError, LocalMediaStream, MediaConstraints, MediaDevices, MediaElement, MediaTrack,
    PlaybackError, PreviewSurface, TrackKind,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

// ============================================================================
// TRACKS & DEVICES
// ============================================================================

/// Synthetischer Geräte-Track
#[derive(Debug)]
pub struct SimulatedTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    stop_calls: AtomicUsize,
}

impl SimulatedTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            enabled: AtomicBool::new(true),
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_calls.load(Ordering::SeqCst) > 0
    }

    /// Anzahl der `stop()` Aufrufe
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl MediaTrack for SimulatedTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Synthetische Kamera + Mikrofon
#[derive(Debug, Default)]
pub struct SimulatedDevices {
    latency: Duration,
    next_failure: Mutex<Option<CaptureError>>,
    issued: Mutex<Vec<Arc<SimulatedTrack>>>,
    last_constraints: Mutex<Option<MediaConstraints>>,
}

impl SimulatedDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verzögert jede Capture-Anfrage
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Lässt die nächste Capture-Anfrage fehlschlagen
    pub fn fail_next(&self, error: CaptureError) {
        *self.next_failure.lock() = Some(error);
    }

    /// Alle bisher ausgegebenen Tracks
    pub fn issued_tracks(&self) -> Vec<Arc<SimulatedTrack>> {
        self.issued.lock().clone()
    }

    pub fn last_constraints(&self) -> Option<MediaConstraints> {
        *self.last_constraints.lock()
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn capture(
        &self,
        constraints: MediaConstraints,
    ) -> Result<LocalMediaStream, CaptureError> {
        *self.last_constraints.lock() = Some(constraints);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.next_failure.lock().take() {
            return Err(error);
        }

        let mut tracks = vec![Arc::new(SimulatedTrack::new(TrackKind::Video))];
        if constraints.audio {
            tracks.push(Arc::new(SimulatedTrack::new(TrackKind::Audio)));
        }
        self.issued.lock().extend(tracks.iter().cloned());

        Ok(LocalMediaStream::new(
            tracks
                .into_iter()
                .map(|t| t as Arc<dyn MediaTrack>)
                .collect(),
        ))
    }
}

// ============================================================================
// MEDIA ELEMENT
// ============================================================================

#[derive(Debug, Default)]
struct ElementState {
    source: Option<Url>,
    paused: bool,
    position: f64,
    autoplay_blocked: bool,
}

/// Medien-Element ohne echte Dekodierung
#[derive(Debug)]
pub struct SimulatedElement {
    state: Mutex<ElementState>,
}

impl SimulatedElement {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ElementState {
                paused: true,
                ..ElementState::default()
            }),
        }
    }

    /// Simuliert eine Autoplay-Sperre des Hosts
    pub fn block_autoplay(&self, blocked: bool) {
        self.state.lock().autoplay_blocked = blocked;
    }

    pub fn source(&self) -> Option<Url> {
        self.state.lock().source.clone()
    }

    /// Spult ein laufendes Element vor und gibt die neue Position zurück
    pub fn advance(&self, seconds: f64) -> f64 {
        let mut state = self.state.lock();
        if !state.paused {
            state.position += seconds;
        }
        state.position
    }
}

impl Default for SimulatedElement {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaElement for SimulatedElement {
    fn set_source(&self, source: Option<&Url>) {
        let mut state = self.state.lock();
        if state.source.as_ref() != source {
            state.source = source.cloned();
            state.position = 0.0;
            state.paused = true;
        }
    }

    fn play(&self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        if state.source.is_none() {
            return Err(PlaybackError::NoSource);
        }
        if state.autoplay_blocked {
            return Err(PlaybackError::AutoplayBlocked);
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.state.lock().position
    }

    fn set_current_time(&self, seconds: f64) {
        self.state.lock().position = seconds.max(0.0);
    }
}

// ============================================================================
// PREVIEW & NAVIGATION
// ============================================================================

/// Vorschau die nur festhält, ob und wie sie gebunden ist
#[derive(Debug, Default)]
pub struct SimulatedPreview {
    attached: AtomicBool,
    muted: AtomicBool,
}

impl SimulatedPreview {
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }
}

impl PreviewSurface for SimulatedPreview {
    fn attach(&self, _stream: &LocalMediaStream, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        self.attached.store(true, Ordering::SeqCst);
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }
}

/// Navigator der geöffnete Links sammelt und optional weiterreicht
#[derive(Debug, Default)]
pub struct SimulatedNavigator {
    opened: Mutex<Vec<Url>>,
    forward: Option<mpsc::UnboundedSender<Url>>,
}

impl SimulatedNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reicht jeden geöffneten Link an den Channel weiter
    pub fn forwarding(tx: mpsc::UnboundedSender<Url>) -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            forward: Some(tx),
        }
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().clone()
    }
}

impl Navigator for SimulatedNavigator {
    fn open(&self, link: &Url) {
        tracing::info!("Opening new navigation: {}", link);
        self.opened.lock().push(link.clone());
        if let Some(tx) = &self.forward {
            let _ = tx.send(link.clone());
        }
    }
}
