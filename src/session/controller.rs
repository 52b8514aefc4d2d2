//! Call Session Controller
//!
//! Verwaltet eine zeitlich begrenzte Call-Session:
//! - Lokale Kamera/Mikrofon Capture und Freigabe
//! - Sekunden-Timer mit hartem Limit
//! - Mic/Kamera Toggles
//! - Remote-Playback während des Anrufs
//!
//! Zustände: `Idle -> Connecting -> Active -> Ended`, bei Geräte-Fehlern
//! `Connecting -> Idle`.

use super::duration::DurationLimitResolver;
use super::media::{
    CaptureError, LocalMediaStream, MediaConstraints, MediaDevices, PreviewSurface, TrackKind,
};
use super::remote::RemotePlayback;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Fehlermeldung für den Benutzer bei Geräte-/Berechtigungsfehlern
pub const PERMISSION_ERROR_MESSAGE: &str =
    "Camera and microphone could not be accessed. Please allow access and try again.";

/// Intervall des Gesprächs-Timers
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Grund beim automatischen Ende am Zeitlimit (nur für Logs)
pub const LIMIT_REACHED_REASON: &str = "duration limit reached";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Already in a call")]
    AlreadyInCall,

    #[error("Media capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Session ended while media capture was pending")]
    Superseded,

    #[error("Session controller was disposed")]
    Disposed,
}

// ============================================================================
// SESSION STATE
// ============================================================================

/// Phase einer Call-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Kein Anruf (auch nach Geräte-Fehler)
    Idle,
    /// Capture-Anfrage läuft
    Connecting,
    /// Anruf aktiv, Timer läuft
    Active,
    /// Anruf beendet (Hangup, Limit oder Teardown)
    Ended,
}

/// Ergebnis eines Timer-Ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session nicht aktiv, Tick verworfen
    Ignored,
    /// Sekunde gezählt, Limit noch nicht erreicht
    Counted,
    /// Sekunde gezählt und Limit erreicht
    LimitReached,
}

/// Snapshot des Session-States
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSessionState {
    pub phase: SessionPhase,
    pub session_id: Option<Uuid>,
    pub elapsed_seconds: u32,
    pub limit_seconds: u32,
    pub mic_enabled: bool,
    pub camera_enabled: bool,
    pub permission_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl CallSessionState {
    fn new(limit_seconds: u32) -> Self {
        Self {
            phase: SessionPhase::Idle,
            session_id: None,
            elapsed_seconds: 0,
            limit_seconds,
            mic_enabled: true,
            camera_enabled: true,
            permission_error: None,
            started_at: None,
        }
    }

    pub fn in_call(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn is_connecting(&self) -> bool {
        self.phase == SessionPhase::Connecting
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.limit_seconds.saturating_sub(self.elapsed_seconds)
    }

    /// Zählt eine Timer-Sekunde
    ///
    /// Reine Funktion des aktuellen States: außerhalb von `Active` passiert
    /// nichts. Die letzte Sekunde wird immer gezählt, bevor das Limit
    /// gemeldet wird.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != SessionPhase::Active {
            return TickOutcome::Ignored;
        }
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
        if self.elapsed_seconds >= self.limit_seconds {
            TickOutcome::LimitReached
        } else {
            TickOutcome::Counted
        }
    }
}

/// Events die vom CallSessionController ausgelöst werden
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionPhase),
    Tick {
        elapsed_seconds: u32,
        limit_seconds: u32,
    },
    PermissionError(String),
    Ended {
        reason: Option<String>,
    },
}

// ============================================================================
// SHARED STATE
// ============================================================================

struct Inner {
    state: CallSessionState,
    stream: Option<LocalMediaStream>,
    timer: Option<JoinHandle<()>>,
}

/// Von Controller und Timer-Task gemeinsam genutzter Teil
struct Shared {
    inner: Mutex<Inner>,
    event_tx: broadcast::Sender<SessionEvent>,
    preview: Arc<dyn PreviewSurface>,
    remote: Option<Arc<RemotePlayback>>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Beendet die Session und gibt alle Ressourcen frei
    ///
    /// Idempotent: Timer-Abbruch und Track-Freigabe passieren nur, wenn noch
    /// etwas gehalten wird. Gibt `true` zurück wenn ein Übergang nach
    /// `Ended` stattgefunden hat.
    fn end(&self, reason: Option<&str>) -> bool {
        let (previous, session_id, stream, timer) = {
            let mut inner = self.inner.lock();
            let previous = inner.state.phase;
            let session_id = inner.state.session_id.take();

            if matches!(previous, SessionPhase::Connecting | SessionPhase::Active) {
                inner.state.phase = SessionPhase::Ended;
            }
            inner.state.elapsed_seconds = 0;
            inner.state.started_at = None;
            inner.state.mic_enabled = true;
            inner.state.camera_enabled = true;

            (previous, session_id, inner.stream.take(), inner.timer.take())
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        if let Some(stream) = stream {
            stream.stop_all();
            self.preview.detach();
            tracing::debug!("Released local media: {:?}", stream);
        }

        if previous == SessionPhase::Active {
            if let Some(remote) = &self.remote {
                remote.stop();
            }
        }

        let transitioned = matches!(previous, SessionPhase::Connecting | SessionPhase::Active);
        if transitioned {
            tracing::info!(
                "Call session {} ended (reason: {})",
                session_id.map(|id| id.to_string()).unwrap_or_default(),
                reason.unwrap_or("none")
            );
            self.emit(SessionEvent::StateChanged(SessionPhase::Ended));
            self.emit(SessionEvent::Ended {
                reason: reason.map(str::to_string),
            });
        }
        transitioned
    }

    /// `true` solange `session_id` die aktive Session ist
    fn is_current(&self, session_id: Uuid) -> bool {
        let inner = self.inner.lock();
        inner.state.session_id == Some(session_id) && inner.state.phase == SessionPhase::Active
    }

    /// Verarbeitet einen Timer-Tick der Session `session_id`
    ///
    /// Gibt `false` zurück wenn der Timer aufhören soll. Ein Tick einer
    /// bereits beendeten oder neueren Session ist ein No-Op.
    fn on_tick(&self, session_id: Uuid) -> bool {
        let (outcome, elapsed_seconds, limit_seconds) = {
            let mut inner = self.inner.lock();
            if inner.state.session_id != Some(session_id) {
                return false;
            }
            let outcome = inner.state.tick();
            (
                outcome,
                inner.state.elapsed_seconds,
                inner.state.limit_seconds,
            )
        };

        match outcome {
            TickOutcome::Ignored => false,
            TickOutcome::Counted => {
                tracing::debug!("Call tick {}/{}s", elapsed_seconds, limit_seconds);
                self.emit(SessionEvent::Tick {
                    elapsed_seconds,
                    limit_seconds,
                });
                true
            }
            TickOutcome::LimitReached => {
                self.emit(SessionEvent::Tick {
                    elapsed_seconds,
                    limit_seconds,
                });
                self.end(Some(LIMIT_REACHED_REASON));
                false
            }
        }
    }
}

/// Startet den Sekunden-Timer einer Session
fn spawn_timer(shared: Arc<Shared>, session_id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        loop {
            interval.tick().await;
            if !shared.on_tick(session_id) {
                break;
            }
        }
    })
}

// ============================================================================
// CALL SESSION CONTROLLER
// ============================================================================

/// Controller für eine lokale, zeitlich begrenzte Call-Session
pub struct CallSessionController {
    shared: Arc<Shared>,
    devices: Arc<dyn MediaDevices>,
    resolver: Arc<DurationLimitResolver>,
    constraints: MediaConstraints,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl CallSessionController {
    /// Erstellt einen neuen Controller
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        resolver: Arc<DurationLimitResolver>,
        preview: Arc<dyn PreviewSurface>,
        remote: Option<Arc<RemotePlayback>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let limit_seconds = resolver.effective_seconds();

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: CallSessionState::new(limit_seconds),
                    stream: None,
                    timer: None,
                }),
                event_tx,
                preview,
                remote,
            }),
            devices,
            resolver,
            constraints: MediaConstraints::default(),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Gibt einen Snapshot des aktuellen States zurück
    ///
    /// Außerhalb einer Session zeigt `limit_seconds` das aktuell aufgelöste
    /// Limit, während einer Session den beim Start festgelegten Wert.
    pub fn snapshot(&self) -> CallSessionState {
        let mut state = self.shared.inner.lock().state.clone();
        if !matches!(state.phase, SessionPhase::Connecting | SessionPhase::Active) {
            state.limit_seconds = self.resolver.effective_seconds();
        }
        state
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.inner.lock().state.phase
    }

    /// `true` solange ein Local Media Handle gehalten wird
    pub fn has_local_media(&self) -> bool {
        self.shared.inner.lock().stream.is_some()
    }

    /// Einmalige Initialisierung
    ///
    /// Trägt der Entry Link eine gültige Dauer, wird `start()` automatisch
    /// aufgerufen. Gibt `true` zurück wenn dabei ein Start versucht wurde.
    pub async fn init(&self) -> Result<bool, SessionError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        if !self.resolver.has_explicit_duration() {
            return Ok(false);
        }

        tracing::info!(
            "Explicit duration in entry link, auto-starting call ({}s)",
            self.resolver.effective_seconds()
        );
        self.start().await?;
        Ok(true)
    }

    /// Startet eine Session: Capture anfragen, dann Timer starten
    ///
    /// Geräte-Fehler führen zurück nach `Idle` mit Fehlermeldung und können
    /// durch erneutes `start()` wiederholt werden.
    pub async fn start(&self) -> Result<(), SessionError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SessionError::Disposed);
        }

        let session_id = Uuid::new_v4();
        {
            let mut inner = self.shared.inner.lock();
            if matches!(
                inner.state.phase,
                SessionPhase::Connecting | SessionPhase::Active
            ) {
                return Err(SessionError::AlreadyInCall);
            }
            inner.state.phase = SessionPhase::Connecting;
            inner.state.session_id = Some(session_id);
            inner.state.permission_error = None;
            inner.state.elapsed_seconds = 0;
            inner.state.limit_seconds = self.resolver.effective_seconds();
        }
        self.shared
            .emit(SessionEvent::StateChanged(SessionPhase::Connecting));
        tracing::info!("Call session {} connecting", session_id);

        match self.devices.capture(self.constraints).await {
            Ok(stream) => self.activate(session_id, stream),
            Err(error) => Err(self.capture_failed(session_id, error)),
        }
    }

    /// Übergang `Connecting -> Active` nach erfolgreicher Capture
    ///
    /// Der State wird unter dem Lock committed; Preview und Remote-Playback
    /// werden erst danach angestoßen.
    fn activate(&self, session_id: Uuid, stream: LocalMediaStream) -> Result<(), SessionError> {
        let limit_seconds = {
            let mut inner = self.shared.inner.lock();
            let still_pending = inner.state.session_id == Some(session_id)
                && inner.state.phase == SessionPhase::Connecting
                && !self.disposed.load(Ordering::SeqCst);

            if !still_pending {
                drop(inner);
                stream.stop_all();
                tracing::info!("Call session {} ended before capture finished", session_id);
                return Err(SessionError::Superseded);
            }

            stream.set_enabled(TrackKind::Audio, true);
            stream.set_enabled(TrackKind::Video, true);

            inner.state.phase = SessionPhase::Active;
            inner.state.elapsed_seconds = 0;
            inner.state.mic_enabled = true;
            inner.state.camera_enabled = true;
            inner.state.started_at = Some(Utc::now());
            inner.stream = Some(stream.clone());
            inner.timer = Some(spawn_timer(Arc::clone(&self.shared), session_id));
            inner.state.limit_seconds
        };

        self.shared.preview.attach(&stream, true);
        if let Some(remote) = &self.shared.remote {
            remote.start();
        }

        // Ein end() während Preview/Remote-Start hat deren Freigabe verpasst
        if !self.shared.is_current(session_id) {
            self.shared.preview.detach();
            if let Some(remote) = &self.shared.remote {
                remote.stop();
            }
            tracing::info!("Call session {} ended while activating", session_id);
            return Err(SessionError::Superseded);
        }

        tracing::info!(
            "Call session {} active, limit {}s",
            session_id,
            limit_seconds
        );
        self.shared
            .emit(SessionEvent::StateChanged(SessionPhase::Active));
        Ok(())
    }

    /// Übergang `Connecting -> Idle` nach fehlgeschlagener Capture
    fn capture_failed(&self, session_id: Uuid, error: CaptureError) -> SessionError {
        let message = {
            let mut inner = self.shared.inner.lock();
            if inner.state.session_id != Some(session_id)
                || inner.state.phase != SessionPhase::Connecting
            {
                return SessionError::Superseded;
            }
            inner.state.phase = SessionPhase::Idle;
            inner.state.session_id = None;
            if error.is_device_error() {
                inner.state.permission_error = Some(PERMISSION_ERROR_MESSAGE.to_string());
            }
            inner.state.permission_error.clone()
        };

        tracing::warn!("Call session {} could not start: {}", session_id, error);
        self.shared
            .emit(SessionEvent::StateChanged(SessionPhase::Idle));
        if let Some(message) = message {
            self.shared.emit(SessionEvent::PermissionError(message));
        }
        SessionError::Capture(error)
    }

    /// Beendet die Session (Hangup)
    ///
    /// Sicher mehrfach aufrufbar. `reason` dient nur der Beobachtbarkeit.
    pub fn end(&self, reason: Option<&str>) {
        self.shared.end(reason);
    }

    /// Schaltet alle Mikrofon-Tracks um und gibt den neuen Status zurück
    pub fn toggle_mic(&self) -> bool {
        self.toggle(TrackKind::Audio)
    }

    /// Schaltet alle Kamera-Tracks um und gibt den neuen Status zurück
    pub fn toggle_camera(&self) -> bool {
        self.toggle(TrackKind::Video)
    }

    fn toggle(&self, kind: TrackKind) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(stream) = inner.stream.clone() else {
            // Ohne Local Media Handle gibt es nichts umzuschalten
            return match kind {
                TrackKind::Audio => inner.state.mic_enabled,
                TrackKind::Video => inner.state.camera_enabled,
            };
        };

        let flag = match kind {
            TrackKind::Audio => &mut inner.state.mic_enabled,
            TrackKind::Video => &mut inner.state.camera_enabled,
        };
        *flag = !*flag;
        let enabled = *flag;
        stream.set_enabled(kind, enabled);

        tracing::debug!("{:?} tracks enabled: {}", kind, enabled);
        enabled
    }

    /// Teardown: gibt Tracks und Timer genau einmal frei
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.end(Some("disposed"));
        tracing::debug!("Call session controller disposed");
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for CallSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionController")
            .field("state", &self.snapshot())
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::media::{MediaTrack, NoPreview};
    use crate::session::MediaElement;
    use crate::simulated::{SimulatedDevices, SimulatedElement, SimulatedPreview};
    use std::sync::Weak;
    use url::Url;

    fn controller_with(
        devices: Arc<SimulatedDevices>,
        link_seconds: Option<u32>,
    ) -> CallSessionController {
        CallSessionController::new(
            devices,
            Arc::new(DurationLimitResolver::new(link_seconds)),
            Arc::new(NoPreview),
            None,
        )
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn ended_count(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Ended { .. }))
            .count()
    }

    #[test]
    fn test_tick_counts_until_limit() {
        for limit in 1..=50u32 {
            let mut state = CallSessionState::new(limit);
            state.phase = SessionPhase::Active;

            let mut ticks = 0;
            loop {
                ticks += 1;
                match state.tick() {
                    TickOutcome::Counted => continue,
                    TickOutcome::LimitReached => break,
                    TickOutcome::Ignored => panic!("active state ignored tick"),
                }
            }
            assert_eq!(ticks, limit);
            assert_eq!(state.elapsed_seconds, limit);
        }
    }

    #[test]
    fn test_tick_ignored_outside_active() {
        for phase in [SessionPhase::Idle, SessionPhase::Connecting, SessionPhase::Ended] {
            let mut state = CallSessionState::new(10);
            state.phase = phase;
            assert_eq!(state.tick(), TickOutcome::Ignored);
            assert_eq!(state.elapsed_seconds, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_ends_after_exactly_limit_ticks() {
        let devices = Arc::new(SimulatedDevices::new());
        let controller = controller_with(devices.clone(), Some(3));
        let mut rx = controller.subscribe();

        controller.start().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::Active);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(controller.snapshot().elapsed_seconds, 2);
        assert_eq!(controller.phase(), SessionPhase::Active);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let state = controller.snapshot();
        assert_eq!(state.phase, SessionPhase::Ended);
        assert_eq!(state.elapsed_seconds, 0);

        // Nach dem Ende kommen keine weiteren Ticks oder Ended-Events
        tokio::time::sleep(Duration::from_secs(5)).await;
        let events = drain(&mut rx);
        let ticks: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Tick {
                    elapsed_seconds, ..
                } => Some(*elapsed_seconds),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![1, 2, 3]);
        assert_eq!(ended_count(&events), 1);
        assert!(events.contains(&SessionEvent::Ended {
            reason: Some(LIMIT_REACHED_REASON.to_string())
        }));
        assert!(devices.issued_tracks().iter().all(|t| t.is_stopped()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_binds_muted_preview_and_requests_target_resolution() {
        let devices = Arc::new(SimulatedDevices::new());
        let preview = Arc::new(SimulatedPreview::default());
        let controller = CallSessionController::new(
            devices.clone(),
            Arc::new(DurationLimitResolver::new(Some(60))),
            preview.clone(),
            None,
        );

        controller.start().await.unwrap();
        assert!(preview.is_attached());
        assert!(preview.is_muted());
        assert_eq!(devices.last_constraints(), Some(MediaConstraints::default()));

        controller.end(Some("hangup"));
        assert!(!preview.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_mic_twice_restores_state() {
        let devices = Arc::new(SimulatedDevices::new());
        let controller = controller_with(devices.clone(), Some(60));
        controller.start().await.unwrap();

        let audio: Vec<_> = devices
            .issued_tracks()
            .into_iter()
            .filter(|t| t.kind() == TrackKind::Audio)
            .collect();
        assert!(!audio.is_empty());

        assert!(!controller.toggle_mic());
        assert!(!controller.snapshot().mic_enabled);
        assert!(audio.iter().all(|t| !t.is_enabled()));

        assert!(controller.toggle_mic());
        assert!(controller.snapshot().mic_enabled);
        assert!(audio.iter().all(|t| t.is_enabled()));

        // Video bleibt unberührt
        assert!(devices
            .issued_tracks()
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .all(|t| t.is_enabled()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_without_media_is_noop() {
        let controller = controller_with(Arc::new(SimulatedDevices::new()), None);
        assert!(controller.toggle_camera());
        assert!(controller.toggle_mic());
        assert!(controller.snapshot().camera_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_twice_is_idempotent() {
        let devices = Arc::new(SimulatedDevices::new());
        let controller = controller_with(devices.clone(), Some(60));
        let mut rx = controller.subscribe();
        controller.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        controller.end(Some("hangup"));
        controller.end(None);

        let state = controller.snapshot();
        assert_eq!(state.phase, SessionPhase::Ended);
        assert_eq!(state.elapsed_seconds, 0);
        assert!(!controller.has_local_media());
        assert_eq!(ended_count(&drain(&mut rx)), 1);
        assert!(devices.issued_tracks().iter().all(|t| t.stop_calls() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_after_manual_end_is_noop() {
        let controller = controller_with(Arc::new(SimulatedDevices::new()), Some(60));
        controller.start().await.unwrap();
        let session_id = controller.snapshot().session_id.unwrap();

        controller.end(None);
        assert!(!controller.shared.on_tick(session_id));

        let state = controller.snapshot();
        assert_eq!(state.phase, SessionPhase::Ended);
        assert_eq!(state.elapsed_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_does_not_touch_new_session() {
        let controller = controller_with(Arc::new(SimulatedDevices::new()), Some(60));
        controller.start().await.unwrap();
        let old_id = controller.snapshot().session_id.unwrap();
        controller.end(None);

        controller.start().await.unwrap();
        assert!(!controller.shared.on_tick(old_id));
        assert_eq!(controller.snapshot().elapsed_seconds, 0);
        assert_eq!(controller.phase(), SessionPhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_error_is_retryable() {
        let devices = Arc::new(SimulatedDevices::new());
        let controller = controller_with(devices.clone(), Some(60));
        let mut rx = controller.subscribe();

        devices.fail_next(CaptureError::PermissionDenied);
        let err = controller.start().await.unwrap_err();
        assert_eq!(err, SessionError::Capture(CaptureError::PermissionDenied));

        let state = controller.snapshot();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(
            state.permission_error.as_deref(),
            Some(PERMISSION_ERROR_MESSAGE)
        );
        assert!(drain(&mut rx)
            .contains(&SessionEvent::PermissionError(PERMISSION_ERROR_MESSAGE.to_string())));

        // Timer läuft nicht
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(controller.snapshot().elapsed_seconds, 0);

        controller.start().await.unwrap();
        let state = controller.snapshot();
        assert_eq!(state.phase, SessionPhase::Active);
        assert_eq!(state.permission_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_cancel_returns_to_idle_without_message() {
        let devices = Arc::new(SimulatedDevices::new());
        let controller = controller_with(devices.clone(), Some(60));

        devices.fail_next(CaptureError::Cancelled);
        assert!(controller.start().await.is_err());

        let state = controller.snapshot();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.permission_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_active_is_rejected() {
        let controller = controller_with(Arc::new(SimulatedDevices::new()), Some(60));
        controller.start().await.unwrap();
        assert_eq!(controller.start().await, Err(SessionError::AlreadyInCall));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_during_capture_releases_late_tracks() {
        let devices = Arc::new(SimulatedDevices::with_latency(Duration::from_millis(500)));
        let controller = Arc::new(controller_with(devices.clone(), Some(60)));

        let pending = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.start().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.phase(), SessionPhase::Connecting);

        controller.end(Some("hangup"));
        let result = pending.await.unwrap();
        assert_eq!(result, Err(SessionError::Superseded));
        assert_eq!(controller.phase(), SessionPhase::Ended);
        assert!(!controller.has_local_media());
        assert!(devices.issued_tracks().iter().all(|t| t.is_stopped()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_is_fixed_for_running_session() {
        let resolver = Arc::new(DurationLimitResolver::new(None));
        let controller = CallSessionController::new(
            Arc::new(SimulatedDevices::new()),
            Arc::clone(&resolver),
            Arc::new(NoPreview),
            None,
        );

        // Manueller Start vor dem Config-Load nutzt den Default
        assert!(!controller.init().await.unwrap());
        assert_eq!(controller.snapshot().limit_seconds, 1800);
        controller.start().await.unwrap();
        assert_eq!(controller.snapshot().limit_seconds, 1800);

        assert!(resolver.apply_remote(Some(900)));
        assert_eq!(controller.snapshot().limit_seconds, 1800);

        controller.end(None);
        assert_eq!(controller.snapshot().limit_seconds, 900);
        controller.start().await.unwrap();
        assert_eq!(controller.snapshot().limit_seconds, 900);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_snapshot_reports_resolved_limit() {
        let resolver = Arc::new(DurationLimitResolver::new(None));
        let controller = CallSessionController::new(
            Arc::new(SimulatedDevices::new()),
            Arc::clone(&resolver),
            Arc::new(NoPreview),
            None,
        );
        assert_eq!(controller.snapshot().limit_seconds, 1800);

        resolver.apply_remote(Some(900));
        assert_eq!(controller.snapshot().phase, SessionPhase::Idle);
        assert_eq!(controller.snapshot().limit_seconds, 900);
    }

    /// Vorschau die beim Binden den Controller abfragt
    #[derive(Default)]
    struct QueryingPreview {
        controller: parking_lot::Mutex<Option<Weak<CallSessionController>>>,
        phase_on_attach: parking_lot::Mutex<Option<SessionPhase>>,
    }

    impl PreviewSurface for QueryingPreview {
        fn attach(&self, _stream: &LocalMediaStream, _muted: bool) {
            let controller = self.controller.lock().as_ref().and_then(Weak::upgrade);
            if let Some(controller) = controller {
                *self.phase_on_attach.lock() = Some(controller.snapshot().phase);
            }
        }

        fn detach(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_may_query_controller_while_activating() {
        let preview = Arc::new(QueryingPreview::default());
        let controller = Arc::new(CallSessionController::new(
            Arc::new(SimulatedDevices::new()),
            Arc::new(DurationLimitResolver::new(Some(60))),
            preview.clone(),
            None,
        ));
        *preview.controller.lock() = Some(Arc::downgrade(&controller));

        controller.start().await.unwrap();
        assert_eq!(*preview.phase_on_attach.lock(), Some(SessionPhase::Active));
        assert_eq!(controller.phase(), SessionPhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_auto_starts_once() {
        let controller = controller_with(Arc::new(SimulatedDevices::new()), Some(600));
        assert!(controller.init().await.unwrap());
        assert_eq!(controller.phase(), SessionPhase::Active);
        assert_eq!(controller.snapshot().limit_seconds, 600);

        controller.end(None);
        assert!(!controller.init().await.unwrap());
        assert_eq!(controller.phase(), SessionPhase::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_releases_once_and_blocks_restart() {
        let devices = Arc::new(SimulatedDevices::new());
        let controller = controller_with(devices.clone(), Some(60));
        controller.start().await.unwrap();

        controller.dispose();
        controller.dispose();
        assert!(devices.issued_tracks().iter().all(|t| t.stop_calls() == 1));
        assert_eq!(controller.start().await, Err(SessionError::Disposed));

        // Drop nach dispose gibt nichts doppelt frei
        drop(controller);
        assert!(devices.issued_tracks().iter().all(|t| t.stop_calls() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_tracks() {
        let devices = Arc::new(SimulatedDevices::new());
        {
            let controller = controller_with(devices.clone(), Some(60));
            controller.start().await.unwrap();
        }
        assert!(devices.issued_tracks().iter().all(|t| t.stop_calls() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_playback_follows_session() {
        let video = Arc::new(SimulatedElement::new());
        let audio = Arc::new(SimulatedElement::new());
        let remote = Arc::new(RemotePlayback::new(
            video.clone(),
            audio.clone(),
            &Url::parse("https://call.example/media/placeholder.mp4").unwrap(),
        ));
        remote.set_sources(
            &Url::parse("https://cdn.example/v.mp4").unwrap(),
            Some(&Url::parse("https://cdn.example/a.mp3").unwrap()),
        );

        let controller = CallSessionController::new(
            Arc::new(SimulatedDevices::new()),
            Arc::new(DurationLimitResolver::new(Some(2))),
            Arc::new(NoPreview),
            Some(remote),
        );
        controller.start().await.unwrap();
        assert!(!video.is_paused());
        assert!(!audio.is_paused());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(controller.phase(), SessionPhase::Ended);
        assert!(video.is_paused());
        assert!(audio.is_paused());
    }
}
