//! Chat Flow Controller
//!
//! Führt die reine Zustandsmaschine aus `flow` aus: hält den `ChatState`,
//! plant die Typing-Pausen auf der Tokio-Runtime und öffnet den
//! Hand-off Link über den `Navigator`.

use super::catalog::ContactChannel;
use super::flow::{transition, ChatEffect, ChatEvent, ChatState, ChatStep};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Öffnet einen Link als neue, unabhängige Navigation
pub trait Navigator: Send + Sync {
    fn open(&self, link: &Url);
}

/// Grenzen der Typing-Pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingDelay {
    min: Duration,
    max: Duration,
}

impl PacingDelay {
    /// Standard: 700-800 ms
    pub const DEFAULT: PacingDelay = PacingDelay {
        min: Duration::from_millis(700),
        max: Duration::from_millis(800),
    };

    /// Gibt `None` zurück wenn `min > max`
    pub fn new(min: Duration, max: Duration) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Zieht eine Pause gleichverteilt aus `[min, max]`
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for PacingDelay {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ============================================================================
// CHAT FLOW CONTROLLER
// ============================================================================

struct ChatShared {
    state: Mutex<ChatState>,
    origin: Url,
    pacing: PacingDelay,
    navigator: Arc<dyn Navigator>,
    pending: Mutex<Option<JoinHandle<()>>>,
    state_tx: broadcast::Sender<ChatState>,
    disposed: AtomicBool,
}

impl ChatShared {
    fn dispatch(self: &Arc<Self>, event: ChatEvent) -> ChatState {
        if self.disposed.load(Ordering::SeqCst) {
            return self.state.lock().clone();
        }

        let (next, effects) = {
            let mut state = self.state.lock();
            let result = transition(&state, event, &self.origin);
            if result.state != *state {
                tracing::debug!("Chat step: {:?} -> {:?}", state.step, result.state.step);
            }
            *state = result.state.clone();
            (result.state, result.effects)
        };

        let _ = self.state_tx.send(next.clone());

        for effect in effects {
            match effect {
                ChatEffect::StartComposing(step) => self.schedule_composing(step),
                ChatEffect::OpenLink(link) => self.navigator.open(&link),
            }
        }
        next
    }

    /// Plant das Ende der Typing-Pause für `step`
    fn schedule_composing(self: &Arc<Self>, step: ChatStep) {
        let delay = self.pacing.sample();
        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.dispatch(ChatEvent::ComposingElapsed(step));
        });
        // Ältere Pausen laufen aus; ihr Event ist dann veraltet und wird ignoriert
        *self.pending.lock() = Some(handle);
    }
}

/// Controller für den geführten Paket-/Kontakt-Chat
#[derive(Clone)]
pub struct ChatFlowController {
    shared: Arc<ChatShared>,
}

impl ChatFlowController {
    /// Erstellt einen neuen Chat im Schritt `intro`
    pub fn new(origin: Url, pacing: PacingDelay, navigator: Arc<dyn Navigator>) -> Self {
        let (state_tx, _) = broadcast::channel(100);

        Self {
            shared: Arc::new(ChatShared {
                state: Mutex::new(ChatState::default()),
                origin,
                pacing,
                navigator,
                pending: Mutex::new(None),
                state_tx,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Gibt einen Receiver für jeden neuen State zurück
    pub fn subscribe(&self) -> broadcast::Receiver<ChatState> {
        self.shared.state_tx.subscribe()
    }

    /// Gibt den aktuellen State zurück
    pub fn state(&self) -> ChatState {
        self.shared.state.lock().clone()
    }

    /// Verarbeitet ein Event und gibt den neuen State zurück
    pub fn dispatch(&self, event: ChatEvent) -> ChatState {
        self.shared.dispatch(event)
    }

    pub fn select_package(&self, package_id: &str) -> ChatState {
        self.dispatch(ChatEvent::SelectPackage(package_id.to_string()))
    }

    pub fn select_channel(&self, channel: ContactChannel) -> ChatState {
        self.dispatch(ChatEvent::SelectChannel(channel))
    }

    pub fn set_contact_value(&self, value: impl Into<String>) -> ChatState {
        self.dispatch(ChatEvent::EditContact(value.into()))
    }

    /// "Continue" im Kontakt-Schritt
    pub fn confirm_contact(&self) -> ChatState {
        self.dispatch(ChatEvent::Continue)
    }

    pub fn back(&self) -> ChatState {
        self.dispatch(ChatEvent::Back)
    }

    /// "Generate": öffnet den Hand-off Link
    pub fn generate(&self) -> ChatState {
        self.dispatch(ChatEvent::Generate)
    }

    pub fn create_another(&self) -> ChatState {
        self.dispatch(ChatEvent::CreateAnother)
    }

    /// Bricht laufende Typing-Pausen ab, weitere Events werden ignoriert
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pending) = self.shared.pending.lock().take() {
            pending.abort();
        }
        tracing::debug!("Chat flow disposed");
    }
}

impl std::fmt::Debug for ChatFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatFlowController")
            .field("state", &self.state())
            .field("origin", &self.shared.origin.as_str())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedNavigator;

    fn controller(navigator: Arc<SimulatedNavigator>) -> ChatFlowController {
        ChatFlowController::new(
            Url::parse("https://call.example").unwrap(),
            PacingDelay::DEFAULT,
            navigator,
        )
    }

    #[test]
    fn test_pacing_sample_within_bounds() {
        let pacing = PacingDelay::DEFAULT;
        for _ in 0..200 {
            let delay = pacing.sample();
            assert!(delay >= Duration::from_millis(700));
            assert!(delay <= Duration::from_millis(800));
        }
        assert!(PacingDelay::new(Duration::from_millis(900), Duration::from_millis(100)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guided_flow_end_to_end() {
        let navigator = Arc::new(SimulatedNavigator::new());
        let chat = controller(navigator.clone());

        let state = chat.select_package("10min");
        assert_eq!(state.step, ChatStep::MinutesConfirmed);
        assert!(state.composing);

        // Noch innerhalb der ersten Pause
        tokio::time::sleep(Duration::from_millis(650)).await;
        assert_eq!(chat.state().step, ChatStep::MinutesConfirmed);

        // Zwei Pausen a max. 800 ms
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let state = chat.state();
        assert_eq!(state.step, ChatStep::Contact);
        assert!(!state.composing);

        chat.select_channel(ContactChannel::Email);
        chat.set_contact_value("a@b.com");
        assert_eq!(chat.confirm_contact().step, ChatStep::ContactConfirmed);

        tokio::time::sleep(Duration::from_millis(1700)).await;
        assert_eq!(chat.state().step, ChatStep::Summary);

        let state = chat.generate();
        assert_eq!(state.step, ChatStep::Finished);
        assert_eq!(
            navigator.opened(),
            vec![Url::parse("https://call.example/?seconds=600").unwrap()]
        );

        let state = chat.create_another();
        assert_eq!(state.step, ChatStep::Minutes);
        assert_eq!(state.package, None);
        assert_eq!(state.channel, None);
        assert_eq!(state.contact_value, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_ignored_before_summary() {
        let navigator = Arc::new(SimulatedNavigator::new());
        let chat = controller(navigator.clone());

        chat.generate();
        chat.select_package("5min");
        chat.generate();
        assert!(navigator.opened().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_pending_pacing() {
        let navigator = Arc::new(SimulatedNavigator::new());
        let chat = controller(navigator);
        let mut rx = chat.subscribe();

        chat.select_package("5min");
        chat.dispose();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(chat.state().step, ChatStep::MinutesConfirmed);
        assert_eq!(chat.select_package("10min").step, ChatStep::MinutesConfirmed);

        let mut steps = Vec::new();
        while let Ok(state) = rx.try_recv() {
            steps.push(state.step);
        }
        assert_eq!(steps, vec![ChatStep::MinutesConfirmed]);
    }
}
