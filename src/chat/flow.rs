//! Chat Flow - reine Zustandsmaschine
//!
//! `transition(state, event) -> (state, effects)` ohne Seiteneffekte.
//! Timer und Navigation werden als `ChatEffect` zurückgegeben und vom
//! `ChatFlowController` ausgeführt.

use super::catalog::{self, ContactChannel, Package};
use crate::link;
use serde::{Deserialize, Serialize};
use url::Url;

// ============================================================================
// STEPS
// ============================================================================

/// Schritte des Chats in fester Vorwärts-Reihenfolge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStep {
    Intro,
    Minutes,
    MinutesConfirmed,
    ContactTyping,
    Contact,
    ContactConfirmed,
    SummaryTyping,
    Summary,
    Finished,
}

impl ChatStep {
    /// Transiente "Typing"-Schritte laufen zeitgesteuert weiter
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ChatStep::MinutesConfirmed
                | ChatStep::ContactTyping
                | ChatStep::ContactConfirmed
                | ChatStep::SummaryTyping
        )
    }

    /// Nächster Schritt nach Ablauf der Typing-Pause
    fn after_composing(self) -> Option<ChatStep> {
        match self {
            ChatStep::MinutesConfirmed => Some(ChatStep::ContactTyping),
            ChatStep::ContactTyping => Some(ChatStep::Contact),
            ChatStep::ContactConfirmed => Some(ChatStep::SummaryTyping),
            ChatStep::SummaryTyping => Some(ChatStep::Summary),
            _ => None,
        }
    }

    /// Nachricht die der Chat in diesem Schritt zeigt
    pub fn prompt(self) -> Option<&'static str> {
        match self {
            ChatStep::Intro => Some("Hi! How long would you like to talk? Pick a package."),
            ChatStep::Minutes => Some("Pick a package."),
            ChatStep::Contact => Some("Where should we send your call link?"),
            ChatStep::Summary => Some("Please check your details."),
            ChatStep::Finished => Some("Your call link is open. Enjoy the call!"),
            _ => None,
        }
    }
}

// ============================================================================
// STATE, EVENTS, EFFECTS
// ============================================================================

/// Aktueller Stand des Chats
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatState {
    pub step: ChatStep,
    pub package: Option<Package>,
    pub channel: Option<ContactChannel>,
    pub contact_value: String,
    pub composing: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            step: ChatStep::Intro,
            package: None,
            channel: None,
            contact_value: String::new(),
            composing: false,
        }
    }
}

impl ChatState {
    /// "Continue" ist nur mit Kanal und nicht-leerem Kontakt aktiv
    pub fn can_continue(&self) -> bool {
        self.channel.is_some() && !self.contact_value.trim().is_empty()
    }

    /// "Generate" ist nur in der Zusammenfassung mit Paket aktiv
    pub fn can_generate(&self) -> bool {
        self.step == ChatStep::Summary && self.package.is_some()
    }
}

/// Eingaben in die Zustandsmaschine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    SelectPackage(String),
    /// Typing-Pause des angegebenen Schritts abgelaufen
    ComposingElapsed(ChatStep),
    SelectChannel(ContactChannel),
    EditContact(String),
    Continue,
    Back,
    Generate,
    CreateAnother,
}

/// Vom Controller auszuführende Seiteneffekte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEffect {
    /// Typing-Pause für diesen Schritt starten
    StartComposing(ChatStep),
    /// Hand-off Link als neue Navigation öffnen
    OpenLink(Url),
}

/// Ergebnis eines Übergangs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ChatState,
    pub effects: Vec<ChatEffect>,
}

impl Transition {
    fn unchanged(state: &ChatState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }

    fn enter(mut state: ChatState, step: ChatStep) -> Self {
        state.step = step;
        state.composing = step.is_transient();
        let effects = if state.composing {
            vec![ChatEffect::StartComposing(step)]
        } else {
            Vec::new()
        };
        Self { state, effects }
    }
}

// ============================================================================
// TRANSITION
// ============================================================================

/// Berechnet den Folgezustand
///
/// Events die im aktuellen Schritt nicht erlaubt sind, lassen den State
/// unverändert und erzeugen keine Effekte.
pub fn transition(state: &ChatState, event: ChatEvent, origin: &Url) -> Transition {
    use ChatStep::*;

    match (state.step, event) {
        (Intro | Minutes, ChatEvent::SelectPackage(id)) => match catalog::find_package(&id) {
            Some(package) => {
                let mut next = state.clone();
                next.package = Some(package);
                Transition::enter(next, MinutesConfirmed)
            }
            None => {
                tracing::debug!("Ignoring unknown package '{}'", id);
                Transition::unchanged(state)
            }
        },

        (step, ChatEvent::ComposingElapsed(scheduled)) if step == scheduled => {
            match step.after_composing() {
                Some(next_step) => Transition::enter(state.clone(), next_step),
                None => Transition::unchanged(state),
            }
        }

        (Contact, ChatEvent::SelectChannel(channel)) => {
            let mut next = state.clone();
            next.channel = Some(channel);
            Transition { state: next, effects: Vec::new() }
        }

        (Contact, ChatEvent::EditContact(value)) if state.channel.is_some() => {
            let mut next = state.clone();
            next.contact_value = value;
            Transition { state: next, effects: Vec::new() }
        }

        (Contact, ChatEvent::Continue) if state.can_continue() => {
            Transition::enter(state.clone(), ContactConfirmed)
        }

        (Contact, ChatEvent::Back) => Transition::enter(state.clone(), Minutes),

        (Summary, ChatEvent::Back) => Transition::enter(state.clone(), Contact),

        (Summary, ChatEvent::Generate) => {
            let Some(package) = state.package else {
                tracing::error!("Generate requested without a selected package");
                return Transition::unchanged(state);
            };
            let link = link::handoff_link(origin, package.seconds());
            tracing::info!(
                "Generated hand-off link for {} via {:?}: {}",
                package.label,
                state.channel,
                link
            );
            let mut transition = Transition::enter(state.clone(), Finished);
            transition.effects.push(ChatEffect::OpenLink(link));
            transition
        }

        (Finished, ChatEvent::CreateAnother) => {
            let next = ChatState {
                step: Minutes,
                ..ChatState::default()
            };
            Transition::enter(next, Minutes)
        }

        (step, event) => {
            tracing::debug!("Ignoring {:?} in step {:?}", event, step);
            Transition::unchanged(state)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
