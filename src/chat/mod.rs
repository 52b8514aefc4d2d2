//! Chat Module - geführter Paket-Flow
//!
//! Dieses Modul verwaltet:
//! - Den festen Paket-Katalog und die Kontakt-Kanäle
//! - Die reine Chat-Zustandsmaschine (State + Event -> State + Effekte)
//! - Den Controller, der Typing-Pausen plant und den Hand-off Link öffnet

mod catalog;
mod controller;
mod flow;

pub use catalog::{find_package, ContactChannel, Package, PACKAGES};
pub use controller::{ChatFlowController, Navigator, PacingDelay};
pub use flow::{transition, ChatEffect, ChatEvent, ChatState, ChatStep, Transition};
