//! LiveCall - simulierter 1:1 Videoanruf
//!
//! Eine Call-Session mit festem Zeitlimit und ein geführter Chat:
//! - Geführter Flow: Paket wählen, Kontakt angeben, Hand-off Link öffnen
//! - Direct Call: Link mit `?seconds=` startet die Session sofort
//! - Lokale Kamera/Mikrofon Capture mit Mute/Kamera-Toggles
//! - Vorab aufgenommener Remote-Stream mit optional separater Tonspur
//! - Remote-Konfiguration pro Site aus SQLite

pub mod chat;
pub mod config;
pub mod link;
pub mod remote_config;
pub mod session;
pub mod simulated;

use chat::{ChatFlowController, ChatState, ChatStep, ContactChannel, Navigator, PACKAGES};
use config::AppConfig;
use parking_lot::Mutex;
use remote_config::{RemoteConfigSource, SiteMediaStore};
use session::{
    CallSessionController, DurationLimitResolver, MediaDevices, MediaElement, PreviewSurface,
    RemotePlayback, SessionEvent, SessionPhase, VideoEvent,
};
use simulated::{SimulatedDevices, SimulatedElement, SimulatedNavigator, SimulatedPreview};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use url::Url;

// ============================================================================
// PAGE
// ============================================================================

/// Externe Collaborators einer Page
pub struct PageServices {
    pub devices: Arc<dyn MediaDevices>,
    pub config_source: Arc<dyn RemoteConfigSource>,
    pub navigator: Arc<dyn Navigator>,
    pub preview: Arc<dyn PreviewSurface>,
    pub remote_video: Arc<dyn MediaElement>,
    pub remote_audio: Arc<dyn MediaElement>,
}

/// Modus einer Page, abhängig vom Entry Link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Entry Link mit gültiger Dauer: Session startet automatisch
    DirectCall,
    /// Kein gültiger `seconds` Parameter: geführter Chat
    GuidedFlow,
}

/// Eine geladene Seite mit Session-Controller und optionalem Chat
///
/// Besitzt den gesamten Session-State exklusiv; `dispose()` (oder Drop)
/// gibt alles genau einmal frei.
pub struct CallPage {
    entry: Url,
    mode: PageMode,
    resolver: Arc<DurationLimitResolver>,
    remote: Arc<RemotePlayback>,
    session: CallSessionController,
    chat: Option<ChatFlowController>,
    config_task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl CallPage {
    /// Lädt eine Seite für den Entry Link
    ///
    /// Startet den Config-Load im Hintergrund und im Direct Call Mode
    /// automatisch die Session.
    pub async fn open(entry: Url, config: &AppConfig, services: PageServices) -> Self {
        let resolver = Arc::new(DurationLimitResolver::from_entry_link(&entry));
        let mode = if resolver.has_explicit_duration() {
            PageMode::DirectCall
        } else {
            PageMode::GuidedFlow
        };
        let site_id = link::site_id(&entry);
        tracing::info!("Opening page {} ({:?}, site '{}')", entry, mode, site_id);

        let remote = Arc::new(RemotePlayback::new(
            services.remote_video,
            services.remote_audio,
            &config.placeholder_video,
        ));

        let session = CallSessionController::new(
            services.devices,
            Arc::clone(&resolver),
            services.preview,
            Some(Arc::clone(&remote)),
        );

        let chat = (mode == PageMode::GuidedFlow).then(|| {
            ChatFlowController::new(link::page_origin(&entry), config.pacing, services.navigator)
        });

        let config_task = tokio::spawn(load_remote_config(
            services.config_source,
            site_id,
            Arc::clone(&resolver),
            Arc::clone(&remote),
            config.placeholder_video.clone(),
        ));

        let page = Self {
            entry,
            mode,
            resolver,
            remote,
            session,
            chat,
            config_task: Mutex::new(Some(config_task)),
            disposed: AtomicBool::new(false),
        };

        if let Err(e) = page.session.init().await {
            tracing::warn!("Auto-start failed: {}", e);
        }
        page
    }

    pub fn entry(&self) -> &Url {
        &self.entry
    }

    pub fn mode(&self) -> PageMode {
        self.mode
    }

    pub fn resolver(&self) -> &DurationLimitResolver {
        &self.resolver
    }

    pub fn remote(&self) -> &RemotePlayback {
        &self.remote
    }

    pub fn session(&self) -> &CallSessionController {
        &self.session
    }

    /// Chat-Controller, nur im Guided Flow Mode vorhanden
    pub fn chat(&self) -> Option<&ChatFlowController> {
        self.chat.as_ref()
    }

    /// Wartet bis der Config-Load abgeschlossen ist
    pub async fn wait_for_config(&self) {
        let task = self.config_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::debug!("Remote config task did not complete: {}", e);
            }
        }
    }

    /// Teardown der Seite
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.config_task.lock().take() {
            task.abort();
        }
        if let Some(chat) = &self.chat {
            chat.dispose();
        }
        self.session.dispose();
        tracing::info!("Page {} disposed", self.entry);
    }
}

impl Drop for CallPage {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for CallPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallPage")
            .field("entry", &self.entry.as_str())
            .field("mode", &self.mode)
            .field("session", &self.session)
            .finish()
    }
}

/// Lädt die Remote-Konfiguration; Fehler und leere Ergebnisse ergeben Defaults
async fn load_remote_config(
    source: Arc<dyn RemoteConfigSource>,
    site_id: String,
    resolver: Arc<DurationLimitResolver>,
    remote: Arc<RemotePlayback>,
    placeholder_video: Url,
) {
    match source.fetch(&site_id).await {
        Ok(Some(config)) => {
            resolver.apply_remote(config.duration_limit());
            let media = config.resolve(&placeholder_video);
            remote.set_sources(&media.video_source, media.audio_source.as_ref());
        }
        Ok(None) => {
            tracing::debug!("No remote config for site '{}', using defaults", site_id);
        }
        Err(e) => {
            tracing::warn!(
                "Remote config for site '{}' unavailable, using defaults: {}",
                site_id,
                e
            );
        }
    }
}

// ============================================================================
// LOGGING
// ============================================================================

/// Initialisiert das Logging (mehrfacher Aufruf ist erlaubt)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("livecall_lib=debug,livecall=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============================================================================
// HEADLESS RUNNER
// ============================================================================

/// Startet die Anwendung mit simulierten Geräten
///
/// Erstes Argument ist der Entry Link (Default: der konfigurierte Origin).
pub fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let entry = match std::env::args().nth(1) {
        Some(raw) => Url::parse(&raw)?,
        None => config.origin.clone(),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_pages(config, entry))
}

/// Öffnet Seiten nacheinander; ein Hand-off Link wird zur nächsten Seite
async fn run_pages(config: AppConfig, mut entry: Url) -> anyhow::Result<()> {
    let store = Arc::new(SiteMediaStore::open(&config.db_path)?);
    let devices = Arc::new(SimulatedDevices::new());

    loop {
        let (link_tx, mut link_rx) = mpsc::unbounded_channel();
        let video = Arc::new(SimulatedElement::new());

        let services = PageServices {
            devices: devices.clone(),
            config_source: store.clone(),
            navigator: Arc::new(SimulatedNavigator::forwarding(link_tx)),
            preview: Arc::new(SimulatedPreview::default()),
            remote_video: video.clone(),
            remote_audio: Arc::new(SimulatedElement::new()),
        };

        let page = CallPage::open(entry.clone(), &config, services).await;
        let next = match page.mode() {
            PageMode::DirectCall => {
                run_session(&page, &video).await;
                None
            }
            PageMode::GuidedFlow => run_guided_flow(&page, &video, &mut link_rx).await?,
        };
        page.dispose();

        match next {
            Some(link) => entry = link,
            None => return Ok(()),
        }
    }
}

/// Läuft bis die Session endet (Limit, Ctrl-C oder Fehler beim Start)
async fn run_session(page: &CallPage, video: &SimulatedElement) {
    let session = page.session();
    let mut events = session.subscribe();

    if session.phase() != SessionPhase::Active {
        if let Some(message) = session.snapshot().permission_error {
            println!("{}", message);
        }
        return;
    }
    println!(
        "In call. Limit {}s. Press Ctrl-C to hang up.",
        session.snapshot().limit_seconds
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Tick { elapsed_seconds, limit_seconds }) => {
                    let position = video.advance(1.0);
                    page.remote().on_video_event(VideoEvent::TimeUpdate(position));
                    println!("{:>5}s / {}s", elapsed_seconds, limit_seconds);
                }
                Ok(SessionEvent::Ended { .. }) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                session.end(Some("interrupted"));
                break;
            }
        }
    }
    println!("Call ended.");
}

/// Liest Chat-Kommandos von stdin bis ein Hand-off Link geöffnet wird
async fn run_guided_flow(
    page: &CallPage,
    video: &SimulatedElement,
    link_rx: &mut mpsc::UnboundedReceiver<Url>,
) -> anyhow::Result<Option<Url>> {
    let Some(chat) = page.chat() else {
        return Ok(None);
    };

    let mut states = chat.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_step = None;
    render_chat(&chat.state(), &mut last_step);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(None);
                };
                match line.trim() {
                    "quit" | "exit" => return Ok(None),
                    "call" => {
                        if let Err(e) = page.session().start().await {
                            println!("Could not start call: {}", e);
                        }
                        run_session(page, video).await;
                    }
                    "state" => {
                        println!("{}", serde_json::to_string_pretty(&chat.state())?);
                        println!("{}", serde_json::to_string_pretty(&page.session().snapshot())?);
                    }
                    command => apply_chat_command(chat, command),
                }
            }
            state = states.recv() => {
                if let Ok(state) = state {
                    render_chat(&state, &mut last_step);
                }
            }
            link = link_rx.recv() => {
                if let Some(link) = link {
                    println!("Opening {}", link);
                    return Ok(Some(link));
                }
            }
        }
    }
}

fn apply_chat_command(chat: &ChatFlowController, command: &str) {
    let (verb, arg) = command
        .split_once(char::is_whitespace)
        .map(|(v, a)| (v, a.trim()))
        .unwrap_or((command, ""));

    match verb {
        "package" => {
            chat.select_package(arg);
        }
        "channel" => match arg.parse::<ContactChannel>() {
            Ok(channel) => {
                chat.select_channel(channel);
            }
            Err(e) => println!("{}", e),
        },
        "contact" => {
            chat.set_contact_value(arg);
        }
        "continue" => {
            chat.confirm_contact();
        }
        "back" => {
            chat.back();
        }
        "generate" => {
            chat.generate();
        }
        "another" => {
            chat.create_another();
        }
        "" => {}
        other => println!(
            "Unknown command '{}'. Try: package, channel, contact, continue, back, generate, another, call, state, quit",
            other
        ),
    }
}

fn render_chat(state: &ChatState, last_step: &mut Option<ChatStep>) {
    if *last_step == Some(state.step) {
        return;
    }
    *last_step = Some(state.step);

    if state.composing {
        println!("...");
        return;
    }
    if let Some(prompt) = state.step.prompt() {
        println!("{}", prompt);
    }
    match state.step {
        ChatStep::Intro | ChatStep::Minutes => {
            for package in PACKAGES.iter() {
                println!(
                    "  package {:<6} {} ({})",
                    package.id,
                    package.label,
                    package.price_display()
                );
            }
        }
        ChatStep::Contact => {
            for channel in ContactChannel::ALL {
                println!("  channel {:<9} e.g. {}", channel.label().to_lowercase(), channel.placeholder());
            }
        }
        ChatStep::Summary => {
            if let Some(package) = state.package {
                println!("  Package: {} ({})", package.label, package.price_display());
            }
            if let Some(channel) = state.channel {
                println!("  {}: {}", channel, state.contact_value.trim());
            }
            println!("  generate | back");
        }
        _ => {}
    }
}

// ============================================================================
// TESTS
// ============================================================================
