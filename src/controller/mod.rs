//! The conversation flow controller.
//!
//! A single actor task owns the [`Session`] and the [`ListenerManager`].
//! Every transition, whether requested by the UI through a
//! [`ControllerClient`] or reported by a finishing listener, goes through the
//! actor's queue, so no two transitions are ever in flight. Each listener runs
//! one flow (onboarding, navigation, interview, feedback selection, feedback
//! Q&A) and finishes with a [`ListenerOutcome`] naming its successor. While it
//! runs, every recorded utterance is mirrored into the session.

pub mod listener;

mod feedback;
mod interview;
mod navigation;
mod onboarding;

use crate::analysis::ReportAnalyzer;
use crate::config::{CoachConfig, ListenClass};
use crate::dialogue::{DialogueObserver, DialogueTerminator, DialogueUpdate, TurnEngine};
use crate::error::{CoachError, Result};
use crate::llm::LanguageModel;
use crate::persona::Persona;
use crate::runtime::{Presentation, ScreenId};
use crate::session::{Mode, Session, Transcript, UserId};
use crate::store::{InterviewKind, Persistence, ReportSummary};
use crate::voice::{Cue, Heard, VoiceIo};
use listener::{ListenerHandle, ListenerManager};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Spoken when a sub-dialogue is abandoned after a collaborator failure.
pub const APOLOGY: &str = "I'm sorry, something went wrong. Let's go back to the main menu.";

/// Spoken (if the speaker still works) when the microphone is lost.
pub const DEVICE_LOST: &str =
    "I can't hear you anymore. Please check your microphone and try again.";

// ── Collaborators ──────────────────────────────────────────────

/// Everything the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub voice: VoiceIo,
    pub model: Arc<dyn LanguageModel>,
    pub store: Arc<dyn Persistence>,
    pub ui: Arc<dyn Presentation>,
    pub analyzer: Arc<dyn ReportAnalyzer>,
    pub config: Arc<CoachConfig>,
}

/// What a flow needs while it runs inside a listener task.
#[derive(Clone)]
pub(crate) struct FlowContext {
    pub collab: Collaborators,
    pub user: UserId,
    progress: Arc<ProgressReporter>,
}

impl FlowContext {
    fn voice(&self) -> &VoiceIo {
        &self.collab.voice
    }

    fn ui(&self) -> &dyn Presentation {
        self.collab.ui.as_ref()
    }

    fn config(&self) -> &CoachConfig {
        &self.collab.config
    }

    fn engine(&self) -> TurnEngine {
        let progress: Arc<dyn DialogueObserver> = self.progress.clone();
        TurnEngine::new(
            self.collab.voice.clone(),
            Arc::clone(&self.collab.ui),
            self.collab.config.listen.clone(),
        )
        .with_observer(progress)
    }

    fn terminator(&self) -> DialogueTerminator {
        DialogueTerminator::new(self.collab.config.dialogue.clone())
    }

    /// One beep-and-listen for a one-shot flow.
    ///
    /// Recognition misses and recoverable audio errors yield `None`; device
    /// failures propagate.
    async fn listen_once(&self, class: ListenClass, beep: bool) -> Result<Option<Heard>> {
        if beep {
            self.voice().cue_best_effort(Cue::ListeningBeep).await;
        }
        match self.voice().hear(self.config().listen.window(class)).await {
            Ok(heard) => Ok(Some(heard)),
            Err(e) if e.is_recognition_miss() => Ok(None),
            Err(e) if e.is_recoverable_audio() => {
                warn!("audio error while listening: {e}");
                tokio::time::sleep(self.config().listen.recoverable_pause()).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

// ── Outcomes ───────────────────────────────────────────────────

/// The mode (and its data) a finishing listener hands control to.
#[derive(Debug, Clone, PartialEq)]
pub enum Successor {
    Onboarding,
    Navigation,
    Interview(InterviewKind),
    FeedbackSelect,
    FeedbackQa(Box<ReportSummary>),
}

impl Successor {
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::Onboarding => Mode::Onboarding,
            Self::Navigation => Mode::Navigation,
            Self::Interview(_) => Mode::Interview,
            Self::FeedbackSelect => Mode::FeedbackSelect,
            Self::FeedbackQa(_) => Mode::FeedbackQa,
        }
    }

    /// The successor for a mode that needs no extra data.
    #[must_use]
    pub fn for_mode(mode: Mode) -> Option<Self> {
        match mode {
            Mode::Onboarding => Some(Self::Onboarding),
            Mode::Navigation => Some(Self::Navigation),
            Mode::FeedbackSelect => Some(Self::FeedbackSelect),
            Mode::Welcome | Mode::Interview | Mode::FeedbackQa => None,
        }
    }
}

/// How a listener task ended.
#[derive(Debug, Default)]
pub struct ListenerOutcome {
    /// `None` after cancellation or a device failure.
    pub next: Option<Successor>,
}

impl ListenerOutcome {
    #[must_use]
    pub fn next(successor: Successor) -> Self {
        Self {
            next: Some(successor),
        }
    }

    /// No successor.
    #[must_use]
    pub fn halted() -> Self {
        Self::default()
    }
}

/// Run one flow to completion and turn its errors into an outcome.
async fn run_flow(
    ctx: FlowContext,
    successor: Successor,
    greeting: Option<String>,
    cancel: CancellationToken,
) -> ListenerOutcome {
    let mode = successor.mode();
    if let Some(greeting) = greeting {
        ctx.voice().say_best_effort(&greeting).await;
    }
    let result = match successor {
        Successor::Onboarding => onboarding::run(&ctx, &cancel).await,
        Successor::Navigation => navigation::run(&ctx, &cancel).await,
        Successor::Interview(kind) => interview::run(&ctx, kind, &cancel).await,
        Successor::FeedbackSelect => feedback::select(&ctx, &cancel).await,
        Successor::FeedbackQa(report) => feedback::discuss(&ctx, &report, &cancel).await,
    };
    match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_fatal_for_listener() => {
            error!(%mode, "listener stopped by device failure: {e}");
            ctx.ui().set_status("Microphone unavailable");
            ctx.voice().say_best_effort(DEVICE_LOST).await;
            ListenerOutcome::halted()
        }
        Err(e) => {
            warn!(%mode, "sub-dialogue abandoned: {e}");
            if cancel.is_cancelled() {
                return ListenerOutcome::halted();
            }
            ctx.ui().set_status("Something went wrong");
            ctx.voice().say_best_effort(APOLOGY).await;
            ListenerOutcome::next(Successor::Navigation)
        }
    }
}

// ── Requests ───────────────────────────────────────────────────

/// Read-only view of the session for UIs and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: UserId,
    pub mode: Mode,
    pub persona: Persona,
    pub turn_count: u32,
    pub transcript: Transcript,
    /// Mode of the most recently started listener, if it is still running.
    pub listening_in: Option<Mode>,
    /// The last listener ended without a successor (device failure) and
    /// nothing has been started since.
    pub awaiting_restart: bool,
}

enum ControlRequest {
    Login {
        user: UserId,
        display_name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Enter {
        successor: Successor,
        reply: oneshot::Sender<Result<()>>,
    },
    ShowScreen {
        screen: ScreenId,
        reply: oneshot::Sender<Result<()>>,
    },
    Restart {
        reply: oneshot::Sender<Result<()>>,
    },
    Logout {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<SessionSnapshot>>,
    },
}

/// Sent by a listener task to the actor, tagged with the listener id.
struct ListenerMessage {
    id: u64,
    event: ListenerEvent,
}

enum ListenerEvent {
    Progress(DialogueUpdate),
    Finished(ListenerOutcome),
}

/// Forwards a listener's dialogue updates to the actor.
struct ProgressReporter {
    id: u64,
    tx: mpsc::UnboundedSender<ListenerMessage>,
}

impl DialogueObserver for ProgressReporter {
    fn observe(&self, update: DialogueUpdate) {
        // The actor may already be gone at shutdown.
        let _ = self.tx.send(ListenerMessage {
            id: self.id,
            event: ListenerEvent::Progress(update),
        });
    }
}

/// Cloneable handle used by the UI to drive the controller.
#[derive(Clone)]
pub struct ControllerClient {
    request_tx: mpsc::Sender<ControlRequest>,
    running: Arc<AtomicUsize>,
}

impl ControllerClient {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.request_tx
            .send(build(reply))
            .await
            .map_err(|e| CoachError::Channel(format!("controller is not running: {e}")))?;
        response
            .await
            .map_err(|e| CoachError::Channel(format!("controller dropped the request: {e}")))
    }

    /// Create the session for `user` and start onboarding or navigation.
    pub async fn login(&self, user: UserId, display_name: impl Into<String>) -> Result<()> {
        let display_name = display_name.into();
        self.request(|reply| ControlRequest::Login {
            user,
            display_name,
            reply,
        })
        .await?
    }

    /// UI-initiated transition.
    pub async fn enter(&self, successor: Successor) -> Result<()> {
        self.request(|reply| ControlRequest::Enter { successor, reply })
            .await?
    }

    /// UI-initiated screen change; remembered as the last screen.
    pub async fn show_screen(&self, screen: ScreenId) -> Result<()> {
        self.request(|reply| ControlRequest::ShowScreen { screen, reply })
            .await?
    }

    /// Restart the listener of the current mode, e.g. after a device failure.
    pub async fn restart(&self) -> Result<()> {
        self.request(|reply| ControlRequest::Restart { reply }).await?
    }

    /// Stop listening and drop the session.
    pub async fn logout(&self) -> Result<()> {
        self.request(|reply| ControlRequest::Logout { reply }).await?
    }

    /// `None` when nobody is logged in.
    pub async fn snapshot(&self) -> Result<Option<SessionSnapshot>> {
        self.request(|reply| ControlRequest::Snapshot { reply }).await
    }

    /// Listener tasks currently running. Read directly, without a round trip.
    #[must_use]
    pub fn running_listeners(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

// ── Actor ──────────────────────────────────────────────────────

/// The actor. Run it with [`Controller::run`].
pub struct Controller {
    request_rx: mpsc::Receiver<ControlRequest>,
    listener_tx: mpsc::UnboundedSender<ListenerMessage>,
    listener_rx: mpsc::UnboundedReceiver<ListenerMessage>,
    collab: Collaborators,
    session: Option<Session>,
    listeners: ListenerManager,
    /// Flow of the current mode, kept for restarts.
    current: Option<Successor>,
    halted: bool,
}

/// Create a controller and its client.
#[must_use]
pub fn controller(request_capacity: usize, collab: Collaborators) -> (ControllerClient, Controller) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    let (listener_tx, listener_rx) = mpsc::unbounded_channel();
    let listeners = ListenerManager::new();
    let client = ControllerClient {
        request_tx,
        running: listeners.running_counter(),
    };
    let actor = Controller {
        request_rx,
        listener_tx,
        listener_rx,
        collab,
        session: None,
        listeners,
        current: None,
        halted: false,
    };
    (client, actor)
}

impl Controller {
    /// Serve requests until every client is dropped, then stop the listener.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.request_rx.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                Some(message) = self.listener_rx.recv() => self.handle_listener(message).await,
            }
        }
        self.listeners.stop_and_wait().await;
        info!("controller stopped");
    }

    async fn handle_request(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Login {
                user,
                display_name,
                reply,
            } => {
                let result = self.login(user, display_name).await;
                let _ = reply.send(result);
            }
            ControlRequest::Enter { successor, reply } => {
                let result = self.enter(successor, None).await;
                let _ = reply.send(result);
            }
            ControlRequest::ShowScreen { screen, reply } => {
                let result = self.show_screen(screen).await;
                let _ = reply.send(result);
            }
            ControlRequest::Restart { reply } => {
                let result = self.restart().await;
                let _ = reply.send(result);
            }
            ControlRequest::Logout { reply } => {
                self.logout().await;
                let _ = reply.send(Ok(()));
            }
            ControlRequest::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn handle_listener(&mut self, message: ListenerMessage) {
        if !self.listeners.is_current(message.id) {
            debug!(id = message.id, "ignoring message from a replaced listener");
            return;
        }
        match message.event {
            ListenerEvent::Progress(update) => {
                if let Some(session) = self.session.as_mut() {
                    session.record(update.utterance, update.turn_count);
                }
            }
            ListenerEvent::Finished(outcome) => self.handle_finished(outcome).await,
        }
    }

    async fn handle_finished(&mut self, outcome: ListenerOutcome) {
        self.listeners.stop_and_wait().await;

        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(next) = outcome.next else {
            warn!(mode = %session.mode(), "listener ended without a successor; waiting for a transition or restart");
            self.halted = true;
            return;
        };
        if let Err(e) = self.enter(next, None).await {
            error!("listener named an unreachable successor: {e}");
            if let Err(e) = self.enter(Successor::Navigation, None).await {
                error!("could not fall back to navigation: {e}");
            }
        }
    }

    async fn login(&mut self, user: UserId, display_name: String) -> Result<()> {
        if self.session.is_some() {
            self.logout().await;
        }
        let preferences = self.collab.store.load_preferences(&user).await?;
        info!(user = %user.0, onboarded = preferences.onboarding_complete, "login");
        self.session = Some(Session::new(user, display_name.clone()));

        if preferences.onboarding_complete {
            let screen = preferences.last_screen.unwrap_or(ScreenId::Main);
            self.collab.ui.show_screen(screen);
            self.enter(
                Successor::Navigation,
                Some(format!("Welcome back, {display_name}!")),
            )
            .await
        } else {
            self.collab.ui.show_screen(ScreenId::Welcome);
            self.enter(Successor::Onboarding, None).await
        }
    }

    /// Stop the current listener, transition, start the successor's listener.
    ///
    /// Invalid transitions are rejected before the running listener is
    /// touched.
    async fn enter(&mut self, successor: Successor, greeting: Option<String>) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(CoachError::Listener("no user is logged in".into()));
        };
        let mode = successor.mode();
        if !session.mode().can_transition_to(mode) {
            return Err(CoachError::InvalidTransition {
                from: session.mode().as_str(),
                to: mode.as_str(),
            });
        }

        self.listeners.stop_and_wait().await;
        session.transition(mode)?;
        if let Successor::Interview(kind) = &successor {
            session.assume_persona(Persona::for_interview(*kind));
        }
        self.collab.ui.mode_changed(mode);
        if mode == Mode::Navigation && greeting.is_none() {
            self.collab.ui.show_screen(ScreenId::Main);
        }
        self.start_flow(successor, greeting).await;
        Ok(())
    }

    async fn start_flow(&mut self, successor: Successor, greeting: Option<String>) {
        let Some(session) = &self.session else {
            return;
        };
        let collab = self.collab.clone();
        let user = session.user().clone();
        self.current = Some(successor.clone());
        self.halted = false;
        let listener_tx = self.listener_tx.clone();
        let mode = successor.mode();
        self.listeners
            .start(mode, move |handle: ListenerHandle| async move {
                let ctx = FlowContext {
                    collab,
                    user,
                    progress: Arc::new(ProgressReporter {
                        id: handle.id(),
                        tx: listener_tx.clone(),
                    }),
                };
                let outcome =
                    run_flow(ctx, successor, greeting, handle.cancellation().clone()).await;
                // The actor may already be gone at shutdown.
                let _ = listener_tx.send(ListenerMessage {
                    id: handle.id(),
                    event: ListenerEvent::Finished(outcome),
                });
            })
            .await;
    }

    async fn show_screen(&mut self, screen: ScreenId) -> Result<()> {
        let Some(session) = &self.session else {
            return Err(CoachError::Listener("no user is logged in".into()));
        };
        self.collab.ui.show_screen(screen);
        remember_screen(self.collab.store.as_ref(), session.user(), screen).await;
        Ok(())
    }

    async fn restart(&mut self) -> Result<()> {
        let (Some(session), Some(current)) = (self.session.as_mut(), self.current.clone()) else {
            return Err(CoachError::Listener("nothing to restart".into()));
        };
        info!(mode = %session.mode(), "restarting listener");
        self.listeners.stop_and_wait().await;
        session.reset_dialogue();
        self.start_flow(current, None).await;
        Ok(())
    }

    async fn logout(&mut self) {
        self.listeners.stop_and_wait().await;
        self.current = None;
        self.halted = false;
        if let Some(mut session) = self.session.take() {
            info!(user = %session.user().0, "logout");
            if let Err(e) = session.transition(Mode::Welcome) {
                warn!("logout transition failed: {e}");
            }
            self.collab.ui.mode_changed(Mode::Welcome);
        }
        self.collab.ui.show_screen(ScreenId::Welcome);
    }

    fn snapshot(&self) -> Option<SessionSnapshot> {
        let session = self.session.as_ref()?;
        let listening_in = self
            .listeners
            .active()
            .filter(|h| h.is_running())
            .map(ListenerHandle::mode);
        Some(SessionSnapshot {
            user: session.user().clone(),
            mode: session.mode(),
            persona: session.persona(),
            turn_count: session.turn_count(),
            transcript: session.transcript().clone(),
            listening_in,
            awaiting_restart: self.halted,
        })
    }
}

/// Persist `screen` as the user's last screen. Failures are logged only.
async fn remember_screen(store: &dyn Persistence, user: &UserId, screen: ScreenId) {
    let result = async {
        let mut preferences = store.load_preferences(user).await?;
        preferences.last_screen = Some(screen);
        store.update_preferences(user, &preferences).await
    }
    .await;
    if let Err(e) = result {
        warn!(screen = screen.as_str(), "could not remember last screen: {e}");
    }
}
