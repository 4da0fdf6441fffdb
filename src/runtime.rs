//! Presentation events emitted by the controller for UI and observability.
//!
//! Everything here is fire-and-forget: a slow or absent UI never blocks a
//! listener.

use crate::session::{Mode, Role};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Screens the presentation layer can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenId {
    Welcome,
    Main,
    Interview,
    Feedback,
}

impl ScreenId {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Main => "main",
            Self::Interview => "interview",
            Self::Feedback => "feedback",
        }
    }
}

/// Events describing what the controller is doing right now.
#[derive(Debug, Clone, PartialEq)]
pub enum CoachEvent {
    /// Short human-readable status line.
    Status(String),
    /// A screen should be shown.
    Screen(ScreenId),
    /// A line to append to the visible transcript.
    TranscriptLine { role: Role, text: String },
    /// The session entered a new mode.
    ModeChanged(Mode),
}

/// Visual presentation collaborator.
pub trait Presentation: Send + Sync {
    fn set_status(&self, status: &str);
    fn show_screen(&self, screen: ScreenId);
    fn append_transcript_line(&self, role: Role, text: &str);

    /// Called after every successful transition.
    fn mode_changed(&self, _mode: Mode) {}
}

/// [`Presentation`] that republishes everything on a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastPresentation {
    tx: broadcast::Sender<CoachEvent>,
}

impl BroadcastPresentation {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoachEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: CoachEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastPresentation {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Presentation for BroadcastPresentation {
    fn set_status(&self, status: &str) {
        tracing::debug!(%status, "status");
        self.emit(CoachEvent::Status(status.to_owned()));
    }

    fn show_screen(&self, screen: ScreenId) {
        self.emit(CoachEvent::Screen(screen));
    }

    fn append_transcript_line(&self, role: Role, text: &str) {
        self.emit(CoachEvent::TranscriptLine {
            role,
            text: text.to_owned(),
        });
    }

    fn mode_changed(&self, mode: Mode) {
        self.emit(CoachEvent::ModeChanged(mode));
    }
}
