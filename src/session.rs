//! Session state: current mode, persona, turn counter and the transcript of
//! the sub-dialogue in progress.
//!
//! The mode graph:
//!
//! ```text
//! Welcome ──login──▶ Onboarding ──complete──▶ Navigation
//!    │                                         ▲   │   │
//!    └──────────login (onboarded)──────────────┘   │   │
//!                        Interview ◀───start───────┘   │
//!                            │                         │
//!                            └──────▶ Navigation ◀──┐  ▼
//!                                    FeedbackQa ◀── FeedbackSelect
//! ```
//!
//! Any mode may return to `Navigation` (the fallback listener) or to
//! `Welcome` (logout).

use crate::config::ListenClass;
use crate::error::{CoachError, Result};
use crate::persona::Persona;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder user utterance used once the listen retry budget is exhausted.
pub const SENTINEL_UTTERANCE: &str = "...";

/// Opaque reference to the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Controller mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Profile selection; no listener runs.
    #[default]
    Welcome,
    /// First-run conversational onboarding.
    Onboarding,
    /// One-shot voice command loop.
    Navigation,
    /// Mock interview sub-dialogue.
    Interview,
    /// Choosing a past feedback report by spoken reference.
    FeedbackSelect,
    /// Discussing a selected feedback report.
    FeedbackQa,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Onboarding => "onboarding",
            Self::Navigation => "navigation",
            Self::Interview => "interview",
            Self::FeedbackSelect => "feedback_select",
            Self::FeedbackQa => "feedback_qa",
        }
    }

    /// Listen window class used by this mode's listener.
    ///
    /// `Welcome` never listens; it reports `Command` for completeness.
    #[must_use]
    pub fn listen_class(self) -> ListenClass {
        match self {
            Self::Onboarding | Self::Interview | Self::FeedbackQa => ListenClass::Answer,
            Self::Welcome | Self::Navigation | Self::FeedbackSelect => ListenClass::Command,
        }
    }

    /// Whether the session state machine allows `self → next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match next {
            Self::Welcome | Self::Navigation => true,
            Self::Onboarding => self == Self::Welcome,
            Self::Interview => self == Self::Navigation,
            Self::FeedbackSelect => matches!(self, Self::Navigation | Self::FeedbackQa),
            Self::FeedbackQa => self == Self::FeedbackSelect,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
        }
    }
}

/// One line of dialogue. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    role: Role,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spoken_duration_seconds: Option<f64>,
}

impl Utterance {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            spoken_duration_seconds: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// The placeholder used when the user stayed silent through every retry.
    #[must_use]
    pub fn sentinel() -> Self {
        Self::new(Role::User, SENTINEL_UTTERANCE)
    }

    /// Attach how long the user spoke for.
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.spoken_duration_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn spoken_duration_seconds(&self) -> Option<f64> {
        self.spoken_duration_seconds
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.role == Role::User && self.text == SENTINEL_UTTERANCE
    }
}

/// Append-only, insertion-ordered record of a sub-dialogue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    utterances: Vec<Utterance>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_utterances(utterances: Vec<Utterance>) -> Self {
        Self { utterances }
    }

    pub fn push(&mut self, utterance: Utterance) {
        self.utterances.push(utterance);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Utterance> {
        self.utterances.iter()
    }

    /// Most recent user utterance that is not the silence sentinel.
    #[must_use]
    pub fn last_user_text(&self) -> Option<&str> {
        self.utterances
            .iter()
            .rev()
            .find(|u| u.role == Role::User && !u.is_sentinel())
            .map(Utterance::text)
    }

    /// Most recent assistant utterance.
    #[must_use]
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.utterances
            .iter()
            .rev()
            .find(|u| u.role == Role::Assistant)
            .map(Utterance::text)
    }

    /// The two most recent assistant utterances, oldest first.
    #[must_use]
    pub fn last_two_assistant(&self) -> Option<(&str, &str)> {
        let mut recent = self
            .utterances
            .iter()
            .rev()
            .filter(|u| u.role == Role::Assistant)
            .map(Utterance::text);
        let newest = recent.next()?;
        let previous = recent.next()?;
        Some((previous, newest))
    }

    /// Number of validated (non-sentinel) user utterances.
    #[must_use]
    pub fn validated_user_turns(&self) -> usize {
        self.utterances
            .iter()
            .filter(|u| u.role == Role::User && !u.is_sentinel())
            .count()
    }

    pub fn clear(&mut self) {
        self.utterances.clear();
    }
}

/// The single controller-owned session for the logged-in user.
#[derive(Debug, Clone)]
pub struct Session {
    mode: Mode,
    user: UserId,
    display_name: String,
    persona: Persona,
    turn_count: u32,
    transcript: Transcript,
}

impl Session {
    /// Create a session at login. The session starts in `Welcome`.
    pub fn new(user: UserId, display_name: impl Into<String>) -> Self {
        Self {
            mode: Mode::Welcome,
            user,
            display_name: display_name.into(),
            persona: Persona::for_mode(Mode::Welcome),
            turn_count: 0,
            transcript: Transcript::new(),
        }
    }

    /// Move to `next`. The only mutator of `mode`.
    ///
    /// Callers must have stopped the previous listener first. Resets the turn
    /// counter and transcript and selects the mode's default persona.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::InvalidTransition`] if the mode graph forbids it.
    pub fn transition(&mut self, next: Mode) -> Result<()> {
        if !self.mode.can_transition_to(next) {
            return Err(CoachError::InvalidTransition {
                from: self.mode.as_str(),
                to: next.as_str(),
            });
        }
        tracing::info!(from = %self.mode, to = %next, "session transition");
        self.mode = next;
        self.persona = Persona::for_mode(next);
        self.turn_count = 0;
        self.transcript.clear();
        Ok(())
    }

    /// Select a persona within the current mode (e.g. salary vs background interview).
    pub fn assume_persona(&mut self, persona: Persona) {
        self.persona = persona;
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn persona(&self) -> Persona {
        self.persona
    }

    #[must_use]
    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Mirror one utterance of the running sub-dialogue.
    ///
    /// `turn_count` is the listener's validated-turn count after the
    /// utterance; it never moves backwards within a mode.
    pub fn record(&mut self, utterance: Utterance, turn_count: u32) {
        self.transcript.push(utterance);
        self.turn_count = self.turn_count.max(turn_count);
    }

    /// Forget the sub-dialogue without changing mode (listener restart).
    pub fn reset_dialogue(&mut self) {
        self.transcript.clear();
        self.turn_count = 0;
    }
}
