//! One-shot voice command classification.
//!
//! A transcript is classified by the model into a closed set of [`Command`]s.
//! Matching against the literal names is exact and case-sensitive after the
//! completion is reduced to a bare label; anything else is `Unknown`.
//!
//! What each command does is described by [`CommandEffect`] and carried out
//! by the controller's navigation flow.

use crate::config::LlmConfig;
use crate::error::Result;
use crate::llm::{self, CompletionRequest, LanguageModel};
use crate::persona;
use crate::runtime::ScreenId;
use crate::session::Mode;
use crate::store::InterviewKind;
use std::fmt;

/// Voice commands available in navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    GotoInterview,
    GotoFeedback,
    Explain,
    StartBackgroundInterview,
    StartSalaryInterview,
    Unknown,
}

/// Signals raised by sub-dialogues rather than by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    OnboardingComplete,
}

/// What dispatching a command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEffect {
    /// Show a screen; the mode does not change.
    ShowScreen(ScreenId),
    /// Transition to another mode.
    Enter(Mode),
    /// Transition to an interview with the given persona.
    StartInterview(InterviewKind),
    /// Play the spoken instructions.
    Instructions,
    /// Play the "not understood" cue.
    NotUnderstood,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Self::GotoInterview,
        Self::GotoFeedback,
        Self::Explain,
        Self::StartBackgroundInterview,
        Self::StartSalaryInterview,
        Self::Unknown,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GotoInterview => "GOTO_INTERVIEW",
            Self::GotoFeedback => "GOTO_FEEDBACK",
            Self::Explain => "EXPLAIN",
            Self::StartBackgroundInterview => "START_BACKGROUND_INTERVIEW",
            Self::StartSalaryInterview => "START_SALARY_INTERVIEW",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Exact, case-sensitive match against the literal names.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == label)
            .unwrap_or(Self::Unknown)
    }

    #[must_use]
    pub fn effect(self) -> CommandEffect {
        match self {
            Self::GotoInterview => CommandEffect::ShowScreen(ScreenId::Interview),
            Self::GotoFeedback => CommandEffect::Enter(Mode::FeedbackSelect),
            Self::Explain => CommandEffect::Instructions,
            Self::StartBackgroundInterview => CommandEffect::StartInterview(InterviewKind::Background),
            Self::StartSalaryInterview => CommandEffect::StartInterview(InterviewKind::Salary),
            Self::Unknown => CommandEffect::NotUnderstood,
        }
    }

    /// Spoken acknowledgement emitted on dispatch.
    #[must_use]
    pub fn acknowledgement(self) -> &'static str {
        match self {
            Self::GotoInterview => "Okay, showing the Interview Screen.",
            Self::GotoFeedback => "Okay, let's look at your feedback reports.",
            Self::Explain => "Here is how this works.",
            Self::StartBackgroundInterview => "Great, let's start a background interview.",
            Self::StartSalaryInterview => "Great, let's practise a salary negotiation.",
            Self::Unknown => "I'm sorry, I didn't understand that command.",
        }
    }

    /// Status line emitted on dispatch.
    #[must_use]
    pub fn status(self) -> &'static str {
        match self {
            Self::GotoInterview => "Interview screen",
            Self::GotoFeedback => "Choosing a feedback report",
            Self::Explain => "Playing instructions",
            Self::StartBackgroundInterview => "Background interview",
            Self::StartSalaryInterview => "Salary negotiation",
            Self::Unknown => "Command not understood",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ControlSignal {
    #[must_use]
    pub fn acknowledgement(self) -> &'static str {
        match self {
            Self::OnboardingComplete => "Thank you. One moment while I set up your profile.",
        }
    }
}

/// Classify a transcript with the model.
///
/// # Errors
///
/// Propagates model invocation failures. An unparseable answer is not an
/// error; it classifies as [`Command::Unknown`].
pub async fn classify(model: &dyn LanguageModel, llm_config: &LlmConfig, text: &str) -> Result<Command> {
    let request = CompletionRequest::classify(persona::command_prompt(text), llm_config);
    let label = llm::complete_label(model, &request).await?;
    let command = Command::parse(&label);
    tracing::info!(%text, %label, %command, "classified command");
    Ok(command)
}
