//! Sub-dialogue termination.
//!
//! The model never says "I am done" reliably, so the end of a sub-dialogue
//! is inferred. [`DialogueTerminator::should_end`] applies the rules in a
//! fixed priority order; the first rule that decides wins:
//!
//! 1. **Floor**: below the kind's minimum turn count, never end.
//! 2. **Conclusion**: the latest user utterance contains a conclusion phrase,
//!    or the latest assistant utterance carries the onboarding end marker.
//! 3. **Stagnation**: the two most recent assistant utterances have a word-set
//!    Jaccard similarity strictly above the threshold.
//! 4. **Ceiling**: the turn count reached the kind's maximum.
//!
//! Feedback Q&A skips rules 3 and 4 and instead asks the model whether the
//! user wants to stop ([`ClassifierEnd`]).

use crate::config::{DialogueConfig, LlmConfig, TurnLimits};
use crate::llm::sanitize::normalize_for_matching;
use crate::llm::{self, CompletionRequest, LanguageModel};
use crate::persona::{self, END_ONBOARDING_MARKER};
use crate::session::{Role, Transcript};
use crate::store::InterviewKind;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Which sub-dialogue is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogueKind {
    Onboarding,
    BackgroundInterview,
    SalaryInterview,
    FeedbackQa,
}

impl DialogueKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::BackgroundInterview => "background_interview",
            Self::SalaryInterview => "salary_interview",
            Self::FeedbackQa => "feedback_qa",
        }
    }

    /// Turn limits for this kind.
    #[must_use]
    pub fn limits(self, config: &DialogueConfig) -> TurnLimits {
        match self {
            Self::Onboarding => config.onboarding,
            Self::BackgroundInterview => config.background_interview,
            Self::SalaryInterview => config.salary_interview,
            Self::FeedbackQa => config.feedback_qa,
        }
    }

    #[must_use]
    pub fn for_interview(kind: InterviewKind) -> Self {
        match kind {
            InterviewKind::Background => Self::BackgroundInterview,
            InterviewKind::Salary => Self::SalaryInterview,
        }
    }

    /// Whether rules 3 and 4 are replaced by the end-intent classifier.
    #[must_use]
    pub fn uses_intent_classifier(self) -> bool {
        matches!(self, Self::FeedbackQa)
    }
}

impl fmt::Display for DialogueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a sub-dialogue ended, or why it did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Rule 1 held the dialogue open.
    MinimumTurnsNotReached,
    /// No rule fired.
    NoSignal,
    /// Rule 2: the user said a conclusion phrase.
    ConclusionPhrase,
    /// Rule 2: the assistant emitted the onboarding end marker.
    CompletionMarker,
    /// Rule 3: near-identical consecutive assistant output.
    Stagnation,
    /// Rule 4: per-kind turn ceiling.
    TurnCeiling,
    /// Rule 5: the classifier judged the user wants to stop.
    EndIntent,
    /// The model returned an empty completion.
    ModelConcluded,
    /// The user stayed silent through too many consecutive rounds.
    UserSilent,
    /// The listener was cancelled by a transition.
    Cancelled,
}

impl EndReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MinimumTurnsNotReached => "minimum turns not reached",
            Self::NoSignal => "no end signal",
            Self::ConclusionPhrase => "conclusion phrase",
            Self::CompletionMarker => "completion marker",
            Self::Stagnation => "stagnation",
            Self::TurnCeiling => "turn ceiling",
            Self::EndIntent => "end intent",
            Self::ModelConcluded => "model concluded",
            Self::UserSilent => "user silent",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a termination check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndDecision {
    pub end: bool,
    pub reason: EndReason,
}

impl EndDecision {
    #[must_use]
    pub fn end(reason: EndReason) -> Self {
        Self { end: true, reason }
    }

    #[must_use]
    pub fn carry_on(reason: EndReason) -> Self {
        Self { end: false, reason }
    }
}

/// Jaccard similarity of the lowercase word sets of `a` and `b`.
///
/// 1.0 for identical sets, 0.0 for disjoint sets or when either side has no
/// words.
#[must_use]
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_for_matching(a);
    let nb = normalize_for_matching(b);
    let sa: HashSet<&str> = na.split_whitespace().collect();
    let sb: HashSet<&str> = nb.split_whitespace().collect();
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    intersection as f64 / union as f64
}

/// Heuristic termination rules.
#[derive(Debug, Clone)]
pub struct DialogueTerminator {
    config: DialogueConfig,
    phrases: Vec<String>,
}

impl DialogueTerminator {
    pub fn new(config: DialogueConfig) -> Self {
        let phrases = config
            .conclusion_phrases
            .iter()
            .map(|p| normalize_for_matching(p))
            .filter(|p| !p.is_empty())
            .collect();
        Self { config, phrases }
    }

    #[must_use]
    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    /// Apply rules 1–4 (rules 1–2 only for classifier-terminated kinds).
    #[must_use]
    pub fn should_end(&self, transcript: &Transcript, kind: DialogueKind, turn_count: u32) -> EndDecision {
        let limits = kind.limits(&self.config);

        if turn_count < limits.min_turns {
            return EndDecision::carry_on(EndReason::MinimumTurnsNotReached);
        }

        if let Some(reason) = self.conclusion_signal(transcript) {
            return EndDecision::end(reason);
        }

        if kind.uses_intent_classifier() {
            return EndDecision::carry_on(EndReason::NoSignal);
        }

        if let Some((previous, latest)) = transcript.last_two_assistant() {
            let similarity = jaccard_similarity(previous, latest);
            if similarity > self.config.stagnation_threshold {
                tracing::info!(similarity, %kind, "assistant output stagnated");
                return EndDecision::end(EndReason::Stagnation);
            }
        }

        if let Some(max) = limits.max_turns
            && turn_count >= max
        {
            return EndDecision::end(EndReason::TurnCeiling);
        }

        EndDecision::carry_on(EndReason::NoSignal)
    }

    fn conclusion_signal(&self, transcript: &Transcript) -> Option<EndReason> {
        let latest_user = transcript.iter().rev().find(|u| u.role() == Role::User);
        if let Some(user) = latest_user {
            let padded = format!(" {} ", normalize_for_matching(user.text()));
            if self
                .phrases
                .iter()
                .any(|p| padded.contains(&format!(" {p} ")))
            {
                return Some(EndReason::ConclusionPhrase);
            }
        }
        transcript
            .last_assistant_text()
            .filter(|t| t.contains(END_ONBOARDING_MARKER))
            .map(|_| EndReason::CompletionMarker)
    }
}

/// A sub-dialogue's termination policy, consulted after every turn.
#[async_trait]
pub trait EndCondition: Send + Sync {
    async fn check(&self, transcript: &Transcript, turn_count: u32) -> EndDecision;
}

/// Rules 1–4 for a fixed kind.
#[derive(Debug, Clone)]
pub struct HeuristicEnd {
    terminator: DialogueTerminator,
    kind: DialogueKind,
}

impl HeuristicEnd {
    pub fn new(terminator: DialogueTerminator, kind: DialogueKind) -> Self {
        Self { terminator, kind }
    }
}

#[async_trait]
impl EndCondition for HeuristicEnd {
    async fn check(&self, transcript: &Transcript, turn_count: u32) -> EndDecision {
        self.terminator.should_end(transcript, self.kind, turn_count)
    }
}

/// Rules 1–2, then a yes/no model call on the user's latest words.
pub struct ClassifierEnd {
    terminator: DialogueTerminator,
    model: Arc<dyn LanguageModel>,
    llm: LlmConfig,
}

impl ClassifierEnd {
    pub fn new(terminator: DialogueTerminator, model: Arc<dyn LanguageModel>, llm: LlmConfig) -> Self {
        Self {
            terminator,
            model,
            llm,
        }
    }
}

#[async_trait]
impl EndCondition for ClassifierEnd {
    async fn check(&self, transcript: &Transcript, turn_count: u32) -> EndDecision {
        let decision = self
            .terminator
            .should_end(transcript, DialogueKind::FeedbackQa, turn_count);
        if decision.end || decision.reason == EndReason::MinimumTurnsNotReached {
            return decision;
        }
        let Some(latest) = transcript.last_user_text() else {
            return decision;
        };
        let request = CompletionRequest::classify(persona::end_intent_prompt(latest), &self.llm);
        match llm::complete_label(self.model.as_ref(), &request).await {
            Ok(label) if label.eq_ignore_ascii_case("yes") => EndDecision::end(EndReason::EndIntent),
            Ok(_) => decision,
            Err(e) => {
                tracing::warn!("end-intent classification failed, continuing: {e}");
                decision
            }
        }
    }
}
