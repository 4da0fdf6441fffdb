//! Persistence collaborator: conversation history, preferences and
//! interview reports.
//!
//! [`Persistence`] is the seam; [`memory::InMemoryStore`] is the bundled
//! implementation used by the console harness and tests.

pub mod memory;

use crate::error::{CoachError, Result};
use crate::runtime::ScreenId;
use crate::session::{UserId, Utterance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Preferences ────────────────────────────────────────────────

/// Structured onboarding profile produced by the summariser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSummary {
    pub interests: Vec<String>,
    pub goals: Vec<String>,
    pub challenges: Vec<String>,
}

impl ProfileSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interests.is_empty() && self.goals.is_empty() && self.challenges.is_empty()
    }

    fn cleaned(self) -> Self {
        let clean = |v: Vec<String>| -> Vec<String> {
            v.into_iter()
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            interests: clean(self.interests),
            goals: clean(self.goals),
            challenges: clean(self.challenges),
        }
    }
}

/// Per-user preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub onboarding_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_screen: Option<ScreenId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_summary: Option<ProfileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_summary: Option<String>,
}

impl Preferences {
    /// Parse a stored preferences blob, normalising blank entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Persistence`] if the blob is not valid JSON for
    /// this record.
    pub fn from_json(raw: &str) -> Result<Self> {
        let prefs: Self = serde_json::from_str(raw)
            .map_err(|e| CoachError::Persistence(format!("invalid preferences record: {e}")))?;
        Ok(prefs.validated())
    }

    /// Serialise for storage.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Persistence`] on serialisation failure.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| CoachError::Persistence(format!("cannot encode preferences: {e}")))
    }

    /// Drop blank strings and empty profiles.
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.profile_summary = self
            .profile_summary
            .map(ProfileSummary::cleaned)
            .filter(|p| !p.is_empty());
        self.narrative_summary = self
            .narrative_summary
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());
        self
    }
}

// ── Reports ────────────────────────────────────────────────────

/// Which mock interview produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewKind {
    Background,
    Salary,
}

impl InterviewKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Salary => "salary",
        }
    }

    /// Name used when speaking to the user and in prompts.
    #[must_use]
    pub fn spoken_name(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Salary => "salary negotiation",
        }
    }
}

impl fmt::Display for InterviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a saved report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(pub String);

impl ReportId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Short form suitable for speaking aloud.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Report list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRef {
    pub id: ReportId,
    pub kind: InterviewKind,
    pub created_at: DateTime<Utc>,
}

impl ReportRef {
    /// e.g. "a salary negotiation interview from March 3".
    #[must_use]
    pub fn spoken_label(&self) -> String {
        format!(
            "a {} interview from {}",
            self.kind.spoken_name(),
            self.created_at.format("%B %-d")
        )
    }
}

/// Analysis of one question/answer pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportRow {
    pub question: String,
    pub answer: String,
    pub words_per_minute: f64,
    pub star_score: Option<u8>,
    pub star_reason: String,
    pub keywords_score: Option<u8>,
    pub keywords_reason: String,
    pub professionalism_score: Option<u8>,
    pub professionalism_reason: String,
}

/// A complete post-interview report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: ReportId,
    pub user: UserId,
    pub kind: InterviewKind,
    pub created_at: DateTime<Utc>,
    pub rows: Vec<ReportRow>,
    #[serde(default)]
    pub overall_feedback: String,
}

impl ReportSummary {
    #[must_use]
    pub fn reference(&self) -> ReportRef {
        ReportRef {
            id: self.id.clone(),
            kind: self.kind,
            created_at: self.created_at,
        }
    }

    /// Mean words per minute over answered rows, if any.
    #[must_use]
    pub fn average_wpm(&self) -> Option<f64> {
        let rates: Vec<f64> = self
            .rows
            .iter()
            .map(|r| r.words_per_minute)
            .filter(|w| *w > 0.0)
            .collect();
        (!rates.is_empty()).then(|| rates.iter().sum::<f64>() / rates.len() as f64)
    }

    /// Short spoken digest read when the report is opened.
    #[must_use]
    pub fn spoken_digest(&self) -> String {
        if !self.overall_feedback.trim().is_empty() {
            return self.overall_feedback.trim().to_owned();
        }
        let mut parts = vec![format!(
            "This {} interview had {} answered question{}.",
            self.kind.spoken_name(),
            self.rows.len(),
            if self.rows.len() == 1 { "" } else { "s" }
        )];
        if let Some(wpm) = self.average_wpm() {
            parts.push(format!("You spoke at about {wpm:.0} words per minute."));
        }
        parts.join(" ")
    }

    /// Plain-text rendering embedded in the feedback coach prompt.
    #[must_use]
    pub fn as_prompt_context(&self) -> String {
        let score = |s: Option<u8>| s.map_or_else(|| "n/a".to_owned(), |v| format!("{v}/10"));
        let mut out = format!("Interview type: {}\n", self.kind.spoken_name());
        for (i, row) in self.rows.iter().enumerate() {
            out.push_str(&format!(
                "Q{n}: {q}\nA{n}: {a}\nPace: {wpm:.0} wpm. STAR {star} ({sr}). Keywords {kw} ({kr}). Professionalism {pr} ({prr}).\n",
                n = i + 1,
                q = row.question,
                a = row.answer,
                wpm = row.words_per_minute,
                star = score(row.star_score),
                sr = row.star_reason,
                kw = score(row.keywords_score),
                kr = row.keywords_reason,
                pr = score(row.professionalism_score),
                prr = row.professionalism_reason,
            ));
        }
        if !self.overall_feedback.is_empty() {
            out.push_str("Overall feedback: ");
            out.push_str(&self.overall_feedback);
        }
        out
    }
}

// ── Trait ──────────────────────────────────────────────────────

/// Storage backend for history, preferences and reports.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Append one utterance to the user's long-lived conversation history.
    async fn append_utterance(&self, user: &UserId, utterance: &Utterance) -> Result<()>;

    /// The user's conversation history in insertion order.
    async fn fetch_history(&self, user: &UserId) -> Result<Vec<Utterance>>;

    /// Preferences for `user`; defaults when none are stored.
    async fn load_preferences(&self, user: &UserId) -> Result<Preferences>;

    /// Overwrite the user's preferences.
    async fn update_preferences(&self, user: &UserId, preferences: &Preferences) -> Result<()>;

    /// Store a finished report.
    async fn save_report(&self, report: &ReportSummary) -> Result<()>;

    /// The user's reports, most recent first.
    async fn list_reports(&self, user: &UserId) -> Result<Vec<ReportRef>>;

    /// Full report by id.
    ///
    /// Returns [`CoachError::Persistence`] if it does not exist.
    async fn fetch_report_detail(&self, user: &UserId, id: &ReportId) -> Result<ReportSummary>;
}
