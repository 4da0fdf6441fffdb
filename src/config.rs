//! Configuration types for the coaching controller.

use crate::error::{CoachError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    /// Listen windows and retry behaviour.
    pub listen: ListenConfig,
    /// Sub-dialogue termination limits.
    pub dialogue: DialogueConfig,
    /// Language model settings.
    pub llm: LlmConfig,
    /// Feedback report selection settings.
    pub feedback: FeedbackConfig,
}

/// Which listen window a sub-dialogue uses.
///
/// Each mode maps to exactly one class. Using the quick command window for an
/// open interview answer cuts the candidate off mid-thought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenClass {
    /// Short one-shot commands and yes/no answers.
    Command,
    /// Open answers to interview or onboarding questions.
    Answer,
}

/// Bounds for one listen operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenWindow {
    /// Seconds to wait for speech to begin before giving up.
    pub initial_timeout_secs: u64,
    /// Maximum length of a single phrase in seconds.
    pub max_phrase_secs: u64,
}

impl ListenWindow {
    #[must_use]
    pub fn initial_timeout(&self) -> Duration {
        Duration::from_secs(self.initial_timeout_secs)
    }

    #[must_use]
    pub fn max_phrase(&self) -> Duration {
        Duration::from_secs(self.max_phrase_secs)
    }
}

/// Listening configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Window for navigation commands, list selection and confirmations.
    pub command: ListenWindow,
    /// Window for open answers (onboarding, interviews, feedback Q&A).
    pub answer: ListenWindow,
    /// Listen attempts retried in place before the empty-input sentinel is used.
    pub retry_budget: u32,
    /// Pause after a recoverable audio error before the loop continues (ms).
    pub recoverable_pause_ms: u64,
    /// Consecutive rounds that end in the sentinel before the sub-dialogue
    /// gives up on the user.
    pub max_silent_rounds: u32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            command: ListenWindow {
                initial_timeout_secs: 5,
                max_phrase_secs: 10,
            },
            answer: ListenWindow {
                initial_timeout_secs: 120,
                max_phrase_secs: 300,
            },
            retry_budget: 2,
            recoverable_pause_ms: 500,
            max_silent_rounds: 3,
        }
    }
}

impl ListenConfig {
    /// Resolve the listen window for a class.
    #[must_use]
    pub fn window(&self, class: ListenClass) -> ListenWindow {
        match class {
            ListenClass::Command => self.command,
            ListenClass::Answer => self.answer,
        }
    }

    #[must_use]
    pub fn recoverable_pause(&self) -> Duration {
        Duration::from_millis(self.recoverable_pause_ms)
    }
}

/// Turn limits for one kind of sub-dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnLimits {
    /// Validated user turns required before any end rule may fire.
    pub min_turns: u32,
    /// Hard ceiling. `None` leaves the length open (feedback Q&A).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
}

/// Sub-dialogue termination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub onboarding: TurnLimits,
    pub background_interview: TurnLimits,
    pub salary_interview: TurnLimits,
    pub feedback_qa: TurnLimits,
    /// Jaccard similarity above which two consecutive assistant utterances
    /// count as stagnation.
    pub stagnation_threshold: f64,
    /// Phrases in the latest user utterance that end a sub-dialogue
    /// (matched case-insensitively on word boundaries).
    pub conclusion_phrases: Vec<String>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            onboarding: TurnLimits {
                min_turns: 4,
                max_turns: Some(4),
            },
            background_interview: TurnLimits {
                min_turns: 4,
                max_turns: Some(10),
            },
            salary_interview: TurnLimits {
                min_turns: 4,
                max_turns: Some(12),
            },
            feedback_qa: TurnLimits {
                min_turns: 1,
                max_turns: None,
            },
            stagnation_threshold: 0.6,
            conclusion_phrases: vec![
                "that's all".to_owned(),
                "that is all".to_owned(),
                "that covers everything".to_owned(),
                "no more questions".to_owned(),
                "i'm done".to_owned(),
                "i am done".to_owned(),
            ],
        }
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible completion server.
    pub api_url: String,
    /// Model name sent with each request.
    pub model: String,
    /// API key; empty for local servers.
    pub api_key: String,
    /// Token budget for conversational replies.
    pub reply_max_tokens: u32,
    /// Token budget for command, ordinal and yes/no classification.
    pub classify_max_tokens: u32,
    /// Token budget for summaries and report analysis.
    pub summary_max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Stop sequences appended to every request.
    pub stop_sequences: Vec<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080".to_owned(),
            model: "gemma-3n-e2b-it".to_owned(),
            api_key: String::new(),
            reply_max_tokens: 250,
            classify_max_tokens: 30,
            summary_max_tokens: 300,
            temperature: 0.4,
            stop_sequences: vec![
                "</s>".to_owned(),
                "[INST]".to_owned(),
                "User:".to_owned(),
                "Assistant:".to_owned(),
            ],
            request_timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Feedback report selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Attempts at resolving a report reference before returning to navigation.
    pub selection_attempts: u32,
    /// Maximum reports read out when announcing the list.
    pub max_announced_reports: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            selection_attempts: 3,
            max_announced_reports: 5,
        }
    }
}

impl CoachConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| CoachError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CoachError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/voice-coach/config.toml`.
    ///
    /// Override the directory with `VOICE_COACH_CONFIG_DIR`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(dir) = std::env::var_os("VOICE_COACH_CONFIG_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        dirs::config_dir()
            .map(|d| d.join("voice-coach"))
            .unwrap_or_else(|| PathBuf::from("/tmp/voice-coach-config"))
            .join("config.toml")
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.dialogue.stagnation_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(CoachError::Config(format!(
                "dialogue.stagnation_threshold must be in (0, 1], got {threshold}"
            )));
        }

        for (name, limits) in [
            ("onboarding", self.dialogue.onboarding),
            ("background_interview", self.dialogue.background_interview),
            ("salary_interview", self.dialogue.salary_interview),
            ("feedback_qa", self.dialogue.feedback_qa),
        ] {
            if let Some(max) = limits.max_turns
                && max < limits.min_turns
            {
                return Err(CoachError::Config(format!(
                    "dialogue.{name}: max_turns ({max}) is below min_turns ({})",
                    limits.min_turns
                )));
            }
        }

        let command = self.listen.command;
        let answer = self.listen.answer;
        if command.initial_timeout_secs == 0 || answer.initial_timeout_secs == 0 {
            return Err(CoachError::Config(
                "listen timeouts must be greater than zero".to_owned(),
            ));
        }
        if command.initial_timeout_secs >= answer.initial_timeout_secs {
            return Err(CoachError::Config(format!(
                "listen.command timeout ({}s) must be shorter than listen.answer timeout ({}s)",
                command.initial_timeout_secs, answer.initial_timeout_secs
            )));
        }

        if self.listen.max_silent_rounds == 0 {
            return Err(CoachError::Config(
                "listen.max_silent_rounds must be at least 1".to_owned(),
            ));
        }

        if self.feedback.selection_attempts == 0 {
            return Err(CoachError::Config(
                "feedback.selection_attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
