//! Error types for the conversation flow controller.

/// Top-level error type for the coaching controller.
#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    /// No speech was detected within the listen window.
    #[error("listen timed out after {waited_secs}s without speech")]
    ListenTimeout {
        /// How long the microphone waited for speech to begin.
        waited_secs: u64,
    },

    /// Audio was captured but the transcriber produced no text.
    #[error("transcription produced no text")]
    TranscriptionEmpty,

    /// Transient audio error; the listening loop pauses and continues.
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio device failure; fatal for the current listener.
    #[error("audio device failure: {0}")]
    AudioDevice(String),

    /// Speech synthesis or playback error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model collaborator unreachable or erroring.
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    /// The model returned structured output that could not be parsed.
    #[error("malformed structured output: {0}")]
    MalformedOutput(String),

    /// Persistence collaborator error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Post-interview analysis error.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Listener lifecycle error.
    #[error("listener error: {0}")]
    Listener(String),

    /// A mode transition that the session state machine does not allow.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Mode the session was in.
        from: &'static str,
        /// Mode that was requested.
        to: &'static str,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl CoachError {
    /// Recognition failures that the turn-taking engine retries in place.
    #[must_use]
    pub fn is_recognition_miss(&self) -> bool {
        matches!(self, Self::ListenTimeout { .. } | Self::TranscriptionEmpty)
    }

    /// Errors after which a listening loop pauses briefly and continues.
    #[must_use]
    pub fn is_recoverable_audio(&self) -> bool {
        matches!(self, Self::Audio(_) | Self::Tts(_))
    }

    /// Errors that terminate the current listener outright.
    #[must_use]
    pub fn is_fatal_for_listener(&self) -> bool {
        matches!(self, Self::AudioDevice(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CoachError>;
