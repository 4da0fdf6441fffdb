//! Audio collaborators: microphone capture, speech-to-text and
//! text-to-speech.
//!
//! The controller never touches a device directly. It holds a [`VoiceIo`]
//! bundle and only the listener task that owns the running handle calls it.

pub mod console;

use crate::config::ListenWindow;
use crate::error::{CoachError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Spoken instructions played at the start of onboarding and on `EXPLAIN`.
pub const INSTRUCTIONS_TEXT: &str = "\
This is your interview coach. Everything works by voice. \
After the beep, say what you would like to do. \
You can say things like: start a background interview, practise a salary negotiation, \
show my feedback, or help. \
During an interview, answer naturally and say that's all when you are finished.";

/// What the microphone delivered.
#[derive(Debug, Clone)]
pub enum SpeechPayload {
    /// Raw mono samples for a real speech-to-text engine.
    Pcm {
        /// f32 samples.
        samples: Vec<f32>,
        /// Sample rate in Hz.
        sample_rate: u32,
    },
    /// Text that was already transcribed upstream (console input, replays).
    Text(String),
}

/// One captured phrase.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub payload: SpeechPayload,
    /// How long the user spoke, if the capture device measured it.
    pub spoken: Option<Duration>,
}

impl SpeechSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: SpeechPayload::Text(text.into()),
            spoken: None,
        }
    }

    pub fn pcm(samples: Vec<f32>, sample_rate: u32) -> Self {
        let spoken = (sample_rate > 0)
            .then(|| Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate)));
        Self {
            payload: SpeechPayload::Pcm {
                samples,
                sample_rate,
            },
            spoken,
        }
    }
}

/// Non-speech audio cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Short tone marking the start of a listen window.
    ListeningBeep,
    /// The recorded usage instructions.
    Instructions,
    /// Distinct tone for a command that was not understood.
    NotUnderstood,
}

/// Microphone capture.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Wait up to `window.initial_timeout` for speech to begin, then capture a
    /// phrase of at most `window.max_phrase`.
    ///
    /// Returns [`CoachError::ListenTimeout`] when no speech starts in time.
    async fn listen(&self, window: ListenWindow) -> Result<SpeechSegment>;
}

/// Speech-to-text engine.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a segment. May return an empty string.
    async fn transcribe(&self, segment: &SpeechSegment) -> Result<String>;
}

/// Text-to-speech engine and playback.
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Synthesise and play `text`. Completes after playback.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Play a non-speech cue. Completes after playback.
    async fn play_cue(&self, cue: Cue) -> Result<()>;
}

/// A validated transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct Heard {
    pub text: String,
    pub spoken: Option<Duration>,
}

/// The audio collaborators used together by a listener.
#[derive(Clone)]
pub struct VoiceIo {
    pub microphone: Arc<dyn Microphone>,
    pub transcriber: Arc<dyn Transcriber>,
    pub speaker: Arc<dyn Speaker>,
}

impl VoiceIo {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        transcriber: Arc<dyn Transcriber>,
        speaker: Arc<dyn Speaker>,
    ) -> Self {
        Self {
            microphone,
            transcriber,
            speaker,
        }
    }

    /// Capture one phrase and transcribe it.
    ///
    /// # Errors
    ///
    /// [`CoachError::ListenTimeout`] from the microphone, or
    /// [`CoachError::TranscriptionEmpty`] when the transcript is blank.
    pub async fn hear(&self, window: ListenWindow) -> Result<Heard> {
        let segment = self.microphone.listen(window).await?;
        let text = self.transcriber.transcribe(&segment).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CoachError::TranscriptionEmpty);
        }
        tracing::info!(%text, "heard");
        Ok(Heard {
            text: text.to_owned(),
            spoken: segment.spoken,
        })
    }

    /// Speak `text`, skipping blank input.
    ///
    /// # Errors
    ///
    /// Propagates [`CoachError::Tts`] from the speaker.
    pub async fn say(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.speaker.speak(text).await
    }

    /// Speak without failing the caller; playback errors are logged.
    pub async fn say_best_effort(&self, text: &str) {
        if let Err(e) = self.say(text).await {
            tracing::warn!("could not speak: {e}");
        }
    }

    /// Play a cue without failing the caller.
    pub async fn cue_best_effort(&self, cue: Cue) {
        if let Err(e) = self.speaker.play_cue(cue).await {
            tracing::warn!(?cue, "could not play cue: {e}");
        }
    }
}

/// Transcriber that passes pre-transcribed text through and rejects PCM.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTranscriber;

#[async_trait]
impl Transcriber for PassthroughTranscriber {
    async fn transcribe(&self, segment: &SpeechSegment) -> Result<String> {
        match &segment.payload {
            SpeechPayload::Text(text) => Ok(text.clone()),
            SpeechPayload::Pcm { .. } => Err(CoachError::Audio(
                "no speech-to-text engine configured for raw audio".into(),
            )),
        }
    }
}
