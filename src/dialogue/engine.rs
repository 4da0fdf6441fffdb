//! The speak → listen → transcribe → validate → model → end? loop shared by
//! every spoken sub-dialogue.
//!
//! Steps inside one turn run strictly in sequence. Cancellation is only
//! observed between steps: an in-flight listen or model call is never
//! interrupted.

use super::terminator::{EndCondition, EndReason};
use crate::config::{ListenClass, ListenConfig, LlmConfig};
use crate::error::Result;
use crate::llm::{self, CompletionRequest, LanguageModel};
use crate::persona::{self, END_ONBOARDING_MARKER, Persona};
use crate::runtime::Presentation;
use crate::session::{Role, Transcript, UserId, Utterance};
use crate::store::Persistence;
use crate::voice::{Cue, Heard, VoiceIo};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spoken after a listen produced nothing usable.
pub const DIDNT_CATCH: &str = "I'm sorry, I didn't catch that.";

/// Produces the next assistant utterance from the transcript so far.
#[async_trait]
pub trait ReplySource: Send + Sync {
    /// May return an empty string, which ends the dialogue.
    async fn next(&self, transcript: &Transcript) -> Result<String>;
}

/// Replies from the language model under a persona template.
pub struct PersonaReplies {
    model: Arc<dyn LanguageModel>,
    llm: LlmConfig,
    persona: Persona,
    context: Option<String>,
}

impl PersonaReplies {
    pub fn new(model: Arc<dyn LanguageModel>, llm: LlmConfig, persona: Persona) -> Self {
        Self {
            model,
            llm,
            persona,
            context: None,
        }
    }

    /// Text substituted into the persona's `{report}` slot.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[async_trait]
impl ReplySource for PersonaReplies {
    async fn next(&self, transcript: &Transcript) -> Result<String> {
        let prompt = persona::dialogue_prompt(self.persona, transcript, self.context.as_deref());
        let request = CompletionRequest::reply(prompt, &self.llm);
        llm::complete_spoken(self.model.as_ref(), &request).await
    }
}

/// Transcript and turn counter of the sub-dialogue in progress.
#[derive(Debug, Clone, Default)]
pub struct DialogueState {
    pub transcript: Transcript,
    pub turn_count: u32,
}

/// How a sub-dialogue finished.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueEnd {
    pub reason: EndReason,
    pub turns: u32,
}

/// One utterance as the engine recorded it, with the turn count after it.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueUpdate {
    pub utterance: Utterance,
    pub turn_count: u32,
}

/// Sees every utterance of a running sub-dialogue, sentinels included.
pub trait DialogueObserver: Send + Sync {
    fn observe(&self, update: DialogueUpdate);
}

/// Long-lived history target for dialogues that persist their utterances.
#[derive(Clone)]
pub struct HistorySink {
    pub store: Arc<dyn Persistence>,
    pub user: UserId,
}

enum ListenResult {
    Heard(Heard),
    Silent,
    Cancelled,
}

/// Turn-taking engine bound to one set of collaborators.
#[derive(Clone)]
pub struct TurnEngine {
    voice: VoiceIo,
    ui: Arc<dyn Presentation>,
    listen: ListenConfig,
    history: Option<HistorySink>,
    observer: Option<Arc<dyn DialogueObserver>>,
}

impl TurnEngine {
    pub fn new(voice: VoiceIo, ui: Arc<dyn Presentation>, listen: ListenConfig) -> Self {
        Self {
            voice,
            ui,
            listen,
            history: None,
            observer: None,
        }
    }

    /// Also append every utterance to the user's stored history.
    #[must_use]
    pub fn with_history(mut self, sink: HistorySink) -> Self {
        self.history = Some(sink);
        self
    }

    /// Report each recorded utterance to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DialogueObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run one sub-dialogue until the end condition fires, the model goes
    /// quiet, the user stays silent for `max_silent_rounds` rounds in a row,
    /// or `cancel` is observed.
    ///
    /// The assistant line generated on the final turn is appended to the
    /// transcript but not spoken; the caller speaks its own closing.
    ///
    /// # Errors
    ///
    /// Model failures and audio device failures. Recognition misses are
    /// absorbed here and never escape.
    pub async fn run(
        &self,
        state: &mut DialogueState,
        initial_prompt: Option<String>,
        replies: &dyn ReplySource,
        end: &dyn EndCondition,
        class: ListenClass,
        cancel: &CancellationToken,
    ) -> Result<DialogueEnd> {
        let mut prompt = match initial_prompt {
            Some(p) => p,
            None => {
                self.ui.set_status("Thinking…");
                replies.next(&state.transcript).await?
            }
        };
        if prompt.trim().is_empty() {
            return Ok(self.finish(state, EndReason::ModelConcluded));
        }
        self.record(state, Utterance::assistant(prompt.clone())).await;

        let mut silent_rounds = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Ok(self.finish(state, EndReason::Cancelled));
            }

            self.speak_prompt(&prompt).await;

            match self.listen_with_retries(&prompt, class, cancel).await? {
                ListenResult::Cancelled => return Ok(self.finish(state, EndReason::Cancelled)),
                ListenResult::Heard(heard) => {
                    silent_rounds = 0;
                    state.turn_count = state.turn_count.saturating_add(1);
                    let mut utterance = Utterance::user(heard.text);
                    if let Some(spoken) = heard.spoken {
                        utterance = utterance.with_duration(spoken.as_secs_f64());
                    }
                    self.record(state, utterance).await;
                }
                ListenResult::Silent => {
                    silent_rounds += 1;
                    self.record(state, Utterance::sentinel()).await;
                    if silent_rounds >= self.listen.max_silent_rounds {
                        info!(silent_rounds, "user stayed silent, giving up");
                        return Ok(self.finish(state, EndReason::UserSilent));
                    }
                    info!(silent_rounds, "listen retries exhausted, continuing with silence");
                }
            }

            if cancel.is_cancelled() {
                return Ok(self.finish(state, EndReason::Cancelled));
            }

            self.ui.set_status("Thinking…");
            let reply = replies.next(&state.transcript).await?;
            if reply.trim().is_empty() {
                return Ok(self.finish(state, EndReason::ModelConcluded));
            }
            self.record(state, Utterance::assistant(reply.clone())).await;

            let decision = end.check(&state.transcript, state.turn_count).await;
            if decision.end {
                return Ok(self.finish(state, decision.reason));
            }
            prompt = reply;
        }
    }

    fn finish(&self, state: &DialogueState, reason: EndReason) -> DialogueEnd {
        info!(%reason, turns = state.turn_count, "dialogue ended");
        DialogueEnd {
            reason,
            turns: state.turn_count,
        }
    }

    async fn speak_prompt(&self, prompt: &str) {
        let spoken = spoken_form(prompt);
        if spoken.is_empty() {
            return;
        }
        self.ui.set_status("Speaking…");
        if let Err(e) = self.voice.say(&spoken).await {
            warn!("prompt playback failed, listening anyway: {e}");
        }
    }

    async fn listen_with_retries(
        &self,
        prompt: &str,
        class: ListenClass,
        cancel: &CancellationToken,
    ) -> Result<ListenResult> {
        let window = self.listen.window(class);
        let mut misses = 0u32;
        loop {
            self.ui.set_status("Listening…");
            self.voice.cue_best_effort(Cue::ListeningBeep).await;
            let err = match self.voice.hear(window).await {
                Ok(heard) => return Ok(ListenResult::Heard(heard)),
                Err(e) => e,
            };

            if err.is_recoverable_audio() {
                warn!("audio error while listening: {err}");
                tokio::time::sleep(self.listen.recoverable_pause()).await;
            } else if !err.is_recognition_miss() {
                return Err(err);
            }

            misses += 1;
            if misses > self.listen.retry_budget {
                return Ok(ListenResult::Silent);
            }
            if cancel.is_cancelled() {
                return Ok(ListenResult::Cancelled);
            }
            info!(misses, "nothing heard, repeating prompt");
            self.voice.say_best_effort(DIDNT_CATCH).await;
            self.speak_prompt(prompt).await;
        }
    }

    async fn record(&self, state: &mut DialogueState, utterance: Utterance) {
        if !utterance.is_sentinel() {
            self.ui
                .append_transcript_line(utterance.role(), utterance.text());
            if let Some(sink) = &self.history
                && utterance.role() != Role::System
                && let Err(e) = sink.store.append_utterance(&sink.user, &utterance).await
            {
                warn!("could not persist utterance: {e}");
            }
        }
        if let Some(observer) = &self.observer {
            observer.observe(DialogueUpdate {
                utterance: utterance.clone(),
                turn_count: state.turn_count,
            });
        }
        state.transcript.push(utterance);
    }
}

/// The text actually spoken for an assistant line: control markers removed.
#[must_use]
pub fn spoken_form(text: &str) -> String {
    text.replace(END_ONBOARDING_MARKER, "").trim().to_owned()
}
