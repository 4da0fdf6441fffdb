//! Scripted collaborators for tests and offline replays.
//!
//! Each fake records what the controller did with it so a test can assert
//! on spoken output, prompts sent to the model, and microphone usage.
//!
//! - [`ScriptedMicrophone`] plays back a queue of listen results, then times
//!   out after a short delay forever.
//! - [`RecordingSpeaker`] records spoken lines and cues.
//! - [`ScriptedModel`] answers prompts by substring rules.
//! - [`FailingAnalyzer`] always fails.

use crate::analysis::ReportAnalyzer;
use crate::config::ListenWindow;
use crate::error::{CoachError, Result};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::session::{Transcript, UserId};
use crate::store::{InterviewKind, ReportId};
use crate::voice::{Cue, Microphone, Speaker, SpeechSegment};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Lock, ignoring poisoning.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── Microphone ─────────────────────────────────────────────────

/// One scripted listen result.
#[derive(Debug, Clone)]
pub enum Hearing {
    /// The user said this.
    Say(String),
    /// The user said this for this many seconds.
    SayFor(String, f64),
    /// Audio captured but transcribed as nothing.
    Mumble,
    /// No speech within the window.
    Silence,
    /// Transient audio glitch.
    Glitch,
    /// The device disappeared.
    DeviceLost,
}

impl Hearing {
    pub fn say(text: impl Into<String>) -> Self {
        Self::Say(text.into())
    }
}

/// Microphone that replays a queue of [`Hearing`]s.
///
/// Once the queue is empty every listen waits `idle_delay` and times out,
/// which keeps one-shot loops spinning until they are cancelled.
#[derive(Debug, Clone)]
pub struct ScriptedMicrophone {
    queue: Arc<Mutex<VecDeque<Hearing>>>,
    listens: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Duration,
    idle_delay: Duration,
}

impl ScriptedMicrophone {
    pub fn new(script: impl IntoIterator<Item = Hearing>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(script.into_iter().collect())),
            listens: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            idle_delay: Duration::from_millis(5),
        }
    }

    /// Simulated capture time for every scripted listen.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Append more lines to the script.
    pub fn push(&self, hearing: Hearing) {
        lock(&self.queue).push_back(hearing);
    }

    /// Total listen calls so far.
    #[must_use]
    pub fn listen_count(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping listen calls observed.
    #[must_use]
    pub fn max_concurrent_listens(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Scripted lines not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        lock(&self.queue).len()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Microphone for ScriptedMicrophone {
    async fn listen(&self, window: ListenWindow) -> Result<SpeechSegment> {
        self.listens.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let next = lock(&self.queue).pop_front();
        let Some(hearing) = next else {
            tokio::time::sleep(self.idle_delay).await;
            return Err(CoachError::ListenTimeout {
                waited_secs: window.initial_timeout_secs,
            });
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match hearing {
            Hearing::Say(text) => Ok(SpeechSegment::text(text)),
            Hearing::SayFor(text, secs) => {
                let mut seg = SpeechSegment::text(text);
                seg.spoken = Some(Duration::from_secs_f64(secs));
                Ok(seg)
            }
            Hearing::Mumble => Ok(SpeechSegment::text("")),
            Hearing::Silence => Err(CoachError::ListenTimeout {
                waited_secs: window.initial_timeout_secs,
            }),
            Hearing::Glitch => Err(CoachError::Audio("buffer overrun".into())),
            Hearing::DeviceLost => Err(CoachError::AudioDevice("input device disconnected".into())),
        }
    }
}

// ── Speaker ────────────────────────────────────────────────────

/// Something the speaker played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Played {
    Speech(String),
    Cue(Cue),
}

/// Speaker that records everything it is asked to play.
#[derive(Debug, Clone, Default)]
pub struct RecordingSpeaker {
    played: Arc<Mutex<Vec<Played>>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything played, in order.
    #[must_use]
    pub fn played(&self) -> Vec<Played> {
        lock(&self.played).clone()
    }

    /// Spoken lines only, in order.
    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        lock(&self.played)
            .iter()
            .filter_map(|p| match p {
                Played::Speech(s) => Some(s.clone()),
                Played::Cue(_) => None,
            })
            .collect()
    }

    /// Whether any spoken line contains `needle`.
    #[must_use]
    pub fn said(&self, needle: &str) -> bool {
        self.spoken().iter().any(|s| s.contains(needle))
    }

    /// How many times `cue` was played.
    #[must_use]
    pub fn cue_count(&self, cue: Cue) -> usize {
        lock(&self.played)
            .iter()
            .filter(|p| **p == Played::Cue(cue))
            .count()
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        lock(&self.played).push(Played::Speech(text.to_owned()));
        Ok(())
    }

    async fn play_cue(&self, cue: Cue) -> Result<()> {
        lock(&self.played).push(Played::Cue(cue));
        Ok(())
    }
}

// ── Model ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

#[derive(Debug)]
struct Rule {
    needle: String,
    replies: VecDeque<Reply>,
}

/// Model that answers by the first rule whose needle occurs in the prompt.
///
/// A rule with several replies hands them out in order and then keeps
/// repeating the last one. Prompts matching no rule get the fallback.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    rules: Arc<Mutex<Vec<Rule>>>,
    fallback: Arc<Mutex<Option<Reply>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `reply` for prompts containing `needle`.
    #[must_use]
    pub fn when(self, needle: &str, reply: &str) -> Self {
        self.when_seq(needle, &[reply])
    }

    /// Answer `replies` in order for prompts containing `needle`.
    #[must_use]
    pub fn when_seq(self, needle: &str, replies: &[&str]) -> Self {
        lock(&self.rules).push(Rule {
            needle: needle.to_owned(),
            replies: replies.iter().map(|r| Reply::Text((*r).to_owned())).collect(),
        });
        self
    }

    /// Fail with a model invocation error for prompts containing `needle`.
    #[must_use]
    pub fn failing_when(self, needle: &str) -> Self {
        lock(&self.rules).push(Rule {
            needle: needle.to_owned(),
            replies: VecDeque::from([Reply::Fail(format!("scripted failure for {needle:?}"))]),
        });
        self
    }

    /// Answer for prompts that match no rule.
    #[must_use]
    pub fn otherwise(self, reply: &str) -> Self {
        *lock(&self.fallback) = Some(Reply::Text(reply.to_owned()));
        self
    }

    /// Every prompt received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Number of prompts containing `needle`.
    #[must_use]
    pub fn prompt_count(&self, needle: &str) -> usize {
        lock(&self.prompts)
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        lock(&self.prompts).push(request.prompt.clone());
        let reply = {
            let mut rules = lock(&self.rules);
            rules
                .iter_mut()
                .find(|r| request.prompt.contains(&r.needle))
                .and_then(|rule| {
                    if rule.replies.len() > 1 {
                        rule.replies.pop_front()
                    } else {
                        rule.replies.front().cloned()
                    }
                })
        };
        let reply = reply.or_else(|| lock(&self.fallback).clone());
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(msg)) => Err(CoachError::ModelInvocation(msg)),
            None => Ok(String::new()),
        }
    }
}

// ── Analyzer ───────────────────────────────────────────────────

/// Analyzer that always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingAnalyzer;

#[async_trait]
impl ReportAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _user: &UserId, _kind: InterviewKind, _transcript: &Transcript) -> Result<ReportId> {
        Err(CoachError::Analysis("analysis backend unavailable".into()))
    }
}
