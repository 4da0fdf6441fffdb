//! Shared helpers for integration tests.
//!
//! A [`Harness`] wires a controller to scripted collaborators and keeps
//! handles on each of them so tests can assert on what was spoken, which
//! prompts reached the model and what the store ended up holding.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use voice_coach::analysis::{ModelReportAnalyzer, ReportAnalyzer};
use voice_coach::config::CoachConfig;
use voice_coach::controller::{Collaborators, ControllerClient, SessionSnapshot, controller};
use voice_coach::runtime::{BroadcastPresentation, CoachEvent, ScreenId};
use voice_coach::scripted::{Hearing, RecordingSpeaker, ScriptedMicrophone, ScriptedModel};
use voice_coach::session::{Mode, UserId};
use voice_coach::store::memory::InMemoryStore;
use voice_coach::store::{InterviewKind, Persistence, Preferences, ReportId, ReportRow, ReportSummary};
use voice_coach::voice::{PassthroughTranscriber, VoiceIo};

pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// Defaults with no real pauses. An exhausted script reads as endless
/// silence, so sub-dialogues only give up on the user when a test asks.
pub(crate) fn fast_config() -> CoachConfig {
    let mut config = CoachConfig::default();
    config.listen.recoverable_pause_ms = 1;
    config.listen.max_silent_rounds = 1_000;
    config
}

pub(crate) fn user() -> UserId {
    UserId("asha".into())
}

/// A store in which `user()` has finished onboarding.
pub(crate) async fn onboarded_store(last_screen: Option<ScreenId>) -> Arc<InMemoryStore> {
    let prefs = Preferences {
        onboarding_complete: true,
        last_screen,
        ..Preferences::default()
    };
    Arc::new(InMemoryStore::new().with_preferences(&user(), prefs).await)
}

/// Save a report for `user()` created `days_ago` days before now.
pub(crate) async fn seed_report(
    store: &InMemoryStore,
    id: &str,
    kind: InterviewKind,
    days_ago: i64,
    question: &str,
    overall: &str,
) {
    let report = ReportSummary {
        id: ReportId(id.to_owned()),
        user: user(),
        kind,
        created_at: chrono::Utc::now() - chrono::Duration::days(days_ago),
        rows: vec![ReportRow {
            question: question.to_owned(),
            answer: "I led the migration.".to_owned(),
            words_per_minute: 120.0,
            star_score: Some(7),
            ..ReportRow::default()
        }],
        overall_feedback: overall.to_owned(),
    };
    store.save_report(&report).await.expect("seed report");
}

pub(crate) struct Harness {
    pub client: ControllerClient,
    pub mic: ScriptedMicrophone,
    pub speaker: RecordingSpeaker,
    pub model: ScriptedModel,
    pub store: Arc<InMemoryStore>,
    pub events: broadcast::Receiver<CoachEvent>,
    actor: JoinHandle<()>,
}

pub(crate) struct HarnessBuilder {
    script: Vec<Hearing>,
    model: ScriptedModel,
    store: Option<Arc<InMemoryStore>>,
    analyzer: Option<Arc<dyn ReportAnalyzer>>,
    config: CoachConfig,
    mic_delay: Duration,
}

impl HarnessBuilder {
    pub(crate) fn new(model: ScriptedModel) -> Self {
        Self {
            script: Vec::new(),
            model,
            store: None,
            analyzer: None,
            config: fast_config(),
            mic_delay: Duration::ZERO,
        }
    }

    pub(crate) fn script(mut self, script: Vec<Hearing>) -> Self {
        self.script = script;
        self
    }

    pub(crate) fn store(mut self, store: Arc<InMemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub(crate) fn analyzer(mut self, analyzer: Arc<dyn ReportAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Adjust the configuration on top of [`fast_config`].
    pub(crate) fn configure(mut self, change: impl FnOnce(&mut CoachConfig)) -> Self {
        change(&mut self.config);
        self
    }

    pub(crate) fn mic_delay(mut self, delay: Duration) -> Self {
        self.mic_delay = delay;
        self
    }

    pub(crate) fn build(self) -> Harness {
        let mic = ScriptedMicrophone::new(self.script).with_delay(self.mic_delay);
        let speaker = RecordingSpeaker::new();
        let store = self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let ui = Arc::new(BroadcastPresentation::new(4096));
        let events = ui.subscribe();
        let model: Arc<ScriptedModel> = Arc::new(self.model.clone());
        let config = Arc::new(self.config);
        let analyzer: Arc<dyn ReportAnalyzer> = match self.analyzer {
            Some(analyzer) => analyzer,
            None => Arc::new(ModelReportAnalyzer::new(
                model.clone(),
                config.llm.clone(),
                store.clone(),
            )),
        };
        let collab = Collaborators {
            voice: VoiceIo::new(
                Arc::new(mic.clone()),
                Arc::new(PassthroughTranscriber),
                Arc::new(speaker.clone()),
            ),
            model,
            store: store.clone(),
            ui,
            analyzer,
            config,
        };
        let (client, actor) = controller(16, collab);
        Harness {
            client,
            mic,
            speaker,
            model: self.model,
            store,
            events,
            actor: tokio::spawn(actor.run()),
        }
    }
}

impl Harness {
    pub(crate) async fn login(&self) {
        self.client.login(user(), "Asha").await.expect("login");
    }

    pub(crate) async fn snapshot(&self) -> SessionSnapshot {
        self.client
            .snapshot()
            .await
            .expect("snapshot")
            .expect("logged in")
    }

    /// Poll until `check` holds, failing the test after [`WAIT`].
    pub(crate) async fn eventually(&self, what: &str, mut check: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !check() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}; spoken so far: {:?}",
                self.speaker.spoken()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until the session is in `mode` with its listener running.
    pub(crate) async fn wait_for_mode(&self, mode: Mode) -> SessionSnapshot {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let snapshot = self.snapshot().await;
            if snapshot.mode == mode && snapshot.listening_in == Some(mode) {
                return snapshot;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {mode}; at {} with {:?}; spoken so far: {:?}",
                snapshot.mode,
                snapshot.listening_in,
                self.speaker.spoken()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until `line` was spoken.
    pub(crate) async fn wait_for_speech(&self, line: &str) {
        let speaker = self.speaker.clone();
        self.eventually(&format!("speech {line:?}"), || speaker.said(line))
            .await;
    }

    /// Wait until every scripted line has been consumed and the session is
    /// back in `mode`.
    pub(crate) async fn settle_in(&self, mode: Mode) -> SessionSnapshot {
        let mic = self.mic.clone();
        self.eventually("the script to run out", || mic.remaining() == 0)
            .await;
        self.wait_for_mode(mode).await
    }

    /// Drain pending presentation events.
    pub(crate) fn drain_events(&mut self) -> Vec<CoachEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    pub(crate) async fn shutdown(self) {
        self.client.logout().await.expect("logout");
        assert_eq!(self.client.running_listeners(), 0);
        drop(self.client);
        tokio::time::timeout(WAIT, self.actor)
            .await
            .expect("controller stops")
            .expect("controller task");
    }
}
