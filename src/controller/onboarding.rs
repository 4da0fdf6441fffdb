//! First-run onboarding and the profile summary that concludes it.

use super::{FlowContext, ListenerOutcome, Successor};
use crate::command::ControlSignal;
use crate::config::LlmConfig;
use crate::dialogue::{DialogueKind, DialogueState, EndReason, HeuristicEnd, HistorySink, PersonaReplies};
use crate::error::Result;
use crate::llm::sanitize::extract_json_object;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::persona::{self, Persona};
use crate::session::{Mode, Transcript};
use crate::store::{Preferences, ProfileSummary};
use crate::voice::Cue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(super) const ONBOARDING_PAUSED: &str = "It sounds like now isn't a good time. \
     We can finish setting up your profile the next time you log in.";

pub(super) const PROFILE_READY: &str = "Your profile is now set up. From now on, I'll be your navigation assistant. \
     Just tell me what you would like to do.";

pub(super) async fn run(ctx: &FlowContext, cancel: &CancellationToken) -> Result<ListenerOutcome> {
    ctx.ui().set_status("Getting to know you");
    ctx.voice().cue_best_effort(Cue::Instructions).await;

    let engine = ctx.engine().with_history(HistorySink {
        store: ctx.collab.store.clone(),
        user: ctx.user.clone(),
    });
    let replies = PersonaReplies::new(
        ctx.collab.model.clone(),
        ctx.config().llm.clone(),
        Persona::OnboardingSpecialist,
    );
    let end = HeuristicEnd::new(ctx.terminator(), DialogueKind::Onboarding);

    let mut state = DialogueState::default();
    let ended = engine
        .run(&mut state, None, &replies, &end, Mode::Onboarding.listen_class(), cancel)
        .await?;
    match ended.reason {
        EndReason::Cancelled => return Ok(ListenerOutcome::halted()),
        EndReason::UserSilent => {
            // Onboarding stays incomplete so the next login resumes it.
            ctx.voice().say_best_effort(ONBOARDING_PAUSED).await;
            return Ok(ListenerOutcome::next(Successor::Navigation));
        }
        _ => {}
    }

    let signal = ControlSignal::OnboardingComplete;
    info!(?signal, turns = ended.turns, "onboarding conversation finished");
    ctx.ui().set_status("Finalizing your profile…");
    ctx.voice().say_best_effort(signal.acknowledgement()).await;

    let history = match ctx.collab.store.fetch_history(&ctx.user).await {
        Ok(history) if !history.is_empty() => Transcript::from_utterances(history),
        Ok(_) => state.transcript.clone(),
        Err(e) => {
            warn!("history unavailable, summarising this session only: {e}");
            state.transcript.clone()
        }
    };
    let summary = summarise_profile(ctx.collab.model.as_ref(), &ctx.config().llm, &history).await;

    let mut preferences = ctx.collab.store.load_preferences(&ctx.user).await?;
    preferences.onboarding_complete = true;
    summary.apply(&mut preferences);
    ctx.collab
        .store
        .update_preferences(&ctx.user, &preferences.validated())
        .await?;

    ctx.ui().set_status("Profile setup complete!");
    ctx.voice().say_best_effort(PROFILE_READY).await;
    Ok(ListenerOutcome::next(Successor::Navigation))
}

/// Result of asking the model for the structured profile.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum ProfileOutcome {
    Parsed(ProfileSummary),
    /// The model answered, but not with the JSON object asked for.
    Prose(String),
    Unavailable,
}

impl ProfileOutcome {
    fn apply(self, preferences: &mut Preferences) {
        match self {
            Self::Parsed(profile) => preferences.profile_summary = Some(profile),
            Self::Prose(text) => preferences.narrative_summary = Some(text),
            Self::Unavailable => {}
        }
    }
}

pub(super) async fn summarise_profile(
    model: &dyn LanguageModel,
    llm: &LlmConfig,
    history: &Transcript,
) -> ProfileOutcome {
    let request = CompletionRequest::summary(persona::summary_prompt(history), llm);
    let raw = match model.complete(&request).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("profile summary unavailable: {e}");
            return ProfileOutcome::Unavailable;
        }
    };
    let parsed = extract_json_object(&raw).and_then(|json| serde_json::from_str::<ProfileSummary>(json).ok());
    match parsed {
        Some(profile) => {
            info!(
                interests = profile.interests.len(),
                goals = profile.goals.len(),
                challenges = profile.challenges.len(),
                "profile summarised"
            );
            ProfileOutcome::Parsed(profile)
        }
        None => {
            warn!(received = %raw, "profile summary was not valid JSON");
            let prose = raw.trim();
            if prose.is_empty() {
                ProfileOutcome::Unavailable
            } else {
                ProfileOutcome::Prose(prose.to_owned())
            }
        }
    }
}
