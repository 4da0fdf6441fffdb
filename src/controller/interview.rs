//! Mock interviews: the turn loop, a closing line, then analysis.

use super::{FlowContext, ListenerOutcome, Successor};
use crate::config::LlmConfig;
use crate::dialogue::{DialogueKind, DialogueState, EndReason, HeuristicEnd, PersonaReplies};
use crate::error::Result;
use crate::llm::{self, CompletionRequest, LanguageModel};
use crate::persona::{self, Persona};
use crate::runtime::ScreenId;
use crate::session::{Mode, Transcript};
use crate::store::InterviewKind;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(super) const CANNED_CLOSING: &str =
    "Thank you for your time today. That concludes our interview. I'll prepare your feedback now.";

const REPORT_FAILED: &str = "I'm sorry, I couldn't create a feedback report for this interview.";

pub(super) async fn run(ctx: &FlowContext, kind: InterviewKind, cancel: &CancellationToken) -> Result<ListenerOutcome> {
    ctx.ui().show_screen(ScreenId::Interview);
    ctx.ui().set_status(&format!("Starting your {} interview", kind.spoken_name()));

    let replies = PersonaReplies::new(
        ctx.collab.model.clone(),
        ctx.config().llm.clone(),
        Persona::for_interview(kind),
    );
    let end = HeuristicEnd::new(ctx.terminator(), DialogueKind::for_interview(kind));

    let mut state = DialogueState::default();
    let ended = ctx
        .engine()
        .run(&mut state, None, &replies, &end, Mode::Interview.listen_class(), cancel)
        .await?;
    if ended.reason == EndReason::Cancelled {
        return Ok(ListenerOutcome::halted());
    }
    info!(%kind, reason = %ended.reason, turns = ended.turns, "interview finished");

    let closing = closing_line(ctx.collab.model.as_ref(), &ctx.config().llm, kind, &state.transcript).await;
    ctx.ui().set_status("Wrapping up");
    ctx.voice().say_best_effort(&closing).await;

    if cancel.is_cancelled() {
        return Ok(ListenerOutcome::halted());
    }

    ctx.ui().set_status("Analysing your interview…");
    match ctx.collab.analyzer.analyze(&ctx.user, kind, &state.transcript).await {
        Ok(id) => {
            info!(report = %id.0, "report saved");
            ctx.ui().set_status("Report ready");
            ctx.voice()
                .say_best_effort(&format!(
                    "Your feedback report is ready. Its reference is {}. \
                     Say show my feedback whenever you want to go through it.",
                    id.short()
                ))
                .await;
        }
        Err(e) => {
            warn!("interview analysis failed: {e}");
            ctx.ui().set_status("Report unavailable");
            ctx.voice().say_best_effort(REPORT_FAILED).await;
        }
    }
    Ok(ListenerOutcome::next(Successor::Navigation))
}

/// Model-written wrap-up, or the canned one when the model fails or is silent.
pub(super) async fn closing_line(
    model: &dyn LanguageModel,
    llm_config: &LlmConfig,
    kind: InterviewKind,
    transcript: &Transcript,
) -> String {
    let prompt = persona::conclusion_prompt(kind.spoken_name(), transcript);
    let request = CompletionRequest::reply(prompt, llm_config);
    match llm::complete_spoken(model, &request).await {
        Ok(line) if !line.is_empty() => line,
        Ok(_) => CANNED_CLOSING.to_owned(),
        Err(e) => {
            warn!("closing line unavailable: {e}");
            CANNED_CLOSING.to_owned()
        }
    }
}
