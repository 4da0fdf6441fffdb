//! Choosing a saved report by voice, then discussing it with the coach.

use super::{FlowContext, ListenerOutcome, Successor};
use crate::dialogue::{ClassifierEnd, DialogueState, EndReason, PersonaReplies};
use crate::error::Result;
use crate::ordinal::{Confirmation, OrdinalResolution, OrdinalResolver};
use crate::persona::Persona;
use crate::runtime::ScreenId;
use crate::session::{Mode, Role};
use crate::store::{ReportRef, ReportSummary};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const NO_REPORTS: &str =
    "You don't have any feedback reports yet. Complete an interview first, then come back here.";
const GIVE_UP: &str = "Let's leave that for now. Going back to the main menu.";
const QA_OPENER: &str = "What would you like to know about this interview?";
const QA_DONE: &str = "Okay. Going back to the main menu.";

const NUMBER_WORDS: [&str; 10] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
];

fn spoken_number(n: usize) -> String {
    n.checked_sub(1)
        .and_then(|i| NUMBER_WORDS.get(i))
        .map_or_else(|| n.to_string(), |w| (*w).to_owned())
}

/// The announcement read before asking which report to open. `reports` is in
/// chronological order.
#[must_use]
pub(super) fn announcement(reports: &[ReportRef]) -> String {
    let mut text = if reports.len() == 1 {
        "You have one recent report.".to_owned()
    } else {
        format!("You have {} recent reports.", spoken_number(reports.len()))
    };
    for (i, report) in reports.iter().enumerate() {
        text.push_str(&format!(" Number {}: {}.", spoken_number(i + 1), report.spoken_label()));
    }
    text.push_str(" Which one would you like to discuss?");
    text
}

pub(super) async fn select(ctx: &FlowContext, cancel: &CancellationToken) -> Result<ListenerOutcome> {
    ctx.ui().show_screen(ScreenId::Feedback);
    ctx.ui().set_status("Choosing a feedback report");

    // Newest first from the store; announce the most recent ones oldest first.
    let mut reports = ctx.collab.store.list_reports(&ctx.user).await?;
    if reports.is_empty() {
        ctx.voice().say_best_effort(NO_REPORTS).await;
        return Ok(ListenerOutcome::next(Successor::Navigation));
    }
    reports.truncate(ctx.config().feedback.max_announced_reports.max(1));
    reports.reverse();

    let resolver = OrdinalResolver::new(ctx.collab.model.clone(), ctx.config().llm.clone());
    let class = Mode::FeedbackSelect.listen_class();
    ctx.voice().say_best_effort(&announcement(&reports)).await;

    // Misses, unresolvable answers and unclear confirmations use up an
    // attempt. A plain "no" does not: the user is still choosing.
    let attempts = ctx.config().feedback.selection_attempts.max(1);
    let mut failed = 0u32;
    while failed < attempts {
        if cancel.is_cancelled() {
            return Ok(ListenerOutcome::halted());
        }
        ctx.ui().set_status("Which report?");
        let Some(heard) = ctx.listen_once(class, true).await? else {
            ctx.voice()
                .say_best_effort("I didn't catch that. Which report would you like?")
                .await;
            failed += 1;
            continue;
        };
        ctx.ui().append_transcript_line(Role::User, &heard.text);

        let index = match resolver.resolve(&heard.text, reports.len()).await {
            OrdinalResolution::Index(index) => index,
            OrdinalResolution::OutOfRange(_) => {
                ctx.voice()
                    .say_best_effort(&format!(
                        "I only have {} to choose from. Please pick a number between one and {}.",
                        spoken_number(reports.len()),
                        spoken_number(reports.len())
                    ))
                    .await;
                failed += 1;
                continue;
            }
            OrdinalResolution::Unknown => {
                ctx.voice()
                    .say_best_effort("Sorry, which one? You can say the first one, or the latest one.")
                    .await;
                failed += 1;
                continue;
            }
        };

        let chosen = &reports[index];
        ctx.voice()
            .say_best_effort(&format!("You mean {}. Is that right?", chosen.spoken_label()))
            .await;
        if cancel.is_cancelled() {
            return Ok(ListenerOutcome::halted());
        }
        let answer = ctx.listen_once(class, true).await?;
        let confirmation = match &answer {
            Some(heard) => {
                ctx.ui().append_transcript_line(Role::User, &heard.text);
                resolver.confirm(&heard.text).await
            }
            None => Confirmation::Unclear,
        };
        match confirmation {
            Confirmation::Yes => {}
            Confirmation::No => {
                info!(failed, "report choice rejected");
                ctx.voice().say_best_effort("Okay. Which one would you like, then?").await;
                continue;
            }
            Confirmation::Unclear => {
                failed += 1;
                info!(failed, "report choice not confirmed");
                ctx.voice().say_best_effort("Sorry, I didn't get that. Which one would you like?").await;
                continue;
            }
        }

        let report = ctx.collab.store.fetch_report_detail(&ctx.user, &chosen.id).await?;
        info!(report = %report.id.0, "report opened");
        ctx.ui().set_status("Reading your report");
        ctx.voice().say_best_effort(&report.spoken_digest()).await;
        return Ok(ListenerOutcome::next(Successor::FeedbackQa(Box::new(report))));
    }

    warn!(attempts, "no report selected");
    ctx.voice().say_best_effort(GIVE_UP).await;
    Ok(ListenerOutcome::next(Successor::Navigation))
}

pub(super) async fn discuss(
    ctx: &FlowContext,
    report: &ReportSummary,
    cancel: &CancellationToken,
) -> Result<ListenerOutcome> {
    ctx.ui().set_status("Discussing your feedback");
    let replies = PersonaReplies::new(ctx.collab.model.clone(), ctx.config().llm.clone(), Persona::FeedbackCoach)
        .with_context(report.as_prompt_context());
    let end = ClassifierEnd::new(ctx.terminator(), ctx.collab.model.clone(), ctx.config().llm.clone());

    let mut state = DialogueState::default();
    let ended = ctx
        .engine()
        .run(
            &mut state,
            Some(QA_OPENER.to_owned()),
            &replies,
            &end,
            Mode::FeedbackQa.listen_class(),
            cancel,
        )
        .await?;
    if ended.reason == EndReason::Cancelled {
        return Ok(ListenerOutcome::halted());
    }
    info!(reason = %ended.reason, turns = ended.turns, "feedback discussion finished");
    ctx.voice().say_best_effort(QA_DONE).await;
    Ok(ListenerOutcome::next(Successor::Navigation))
}
