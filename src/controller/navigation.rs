//! The one-shot command loop.

use super::{FlowContext, ListenerOutcome, Successor, remember_screen};
use crate::command::{self, Command, CommandEffect};
use crate::error::Result;
use crate::session::{Mode, Role};
use crate::voice::Cue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const CLASSIFY_FAILED: &str = "I'm sorry, I couldn't process that. Please try again.";

pub(super) async fn run(ctx: &FlowContext, cancel: &CancellationToken) -> Result<ListenerOutcome> {
    let class = Mode::Navigation.listen_class();
    // Beep only after something was said, not on every silent window.
    let mut beep = true;
    loop {
        if cancel.is_cancelled() {
            return Ok(ListenerOutcome::halted());
        }
        if beep {
            ctx.ui().set_status("Listening for a command…");
        }
        let heard = ctx.listen_once(class, beep).await?;
        let Some(heard) = heard else {
            beep = false;
            continue;
        };
        beep = true;
        if cancel.is_cancelled() {
            return Ok(ListenerOutcome::halted());
        }
        ctx.ui().append_transcript_line(Role::User, &heard.text);

        ctx.ui().set_status("Thinking…");
        let command = match command::classify(ctx.collab.model.as_ref(), &ctx.config().llm, &heard.text).await {
            Ok(command) => command,
            Err(e) => {
                warn!("command classification failed: {e}");
                ctx.voice().say_best_effort(CLASSIFY_FAILED).await;
                continue;
            }
        };
        if let Some(next) = dispatch(ctx, command).await {
            return Ok(ListenerOutcome::next(next));
        }
    }
}

/// Carry out `command`. Returns the successor when it leaves navigation.
pub(super) async fn dispatch(ctx: &FlowContext, command: Command) -> Option<Successor> {
    let effect = command.effect();
    debug!(%command, ?effect, "dispatching command");
    ctx.ui().set_status(command.status());
    ctx.voice().say_best_effort(command.acknowledgement()).await;
    match effect {
        CommandEffect::ShowScreen(screen) => {
            ctx.ui().show_screen(screen);
            remember_screen(ctx.collab.store.as_ref(), &ctx.user, screen).await;
            None
        }
        CommandEffect::Enter(mode) => Successor::for_mode(mode),
        CommandEffect::StartInterview(kind) => Some(Successor::Interview(kind)),
        CommandEffect::Instructions => {
            ctx.voice().cue_best_effort(Cue::Instructions).await;
            None
        }
        CommandEffect::NotUnderstood => {
            ctx.voice().cue_best_effort(Cue::NotUnderstood).await;
            None
        }
    }
}
