//! Console harness for the interview coach.
//!
//! Typed lines stand in for speech and spoken output is printed, so the whole
//! controller runs without audio hardware. The language model is reached over
//! the OpenAI-compatible completions endpoint from the config file.
//!
//! Usage: `voice-coach-console [--config PATH] [USER_NAME]`
//!
//! Tracing goes to stderr so stdout stays a readable conversation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_coach::analysis::ModelReportAnalyzer;
use voice_coach::config::CoachConfig;
use voice_coach::controller::{Collaborators, controller};
use voice_coach::llm::http::HttpLanguageModel;
use voice_coach::runtime::{BroadcastPresentation, CoachEvent};
use voice_coach::session::UserId;
use voice_coach::store::memory::InMemoryStore;
use voice_coach::voice::console::{ConsoleMicrophone, ConsoleSpeaker};
use voice_coach::voice::{PassthroughTranscriber, VoiceIo};

struct Args {
    config: Option<PathBuf>,
    user: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut user = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("usage: voice-coach-console [--config PATH] [USER_NAME]");
                std::process::exit(0);
            }
            _ => user = Some(arg),
        }
    }
    Ok(Args {
        config,
        user: user.unwrap_or_else(|| "guest".to_owned()),
    })
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<CoachConfig> {
    let path = path.unwrap_or_else(CoachConfig::default_config_path);
    let config = if path.exists() {
        info!(path = %path.display(), "loading config");
        CoachConfig::from_file(&path)?
    } else {
        info!(path = %path.display(), "no config file, using defaults");
        CoachConfig::default()
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voice_coach=info")),
        )
        .init();

    let args = parse_args()?;
    let config = Arc::new(load_config(args.config)?);
    println!("Voice Coach v{}", env!("CARGO_PKG_VERSION"));

    let model = Arc::new(HttpLanguageModel::new(&config.llm)?);
    let store = Arc::new(InMemoryStore::new());
    let ui = Arc::new(BroadcastPresentation::default());
    let collab = Collaborators {
        voice: VoiceIo::new(
            Arc::new(ConsoleMicrophone::new()),
            Arc::new(PassthroughTranscriber),
            Arc::new(ConsoleSpeaker),
        ),
        model: model.clone(),
        store: store.clone(),
        ui: ui.clone(),
        analyzer: Arc::new(ModelReportAnalyzer::new(model, config.llm.clone(), store)),
        config,
    };

    let mut events = ui.subscribe();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                CoachEvent::Status(status) => info!(%status, "status"),
                CoachEvent::Screen(screen) => info!(screen = screen.as_str(), "screen"),
                CoachEvent::ModeChanged(mode) => info!(%mode, "mode"),
                CoachEvent::TranscriptLine { .. } => {}
            }
        }
    });

    let (client, actor) = controller(16, collab);
    let actor = tokio::spawn(actor.run());

    let user = UserId(args.user.to_lowercase());
    client.login(user, args.user).await?;

    // Run until interrupted or until the listener halts on closed console input.
    let mut poll = tokio::time::interval(Duration::from_millis(500));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = poll.tick() => {
                let halted = client
                    .snapshot()
                    .await?
                    .is_none_or(|s| s.awaiting_restart);
                if halted {
                    break;
                }
            }
        }
    }

    client.logout().await?;
    drop(client);
    actor.await?;
    event_log.abort();
    info!("voice coach shut down cleanly");
    Ok(())
}
