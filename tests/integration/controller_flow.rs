//! Login, navigation commands, invalid transitions, device loss and logout.

use crate::helpers::{HarnessBuilder, onboarded_store, user};
use std::time::Duration;
use voice_coach::controller::{DEVICE_LOST, Successor};
use voice_coach::error::CoachError;
use voice_coach::persona::Persona;
use voice_coach::runtime::{CoachEvent, ScreenId};
use voice_coach::scripted::{Hearing, ScriptedModel};
use voice_coach::session::Mode;
use voice_coach::store::{InterviewKind, Persistence, ReportId, ReportSummary};
use voice_coach::voice::Cue;

const CLASSIFIER: &str = "command classifier";

#[tokio::test]
async fn returning_user_is_greeted_on_their_last_screen() {
    let mut h = HarnessBuilder::new(ScriptedModel::new())
        .store(onboarded_store(Some(ScreenId::Feedback)).await)
        .build();

    h.login().await;
    let snapshot = h.wait_for_mode(Mode::Navigation).await;
    assert_eq!(snapshot.user, user());
    assert_eq!(snapshot.persona, Persona::NavigationAssistant);
    h.wait_for_speech("Welcome back, Asha!").await;

    let events = h.drain_events();
    assert!(events.contains(&CoachEvent::Screen(ScreenId::Feedback)));
    assert!(!events.contains(&CoachEvent::ModeChanged(Mode::Onboarding)));
    h.shutdown().await;
}

#[tokio::test]
async fn goto_interview_shows_screen_and_stays_in_navigation() {
    let mut h = HarnessBuilder::new(ScriptedModel::new().when(CLASSIFIER, "GOTO_INTERVIEW"))
        .store(onboarded_store(None).await)
        .script(vec![Hearing::say("take me to the interview screen")])
        .build();

    h.login().await;
    h.wait_for_speech("Okay, showing the Interview Screen.").await;

    let store = h.store.clone();
    let mut remembered = false;
    for _ in 0..200 {
        let prefs = store.load_preferences(&user()).await.expect("prefs");
        if prefs.last_screen == Some(ScreenId::Interview) {
            remembered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(remembered, "last screen not persisted");

    let snapshot = h.wait_for_mode(Mode::Navigation).await;
    assert_eq!(snapshot.mode, Mode::Navigation);
    assert!(h.drain_events().contains(&CoachEvent::Screen(ScreenId::Interview)));
    h.shutdown().await;
}

#[tokio::test]
async fn explain_and_unknown_play_their_cues() {
    let h = HarnessBuilder::new(
        ScriptedModel::new().when_seq(CLASSIFIER, &["EXPLAIN", "\"UNKNOWN\""]),
    )
    .store(onboarded_store(None).await)
    .script(vec![Hearing::say("help"), Hearing::say("what's the weather")])
    .build();

    h.login().await;
    h.wait_for_speech("I'm sorry, I didn't understand that command.").await;
    let speaker = h.speaker.clone();
    h.eventually("the not-understood cue", || speaker.cue_count(Cue::NotUnderstood) == 1)
        .await;
    assert_eq!(h.speaker.cue_count(Cue::Instructions), 1);
    assert!(h.speaker.said("Here is how this works."));
    h.shutdown().await;
}

#[tokio::test]
async fn classifier_failure_apologises_and_keeps_listening() {
    let h = HarnessBuilder::new(
        ScriptedModel::new()
            .failing_when("flaky request")
            .when(CLASSIFIER, "GOTO_INTERVIEW"),
    )
    .store(onboarded_store(None).await)
    .script(vec![
        Hearing::say("flaky request"),
        Hearing::say("interview screen please"),
    ])
    .build();

    h.login().await;
    h.wait_for_speech("I'm sorry, I couldn't process that.").await;
    h.wait_for_speech("Okay, showing the Interview Screen.").await;
    assert_eq!(h.wait_for_mode(Mode::Navigation).await.mode, Mode::Navigation);
    h.shutdown().await;
}

#[tokio::test]
async fn practice_session_starts_a_background_interview() {
    let mut h = HarnessBuilder::new(
        ScriptedModel::new()
            .when(CLASSIFIER, "START_BACKGROUND_INTERVIEW")
            .when("background and project-focused", "Tell me about yourself."),
    )
    .store(onboarded_store(None).await)
    .script(vec![Hearing::say("let's start a practice session")])
    .mic_delay(Duration::from_millis(1))
    .build();

    h.login().await;
    h.wait_for_speech("Tell me about yourself.").await;

    let events = h.drain_events();
    assert!(events.contains(&CoachEvent::ModeChanged(Mode::Interview)));
    assert!(events.contains(&CoachEvent::Screen(ScreenId::Interview)));
    assert_eq!(h.model.prompt_count("salary negotiation simulation"), 0);
    h.shutdown().await;
}

#[tokio::test]
async fn invalid_ui_transition_leaves_listener_running() {
    let h = HarnessBuilder::new(ScriptedModel::new())
        .store(onboarded_store(None).await)
        .build();
    h.login().await;
    h.wait_for_mode(Mode::Navigation).await;

    let report = ReportSummary {
        id: ReportId("r1".into()),
        user: user(),
        kind: InterviewKind::Background,
        created_at: chrono::Utc::now(),
        rows: Vec::new(),
        overall_feedback: String::new(),
    };
    let err = h
        .client
        .enter(Successor::FeedbackQa(Box::new(report)))
        .await
        .expect_err("navigation cannot jump to feedback Q&A");
    assert!(matches!(
        err,
        CoachError::InvalidTransition {
            from: "navigation",
            to: "feedback_qa"
        }
    ));

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.mode, Mode::Navigation);
    assert_eq!(snapshot.listening_in, Some(Mode::Navigation));
    assert_eq!(h.client.running_listeners(), 1);
    h.shutdown().await;
}

#[tokio::test]
async fn device_loss_halts_until_restart() {
    let h = HarnessBuilder::new(ScriptedModel::new().when(CLASSIFIER, "EXPLAIN"))
        .store(onboarded_store(None).await)
        .script(vec![Hearing::DeviceLost])
        .build();

    h.login().await;
    h.wait_for_speech(DEVICE_LOST).await;

    let client = h.client.clone();
    let mut halted = false;
    for _ in 0..200 {
        let snapshot = client.snapshot().await.expect("snapshot").expect("session");
        if snapshot.awaiting_restart {
            assert_eq!(snapshot.listening_in, None);
            assert_eq!(snapshot.mode, Mode::Navigation);
            halted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(halted, "listener never halted");
    assert_eq!(h.client.running_listeners(), 0);

    h.mic.push(Hearing::say("help"));
    h.client.restart().await.expect("restart");
    let snapshot = h.wait_for_mode(Mode::Navigation).await;
    assert!(!snapshot.awaiting_restart);
    h.wait_for_speech("Here is how this works.").await;
    drop(client);
    h.shutdown().await;
}

#[tokio::test]
async fn logout_stops_listening_and_drops_the_session() {
    let h = HarnessBuilder::new(ScriptedModel::new())
        .store(onboarded_store(None).await)
        .build();
    h.login().await;
    h.wait_for_mode(Mode::Navigation).await;

    h.client.logout().await.expect("logout");
    assert_eq!(h.client.running_listeners(), 0);
    assert!(h.client.snapshot().await.expect("snapshot").is_none());
    assert!(matches!(
        h.client.restart().await,
        Err(CoachError::Listener(_))
    ));
    h.shutdown().await;
}

#[tokio::test]
async fn ui_screen_change_is_remembered() {
    let h = HarnessBuilder::new(ScriptedModel::new())
        .store(onboarded_store(None).await)
        .build();
    h.login().await;
    h.client.show_screen(ScreenId::Feedback).await.expect("show screen");
    let prefs = h.store.load_preferences(&user()).await.expect("prefs");
    assert_eq!(prefs.last_screen, Some(ScreenId::Feedback));
    h.shutdown().await;
}
