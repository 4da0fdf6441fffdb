//! First login: onboarding conversation, profile summary, hand-off to navigation.

use crate::helpers::{HarnessBuilder, user};
use voice_coach::runtime::{CoachEvent, ScreenId};
use voice_coach::scripted::{Hearing, ScriptedModel};
use voice_coach::session::{Mode, Role};
use voice_coach::store::Persistence;
use voice_coach::voice::Cue;

const ONBOARDING: &str = "onboarding specialist";
const SUMMARIZER: &str = "summarising the user's profile";

fn onboarding_model(summary: &str) -> ScriptedModel {
    ScriptedModel::new()
        .when_seq(
            ONBOARDING,
            &[
                "Hi, I'm Gemma. What do you enjoy doing outside work?",
                "What would you most like to practise here?",
                "What makes interviews hard for you?",
                "What would a perfect coach do for you?",
                "Thank you, that's really helpful. [END_ONBOARDING]",
            ],
        )
        .when(SUMMARIZER, summary)
}

fn four_answers() -> Vec<Hearing> {
    vec![
        Hearing::say("I like hiking and chess"),
        Hearing::say("I want to practise salary negotiation"),
        Hearing::say("I get nervous and ramble"),
        Hearing::say("keep me focused, that's all"),
    ]
}

#[tokio::test]
async fn new_user_is_onboarded_then_navigates() {
    let mut h = HarnessBuilder::new(onboarding_model(
        r#"{"interests": ["hiking", "chess"], "goals": ["salary negotiation"], "challenges": ["nerves"]}"#,
    ))
    .script(four_answers())
    .build();

    h.login().await;
    h.settle_in(Mode::Navigation).await;
    h.wait_for_speech("Your profile is now set up").await;

    let prefs = h.store.load_preferences(&user()).await.expect("prefs");
    assert!(prefs.onboarding_complete);
    let profile = prefs.profile_summary.expect("profile saved");
    assert_eq!(profile.interests, vec!["hiking".to_owned(), "chess".to_owned()]);
    assert_eq!(profile.challenges, vec!["nerves".to_owned()]);

    // Opener plus four answered turns, each answer followed by a reply.
    let history = h.store.fetch_history(&user()).await.expect("history");
    assert_eq!(history.len(), 9);
    assert_eq!(history.iter().filter(|u| u.role() == Role::User).count(), 4);

    assert_eq!(h.speaker.cue_count(Cue::Instructions), 1);
    assert!(h.speaker.said("Thank you. One moment while I set up your profile."));
    // The end marker is never spoken.
    assert!(!h.speaker.said("[END_ONBOARDING]"));
    // The summariser saw the whole conversation.
    let summary_prompt = h
        .model
        .prompts()
        .into_iter()
        .find(|p| p.contains(SUMMARIZER))
        .expect("summary prompt");
    assert!(summary_prompt.contains("I get nervous and ramble"));

    let events = h.drain_events();
    assert!(events.contains(&CoachEvent::Screen(ScreenId::Welcome)));
    assert!(events.contains(&CoachEvent::ModeChanged(Mode::Onboarding)));
    assert!(events.contains(&CoachEvent::ModeChanged(Mode::Navigation)));

    h.shutdown().await;
}

#[tokio::test]
async fn malformed_summary_still_completes_onboarding() {
    let h = HarnessBuilder::new(onboarding_model("Sorry, I can't do JSON today."))
        .script(four_answers())
        .build();

    h.login().await;
    h.settle_in(Mode::Navigation).await;

    let prefs = h.store.load_preferences(&user()).await.expect("prefs");
    assert!(prefs.onboarding_complete);
    assert!(prefs.profile_summary.is_none());
    assert_eq!(prefs.narrative_summary.as_deref(), Some("Sorry, I can't do JSON today."));

    h.shutdown().await;
}

#[tokio::test]
async fn onboarding_does_not_end_before_four_turns() {
    // The user tries to wrap up on the first answer; the floor keeps going.
    let h = HarnessBuilder::new(onboarding_model("{}"))
        .script(vec![
            Hearing::say("that's all"),
            Hearing::say("I like music"),
            Hearing::say("interview practice"),
            Hearing::say("I'm done"),
        ])
        .build();

    h.login().await;
    h.settle_in(Mode::Navigation).await;

    assert_eq!(h.model.prompt_count(ONBOARDING), 5);
    h.shutdown().await;
}

#[tokio::test]
async fn silent_new_user_leaves_onboarding_incomplete() {
    let h = HarnessBuilder::new(onboarding_model("{}"))
        .configure(|config| {
            config.listen.retry_budget = 0;
            config.listen.max_silent_rounds = 2;
        })
        .build();

    h.login().await;
    h.wait_for_speech("We can finish setting up your profile the next time you log in.")
        .await;
    let snapshot = h.wait_for_mode(Mode::Navigation).await;
    assert_eq!(snapshot.turn_count, 0);

    let prefs = h.store.load_preferences(&user()).await.expect("prefs");
    assert!(!prefs.onboarding_complete);
    assert!(prefs.profile_summary.is_none());
    assert_eq!(h.model.prompt_count(SUMMARIZER), 0);
    // Opener plus one reply after the first silent round; silence itself is
    // never written to history.
    assert_eq!(h.model.prompt_count(ONBOARDING), 2);
    let history = h.store.fetch_history(&user()).await.expect("history");
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|u| u.role() == Role::Assistant));
    assert!(!h.speaker.said("Your profile is now set up"));

    h.shutdown().await;
}
