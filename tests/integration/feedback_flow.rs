//! Picking a report by voice, hearing its digest and discussing it.

use crate::helpers::{HarnessBuilder, onboarded_store, seed_report};
use voice_coach::runtime::{CoachEvent, ScreenId};
use voice_coach::scripted::{Hearing, ScriptedModel};
use voice_coach::session::Mode;
use voice_coach::store::InterviewKind;

const CLASSIFIER: &str = "command classifier";
const ORDINAL: &str = "spoken reference";
const CONFIRM: &str = "affirmation";
const COACH: &str = "supportive career coach";
const END_INTENT: &str = "intention to end";

async fn three_reports() -> std::sync::Arc<voice_coach::store::memory::InMemoryStore> {
    let store = onboarded_store(None).await;
    seed_report(&store, "oldest", InterviewKind::Background, 9, "Describe a conflict.", "Oldest feedback.").await;
    seed_report(&store, "middle", InterviewKind::Salary, 5, "What are your expectations?", "Middle feedback.").await;
    seed_report(&store, "newest", InterviewKind::Background, 1, "Tell me about a launch.", "Newest feedback.").await;
    store
}

#[tokio::test]
async fn latest_report_is_chosen_read_and_discussed() {
    let mut h = HarnessBuilder::new(
        ScriptedModel::new()
            .when(CLASSIFIER, "GOTO_FEEDBACK")
            .when(ORDINAL, "UNKNOWN")
            .when(END_INTENT, "NO")
            .when(COACH, "Your pacing was steady and clear."),
    )
    .store(three_reports().await)
    .script(vec![
        Hearing::say("show my feedback"),
        Hearing::say("the last one"),
        Hearing::say("yes"),
        Hearing::say("how was my pace"),
        Hearing::say("thanks, that's all"),
    ])
    .build();

    h.login().await;
    h.wait_for_speech("Okay. Going back to the main menu.").await;
    h.settle_in(Mode::Navigation).await;

    let spoken = h.speaker.spoken();
    let listing = spoken
        .iter()
        .find(|s| s.starts_with("You have three recent reports."))
        .expect("report listing");
    // Oldest first, so "the last one" is the newest.
    let salary = listing.find("salary negotiation").expect("middle report");
    let first_background = listing.find("background").expect("a background report");
    assert!(first_background < salary);
    assert!(h.speaker.said("Newest feedback."));
    assert!(!h.speaker.said("Oldest feedback."));

    let coach_prompt = h
        .model
        .prompts()
        .into_iter()
        .find(|p| p.contains(COACH))
        .expect("coach prompt");
    assert!(coach_prompt.contains("Tell me about a launch."));
    assert!(!coach_prompt.contains("Describe a conflict."));
    assert!(h.speaker.said("What would you like to know about this interview?"));
    assert!(h.speaker.said("Your pacing was steady and clear."));
    // "how was my pace" went to the classifier; "that's all" ended without it.
    assert_eq!(h.model.prompt_count(END_INTENT), 1);
    assert_eq!(h.model.prompt_count(CONFIRM), 0);

    let events = h.drain_events();
    assert!(events.contains(&CoachEvent::Screen(ScreenId::Feedback)));
    assert!(events.contains(&CoachEvent::ModeChanged(Mode::FeedbackSelect)));
    assert!(events.contains(&CoachEvent::ModeChanged(Mode::FeedbackQa)));
    h.shutdown().await;
}

#[tokio::test]
async fn rejected_choice_asks_again() {
    let h = HarnessBuilder::new(
        ScriptedModel::new()
            .when(CLASSIFIER, "GOTO_FEEDBACK")
            .when_seq(ORDINAL, &["2", "1"])
            .when(END_INTENT, "YES")
            .when(COACH, "Happy to help."),
    )
    .store(three_reports().await)
    .script(vec![
        Hearing::say("feedback please"),
        Hearing::say("the newest"),
        Hearing::say("no"),
        Hearing::say("number two"),
        Hearing::say("yep"),
        Hearing::say("what should I improve"),
    ])
    .build();

    h.login().await;
    h.wait_for_speech("Middle feedback.").await;
    h.settle_in(Mode::Navigation).await;

    assert!(h.speaker.said("Okay. Which one would you like, then?"));
    assert!(h.speaker.said("You mean a salary negotiation interview from"));
    assert!(!h.speaker.said("Newest feedback."));
    assert_eq!(h.model.prompt_count(ORDINAL), 2);
    h.shutdown().await;
}

#[tokio::test]
async fn no_reports_returns_to_navigation() {
    let h = HarnessBuilder::new(ScriptedModel::new().when(CLASSIFIER, "GOTO_FEEDBACK"))
        .store(onboarded_store(None).await)
        .script(vec![Hearing::say("show my feedback")])
        .build();

    h.login().await;
    h.wait_for_speech("You don't have any feedback reports yet.").await;
    h.settle_in(Mode::Navigation).await;
    assert_eq!(h.model.prompt_count(ORDINAL), 0);
    h.shutdown().await;
}

#[tokio::test]
async fn saying_no_does_not_use_up_an_attempt() {
    let h = HarnessBuilder::new(
        ScriptedModel::new()
            .when(CLASSIFIER, "GOTO_FEEDBACK")
            .when_seq(ORDINAL, &["2", "1"])
            .when(END_INTENT, "YES")
            .when(COACH, "Happy to help."),
    )
    .store(three_reports().await)
    .configure(|config| config.feedback.selection_attempts = 1)
    .script(vec![
        Hearing::say("feedback please"),
        Hearing::say("the newest"),
        Hearing::say("no"),
        Hearing::say("number two"),
        Hearing::say("yes"),
        Hearing::say("what should I improve"),
    ])
    .build();

    h.login().await;
    h.wait_for_speech("Middle feedback.").await;
    h.settle_in(Mode::Navigation).await;

    assert!(h.speaker.said("Okay. Which one would you like, then?"));
    assert!(!h.speaker.said("Let's leave that for now."));
    h.shutdown().await;
}

#[tokio::test]
async fn unresolvable_choice_uses_up_the_last_attempt() {
    let h = HarnessBuilder::new(
        ScriptedModel::new()
            .when(CLASSIFIER, "GOTO_FEEDBACK")
            .when(ORDINAL, "UNKNOWN"),
    )
    .store(three_reports().await)
    .configure(|config| config.feedback.selection_attempts = 1)
    .script(vec![Hearing::say("feedback please"), Hearing::say("the blue report")])
    .build();

    h.login().await;
    h.wait_for_speech("Let's leave that for now.").await;
    h.settle_in(Mode::Navigation).await;
    assert!(!h.speaker.said("Is that right?"));
    h.shutdown().await;
}
