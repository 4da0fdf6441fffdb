//! Mock interviews end to end: turn-taking, closing line, analysis and the report.

use crate::helpers::{HarnessBuilder, onboarded_store, user};
use std::sync::Arc;
use voice_coach::dialogue::engine::DIDNT_CATCH;
use voice_coach::scripted::{FailingAnalyzer, Hearing, ScriptedModel};
use voice_coach::persona::Persona;
use voice_coach::session::{Mode, Role};
use voice_coach::store::{InterviewKind, Persistence};

const CLASSIFIER: &str = "command classifier";
const SALARY: &str = "salary negotiation simulation";
const BACKGROUND: &str = "background and project-focused";
const CONTENT: &str = "Analyse the user's answer";
const OVERALL: &str = "summarising an interview performance";
const CLOSING: &str = "write a brief, natural closing";

fn salary_model() -> ScriptedModel {
    ScriptedModel::new()
        .when(CLASSIFIER, "START_SALARY_INTERVIEW")
        .when_seq(
            SALARY,
            &[
                "What salary are you hoping for?",
                "Why do you think that figure is fair?",
                "What if we offered ten percent less?",
                "How flexible are you on the start date?",
                "Thanks, let's wrap up there.",
            ],
        )
        .when(CONTENT, "STAR_SCORE: 7\nSTAR_REASON: Clear ask.\nKEYWORDS_SCORE: 6\nKEYWORDS_REASON: Named a number.")
        .when(OVERALL, "Solid negotiation overall. Anchor higher next time.")
        .when(CLOSING, "Thanks for negotiating with me today.")
}

fn salary_script() -> Vec<Hearing> {
    vec![
        Hearing::say("let's practise salary negotiation"),
        Hearing::SayFor("around ninety thousand".into(), 4.0),
        Hearing::say("it matches the market rate for this role"),
        Hearing::say("I could go a little lower with more equity"),
        Hearing::say("two weeks notice, that's all"),
    ]
}

#[tokio::test]
async fn salary_interview_produces_a_saved_report() {
    let store = onboarded_store(None).await;
    let h = HarnessBuilder::new(salary_model())
        .store(store.clone())
        .script(salary_script())
        .build();

    h.login().await;
    h.wait_for_speech("Your feedback report is ready.").await;
    h.settle_in(Mode::Navigation).await;

    assert!(h.speaker.said("What salary are you hoping for?"));
    assert!(h.speaker.said("Thanks for negotiating with me today."));
    assert_eq!(h.model.prompt_count(BACKGROUND), 0);

    let reports = store.list_reports(&user()).await.expect("reports");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, InterviewKind::Salary);

    let report = store
        .fetch_report_detail(&user(), &reports[0].id)
        .await
        .expect("report detail");
    assert_eq!(report.rows.len(), 4);
    let first = &report.rows[0];
    assert_eq!(first.question, "What salary are you hoping for?");
    assert_eq!(first.answer, "around ninety thousand");
    assert!((first.words_per_minute - 45.0).abs() < f64::EPSILON);
    assert_eq!(first.star_score, Some(7));
    assert_eq!(first.keywords_reason, "Named a number.");
    assert_eq!(report.overall_feedback, "Solid negotiation overall. Anchor higher next time.");
    assert_eq!(h.model.prompt_count(CONTENT), 4);

    // The reference read out is the report id's prefix.
    let reference = format!("Its reference is {}.", reports[0].id.short());
    assert!(h.speaker.said(&reference));

    h.shutdown().await;
}

#[tokio::test]
async fn failed_analysis_is_reported_and_navigation_resumes() {
    let h = HarnessBuilder::new(salary_model())
        .store(onboarded_store(None).await)
        .analyzer(Arc::new(FailingAnalyzer))
        .script(salary_script())
        .build();

    h.login().await;
    h.wait_for_speech("couldn't create a feedback report").await;
    h.settle_in(Mode::Navigation).await;

    assert!(h.store.list_reports(&user()).await.expect("reports").is_empty());
    assert!(!h.speaker.said("Your feedback report is ready."));
    h.shutdown().await;
}

#[tokio::test]
async fn mumbled_answer_gets_the_same_question_again() {
    let h = HarnessBuilder::new(
        ScriptedModel::new()
            .when(CLASSIFIER, "START_BACKGROUND_INTERVIEW")
            .when_seq(
                BACKGROUND,
                &["Tell me about a project you are proud of.", "What was your role in it?"],
            ),
    )
    .store(onboarded_store(None).await)
    .script(vec![
        Hearing::say("start a background interview"),
        Hearing::Mumble,
        Hearing::say("I rebuilt our billing pipeline"),
    ])
    .build();

    h.login().await;
    h.wait_for_speech("What was your role in it?").await;

    let spoken = h.speaker.spoken();
    let first = spoken
        .iter()
        .position(|s| s == "Tell me about a project you are proud of.")
        .expect("opening question");
    assert_eq!(
        &spoken[first..first + 3],
        &[
            "Tell me about a project you are proud of.".to_owned(),
            DIDNT_CATCH.to_owned(),
            "Tell me about a project you are proud of.".to_owned(),
        ]
    );
    // One answered turn means one reply request beyond the opener.
    assert_eq!(h.model.prompt_count(BACKGROUND), 2);
    h.shutdown().await;
}

fn background_model(questions: &[&str]) -> ScriptedModel {
    ScriptedModel::new()
        .when(CLASSIFIER, "START_BACKGROUND_INTERVIEW")
        .when_seq(BACKGROUND, questions)
        .when(CONTENT, "STAR_SCORE: 6\nSTAR_REASON: Some structure.\nKEYWORDS_SCORE: 5\nKEYWORDS_REASON: Few specifics.")
        .when(OVERALL, "Good detail. Tighten your endings.")
        .when(CLOSING, "Thanks for walking me through your background.")
}

#[tokio::test]
async fn repeated_question_ends_the_interview_before_the_ceiling() {
    let repeated = "Could you tell me more about that?";
    let store = onboarded_store(None).await;
    let h = HarnessBuilder::new(background_model(&[
        "Tell me about a project you are proud of.",
        "What was your role in it?",
        "What did you learn from it?",
        repeated,
        repeated,
    ]))
    .store(store.clone())
    .script(vec![
        Hearing::say("start a background interview"),
        Hearing::say("I rebuilt our billing pipeline"),
        Hearing::say("I led a team of four engineers"),
        Hearing::say("to measure before optimising"),
        Hearing::say("we cut invoice errors by half"),
    ])
    .build();

    h.login().await;
    h.wait_for_speech("Your feedback report is ready.").await;
    let snapshot = h.settle_in(Mode::Navigation).await;
    assert_eq!(snapshot.turn_count, 0);
    assert!(snapshot.transcript.is_empty());

    // Four answers reached the floor and the last two questions matched, so
    // the ceiling of ten was never approached.
    assert_eq!(h.model.prompt_count(BACKGROUND), 5);
    // The final, stagnant line is recorded but not spoken.
    let spoken = h.speaker.spoken();
    assert_eq!(spoken.iter().filter(|s| s.as_str() == repeated).count(), 1);
    assert!(h.speaker.said("Thanks for walking me through your background."));

    let reports = store.list_reports(&user()).await.expect("reports");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, InterviewKind::Background);
    let report = store
        .fetch_report_detail(&user(), &reports[0].id)
        .await
        .expect("report detail");
    assert_eq!(report.rows.len(), 4);
    assert_eq!(report.rows[3].question, repeated);
    assert_eq!(report.rows[3].answer, "we cut invoice errors by half");

    h.shutdown().await;
}

#[tokio::test]
async fn silent_candidate_gets_a_closing_and_no_report() {
    let h = HarnessBuilder::new(salary_model())
        .store(onboarded_store(None).await)
        .configure(|config| config.listen.max_silent_rounds = 3)
        .script(vec![Hearing::say("let's practise salary negotiation")])
        .build();

    h.login().await;
    h.wait_for_speech("couldn't create a feedback report").await;
    h.settle_in(Mode::Navigation).await;

    // Opener, then one reply after each of the first two silent rounds.
    assert_eq!(h.model.prompt_count(SALARY), 3);
    // Two retries per round, three rounds.
    let spoken = h.speaker.spoken();
    assert_eq!(spoken.iter().filter(|s| s.as_str() == DIDNT_CATCH).count(), 6);
    assert!(h.speaker.said("Thanks for negotiating with me today."));
    assert_eq!(h.model.prompt_count(CONTENT), 0);
    assert!(h.store.list_reports(&user()).await.expect("reports").is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn session_mirrors_the_interview_while_it_runs() {
    let h = HarnessBuilder::new(background_model(&[
        "Tell me about a project you are proud of.",
        "What was your role in it?",
        "What did you learn from it?",
    ]))
    .store(onboarded_store(None).await)
    .script(vec![
        Hearing::say("start a background interview"),
        Hearing::say("I rebuilt our billing pipeline"),
        Hearing::say("I owned the data migration"),
    ])
    .build();

    h.login().await;
    let deadline = tokio::time::Instant::now() + crate::helpers::WAIT;
    let snapshot = loop {
        let snapshot = h.snapshot().await;
        if snapshot.turn_count == 2
            && snapshot
                .transcript
                .iter()
                .any(|u| u.text() == "What did you learn from it?")
        {
            break snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session never caught up: {snapshot:?}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };

    assert_eq!(snapshot.mode, Mode::Interview);
    assert_eq!(snapshot.persona, Persona::BackgroundInterviewer);
    assert_eq!(snapshot.transcript.validated_user_turns(), 2);
    let texts: Vec<(Role, &str)> = snapshot
        .transcript
        .iter()
        .take(5)
        .map(|u| (u.role(), u.text()))
        .collect();
    assert_eq!(
        texts,
        vec![
            (Role::Assistant, "Tell me about a project you are proud of."),
            (Role::User, "I rebuilt our billing pipeline"),
            (Role::Assistant, "What was your role in it?"),
            (Role::User, "I owned the data migration"),
            (Role::Assistant, "What did you learn from it?"),
        ]
    );

    h.shutdown().await;
}
