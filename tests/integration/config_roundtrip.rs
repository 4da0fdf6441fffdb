//! Configuration files on disk.

use voice_coach::config::CoachConfig;
use voice_coach::error::CoachError;

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = CoachConfig::default();
    config.llm.api_url = "http://llm.internal:9000".into();
    config.dialogue.salary_interview.max_turns = Some(8);
    config.feedback.selection_attempts = 2;
    config.save_to_file(&path).expect("save");

    let loaded = CoachConfig::from_file(&path).expect("load");
    assert_eq!(loaded.llm.api_url, "http://llm.internal:9000");
    assert_eq!(loaded.dialogue.salary_interview.max_turns, Some(8));
    assert_eq!(loaded.feedback.selection_attempts, 2);
    assert_eq!(loaded.dialogue.feedback_qa.max_turns, None);
}

#[test]
fn partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[llm]\nmodel = \"local-gemma\"\n").expect("write");

    let loaded = CoachConfig::from_file(&path).expect("load");
    assert_eq!(loaded.llm.model, "local-gemma");
    assert_eq!(loaded.listen.retry_budget, 2);
    assert_eq!(loaded.dialogue.onboarding.min_turns, 4);
}

#[test]
fn invalid_file_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[dialogue]\nstagnation_threshold = 1.5\n").expect("write");
    assert!(matches!(CoachConfig::from_file(&path), Err(CoachError::Config(_))));

    std::fs::write(&path, "not = [valid").expect("write");
    assert!(matches!(CoachConfig::from_file(&path), Err(CoachError::Config(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = CoachConfig::from_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(CoachError::Io(_))));
}
