//! Post-interview analysis.
//!
//! The controller only needs to know whether analysis succeeded and which
//! report id to announce. [`ModelReportAnalyzer`] builds the report by asking
//! the model to score each answer, then saves it through [`Persistence`].

use crate::config::LlmConfig;
use crate::error::{CoachError, Result};
use crate::llm::{self, CompletionRequest, LanguageModel};
use crate::persona;
use crate::session::{Role, Transcript, UserId};
use crate::store::{InterviewKind, Persistence, ReportId, ReportRow, ReportSummary};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Speaking rate assumed when an answer has no measured duration.
pub const ESTIMATED_WPM: f64 = 150.0;

/// Turns a finished interview transcript into a stored report.
#[async_trait]
pub trait ReportAnalyzer: Send + Sync {
    async fn analyze(&self, user: &UserId, kind: InterviewKind, transcript: &Transcript) -> Result<ReportId>;
}

/// A question and the answer that followed it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredQuestion {
    pub question: String,
    pub answer: String,
    pub spoken_seconds: Option<f64>,
}

/// Pair each assistant line with the user answer that directly follows it.
///
/// Silence sentinels consume their question without producing a pair.
#[must_use]
pub fn pair_questions(transcript: &Transcript) -> Vec<AnsweredQuestion> {
    let mut pairs = Vec::new();
    let mut pending: Option<&str> = None;
    for utterance in transcript.iter() {
        match utterance.role() {
            Role::Assistant => pending = Some(utterance.text()),
            Role::User => {
                if let Some(question) = pending.take()
                    && !utterance.is_sentinel()
                {
                    pairs.push(AnsweredQuestion {
                        question: question.to_owned(),
                        answer: utterance.text().to_owned(),
                        spoken_seconds: utterance.spoken_duration_seconds(),
                    });
                }
            }
            Role::System => {}
        }
    }
    pairs
}

/// Words per minute, falling back to [`ESTIMATED_WPM`] without a duration.
#[must_use]
pub fn words_per_minute(answer: &str, spoken_seconds: Option<f64>) -> f64 {
    let words = answer.split_whitespace().count() as f64;
    if words == 0.0 {
        return 0.0;
    }
    match spoken_seconds {
        Some(secs) if secs > 0.0 => (words / secs * 60.0).round(),
        _ => ESTIMATED_WPM,
    }
}

/// First integer in `value`, clamped to 1..=10.
fn parse_score(value: &str) -> Option<u8> {
    let digits: String = value
        .trim()
        .trim_start_matches(['[', '('])
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u32>().ok().map(|n| n.clamp(1, 10) as u8)
}

fn clean_reason(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .to_owned()
}

/// Parse the `KEY: value` lines of a content analysis into `row`.
///
/// Unknown keys are ignored and missing ones stay empty.
pub fn apply_content_analysis(row: &mut ReportRow, text: &str) {
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key
            .trim()
            .trim_matches(['*', '\'', '"'])
            .to_ascii_uppercase()
            .replace(' ', "_");
        match key.as_str() {
            "STAR_SCORE" => row.star_score = parse_score(value),
            "STAR_REASON" => row.star_reason = clean_reason(value),
            "KEYWORDS_SCORE" => row.keywords_score = parse_score(value),
            "KEYWORDS_REASON" => row.keywords_reason = clean_reason(value),
            "PROFESSIONALISM_SCORE" => row.professionalism_score = parse_score(value),
            "PROFESSIONALISM_REASON" => row.professionalism_reason = clean_reason(value),
            _ => {}
        }
    }
}

/// Model-backed analyzer.
pub struct ModelReportAnalyzer {
    model: Arc<dyn LanguageModel>,
    llm: LlmConfig,
    store: Arc<dyn Persistence>,
}

impl ModelReportAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, llm: LlmConfig, store: Arc<dyn Persistence>) -> Self {
        Self { model, llm, store }
    }

    async fn analyse_answer(&self, pair: &AnsweredQuestion) -> ReportRow {
        let mut row = ReportRow {
            question: pair.question.clone(),
            answer: pair.answer.clone(),
            words_per_minute: words_per_minute(&pair.answer, pair.spoken_seconds),
            ..ReportRow::default()
        };
        let prompt = persona::content_analysis_prompt(&pair.question, &pair.answer);
        let request = CompletionRequest::summary(prompt, &self.llm);
        match self.model.complete(&request).await {
            Ok(text) => apply_content_analysis(&mut row, &text),
            Err(e) => warn!("content analysis failed for one answer: {e}"),
        }
        row
    }

    async fn overall_feedback(&self, rows: &[ReportRow]) -> String {
        let digest = rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "Question {}: pace {:.0} wpm; STAR {:?} ({}); keywords {:?} ({}); professionalism {:?} ({})",
                    i + 1,
                    r.words_per_minute,
                    r.star_score,
                    r.star_reason,
                    r.keywords_score,
                    r.keywords_reason,
                    r.professionalism_score,
                    r.professionalism_reason
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let request = CompletionRequest::summary(persona::final_summary_prompt(&digest), &self.llm);
        match llm::complete_spoken(self.model.as_ref(), &request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("overall feedback unavailable: {e}");
                String::new()
            }
        }
    }
}

#[async_trait]
impl ReportAnalyzer for ModelReportAnalyzer {
    async fn analyze(&self, user: &UserId, kind: InterviewKind, transcript: &Transcript) -> Result<ReportId> {
        let pairs = pair_questions(transcript);
        if pairs.is_empty() {
            return Err(CoachError::Analysis("the interview has no answered questions".into()));
        }

        let mut rows = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            rows.push(self.analyse_answer(pair).await);
        }
        let overall_feedback = self.overall_feedback(&rows).await;

        let report = ReportSummary {
            id: ReportId::generate(),
            user: user.clone(),
            kind,
            created_at: chrono::Utc::now(),
            rows,
            overall_feedback,
        };
        self.store.save_report(&report).await?;
        info!(report = %report.id, %kind, answers = report.rows.len(), "interview report saved");
        Ok(report.id)
    }
}
