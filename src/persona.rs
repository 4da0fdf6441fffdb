//! Persona instruction templates and prompt assembly.
//!
//! Every prompt sent to the model is built here:
//!
//! 1. **Persona** ([`Persona`]) selects a long-form instruction template
//!    compiled in from `prompts/*.md`.
//! 2. **History** is rendered from the current [`Transcript`] with
//!    [`format_history`].
//! 3. The result is wrapped in the model's instruction markers by
//!    [`wrap_instruction`].
//!
//! Short task templates used for auxiliary classification calls (yes/no,
//! ordinal resolution, end intent, wrap-up, content analysis) are plain
//! constants in this module.

use crate::session::{Mode, Role, Transcript};
use crate::store::InterviewKind;
use std::fmt;

/// Onboarding conversation persona. Ends with [`END_ONBOARDING_MARKER`].
pub const ONBOARDING_SPECIALIST: &str = include_str!("../prompts/onboarding-specialist.md");

/// One-shot command classifier.
pub const NAVIGATION_ASSISTANT: &str = include_str!("../prompts/navigation-assistant.md");

/// Background / project interview persona.
pub const BACKGROUND_INTERVIEWER: &str = include_str!("../prompts/background-interviewer.md");

/// Salary negotiation persona.
pub const SALARY_INTERVIEWER: &str = include_str!("../prompts/salary-interviewer.md");

/// Feedback discussion persona. Expects `{report}` and `{history}`.
pub const FEEDBACK_COACH: &str = include_str!("../prompts/feedback-coach.md");

/// Onboarding profile summariser. Expects `{history}`.
pub const SUMMARIZER: &str = include_str!("../prompts/summarizer.md");

/// Marker the onboarding persona emits as its final response.
pub const END_ONBOARDING_MARKER: &str = "[END_ONBOARDING]";

/// Label used for assistant lines in rendered history.
pub const ASSISTANT_LABEL: &str = "Interviewer (Gemma)";

/// Label used for user lines in rendered history.
pub const USER_LABEL: &str = "Candidate";

/// Yes/no classifier. Expects `{user_text}`.
pub const CONFIRMATION_TEMPLATE: &str = "\
You are a simple classification agent. Decide whether the user's response is an affirmation or a negation.\n\
- If the user agrees, confirms or says yes, answer with the single word: YES\n\
- If the user disagrees, denies or says no, answer with the single word: NO\n\
- If the response is unclear, answer with the single word: UNKNOWN\n\
User's response: \"{user_text}\"";

/// Ordinal resolver. Expects `{count}` and `{user_text}`.
pub const ORDINAL_TEMPLATE: &str = "\
You map a spoken reference onto an item in a list that was just read aloud. The list has {count} items, numbered from 0.\n\
\"first\", \"one\" or \"number one\" is 0; \"second\", \"two\" or \"number two\" is 1; and so on up to \"tenth\" which is 9.\n\
\"last\", \"latest\" or \"most recent\" is {last_index}.\n\
Answer with ONLY the number, or UNKNOWN if the reference does not identify an item.\n\
User said: \"{user_text}\"";

/// End-of-conversation intent classifier for feedback Q&A. Expects `{user_text}`.
pub const END_INTENT_TEMPLATE: &str = "\
You are a classification agent. Decide whether the user's last words express an intention to end the conversation.\n\
Answer with the single word YES or NO.\n\
User said: \"{user_text}\"";

/// Interview wrap-up line. Expects `{interview_kind}` and `{history}`.
pub const CONCLUSION_TEMPLATE: &str = "\
Based on this {interview_kind} interview conversation, write a brief, natural closing that Gemma would say to wrap up the interview professionally. Keep it under 50 words.\n\
\n\
Conversation so far:\n\
{history}\n\
\n\
Write only Gemma's closing statement:";

/// Per-answer content analysis. Expects `{question}` and `{answer}`.
pub const CONTENT_ANALYSIS_TEMPLATE: &str = "\
You are an expert career coach. Analyse the user's answer to the question they were asked.\n\
For each metric give a score from 1 to 10 and a one-sentence reason. For the keywords reason, list the keywords the user mentioned and any important ones they missed.\n\
Respond with ONLY these lines:\n\
STAR_SCORE: [score]\n\
STAR_REASON: [reason]\n\
KEYWORDS_SCORE: [score]\n\
KEYWORDS_REASON: [reason]\n\
PROFESSIONALISM_SCORE: [score]\n\
PROFESSIONALISM_REASON: [reason]\n\
\n\
The question: \"{question}\"\n\
The user's answer: \"{answer}\"";

/// Spoken overall feedback. Expects `{analysis}`.
pub const FINAL_SUMMARY_TEMPLATE: &str = "\
You are an expert career coach summarising an interview performance. Speak directly to the user in plain conversational text with no markdown, lists or symbols.\n\
Cover an overall summary, their pacing in words per minute, their use of the STAR method, keywords and professionalism, and end on a motivating note. Keep it under 200 words.\n\
\n\
Analysis:\n\
{analysis}";

/// Named instruction template selecting model behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persona {
    OnboardingSpecialist,
    NavigationAssistant,
    BackgroundInterviewer,
    SalaryInterviewer,
    FeedbackCoach,
    Summarizer,
}

impl Persona {
    /// Default persona bound to a mode on transition.
    #[must_use]
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Onboarding => Self::OnboardingSpecialist,
            Mode::Interview => Self::BackgroundInterviewer,
            Mode::FeedbackQa => Self::FeedbackCoach,
            Mode::Welcome | Mode::Navigation | Mode::FeedbackSelect => Self::NavigationAssistant,
        }
    }

    /// Persona that conducts an interview of `kind`.
    #[must_use]
    pub fn for_interview(kind: InterviewKind) -> Self {
        match kind {
            InterviewKind::Background => Self::BackgroundInterviewer,
            InterviewKind::Salary => Self::SalaryInterviewer,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnboardingSpecialist => "onboarding_specialist",
            Self::NavigationAssistant => "navigation_assistant",
            Self::BackgroundInterviewer => "background_interviewer",
            Self::SalaryInterviewer => "salary_interviewer",
            Self::FeedbackCoach => "feedback_coach",
            Self::Summarizer => "summarizer",
        }
    }

    /// The raw instruction template.
    #[must_use]
    pub fn template(self) -> &'static str {
        match self {
            Self::OnboardingSpecialist => ONBOARDING_SPECIALIST,
            Self::NavigationAssistant => NAVIGATION_ASSISTANT,
            Self::BackgroundInterviewer => BACKGROUND_INTERVIEWER,
            Self::SalaryInterviewer => SALARY_INTERVIEWER,
            Self::FeedbackCoach => FEEDBACK_COACH,
            Self::Summarizer => SUMMARIZER,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substitute `{key}` placeholders in `template`.
///
/// Unknown placeholders are left as-is.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_owned();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Wrap a prompt body in instruction markers.
#[must_use]
pub fn wrap_instruction(body: &str) -> String {
    format!("[INST] {} [/INST]", body.trim())
}

/// Render the transcript as labelled lines. System lines are omitted.
#[must_use]
pub fn format_history(transcript: &Transcript) -> String {
    let lines: Vec<String> = transcript
        .iter()
        .filter_map(|u| match u.role() {
            Role::User => Some(format!("{USER_LABEL}: {}", u.text())),
            Role::Assistant => Some(format!("{ASSISTANT_LABEL}: {}", u.text())),
            Role::System => None,
        })
        .collect();
    if lines.is_empty() {
        "(no conversation yet)".to_owned()
    } else {
        lines.join("\n")
    }
}

/// Build the next-turn prompt for a conversational persona.
///
/// `context` fills the `{report}` slot for the feedback coach and is ignored
/// by other personas.
#[must_use]
pub fn dialogue_prompt(persona: Persona, transcript: &Transcript, context: Option<&str>) -> String {
    let history = format_history(transcript);
    let body = match persona {
        Persona::OnboardingSpecialist => format!(
            "{}\n\nThe conversation so far:\n{history}\n\nGive your next response.",
            persona.template().trim()
        ),
        Persona::FeedbackCoach => render(
            persona.template(),
            &[("history", &history), ("report", context.unwrap_or("(no report)"))],
        ),
        _ => render(persona.template(), &[("history", &history)]),
    };
    wrap_instruction(&body)
}

/// Build the one-shot command classification prompt.
#[must_use]
pub fn command_prompt(user_text: &str) -> String {
    wrap_instruction(&format!(
        "{}\nUser said: \"{}\"",
        NAVIGATION_ASSISTANT.trim(),
        user_text.trim()
    ))
}

/// Build the onboarding summarisation prompt.
#[must_use]
pub fn summary_prompt(transcript: &Transcript) -> String {
    wrap_instruction(&render(SUMMARIZER, &[("history", &format_history(transcript))]))
}

/// Build the yes/no confirmation prompt.
#[must_use]
pub fn confirmation_prompt(user_text: &str) -> String {
    wrap_instruction(&render(CONFIRMATION_TEMPLATE, &[("user_text", user_text.trim())]))
}

/// Build the ordinal resolution prompt for a list of `count` items.
#[must_use]
pub fn ordinal_prompt(user_text: &str, count: usize) -> String {
    let count_s = count.to_string();
    let last_s = count.saturating_sub(1).to_string();
    wrap_instruction(&render(
        ORDINAL_TEMPLATE,
        &[
            ("count", &count_s),
            ("last_index", &last_s),
            ("user_text", user_text.trim()),
        ],
    ))
}

/// Build the end-intent classification prompt.
#[must_use]
pub fn end_intent_prompt(user_text: &str) -> String {
    wrap_instruction(&render(END_INTENT_TEMPLATE, &[("user_text", user_text.trim())]))
}

/// Build the interview wrap-up prompt.
#[must_use]
pub fn conclusion_prompt(interview_kind: &str, transcript: &Transcript) -> String {
    wrap_instruction(&render(
        CONCLUSION_TEMPLATE,
        &[
            ("interview_kind", interview_kind),
            ("history", &format_history(transcript)),
        ],
    ))
}

/// Build the per-answer content analysis prompt.
#[must_use]
pub fn content_analysis_prompt(question: &str, answer: &str) -> String {
    wrap_instruction(&render(
        CONTENT_ANALYSIS_TEMPLATE,
        &[("question", question), ("answer", answer)],
    ))
}

/// Build the spoken overall feedback prompt.
#[must_use]
pub fn final_summary_prompt(analysis: &str) -> String {
    wrap_instruction(&render(FINAL_SUMMARY_TEMPLATE, &[("analysis", analysis)]))
}
