//! Spoken positional references ("the first one", "the latest") resolved
//! against a list that was just read aloud, plus yes/no confirmation.
//!
//! The model is asked first, with the keyword table and list length in its
//! instructions. The deterministic [`keyword_index`] table is the fallback
//! when the model is unavailable or answers `UNKNOWN`.

use crate::config::LlmConfig;
use crate::llm::sanitize::normalize_for_matching;
use crate::llm::{self, CompletionRequest, LanguageModel};
use crate::persona;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of resolving a reference against a list of `len` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdinalResolution {
    /// A valid 0-based index.
    Index(usize),
    /// A position was named but the list is too short. Needs a re-prompt.
    /// Carries the named index, or `len` when the position falls before the
    /// start of the list; never a valid index.
    OutOfRange(usize),
    /// No position could be identified.
    Unknown,
}

/// A yes/no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
    Unclear,
}

const ORDINALS: [&str; 10] = [
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];
const NUMERIC_ORDINALS: [&str; 10] = [
    "1st", "2nd", "3rd", "4th", "5th", "6th", "7th", "8th", "9th", "10th",
];
const CARDINALS: [&str; 10] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
];

const YES_WORDS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "sure", "correct", "right", "ok", "okay", "affirmative",
    "absolutely", "definitely", "exactly",
];
const NO_WORDS: &[&str] = &[
    "no", "nope", "nah", "wrong", "incorrect", "negative", "not", "different", "other",
];

fn bounded(index: usize, len: usize) -> OrdinalResolution {
    if index < len {
        OrdinalResolution::Index(index)
    } else {
        OrdinalResolution::OutOfRange(index)
    }
}

/// 1-based spoken number ("3", "three") to a 0-based index.
fn spoken_number(word: &str) -> Option<usize> {
    if let Some(pos) = CARDINALS.iter().position(|c| *c == word) {
        return Some(pos);
    }
    word.parse::<usize>().ok().and_then(|n| n.checked_sub(1))
}

/// Deterministic keyword resolution.
///
/// Priority: "second to last", then "last"/"latest"/"most recent", then
/// "number N", then ordinal words, then bare cardinals or digits.
#[must_use]
pub fn keyword_index(text: &str, len: usize) -> OrdinalResolution {
    let normalized = normalize_for_matching(text);
    let padded = format!(" {normalized} ");
    let words: Vec<&str> = normalized.split_whitespace().collect();

    if len >= 1
        && ["second to last", "second last", "penultimate"]
            .iter()
            .any(|p| padded.contains(&format!(" {p} ")))
    {
        return match len.checked_sub(2) {
            Some(i) => OrdinalResolution::Index(i),
            None => OrdinalResolution::OutOfRange(len),
        };
    }

    if words.iter().any(|w| matches!(*w, "last" | "latest" | "newest"))
        || padded.contains(" most recent ")
    {
        return match len.checked_sub(1) {
            Some(i) => OrdinalResolution::Index(i),
            None => OrdinalResolution::Unknown,
        };
    }

    if let Some(pos) = words.iter().position(|w| *w == "number")
        && let Some(next) = words.get(pos + 1)
        && let Some(index) = spoken_number(next)
    {
        return bounded(index, len);
    }

    for word in &words {
        if let Some(index) = ORDINALS
            .iter()
            .position(|o| o == word)
            .or_else(|| NUMERIC_ORDINALS.iter().position(|o| o == word))
        {
            return bounded(index, len);
        }
    }

    for word in &words {
        if let Some(index) = spoken_number(word) {
            return bounded(index, len);
        }
    }

    OrdinalResolution::Unknown
}

/// Interpret the model's answer: a 0-based number or `UNKNOWN`.
///
/// Negative numbers are treated as `UNKNOWN`.
#[must_use]
pub fn parse_model_index(label: &str, len: usize) -> OrdinalResolution {
    let label = label.trim();
    if label.eq_ignore_ascii_case("unknown") {
        return OrdinalResolution::Unknown;
    }
    let Some(start) = label.find(|c: char| c.is_ascii_digit()) else {
        return OrdinalResolution::Unknown;
    };
    if label[..start].trim_end().ends_with('-') {
        return OrdinalResolution::Unknown;
    }
    let digits: String = label[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    match digits.parse::<usize>() {
        Ok(index) => bounded(index, len),
        Err(_) => OrdinalResolution::Unknown,
    }
}

/// Keyword yes/no classification. `Unclear` when neither or both appear.
#[must_use]
pub fn keyword_confirmation(text: &str) -> Confirmation {
    let normalized = normalize_for_matching(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let yes = words.iter().any(|w| YES_WORDS.contains(w))
        || normalized.contains("that's it")
        || normalized.contains("go ahead");
    let no = words.iter().any(|w| NO_WORDS.contains(w));
    match (yes, no) {
        (true, false) => Confirmation::Yes,
        (false, true) => Confirmation::No,
        _ => Confirmation::Unclear,
    }
}

/// Model-assisted resolver.
pub struct OrdinalResolver {
    model: Arc<dyn LanguageModel>,
    llm: LlmConfig,
}

impl OrdinalResolver {
    pub fn new(model: Arc<dyn LanguageModel>, llm: LlmConfig) -> Self {
        Self { model, llm }
    }

    /// Resolve `text` against a list of `len` items.
    pub async fn resolve(&self, text: &str, len: usize) -> OrdinalResolution {
        if len == 0 {
            return OrdinalResolution::Unknown;
        }
        let request = CompletionRequest::classify(persona::ordinal_prompt(text, len), &self.llm);
        let from_model = match llm::complete_label(self.model.as_ref(), &request).await {
            Ok(label) => parse_model_index(&label, len),
            Err(e) => {
                warn!("ordinal model call failed, using keyword table: {e}");
                OrdinalResolution::Unknown
            }
        };
        let resolution = match from_model {
            OrdinalResolution::Index(_) => from_model,
            OrdinalResolution::OutOfRange(_) => match keyword_index(text, len) {
                found @ OrdinalResolution::Index(_) => found,
                _ => from_model,
            },
            OrdinalResolution::Unknown => keyword_index(text, len),
        };
        debug!(%text, len, ?resolution, "ordinal resolved");
        resolution
    }

    /// Classify a yes/no answer: keywords first, then the model.
    pub async fn confirm(&self, text: &str) -> Confirmation {
        let by_keyword = keyword_confirmation(text);
        if by_keyword != Confirmation::Unclear {
            return by_keyword;
        }
        let request = CompletionRequest::classify(persona::confirmation_prompt(text), &self.llm);
        match llm::complete_label(self.model.as_ref(), &request).await {
            Ok(label) if label.eq_ignore_ascii_case("yes") => Confirmation::Yes,
            Ok(label) if label.eq_ignore_ascii_case("no") => Confirmation::No,
            Ok(_) => Confirmation::Unclear,
            Err(e) => {
                warn!("confirmation model call failed: {e}");
                Confirmation::Unclear
            }
        }
    }
}
