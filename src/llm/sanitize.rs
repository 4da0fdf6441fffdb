//! Cleanup passes for raw model output.
//!
//! Local models wrap answers in code fences, add markdown emphasis, quote
//! their labels, prefix speaker names, and sometimes run on into the next
//! speaker's line. None of that should reach the speaker or a `match`.

use crate::persona::{ASSISTANT_LABEL, USER_LABEL};

/// Remove a leading and a trailing triple-backtick fence.
///
/// The opening fence line (including any language tag) is dropped.
pub fn strip_markdown_fences(text: &str) -> String {
    let mut s = text.to_owned();
    if let Some(start) = s.find("```") {
        let fence_end = s[start + 3..]
            .find('\n')
            .map(|i| start + 3 + i + 1)
            .unwrap_or(start + 3);
        s.replace_range(start..fence_end, "");
    }
    if let Some(end) = s.rfind("```") {
        s.replace_range(end..end + 3, "");
    }
    s
}

/// Strip heading hashes, emphasis markers, inline backticks and list bullets.
///
/// Underscores are kept: command labels and markers contain them.
pub fn strip_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        let content = if trimmed.starts_with('#') {
            trimmed.trim_start_matches('#').trim_start()
        } else if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("• "))
        {
            rest
        } else {
            line
        };
        result.extend(content.chars().filter(|c| !matches!(c, '*' | '`')));
        result.push('\n');
    }
    if result.ends_with('\n') {
        result.pop();
    }
    result
}

/// Trim matching surrounding quote characters (straight, curly, backtick).
pub fn trim_quotes(text: &str) -> &str {
    let mut s = text.trim();
    loop {
        let Some(first) = s.chars().next() else {
            return s;
        };
        let Some(last) = s.chars().next_back() else {
            return s;
        };
        let paired = matches!(
            (first, last),
            ('"', '"') | ('\'', '\'') | ('`', '`') | ('“', '”') | ('‘', '’')
        );
        if !paired || s.len() < first.len_utf8() + last.len_utf8() {
            return s;
        }
        s = s[first.len_utf8()..s.len() - last.len_utf8()].trim();
    }
}

/// Cut the text where the model starts writing the candidate's next line.
pub fn truncate_at_turn_marker(text: &str) -> &str {
    let marker = format!("{USER_LABEL}:");
    match text.find(&marker) {
        Some(i) => &text[..i],
        None => text,
    }
}

/// Remove a leading speaker label such as `Interviewer (Gemma):` or `Gemma:`.
pub fn strip_speaker_label(text: &str) -> &str {
    let t = text.trim_start();
    for label in [ASSISTANT_LABEL, "Gemma", "Interviewer", "Assistant"] {
        if let Some(rest) = t.strip_prefix(label)
            && let Some(rest) = rest.trim_start().strip_prefix(':')
        {
            return rest.trim_start();
        }
    }
    t
}

/// Full cleanup for text that will be spoken and recorded.
pub fn for_speech(raw: &str) -> String {
    let unfenced = strip_markdown_fences(raw);
    let cut = truncate_at_turn_marker(&unfenced);
    let unlabeled = strip_speaker_label(cut);
    let plain = strip_markdown(unlabeled);
    let collapsed = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    trim_quotes(&collapsed).to_owned()
}

/// Reduce a completion to a single bare label: first non-empty line, no
/// fences, quotes or trailing punctuation.
pub fn for_label(raw: &str) -> String {
    let unfenced = strip_markdown_fences(raw);
    let line = unfenced
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let plain = strip_markdown(line);
    let unpunctuated = plain.trim().trim_end_matches(['.', '!', ',', ';', ':']);
    trim_quotes(unpunctuated)
        .trim_end_matches(['.', '!', ',', ';', ':'])
        .trim()
        .to_owned()
}

/// Extract the outermost balanced `{...}` object, ignoring braces in strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Text in a form suitable for keyword and phrase matching: lowercase,
/// punctuation removed except apostrophes, whitespace collapsed.
pub fn normalize_for_matching(text: &str) -> String {
    text.to_lowercase()
        .replace(['’', '‘'], "'")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
