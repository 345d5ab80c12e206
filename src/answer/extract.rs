use regex::Regex;
use std::sync::LazyLock;

/// Transcript shown when a direct-mode response defies extraction.
pub const UNEXTRACTED_PLACEHOLDER: &str = "[Unable to extract question]";

/// Longest first line still believable as a transcribed question.
const MAX_FALLBACK_LINE_CHARS: usize = 200;

// The label patterns tolerate markdown emphasis and heading markers.
static QUESTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[\s#*]*question\s*:\s*\**\s*(.+?)[\s*]*$").unwrap());

static ANSWER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ims)^[\s#*]*answer\s*:\s*\**\s*(.*)").unwrap());

/// Transcript and answer pulled out of a direct-mode response.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAnswer {
    pub transcript: String,
    pub answer: String,
    /// True when a `Question:` label was actually found.
    pub extracted: bool,
}

/// Split a `Question:` / `Answer:` formatted response into its parts.
///
/// The labels are matched case-insensitively. When the model ignored
/// the format, the transcript falls back to the first response line if
/// it is short enough, and the answer to the whole response.
pub fn split_response(text: &str) -> ExtractedAnswer {
    let question = QUESTION_PATTERN
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|q| !q.is_empty());

    if let Some(question) = question {
        let answer = ANSWER_PATTERN
            .captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| text.trim().to_string());
        return ExtractedAnswer {
            transcript: question,
            answer,
            extracted: true,
        };
    }

    let first_line = text.lines().map(str::trim).find(|l| !l.is_empty());
    let transcript = match first_line {
        Some(line) if line.chars().count() < MAX_FALLBACK_LINE_CHARS => line.to_string(),
        _ => UNEXTRACTED_PLACEHOLDER.to_string(),
    };
    ExtractedAnswer {
        transcript,
        answer: text.trim().to_string(),
        extracted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_responses_split_cleanly() {
        let response = "Question: What is ownership?\nAnswer: Ownership is Rust's memory model.";
        let parts = split_response(response);
        assert!(parts.extracted);
        assert_eq!(parts.transcript, "What is ownership?");
        assert_eq!(parts.answer, "Ownership is Rust's memory model.");
    }

    #[test]
    fn test_labels_match_case_insensitively_and_through_markdown() {
        let response = "**Question:** does this work?\nANSWER: yes, it does.";
        let parts = split_response(response);
        assert!(parts.extracted);
        assert_eq!(parts.transcript, "does this work?");
        assert_eq!(parts.answer, "yes, it does.");

        let response = "QUESTION:   spaced out?  \nAnswer: sure.";
        let parts = split_response(response);
        assert_eq!(parts.transcript, "spaced out?");
        assert_eq!(parts.answer, "sure.");
    }

    #[test]
    fn test_multi_line_answers_stay_intact() {
        let response = "Question: list two points\nAnswer: first point.\nSecond point.";
        let parts = split_response(response);
        assert_eq!(parts.answer, "first point.\nSecond point.");
    }

    #[test]
    fn test_short_first_line_becomes_the_transcript() {
        let response = "What is a trait object?\nA trait object is a dynamically dispatched value.";
        let parts = split_response(response);
        assert!(!parts.extracted);
        assert_eq!(parts.transcript, "What is a trait object?");
        assert_eq!(parts.answer, response);
    }

    #[test]
    fn test_long_first_line_yields_the_placeholder() {
        let long_line = "x".repeat(250);
        let parts = split_response(&long_line);
        assert_eq!(parts.transcript, UNEXTRACTED_PLACEHOLDER);
        assert_eq!(parts.answer, long_line);
    }

    #[test]
    fn test_empty_responses_yield_the_placeholder() {
        let parts = split_response("   \n  ");
        assert_eq!(parts.transcript, UNEXTRACTED_PLACEHOLDER);
        assert_eq!(parts.answer, "");
    }
}
