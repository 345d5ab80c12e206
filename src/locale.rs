//! Language-specific user-facing strings.
//!
//! The pipeline answers in English or Vietnamese; any other language
//! code falls back to English.

/// Apology shown when a recording produced no usable transcript.
pub fn apology(language: &str) -> &'static str {
    match language {
        "vi" => "Xin lỗi, tôi không nghe rõ câu hỏi của bạn. Bạn có thể thử lại không?",
        _ => "Sorry, I couldn't hear your question clearly. Could you try again?",
    }
}

/// Prefix for error strings delivered inside update/streamError events.
pub fn error_prefix(language: &str) -> &'static str {
    match language {
        "vi" => "Lỗi: ",
        _ => "Error: ",
    }
}
