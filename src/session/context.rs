use tracing::warn;

use super::SessionStore;

/// Decide what conversational context an operation carries forward and
/// update the stored question accordingly.
///
/// A follow-up reuses the stored previous question without replacing
/// it; a missing one is reported but not fatal. A fresh question with a
/// usable transcript replaces the stored one.
pub fn resolve_context(
    session: &SessionStore,
    is_follow_up: bool,
    transcript: &str,
) -> Option<String> {
    if is_follow_up {
        let previous = session.last_question();
        if previous.is_none() {
            warn!("follow-up requested but no previous question is stored");
        }
        return previous;
    }

    if !transcript.trim().is_empty() {
        session.set_last_question(Some(transcript.trim().to_string()));
    }
    None
}
