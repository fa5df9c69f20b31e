//! Transient-error classification.
//!
//! The upstream endpoint reports failures as free-form messages, sometimes
//! carrying an HTTP-status-like substring. Classification is a substring
//! heuristic over that message: crude, but it matches what the provider
//! actually emits, and it is a pure function so callers can rely on it being
//! stable for a given message.

/// Message fragments that mark a failure as likely-temporary.
const TRANSIENT_MARKERS: [&str; 5] = ["429", "503", "500", "timeout", "overloaded"];

/// Does this error message look like a temporary upstream condition?
///
/// Case-insensitive. Everything that does not match is terminal and must not
/// be retried.
pub fn is_transient_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
