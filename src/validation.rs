//! Validation of player-supplied text: display names and chat lines.

use crate::error::GameError;

/// Longest accepted display name, in characters.
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    #[error("text is empty")]
    Empty,

    #[error("text is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("text cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("text contains control characters")]
    ControlCharacters,
}

impl From<TextError> for GameError {
    fn from(err: TextError) -> Self {
        GameError::InvalidParam(err.to_string())
    }
}

/// Validate a display name shown to other players in chat.
pub fn validate_display_name(name: &str) -> Result<String, TextError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TextError::Empty);
    }
    if trimmed != name {
        return Err(TextError::InvalidWhitespace);
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(TextError::TooLong {
            max: MAX_DISPLAY_NAME_LEN,
        });
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(TextError::ControlCharacters);
    }
    Ok(trimmed.to_string())
}

/// Clean a chat line: control characters other than newline are dropped and
/// the result must be non-empty and at most `max_chars` characters.
pub fn sanitize_chat_text(text: &str, max_chars: usize) -> Result<String, TextError> {
    let cleaned: String = text
        .chars()
        .filter(|&c| !c.is_control() || c == '\n')
        .collect();
    if cleaned.trim().is_empty() {
        return Err(TextError::Empty);
    }
    if cleaned.chars().count() > max_chars {
        return Err(TextError::TooLong { max: max_chars });
    }
    Ok(cleaned)
}
