//! Error taxonomy for match operations.
//!
//! One enum serves both surfaces: the HTTP adapter maps variants to status
//! codes, the channel endpoint forwards the stable `code()` string in `error`
//! frames. The `message` shown to humans is the `Display` impl.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("missing or unknown match mode")]
    InvalidMode,
    #[error("player is already in an active match")]
    AlreadyInMatch,
    #[error("match is already full")]
    MatchFull,
    #[error("cannot join your own match")]
    OwnMatch,
    #[error("match is not joinable")]
    NotJoinable,
    #[error("match not found")]
    NotFound,
    #[error("player is not in a match")]
    NotInMatch,
}

impl MatchError {
    /// Stable machine-readable code; the human message may change, this must
    /// not.
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::InvalidMode => "invalid_mode",
            MatchError::AlreadyInMatch => "already_in_match",
            MatchError::MatchFull => "match_full",
            MatchError::OwnMatch => "own_match",
            MatchError::NotJoinable => "not_joinable",
            MatchError::NotFound => "not_found",
            MatchError::NotInMatch => "not_in_match",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(MatchError::AlreadyInMatch.code(), "already_in_match");
        assert_eq!(MatchError::NotJoinable.code(), "not_joinable");
        assert_eq!(MatchError::NotFound.code(), "not_found");
    }

    #[test]
    fn test_display_is_human_readable() {
        assert_eq!(
            MatchError::OwnMatch.to_string(),
            "cannot join your own match"
        );
    }
}
