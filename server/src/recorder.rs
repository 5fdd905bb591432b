//! Hand-off of terminal match outcomes.
//!
//! The tournament recorder is an external collaborator; delivery is
//! best-effort and must never block or fail the tick path. The default
//! implementation just logs the outcome.

use serde::Serialize;

/// Result detail handed to the recorder when a match finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub player1: String,
    pub player2: String,
    pub score1: u32,
    pub score2: u32,
    pub winner_id: String,
    pub started_at: Option<u64>,
    pub ended_at: u64,
}

pub trait MatchRecorder: Send + Sync {
    fn record(&self, outcome: MatchOutcome);
}

/// Recorder that writes outcomes to the log.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl MatchRecorder for LogRecorder {
    fn record(&self, outcome: MatchOutcome) {
        match serde_json::to_string(&outcome) {
            Ok(json) => log::info!("Match result: {}", json),
            Err(e) => log::warn!("Failed to encode match result: {}", e),
        }
    }
}
