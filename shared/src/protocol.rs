//! JSON wire protocol for the persistent game channel.
//!
//! Every frame on the channel is a JSON object `{event, data}`. The `event`
//! string discriminates a closed catalogue of frames, modeled here as two
//! tagged enums: [`ClientEvent`] (client → server) and [`ServerEvent`]
//! (server → client). Unknown or malformed frames fail deserialization; the
//! endpoint answers those with an `error` frame and leaves the connection
//! open.
//!
//! The request/response surface shares this module through
//! [`MatchDescriptor`], the safe projection of a match used for listings.

use crate::{Ball, InputDirection, MatchMode, MatchPhase, Paddle};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Close code sent when a newer session for the same identity supersedes an
/// existing connection. Clients treat it as non-retryable.
pub const CLOSE_SESSION_REPLACED: u16 = 4001;

/// Reason attached to a `game:paused` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    OpponentDisconnected,
}

/// Public projection of a player slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub username: String,
    pub connected: bool,
}

/// Safe projection of a match for list consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDescriptor {
    pub id: Uuid,
    pub mode: MatchMode,
    pub status: MatchPhase,
    pub player1: PlayerInfo,
    pub player2: Option<PlayerInfo>,
    pub score1: u32,
    pub score2: u32,
    pub winner_id: Option<String>,
    pub created_at: u64,
    pub started_at: Option<u64>,
}

/// Full match state frame, renderable without prior history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub match_id: Uuid,
    pub phase: MatchPhase,
    pub ball: Ball,
    pub paddle1: Paddle,
    pub paddle2: Paddle,
    pub score1: u32,
    pub score2: u32,
    pub player1: PlayerInfo,
    pub player2: Option<PlayerInfo>,
}

/// Frames accepted from clients on the persistent channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Movement intent; last write before a tick wins that tick.
    #[serde(rename = "player:input")]
    PlayerInput { direction: InputDirection },
    /// Client asks for a fresh state snapshot (sent after join/reconnect).
    #[serde(rename = "player:ready")]
    PlayerReady {},
    /// Bind this connection to the given match.
    #[serde(rename = "match:join", rename_all = "camelCase")]
    MatchJoin { match_id: Uuid },
    /// Leave the current match (cancel or forfeit depending on phase).
    #[serde(rename = "match:leave")]
    MatchLeave {},
    /// Re-bind this connection to the caller's current match.
    #[serde(rename = "match:reconnect")]
    MatchReconnect {},
    /// Application-level heartbeat.
    #[serde(rename = "ping")]
    Ping {},
}

/// Frames emitted by the server on the persistent channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "match:created", rename_all = "camelCase")]
    MatchCreated { match_id: Uuid },
    #[serde(rename = "match:joined", rename_all = "camelCase")]
    MatchJoined {
        match_id: Uuid,
        opponent: String,
        player_number: u8,
    },
    #[serde(rename = "match:waiting", rename_all = "camelCase")]
    MatchWaiting { match_id: Uuid },
    #[serde(rename = "match:opponent_joined")]
    OpponentJoined { opponent: String },
    #[serde(rename = "match:opponent_left")]
    OpponentLeft {},
    #[serde(rename = "match:opponent_disconnected", rename_all = "camelCase")]
    OpponentDisconnected { reconnect_timeout: u64 },
    #[serde(rename = "match:opponent_reconnected")]
    OpponentReconnected {},
    #[serde(rename = "matches:updated")]
    MatchesUpdated { matches: Vec<MatchDescriptor> },
    #[serde(rename = "game:countdown")]
    Countdown { count: u32 },
    #[serde(rename = "game:start")]
    GameStart {},
    #[serde(rename = "game:state")]
    GameState(Snapshot),
    #[serde(rename = "game:paused")]
    GamePaused { reason: PauseReason },
    #[serde(rename = "game:resumed")]
    GameResumed {},
    #[serde(rename = "game:end", rename_all = "camelCase")]
    GameEnd {
        winner: String,
        winner_id: String,
        score1: u32,
        score2: u32,
    },
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "pong")]
    Pong {},
}

impl ServerEvent {
    /// Snapshots are absolute state and may be coalesced or dropped under
    /// backpressure; every other frame must be delivered.
    pub fn is_droppable(&self) -> bool {
        matches!(self, ServerEvent::GameState(_))
    }
}
