//! # Match Service Library
//!
//! Authoritative realtime server for two-player Pong matches. The server owns
//! the canonical physics of every live match, ticks each one at a fixed rate,
//! ingests player inputs over a persistent WebSocket channel, broadcasts
//! state snapshots, and manages the join/disconnect/reconnect/forfeit
//! lifecycle across many concurrent matches.
//!
//! ## Architecture
//!
//! ### Per-Match Workers
//! Every match is advanced by a dedicated tokio task. All mutation of a
//! match's state happens under that match's lock, which the worker holds
//! while ticking: inputs observed before tick T apply to tick T, and no
//! cross-task interleaving can tear a phase transition. The worker also owns
//! the match's timers (countdown cadence, reconnect deadline, cleanup delay),
//! so a terminal match cancels its own timers simply by exiting.
//!
//! ### Coarse Registry Lock
//! The match registry and the player→match index sit behind one mutex in the
//! [`manager`]. Lock order is registry before match everywhere, which keeps
//! the two-level locking deadlock-free.
//!
//! ### Non-Blocking Fan-Out
//! Match workers push frames into bounded per-connection queues ([`outbound`])
//! drained by per-connection writer tasks; a slow socket drops its oldest
//! snapshots instead of stalling the simulation.
//!
//! ## Module Organization
//!
//! - [`simulation`] — the per-match state machine over the `shared` physics
//!   kernel
//! - [`manager`] — match registry, player index, and lifecycle operations
//! - [`endpoint`] — WebSocket listener, session registry wiring, heartbeats
//! - [`http`] — request/response adapter (create/join/quickmatch/list/leave)
//! - [`session`] / [`outbound`] — live-connection registry and outbound
//!   queues
//! - [`auth`] — opaque-token identity resolution seam
//! - [`recorder`] — best-effort hand-off of finished match outcomes
//! - [`config`] — service tunables passed in at construction

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod manager;
pub mod outbound;
pub mod recorder;
pub mod session;
pub mod simulation;
pub mod util;
