//! Match lifecycle management.
//!
//! The manager owns the match registry and the player index and enforces the
//! one-active-match-per-player rule. Each live match is advanced by its own
//! worker task at the configured tick rate; manager commands and the worker
//! serialize on the per-match lock, and the registry is guarded by one coarse
//! lock. Lock order is always registry before match, never the reverse.
//!
//! Timers are owned by the worker: countdown cadence comes from tick counting
//! inside the simulation, the reconnect deadline is a stamped instant the
//! worker polls, and the cleanup delay runs on the worker's exit path. A
//! match turning terminal therefore cancels its own timers by construction.

use crate::auth::PlayerIdentity;
use crate::config::ServerConfig;
use crate::error::MatchError;
use crate::recorder::{MatchOutcome, MatchRecorder};
use crate::session::{ConnectionHandle, SessionRegistry};
use crate::simulation::{MatchSim, SimEvent};
use crate::util::now_millis;
use log::{debug, error, info};
use shared::protocol::{MatchDescriptor, PauseReason, PlayerInfo, ServerEvent, Snapshot};
use shared::{InputDirection, MatchMode, MatchPhase, Side};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, sleep, Instant};
use uuid::Uuid;

/// One seat in a match. The connection is a weak-style reference: the
/// endpoint owns the socket, the slot only holds the outbound handle.
#[derive(Debug)]
pub struct PlayerSlot {
    pub identity: PlayerIdentity,
    pub connected: bool,
    pub conn: Option<ConnectionHandle>,
}

impl PlayerSlot {
    fn new(identity: PlayerIdentity, conn: Option<ConnectionHandle>) -> Self {
        Self {
            connected: conn.is_some(),
            identity,
            conn,
        }
    }

    fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.identity.id.clone(),
            username: self.identity.username.clone(),
            connected: self.connected,
        }
    }

    fn send(&self, event: ServerEvent) {
        if let Some(conn) = &self.conn {
            conn.send(event);
        }
    }
}

/// A registered match: slots, simulation, and lifecycle bookkeeping.
#[derive(Debug)]
pub struct Match {
    pub id: Uuid,
    pub mode: MatchMode,
    pub player1: PlayerSlot,
    pub player2: Option<PlayerSlot>,
    pub sim: MatchSim,
    pub created_at: u64,
    pub started_at: Option<u64>,
    /// While Paused after a disconnect: the instant the absent player
    /// forfeits. Polled by the match worker.
    pub reconnect_deadline: Option<Instant>,
}

impl Match {
    pub fn phase(&self) -> MatchPhase {
        self.sim.phase
    }

    pub fn slot_side(&self, player_id: &str) -> Option<Side> {
        if self.player1.identity.id == player_id {
            return Some(Side::Left);
        }
        match &self.player2 {
            Some(slot) if slot.identity.id == player_id => Some(Side::Right),
            _ => None,
        }
    }

    pub fn slot(&self, side: Side) -> Option<&PlayerSlot> {
        match side {
            Side::Left => Some(&self.player1),
            Side::Right => self.player2.as_ref(),
        }
    }

    fn slot_mut(&mut self, side: Side) -> Option<&mut PlayerSlot> {
        match side {
            Side::Left => Some(&mut self.player1),
            Side::Right => self.player2.as_mut(),
        }
    }

    fn both_connected(&self) -> bool {
        self.player1.connected
            && self.player2.as_ref().map(|s| s.connected).unwrap_or(false)
    }

    /// Safe projection for list consumers.
    pub fn descriptor(&self) -> MatchDescriptor {
        MatchDescriptor {
            id: self.id,
            mode: self.mode,
            status: self.phase(),
            player1: self.player1.info(),
            player2: self.player2.as_ref().map(PlayerSlot::info),
            score1: self.sim.score_left,
            score2: self.sim.score_right,
            winner_id: self
                .sim
                .winner
                .and_then(|side| self.slot(side))
                .map(|slot| slot.identity.id.clone()),
            created_at: self.created_at,
            started_at: self.started_at,
        }
    }

    /// Full state frame for client rendering.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            match_id: self.id,
            phase: self.phase(),
            ball: self.sim.ball,
            paddle1: self.sim.paddle_left,
            paddle2: self.sim.paddle_right,
            score1: self.sim.score_left,
            score2: self.sim.score_right,
            player1: self.player1.info(),
            player2: self.player2.as_ref().map(PlayerSlot::info),
        }
    }

    fn send_to(&self, side: Side, event: ServerEvent) {
        if let Some(slot) = self.slot(side) {
            slot.send(event);
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        self.player1.send(event.clone());
        if let Some(slot) = &self.player2 {
            slot.send(event);
        }
    }

    /// Translates simulation events to wire frames and fans them out to both
    /// slots. Returns the recorder detail when one of the events ended the
    /// match.
    fn deliver(&mut self, events: Vec<SimEvent>) -> Option<MatchOutcome> {
        let mut outcome = None;
        for event in events {
            match event {
                SimEvent::Countdown { count } => {
                    self.broadcast(ServerEvent::Countdown { count });
                }
                SimEvent::Start => {
                    if self.started_at.is_none() {
                        self.started_at = Some(now_millis());
                    }
                    self.broadcast(ServerEvent::GameStart {});
                }
                SimEvent::State => {
                    self.broadcast(ServerEvent::GameState(self.snapshot()));
                }
                SimEvent::Paused { reason } => {
                    self.broadcast(ServerEvent::GamePaused { reason });
                }
                SimEvent::Resumed => {
                    self.broadcast(ServerEvent::GameResumed {});
                }
                SimEvent::End {
                    winner,
                    score_left,
                    score_right,
                } => {
                    let Some(winner_slot) = self.slot(winner) else {
                        error!("Match {} ended with an empty winner slot", self.id);
                        continue;
                    };
                    self.broadcast(ServerEvent::GameEnd {
                        winner: winner_slot.identity.username.clone(),
                        winner_id: winner_slot.identity.id.clone(),
                        score1: score_left,
                        score2: score_right,
                    });
                    if let Some(p2) = &self.player2 {
                        outcome = Some(MatchOutcome {
                            player1: self.player1.identity.id.clone(),
                            player2: p2.identity.id.clone(),
                            score1: score_left,
                            score2: score_right,
                            winner_id: self
                                .slot(winner)
                                .map(|s| s.identity.id.clone())
                                .unwrap_or_default(),
                            started_at: self.started_at,
                            ended_at: now_millis(),
                        });
                    }
                }
            }
        }
        outcome
    }
}

#[derive(Default)]
struct Registry {
    matches: HashMap<Uuid, Arc<Mutex<Match>>>,
    /// Insertion order, so quickmatch scans are deterministic.
    order: Vec<Uuid>,
    /// player id -> match id; at most one non-terminal match per player.
    players: HashMap<String, Uuid>,
}

impl Registry {
    /// Frees both players of `m` in the index, leaving entries that already
    /// point at a newer match untouched.
    fn clear_players_of(&mut self, m: &Match) {
        if self.players.get(&m.player1.identity.id) == Some(&m.id) {
            self.players.remove(&m.player1.identity.id);
        }
        if let Some(p2) = &m.player2 {
            if self.players.get(&p2.identity.id) == Some(&m.id) {
                self.players.remove(&p2.identity.id);
            }
        }
    }
}

/// Outcome of a quickmatch request.
#[derive(Debug, Clone, PartialEq)]
pub enum Quickmatch {
    /// An open match was found and joined.
    Joined(MatchDescriptor),
    /// Nothing was open; a fresh Waiting match was created instead.
    Created(MatchDescriptor),
}

impl Quickmatch {
    pub fn descriptor(&self) -> &MatchDescriptor {
        match self {
            Quickmatch::Joined(d) | Quickmatch::Created(d) => d,
        }
    }
}

/// Authoritative registry of matches and player bindings.
pub struct MatchManager {
    config: ServerConfig,
    registry: Mutex<Registry>,
    sessions: Arc<SessionRegistry>,
    recorder: Arc<dyn MatchRecorder>,
}

impl MatchManager {
    pub fn new(
        config: ServerConfig,
        sessions: Arc<SessionRegistry>,
        recorder: Arc<dyn MatchRecorder>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Mutex::new(Registry::default()),
            sessions,
            recorder,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Creates a Waiting match owned by `identity` and spawns its worker.
    pub async fn create(
        self: &Arc<Self>,
        identity: &PlayerIdentity,
        mode: MatchMode,
    ) -> Result<MatchDescriptor, MatchError> {
        let mut registry = self.registry.lock().await;
        if registry.players.contains_key(&identity.id) {
            return Err(MatchError::AlreadyInMatch);
        }

        let id = Uuid::new_v4();
        let conn = self.sessions.handle_for(&identity.id);
        let m = Match {
            id,
            mode,
            player1: PlayerSlot::new(identity.clone(), conn),
            player2: None,
            sim: MatchSim::new(self.config.sim_config()),
            created_at: now_millis(),
            started_at: None,
            reconnect_deadline: None,
        };
        m.player1.send(ServerEvent::MatchCreated { match_id: id });
        m.player1.send(ServerEvent::MatchWaiting { match_id: id });
        let descriptor = m.descriptor();

        let handle = Arc::new(Mutex::new(m));
        registry.matches.insert(id, Arc::clone(&handle));
        registry.order.push(id);
        registry.players.insert(identity.id.clone(), id);
        drop(registry);

        info!("Player {} created match {} ({})", identity.id, id, mode);
        tokio::spawn(run_match(Arc::clone(self), id, handle));
        self.broadcast_match_list().await;
        Ok(descriptor)
    }

    /// Fills the second slot of a Waiting match and starts the countdown.
    ///
    /// If a slot owner has no live channel session at this point, the match
    /// pauses immediately and the regular reconnect grace applies until the
    /// connection attaches.
    pub async fn join(
        self: &Arc<Self>,
        match_id: Uuid,
        identity: &PlayerIdentity,
    ) -> Result<MatchDescriptor, MatchError> {
        let mut registry = self.registry.lock().await;
        let handle = registry
            .matches
            .get(&match_id)
            .cloned()
            .ok_or(MatchError::NotFound)?;
        let mut m = handle.lock().await;

        if m.player1.identity.id == identity.id {
            return Err(MatchError::OwnMatch);
        }
        if registry.players.contains_key(&identity.id) {
            return Err(MatchError::AlreadyInMatch);
        }
        if m.player2.is_some() {
            return Err(MatchError::MatchFull);
        }
        if m.phase() != MatchPhase::Waiting {
            return Err(MatchError::NotJoinable);
        }

        let conn = self.sessions.handle_for(&identity.id);
        m.player2 = Some(PlayerSlot::new(identity.clone(), conn));
        registry.players.insert(identity.id.clone(), match_id);

        m.send_to(
            Side::Right,
            ServerEvent::MatchJoined {
                match_id,
                opponent: m.player1.identity.username.clone(),
                player_number: Side::Right.player_number(),
            },
        );
        m.send_to(
            Side::Left,
            ServerEvent::OpponentJoined {
                opponent: identity.username.clone(),
            },
        );

        let mut events = m.sim.begin();
        if !m.both_connected() {
            // A slot owner has not opened the channel yet; hold the game
            // until they attach or their grace expires.
            events.extend(m.sim.pause(PauseReason::OpponentDisconnected));
            m.reconnect_deadline = Some(Instant::now() + self.config.reconnect_grace);
        }
        if let Some(outcome) = m.deliver(events) {
            self.recorder.record(outcome);
        }
        let descriptor = m.descriptor();

        info!("Player {} joined match {}", identity.id, match_id);
        drop(m);
        drop(registry);
        self.broadcast_match_list().await;
        Ok(descriptor)
    }

    /// First-available matchmaking: joins the oldest open match, or creates a
    /// fresh Waiting one when nothing is open.
    pub async fn quickmatch(
        self: &Arc<Self>,
        identity: &PlayerIdentity,
    ) -> Result<Quickmatch, MatchError> {
        if let Some(match_id) = self.find_available(MatchMode::OneVsOne, &identity.id).await {
            match self.join(match_id, identity).await {
                Ok(descriptor) => return Ok(Quickmatch::Joined(descriptor)),
                Err(MatchError::AlreadyInMatch) => return Err(MatchError::AlreadyInMatch),
                Err(e) => {
                    // The scan raced another joiner; fall through and create.
                    debug!("Quickmatch join of {} failed ({}); creating", match_id, e);
                }
            }
        }
        self.create(identity, MatchMode::OneVsOne)
            .await
            .map(Quickmatch::Created)
    }

    /// First Waiting match of `mode` not owned by `exclude_player`, in
    /// creation order.
    pub async fn find_available(&self, mode: MatchMode, exclude_player: &str) -> Option<Uuid> {
        let registry = self.registry.lock().await;
        for id in &registry.order {
            if let Some(handle) = registry.matches.get(id) {
                let m = handle.lock().await;
                if m.phase() == MatchPhase::Waiting
                    && m.mode == mode
                    && m.player2.is_none()
                    && m.player1.identity.id != exclude_player
                {
                    return Some(*id);
                }
            }
        }
        None
    }

    /// Waiting matches projected for list consumers, in creation order.
    pub async fn list_available(&self, mode: Option<MatchMode>) -> Vec<MatchDescriptor> {
        let registry = self.registry.lock().await;
        let mut matches = Vec::new();
        for id in &registry.order {
            if let Some(handle) = registry.matches.get(id) {
                let m = handle.lock().await;
                if m.phase() == MatchPhase::Waiting && mode.map_or(true, |wanted| wanted == m.mode)
                {
                    matches.push(m.descriptor());
                }
            }
        }
        matches
    }

    /// User-initiated exit from the current match. Cancels a Waiting match,
    /// forfeits to a still-connected opponent otherwise. No-op when the
    /// player has no active match.
    pub async fn leave(self: &Arc<Self>, player_id: &str) {
        let mut registry = self.registry.lock().await;
        let Some(match_id) = registry.players.get(player_id).copied() else {
            return;
        };
        let Some(handle) = registry.matches.get(&match_id).cloned() else {
            error!("Player index pointed at missing match {}", match_id);
            registry.players.remove(player_id);
            return;
        };
        let mut m = handle.lock().await;
        let Some(side) = m.slot_side(player_id) else {
            error!("Player {} indexed to match {} without a slot", player_id, match_id);
            registry.players.remove(player_id);
            return;
        };
        if m.phase().is_terminal() {
            return;
        }

        let other = side.other();
        let other_connected = m.slot(other).map(|s| s.connected).unwrap_or(false);

        if m.phase() == MatchPhase::Waiting || !other_connected {
            m.sim.cancel();
            info!("Player {} left match {}; match cancelled", player_id, match_id);
        } else {
            let events = m.sim.force_end(other);
            if let Some(outcome) = m.deliver(events) {
                self.recorder.record(outcome);
            }
            info!(
                "Player {} left match {}; win awarded to opponent",
                player_id, match_id
            );
        }
        m.reconnect_deadline = None;
        m.send_to(other, ServerEvent::OpponentLeft {});
        registry.clear_players_of(&m);

        drop(m);
        drop(registry);
        self.broadcast_match_list().await;
    }

    /// Channel loss for `player_id`. Cancels a Waiting match; otherwise
    /// pauses the game, notifies the opponent, and arms the reconnect
    /// deadline. Idempotent for players with no active match.
    pub async fn handle_disconnect(self: &Arc<Self>, player_id: &str) {
        let mut registry = self.registry.lock().await;
        let Some(match_id) = registry.players.get(player_id).copied() else {
            return;
        };
        let Some(handle) = registry.matches.get(&match_id).cloned() else {
            registry.players.remove(player_id);
            return;
        };
        let mut m = handle.lock().await;
        let Some(side) = m.slot_side(player_id) else {
            return;
        };
        if let Some(slot) = m.slot_mut(side) {
            slot.connected = false;
            slot.conn = None;
        }

        match m.phase() {
            MatchPhase::Waiting => {
                m.sim.cancel();
                registry.clear_players_of(&m);
                info!(
                    "Player {} disconnected while waiting; match {} cancelled",
                    player_id, match_id
                );
                drop(m);
                drop(registry);
                self.broadcast_match_list().await;
            }
            MatchPhase::Playing | MatchPhase::Countdown => {
                let events = m.sim.pause(PauseReason::OpponentDisconnected);
                let _ = m.deliver(events);
                m.send_to(
                    side.other(),
                    ServerEvent::OpponentDisconnected {
                        reconnect_timeout: self.config.reconnect_grace.as_secs(),
                    },
                );
                m.reconnect_deadline = Some(Instant::now() + self.config.reconnect_grace);
                info!(
                    "Player {} disconnected from match {}; paused for up to {:?}",
                    player_id, match_id, self.config.reconnect_grace
                );
            }
            // Already paused (both sides out) or terminal: the armed
            // deadline, or the cleanup path, already covers it.
            _ => {}
        }
    }

    /// Binds a live connection to the player's slot in their current match.
    ///
    /// Covers three cases: a reconnect after channel loss (opponent is
    /// notified and a paused game resumes once both sides are back), a
    /// session replacement (the slot silently points at the newer
    /// connection), and the initial attach after a REST create/join. Returns
    /// a snapshot for the caller to sync from, or `None` when the player has
    /// no active match.
    pub async fn attach_session(self: &Arc<Self>, conn: &ConnectionHandle) -> Option<Snapshot> {
        let registry = self.registry.lock().await;
        let player_id = &conn.identity.id;
        let match_id = registry.players.get(player_id).copied()?;
        let handle = registry.matches.get(&match_id).cloned()?;
        let mut m = handle.lock().await;
        if m.phase().is_terminal() {
            return None;
        }
        let side = m.slot_side(player_id)?;

        let was_connected = m.slot(side).map(|s| s.connected).unwrap_or(false);
        if let Some(slot) = m.slot_mut(side) {
            slot.conn = Some(conn.clone());
            slot.connected = true;
        }

        if !was_connected {
            m.send_to(side.other(), ServerEvent::OpponentReconnected {});
            if m.phase() == MatchPhase::Paused {
                if m.both_connected() {
                    m.reconnect_deadline = None;
                    info!("Player {} reconnected to match {}; resuming", player_id, match_id);
                    let events = m.sim.resume();
                    let _ = m.deliver(events);
                } else {
                    // The other side is still out; their grace restarts now.
                    m.reconnect_deadline =
                        Some(Instant::now() + self.config.reconnect_grace);
                    info!(
                        "Player {} reconnected to match {}; opponent still absent",
                        player_id, match_id
                    );
                }
            }
        }

        Some(m.snapshot())
    }

    /// Routes a movement intent to the owning match.
    pub async fn input(&self, player_id: &str, direction: InputDirection) {
        let handle = {
            let registry = self.registry.lock().await;
            registry
                .players
                .get(player_id)
                .and_then(|id| registry.matches.get(id))
                .cloned()
        };
        if let Some(handle) = handle {
            let mut m = handle.lock().await;
            if let Some(side) = m.slot_side(player_id) {
                m.sim.set_input(side, direction);
            }
        }
    }

    /// Current snapshot of the player's match, if any.
    pub async fn snapshot_for(&self, player_id: &str) -> Option<Snapshot> {
        let handle = {
            let registry = self.registry.lock().await;
            registry
                .players
                .get(player_id)
                .and_then(|id| registry.matches.get(id))
                .cloned()
        };
        match handle {
            Some(handle) => Some(handle.lock().await.snapshot()),
            None => None,
        }
    }

    /// Match the player is currently bound to, if any.
    pub async fn match_of(&self, player_id: &str) -> Option<Uuid> {
        self.registry.lock().await.players.get(player_id).copied()
    }

    /// Descriptor of a match still present in the registry.
    pub async fn descriptor_of(&self, match_id: Uuid) -> Option<MatchDescriptor> {
        let handle = {
            let registry = self.registry.lock().await;
            registry.matches.get(&match_id).cloned()
        };
        match handle {
            Some(handle) => Some(handle.lock().await.descriptor()),
            None => None,
        }
    }

    /// Applies an expired reconnect deadline: the still-connected side wins,
    /// or the match is cancelled when nobody is left.
    async fn resolve_reconnect_timeout(self: &Arc<Self>, match_id: Uuid) {
        let mut registry = self.registry.lock().await;
        let Some(handle) = registry.matches.get(&match_id).cloned() else {
            return;
        };
        let mut m = handle.lock().await;
        let Some(deadline) = m.reconnect_deadline else {
            return;
        };
        if Instant::now() < deadline || m.phase() != MatchPhase::Paused {
            return;
        }
        m.reconnect_deadline = None;

        let connected_side = if m.player1.connected {
            Some(Side::Left)
        } else if m.player2.as_ref().map(|s| s.connected).unwrap_or(false) {
            Some(Side::Right)
        } else {
            None
        };

        match connected_side {
            Some(winner) => {
                info!(
                    "Reconnect grace expired in match {}; win awarded to {:?}",
                    match_id, winner
                );
                let events = m.sim.force_end(winner);
                if let Some(outcome) = m.deliver(events) {
                    self.recorder.record(outcome);
                }
            }
            None => {
                info!(
                    "Reconnect grace expired in match {} with nobody connected; cancelled",
                    match_id
                );
                m.sim.cancel();
            }
        }
        registry.clear_players_of(&m);
    }

    /// Frees the player index entries of a match that just turned terminal.
    async fn finalize(self: &Arc<Self>, match_id: Uuid) {
        let mut registry = self.registry.lock().await;
        let Some(handle) = registry.matches.get(&match_id).cloned() else {
            return;
        };
        let m = handle.lock().await;
        registry.clear_players_of(&m);
    }

    /// Drops a terminal match from the registry after its cleanup delay.
    async fn remove_match(self: &Arc<Self>, match_id: Uuid) {
        let mut registry = self.registry.lock().await;
        registry.matches.remove(&match_id);
        registry.order.retain(|id| *id != match_id);
        registry.players.retain(|_, bound| *bound != match_id);
        info!("Match {} removed from registry", match_id);
    }

    /// Number of matches currently registered (terminal ones included until
    /// their cleanup runs).
    pub async fn match_count(&self) -> usize {
        self.registry.lock().await.matches.len()
    }

    async fn broadcast_match_list(&self) {
        let matches = self.list_available(None).await;
        self.sessions
            .broadcast(&ServerEvent::MatchesUpdated { matches });
    }
}

/// Per-match worker: drives the simulation at the tick rate, polls the
/// reconnect deadline, and runs the cleanup path once the match is terminal.
async fn run_match(manager: Arc<MatchManager>, match_id: Uuid, handle: Arc<Mutex<Match>>) {
    let mut ticker = interval(manager.config.tick_duration());

    loop {
        ticker.tick().await;

        let deadline_due = {
            let m = handle.lock().await;
            if m.phase().is_terminal() {
                break;
            }
            m.reconnect_deadline
                .map(|d| Instant::now() >= d)
                .unwrap_or(false)
        };
        if deadline_due {
            manager.resolve_reconnect_timeout(match_id).await;
            continue;
        }

        let outcome = {
            let mut m = handle.lock().await;
            let events = m.sim.tick();
            m.deliver(events)
        };
        if let Some(outcome) = outcome {
            manager.recorder.record(outcome);
            manager.finalize(match_id).await;
        }
    }

    sleep(manager.config.cleanup_delay).await;
    manager.remove_match(match_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::{OutboundFrame, OutboundQueue};
    use crate::recorder::LogRecorder;
    use std::time::Duration;

    fn test_config() -> ServerConfig {
        ServerConfig {
            reconnect_grace: Duration::from_millis(40),
            cleanup_delay: Duration::from_millis(40),
            ..ServerConfig::default()
        }
    }

    fn manager_with_sessions() -> (Arc<MatchManager>, Arc<SessionRegistry>) {
        let sessions = Arc::new(SessionRegistry::new());
        let manager = MatchManager::new(
            test_config(),
            Arc::clone(&sessions),
            Arc::new(LogRecorder),
        );
        (manager, sessions)
    }

    fn connect(sessions: &SessionRegistry, id: &str) -> ConnectionHandle {
        let queue = Arc::new(OutboundQueue::new(64));
        sessions
            .register(PlayerIdentity::new(id, format!("user-{id}")), queue)
            .0
    }

    fn identity(id: &str) -> PlayerIdentity {
        PlayerIdentity::new(id, format!("user-{id}"))
    }

    fn drain(handle: &ConnectionHandle) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Some(frame) = handle.queue().try_recv() {
            if let OutboundFrame::Event(event) = frame {
                events.push(event);
            }
        }
        events
    }

    async fn wait_for<F>(mut probe: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..100 {
            if probe() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_create_enforces_one_active_match() {
        let (manager, sessions) = manager_with_sessions();
        let _a = connect(&sessions, "a");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        assert_eq!(descriptor.status, MatchPhase::Waiting);
        assert_eq!(descriptor.player1.id, "a");
        assert!(descriptor.player2.is_none());

        assert_eq!(
            manager.create(&identity("a"), MatchMode::OneVsOne).await,
            Err(MatchError::AlreadyInMatch)
        );
    }

    #[tokio::test]
    async fn test_create_notifies_creator_and_broadcasts_list() {
        let (manager, sessions) = manager_with_sessions();
        let a = connect(&sessions, "a");
        let b = connect(&sessions, "b");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();

        let a_events = drain(&a);
        assert_eq!(
            a_events[0],
            ServerEvent::MatchCreated {
                match_id: descriptor.id
            }
        );
        assert_eq!(
            a_events[1],
            ServerEvent::MatchWaiting {
                match_id: descriptor.id
            }
        );
        // A bystander sees the list update with the new match.
        let b_events = drain(&b);
        assert!(matches!(
            b_events.last(),
            Some(ServerEvent::MatchesUpdated { matches }) if matches.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_join_starts_countdown_and_notifies_both() {
        let (manager, sessions) = manager_with_sessions();
        let a = connect(&sessions, "a");
        let b = connect(&sessions, "b");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        drain(&a);
        drain(&b);

        let joined = manager.join(descriptor.id, &identity("b")).await.unwrap();
        assert_eq!(joined.status, MatchPhase::Countdown);
        assert_eq!(joined.player2.as_ref().unwrap().id, "b");

        let a_events = drain(&a);
        assert!(a_events.contains(&ServerEvent::OpponentJoined {
            opponent: "user-b".into()
        }));
        assert!(a_events.contains(&ServerEvent::Countdown { count: 3 }));

        let b_events = drain(&b);
        assert!(b_events.contains(&ServerEvent::MatchJoined {
            match_id: descriptor.id,
            opponent: "user-a".into(),
            player_number: 2,
        }));
    }

    #[tokio::test]
    async fn test_join_error_taxonomy() {
        let (manager, sessions) = manager_with_sessions();
        let _a = connect(&sessions, "a");
        let _b = connect(&sessions, "b");
        let _c = connect(&sessions, "c");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();

        assert_eq!(
            manager.join(Uuid::new_v4(), &identity("b")).await,
            Err(MatchError::NotFound)
        );
        assert_eq!(
            manager.join(descriptor.id, &identity("a")).await,
            Err(MatchError::OwnMatch)
        );

        manager.join(descriptor.id, &identity("b")).await.unwrap();
        assert_eq!(
            manager.join(descriptor.id, &identity("b")).await,
            Err(MatchError::AlreadyInMatch)
        );
        assert_eq!(
            manager.join(descriptor.id, &identity("c")).await,
            Err(MatchError::MatchFull)
        );
    }

    #[tokio::test]
    async fn test_quickmatch_joins_oldest_or_creates() {
        let (manager, sessions) = manager_with_sessions();
        let _a = connect(&sessions, "a");
        let _b = connect(&sessions, "b");
        let _c = connect(&sessions, "c");

        // Nothing open: quickmatch creates.
        let created = manager.quickmatch(&identity("a")).await.unwrap();
        let Quickmatch::Created(first) = &created else {
            panic!("expected a created match, got {:?}", created);
        };

        let second = manager
            .create(&identity("b"), MatchMode::OneVsOne)
            .await
            .unwrap();

        // Two open matches: the older one wins the scan.
        let joined = manager.quickmatch(&identity("c")).await.unwrap();
        let Quickmatch::Joined(joined) = &joined else {
            panic!("expected to join, got {:?}", joined);
        };
        assert_eq!(joined.id, first.id);
        assert_ne!(joined.id, second.id);
    }

    #[tokio::test]
    async fn test_quickmatch_excludes_own_match() {
        let (manager, sessions) = manager_with_sessions();
        let _a = connect(&sessions, "a");

        let created = manager.quickmatch(&identity("a")).await.unwrap();
        assert!(matches!(created, Quickmatch::Created(_)));
        // The creator cannot be matched into their own Waiting match.
        assert_eq!(
            manager.quickmatch(&identity("a")).await,
            Err(MatchError::AlreadyInMatch)
        );
    }

    #[tokio::test]
    async fn test_list_available_filters_waiting_only() {
        let (manager, sessions) = manager_with_sessions();
        let _a = connect(&sessions, "a");
        let _b = connect(&sessions, "b");
        let _c = connect(&sessions, "c");

        let first = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        let second = manager
            .create(&identity("c"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.join(first.id, &identity("b")).await.unwrap();

        let open = manager.list_available(Some(MatchMode::OneVsOne)).await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, second.id);
    }

    #[tokio::test]
    async fn test_leave_waiting_cancels_and_frees_player() {
        let (manager, sessions) = manager_with_sessions();
        let _a = connect(&sessions, "a");

        manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.leave("a").await;

        // No residual index entry: the player can create again right away.
        assert!(manager.match_of("a").await.is_none());
        assert!(manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .is_ok());

        // Leaving twice is the same as leaving once.
        manager.leave("a").await;
        manager.leave("a").await;
    }

    #[tokio::test]
    async fn test_leave_live_match_forfeits_to_opponent() {
        let (manager, sessions) = manager_with_sessions();
        let a = connect(&sessions, "a");
        let _b = connect(&sessions, "b");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.join(descriptor.id, &identity("b")).await.unwrap();
        drain(&a);

        manager.leave("b").await;

        let a_events = drain(&a);
        assert!(a_events.contains(&ServerEvent::OpponentLeft {}));
        assert!(a_events.iter().any(|e| matches!(
            e,
            ServerEvent::GameEnd { winner_id, .. } if winner_id == "a"
        )));
        assert!(manager.match_of("a").await.is_none());
        assert!(manager.match_of("b").await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_pauses_and_notifies_opponent() {
        let (manager, sessions) = manager_with_sessions();
        let a = connect(&sessions, "a");
        let _b = connect(&sessions, "b");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.join(descriptor.id, &identity("b")).await.unwrap();
        drain(&a);

        manager.handle_disconnect("b").await;

        let a_events = drain(&a);
        assert!(a_events.contains(&ServerEvent::GamePaused {
            reason: PauseReason::OpponentDisconnected
        }));
        assert!(a_events.iter().any(|e| matches!(
            e,
            ServerEvent::OpponentDisconnected { .. }
        )));

        let snapshot = manager.snapshot_for("a").await.unwrap();
        assert_eq!(snapshot.phase, MatchPhase::Paused);
    }

    #[tokio::test]
    async fn test_reconnect_within_grace_resumes() {
        let (manager, sessions) = manager_with_sessions();
        let a = connect(&sessions, "a");
        let _b = connect(&sessions, "b");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.join(descriptor.id, &identity("b")).await.unwrap();
        manager.handle_disconnect("b").await;
        drain(&a);

        let b2 = connect(&sessions, "b");
        let snapshot = manager.attach_session(&b2).await.unwrap();
        assert_eq!(snapshot.phase, MatchPhase::Countdown);

        let a_events = drain(&a);
        assert!(a_events.contains(&ServerEvent::OpponentReconnected {}));
        assert!(a_events.contains(&ServerEvent::GameResumed {}));
        assert!(a_events.contains(&ServerEvent::Countdown { count: 3 }));
    }

    #[tokio::test]
    async fn test_grace_expiry_awards_win_to_connected_side() {
        let (manager, sessions) = manager_with_sessions();
        let a = connect(&sessions, "a");
        let _b = connect(&sessions, "b");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.join(descriptor.id, &identity("b")).await.unwrap();
        manager.handle_disconnect("b").await;
        drain(&a);

        // The worker polls the deadline; with the short test grace it fires
        // within a few ticks.
        wait_for(|| {
            drain(&a)
                .iter()
                .any(|e| matches!(e, ServerEvent::GameEnd { winner_id, .. } if winner_id == "a"))
        })
        .await;

        assert!(manager.match_of("a").await.is_none());
        assert!(manager.match_of("b").await.is_none());
    }

    #[tokio::test]
    async fn test_terminal_match_is_cleaned_up_after_delay() {
        let (manager, sessions) = manager_with_sessions();
        let _a = connect(&sessions, "a");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.leave("a").await;

        assert!(manager.descriptor_of(descriptor.id).await.is_some());
        wait_for(|| {
            // Cleanup runs on the worker after the configured delay.
            futures_util::FutureExt::now_or_never(manager.descriptor_of(descriptor.id))
                .map(|d| d.is_none())
                .unwrap_or(false)
        })
        .await;
    }

    #[tokio::test]
    async fn test_session_replacement_keeps_match_untouched() {
        let (manager, sessions) = manager_with_sessions();
        let _a1 = connect(&sessions, "a");
        let _b = connect(&sessions, "b");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.join(descriptor.id, &identity("b")).await.unwrap();
        let before = manager.snapshot_for("a").await.unwrap();

        // Second login for the same identity supersedes the first.
        let a2 = connect(&sessions, "a");
        let snapshot = manager.attach_session(&a2).await.unwrap();

        assert_eq!(snapshot.phase, before.phase);
        assert_eq!(snapshot.score1, before.score1);
        assert_eq!(snapshot.score2, before.score2);

        // The new connection now receives the match frames.
        drain(&a2);
        manager.handle_disconnect("b").await;
        assert!(drain(&a2).iter().any(|e| matches!(
            e,
            ServerEvent::OpponentDisconnected { .. }
        )));
    }

    #[tokio::test]
    async fn test_input_routes_to_owning_match() {
        let (manager, sessions) = manager_with_sessions();
        let _a = connect(&sessions, "a");
        let _b = connect(&sessions, "b");

        let descriptor = manager
            .create(&identity("a"), MatchMode::OneVsOne)
            .await
            .unwrap();
        manager.join(descriptor.id, &identity("b")).await.unwrap();

        let before = manager.snapshot_for("a").await.unwrap();
        manager.input("a", InputDirection::Up).await;

        // The worker applies the stored intent on subsequent countdown ticks.
        wait_for(|| {
            futures_util::FutureExt::now_or_never(manager.snapshot_for("a"))
                .flatten()
                .map(|s| s.paddle1.y < before.paddle1.y)
                .unwrap_or(false)
        })
        .await;
    }
}
