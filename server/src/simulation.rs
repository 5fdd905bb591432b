//! Per-match simulation state machine.
//!
//! Wraps the physics kernel from `shared` with the match lifecycle: waiting
//! for an opponent, counting down to a serve, playing, pausing on disconnect,
//! and finishing at the score cap or by forfeit. The simulation is driven
//! externally — the owning match worker calls [`MatchSim::tick`] at the fixed
//! rate — and it communicates observable effects as batches of [`SimEvent`]s
//! returned from each call. It never blocks, never panics on bad phase
//! transitions (they are no-ops), and holds no timers of its own: countdown
//! cadence is derived from tick counting.
//!
//! The simulation deals purely in [`Side`]s; mapping slots to player
//! identities is the match layer's concern.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::PauseReason;
use shared::{
    move_paddle, reset_ball, step, Ball, InputDirection, MatchPhase, Paddle, ServeDirection, Side,
    MAX_SCORE, SERVE_ANGLE_MAX_RAD, TICK_HZ,
};

/// Simulation tunables, fixed at construction.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tick_hz: u32,
    /// Countdown before the opening serve and after a resume.
    pub countdown_secs: u32,
    /// Countdown before each serve after a point.
    pub serve_countdown_secs: u32,
    pub max_score: u32,
    /// Maximum serve deviation from horizontal, radians. Zero makes every
    /// serve flat, which the deterministic tests rely on.
    pub serve_angle_max_rad: f32,
    /// Seed for the serve-angle RNG; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_hz: TICK_HZ,
            countdown_secs: 3,
            serve_countdown_secs: 3,
            max_score: MAX_SCORE,
            serve_angle_max_rad: SERVE_ANGLE_MAX_RAD,
            rng_seed: None,
        }
    }
}

/// Observable effect of a simulation transition, translated to wire frames by
/// the match layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Countdown { count: u32 },
    Start,
    /// A fresh snapshot should be broadcast. The event is a marker; the match
    /// layer projects the snapshot because it owns the player identities.
    State,
    Paused { reason: PauseReason },
    Resumed,
    End {
        winner: Side,
        score_left: u32,
        score_right: u32,
    },
}

/// Authoritative state of one match.
#[derive(Debug)]
pub struct MatchSim {
    config: SimConfig,
    pub phase: MatchPhase,
    pub ball: Ball,
    pub paddle_left: Paddle,
    pub paddle_right: Paddle,
    pub score_left: u32,
    pub score_right: u32,
    pub winner: Option<Side>,
    serve: ServeDirection,
    countdown: u32,
    countdown_ticks_left: u32,
    inputs: [InputDirection; 2],
    rng: StdRng,
}

impl MatchSim {
    pub fn new(config: SimConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            phase: MatchPhase::Waiting,
            ball: Ball::centered(),
            paddle_left: Paddle::for_side(Side::Left),
            paddle_right: Paddle::for_side(Side::Right),
            score_left: 0,
            score_right: 0,
            winner: None,
            // The opening serve goes toward the creator's side.
            serve: ServeDirection::TowardLeft,
            countdown: 0,
            countdown_ticks_left: 0,
            inputs: [InputDirection::None; 2],
            rng,
        }
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.score_left,
            Side::Right => self.score_right,
        }
    }

    /// Both players are present: leave Waiting and count down to the opening
    /// serve. No-op from any other phase.
    pub fn begin(&mut self) -> Vec<SimEvent> {
        if self.phase != MatchPhase::Waiting {
            return Vec::new();
        }

        let angle = self.serve_angle();
        reset_ball(&mut self.ball, self.serve, angle);

        let mut events = Vec::new();
        self.enter_countdown(self.config.countdown_secs, &mut events);
        events.push(SimEvent::State);
        events
    }

    /// Stores the latest movement intent for a slot. Last write before a tick
    /// wins that tick; the intent persists until overwritten. Ignored outside
    /// Countdown and Playing.
    pub fn set_input(&mut self, side: Side, dir: InputDirection) {
        if matches!(self.phase, MatchPhase::Countdown | MatchPhase::Playing) {
            self.inputs[slot_index(side)] = dir;
        }
    }

    /// Advances the match by one tick. Only Countdown and Playing simulate;
    /// every other phase returns no events.
    pub fn tick(&mut self) -> Vec<SimEvent> {
        match self.phase {
            MatchPhase::Countdown => self.tick_countdown(),
            MatchPhase::Playing => self.tick_playing(),
            _ => Vec::new(),
        }
    }

    /// Suspends simulation. Only Playing and Countdown can pause.
    pub fn pause(&mut self, reason: PauseReason) -> Vec<SimEvent> {
        if !matches!(self.phase, MatchPhase::Playing | MatchPhase::Countdown) {
            return Vec::new();
        }
        self.phase = MatchPhase::Paused;
        vec![SimEvent::Paused { reason }]
    }

    /// Leaves Paused through a fresh countdown. Ball, paddles, and scores are
    /// preserved.
    pub fn resume(&mut self) -> Vec<SimEvent> {
        if self.phase != MatchPhase::Paused {
            return Vec::new();
        }
        let mut events = vec![SimEvent::Resumed];
        self.enter_countdown(self.config.countdown_secs, &mut events);
        events.push(SimEvent::State);
        events
    }

    /// Ends the match immediately in favor of `winner`, regardless of scores.
    /// Used for forfeits and reconnect timeouts. No-op on terminal matches.
    pub fn force_end(&mut self, winner: Side) -> Vec<SimEvent> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        self.phase = MatchPhase::Finished;
        self.winner = Some(winner);
        vec![SimEvent::End {
            winner,
            score_left: self.score_left,
            score_right: self.score_right,
        }]
    }

    /// Cancels the match without a winner. No-op on terminal matches.
    pub fn cancel(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = MatchPhase::Cancelled;
        }
    }

    fn tick_countdown(&mut self) -> Vec<SimEvent> {
        let mut events = Vec::new();

        // Paddles may be repositioned during the countdown; the ball waits.
        self.apply_paddle_inputs();

        self.countdown_ticks_left = self.countdown_ticks_left.saturating_sub(1);
        if self.countdown_ticks_left == 0 {
            self.countdown = self.countdown.saturating_sub(1);
            if self.countdown == 0 {
                self.phase = MatchPhase::Playing;
                events.push(SimEvent::Start);
            } else {
                self.countdown_ticks_left = self.config.tick_hz;
                events.push(SimEvent::Countdown {
                    count: self.countdown,
                });
            }
        }

        events.push(SimEvent::State);
        events
    }

    fn tick_playing(&mut self) -> Vec<SimEvent> {
        let mut events = Vec::new();

        self.apply_paddle_inputs();
        let scored = step(&mut self.ball, &self.paddle_left, &self.paddle_right);

        if let Some(scorer) = scored {
            match scorer {
                Side::Left => self.score_left += 1,
                Side::Right => self.score_right += 1,
            }

            if self.score(scorer) >= self.config.max_score {
                self.phase = MatchPhase::Finished;
                self.winner = Some(scorer);
                events.push(SimEvent::End {
                    winner: scorer,
                    score_left: self.score_left,
                    score_right: self.score_right,
                });
                return events;
            }

            // The side that conceded serves next.
            self.serve = ServeDirection::toward(scorer.other());
            let angle = self.serve_angle();
            reset_ball(&mut self.ball, self.serve, angle);
            self.enter_countdown(self.config.serve_countdown_secs, &mut events);
        }

        events.push(SimEvent::State);
        events
    }

    fn apply_paddle_inputs(&mut self) {
        move_paddle(&mut self.paddle_left, self.inputs[slot_index(Side::Left)]);
        move_paddle(&mut self.paddle_right, self.inputs[slot_index(Side::Right)]);
    }

    fn enter_countdown(&mut self, secs: u32, events: &mut Vec<SimEvent>) {
        if secs == 0 {
            self.phase = MatchPhase::Playing;
            events.push(SimEvent::Start);
            return;
        }
        self.phase = MatchPhase::Countdown;
        self.countdown = secs;
        self.countdown_ticks_left = self.config.tick_hz;
        events.push(SimEvent::Countdown { count: secs });
    }

    fn serve_angle(&mut self) -> f32 {
        let max = self.config.serve_angle_max_rad;
        if max <= 0.0 {
            0.0
        } else {
            self.rng.gen_range(-max..=max)
        }
    }
}

fn slot_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}
