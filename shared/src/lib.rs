//! # Shared Game Library
//!
//! Data structures, constants, and the physics kernel shared by the match
//! simulation, the connection endpoint, and the tests. This crate is the single
//! authority for the playfield geometry and ball/paddle behavior: the server
//! simulation and any external predictor must consume these values rather than
//! carry their own copies.
//!
//! ## Contents
//!
//! ### Game Constants
//! Field dimensions, paddle geometry and speed, ball radius and speed band,
//! score cap, and the simulation tick rate.
//!
//! ### Core Types
//! [`Ball`], [`Paddle`], [`Side`], [`InputDirection`], [`ServeDirection`],
//! [`MatchPhase`], and [`MatchMode`]. All wire-visible types derive `Serialize`
//! and `Deserialize` so snapshots can be framed as JSON without conversion.
//!
//! ### Physics Kernel
//! Pure functions over ball/paddle state: [`advance`], [`collide_walls`],
//! [`collide_paddle`], [`detect_score`], [`reset_ball`], and [`move_paddle`].
//! The kernel owns no state and never blocks; the per-tick composition lives
//! in [`step`].
//!
//! ### Wire Protocol
//! The [`protocol`] module defines the JSON `{event, data}` frame catalogue
//! exchanged over the persistent channel, plus the match descriptor projection
//! served by the request/response surface.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod protocol;

/// Width of the playfield in game units.
pub const FIELD_WIDTH: f32 = 800.0;

/// Height of the playfield in game units.
pub const FIELD_HEIGHT: f32 = 600.0;

/// Paddle thickness along the x axis.
pub const PADDLE_WIDTH: f32 = 15.0;

/// Paddle extent along the y axis.
pub const PADDLE_HEIGHT: f32 = 100.0;

/// Distance a paddle travels in one tick while an up/down intent is held.
pub const PADDLE_STEP: f32 = 6.0;

/// Gap between the field edge and the near face of each paddle.
///
/// The left paddle occupies `[PADDLE_INSET, PADDLE_INSET + PADDLE_WIDTH]`;
/// the right paddle mirrors it against the far edge.
pub const PADDLE_INSET: f32 = 10.0;

/// Ball radius.
pub const BALL_RADIUS: f32 = 8.0;

/// Ball speed immediately after a serve.
pub const BALL_SPEED_INITIAL: f32 = 5.0;

/// Upper bound on ball speed regardless of how many paddle hits ramped it.
pub const BALL_SPEED_MAX: f32 = 12.0;

/// Multiplier applied to the ball speed on every paddle hit.
pub const SPEED_RAMP: f32 = 1.05;

/// Points required to win a match.
pub const MAX_SCORE: u32 = 11;

/// Simulation ticks per second.
pub const TICK_HZ: u32 = 60;

/// Largest deviation from horizontal for a serve, in radians (30 degrees).
pub const SERVE_ANGLE_MAX_RAD: f32 = std::f32::consts::PI / 6.0;

/// The two paddle slots of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Slot number as exposed on the wire (left = 1, right = 2).
    pub fn player_number(self) -> u8 {
        match self {
            Side::Left => 1,
            Side::Right => 2,
        }
    }
}

/// A player's movement intent for the current tick window.
///
/// Intents are last-write-wins: the most recent direction received before a
/// tick is the one applied on that tick, and it stays in effect until the
/// client sends a different one. `None` halts the paddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputDirection {
    Up,
    Down,
    #[default]
    None,
}

/// Horizontal sign assigned to the ball's velocity after a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeDirection {
    TowardLeft,
    TowardRight,
}

impl ServeDirection {
    pub fn toward(side: Side) -> ServeDirection {
        match side {
            Side::Left => ServeDirection::TowardLeft,
            Side::Right => ServeDirection::TowardRight,
        }
    }

    fn sign(self) -> f32 {
        match self {
            ServeDirection::TowardLeft => -1.0,
            ServeDirection::TowardRight => 1.0,
        }
    }
}

/// Lifecycle phase of a match.
///
/// Exactly one phase holds at any time. `Finished` and `Cancelled` are
/// terminal: the simulation refuses further operations and the match becomes
/// eligible for cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    Waiting,
    Countdown,
    Playing,
    Paused,
    Finished,
    Cancelled,
}

impl MatchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchPhase::Finished | MatchPhase::Cancelled)
    }
}

/// Supported match modes. Only two-player matches exist today; the tag is kept
/// on the wire so the mode set can grow without a protocol break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    #[serde(rename = "1v1")]
    OneVsOne,
}

impl MatchMode {
    pub fn parse(s: &str) -> Option<MatchMode> {
        match s {
            "1v1" => Some(MatchMode::OneVsOne),
            _ => None,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::OneVsOne => write!(f, "1v1"),
        }
    }
}

/// Ball state.
///
/// `speed` is the scalar speed the velocity components are derived from.
/// `vx² + vy² ≈ speed²` holds except on the tick immediately after a paddle
/// hit, where the horizontal component is renormalized to the ramped speed
/// while the vertical component keeps the steered magnitude. The next tick
/// moves with the stored components as-is; this transient is intended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub speed: f32,
}

impl Ball {
    /// A ball resting at field center, not yet served.
    pub fn centered() -> Ball {
        Ball {
            x: FIELD_WIDTH / 2.0,
            y: FIELD_HEIGHT / 2.0,
            vx: 0.0,
            vy: 0.0,
            speed: BALL_SPEED_INITIAL,
        }
    }
}

/// Paddle state. `x` is fixed per side; only `y` moves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
}

impl Paddle {
    /// Paddle for the given side, vertically centered.
    pub fn for_side(side: Side) -> Paddle {
        let x = match side {
            Side::Left => PADDLE_INSET,
            Side::Right => FIELD_WIDTH - PADDLE_INSET - PADDLE_WIDTH,
        };
        Paddle {
            x,
            y: (FIELD_HEIGHT - PADDLE_HEIGHT) / 2.0,
        }
    }
}

/// Moves the ball one tick along its velocity.
pub fn advance(ball: &mut Ball) {
    ball.x += ball.vx;
    ball.y += ball.vy;
}

/// Reflects the ball off the top and bottom field edges.
///
/// The ball is clamped onto the boundary it crossed so a single crossing
/// produces a single reflection.
pub fn collide_walls(ball: &mut Ball) {
    if ball.y - BALL_RADIUS <= 0.0 {
        ball.y = BALL_RADIUS;
        ball.vy = -ball.vy;
    } else if ball.y + BALL_RADIUS >= FIELD_HEIGHT {
        ball.y = FIELD_HEIGHT - BALL_RADIUS;
        ball.vy = -ball.vy;
    }
}

/// Tests the ball against one paddle and resolves the hit.
///
/// Overlap is an AABB test between the ball's bounding box and the paddle
/// rectangle. On a hit the outgoing angle is steered by where the ball struck
/// the paddle face: dead center sends it back flat, the extreme edges send it
/// at the steepest angle. The scalar speed ramps by [`SPEED_RAMP`] up to
/// [`BALL_SPEED_MAX`], the vertical component is set from the pre-ramp speed,
/// and the horizontal component is renormalized to the post-ramp speed. The
/// ball is then repositioned just outside the struck face so it cannot collide
/// with the same paddle again on the following tick.
///
/// Returns `true` if a hit was resolved.
pub fn collide_paddle(ball: &mut Ball, paddle: &Paddle) -> bool {
    let overlaps = ball.x - BALL_RADIUS < paddle.x + PADDLE_WIDTH
        && ball.x + BALL_RADIUS > paddle.x
        && ball.y - BALL_RADIUS < paddle.y + PADDLE_HEIGHT
        && ball.y + BALL_RADIUS > paddle.y;

    if !overlaps {
        return false;
    }

    let hit_pos = ((ball.y - paddle.y) / PADDLE_HEIGHT).clamp(0.0, 1.0);
    let angle_mul = (hit_pos - 0.5) * 2.0;

    ball.vx = -ball.vx;
    ball.vy = ball.speed * angle_mul;
    ball.speed = (ball.speed * SPEED_RAMP).min(BALL_SPEED_MAX);
    ball.vx = ball.vx.signum() * ball.speed;

    // Place the ball on the open side of the struck paddle.
    if paddle.x + PADDLE_WIDTH / 2.0 < FIELD_WIDTH / 2.0 {
        ball.x = paddle.x + PADDLE_WIDTH + BALL_RADIUS;
    } else {
        ball.x = paddle.x - BALL_RADIUS;
    }

    true
}

/// Checks whether the ball has left the field past a goal line.
///
/// The crossing is detected when the ball's leading edge passes the wall.
/// Returns the side that scored: the ball leaving past the left edge awards
/// the point to the right player, and vice versa.
pub fn detect_score(ball: &Ball) -> Option<Side> {
    if ball.x - BALL_RADIUS < 0.0 {
        Some(Side::Right)
    } else if ball.x + BALL_RADIUS > FIELD_WIDTH {
        Some(Side::Left)
    } else {
        None
    }
}

/// Re-centers the ball and serves it at `angle_rad` from horizontal.
///
/// The horizontal sign comes from `serve`; speed returns to
/// [`BALL_SPEED_INITIAL`]. Callers pick the angle (uniform within
/// ±[`SERVE_ANGLE_MAX_RAD`] in the simulation, fixed values in tests).
pub fn reset_ball(ball: &mut Ball, serve: ServeDirection, angle_rad: f32) {
    ball.x = FIELD_WIDTH / 2.0;
    ball.y = FIELD_HEIGHT / 2.0;
    ball.speed = BALL_SPEED_INITIAL;
    ball.vx = serve.sign() * ball.speed * angle_rad.cos();
    ball.vy = ball.speed * angle_rad.sin();
}

/// Steps a paddle one tick in the given direction, clamped to the field.
pub fn move_paddle(paddle: &mut Paddle, dir: InputDirection) {
    match dir {
        InputDirection::Up => {
            paddle.y = (paddle.y - PADDLE_STEP).clamp(0.0, FIELD_HEIGHT - PADDLE_HEIGHT);
        }
        InputDirection::Down => {
            paddle.y = (paddle.y + PADDLE_STEP).clamp(0.0, FIELD_HEIGHT - PADDLE_HEIGHT);
        }
        InputDirection::None => {}
    }
}

/// One full physics tick: advance, wall bounce, paddle hits (left then
/// right), then score detection.
///
/// Scoring runs after collision resolution so a ball struck by a paddle on
/// this tick cannot also score on it.
pub fn step(ball: &mut Ball, left: &Paddle, right: &Paddle) -> Option<Side> {
    advance(ball);
    collide_walls(ball);
    collide_paddle(ball, left);
    collide_paddle(ball, right);
    detect_score(ball)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn moving_ball(x: f32, y: f32, vx: f32, vy: f32) -> Ball {
        Ball {
            x,
            y,
            vx,
            vy,
            speed: BALL_SPEED_INITIAL,
        }
    }

    #[test]
    fn test_advance_moves_along_velocity() {
        let mut ball = moving_ball(100.0, 100.0, 3.0, -4.0);
        advance(&mut ball);
        assert_approx_eq!(ball.x, 103.0);
        assert_approx_eq!(ball.y, 96.0);
    }

    #[test]
    fn test_wall_reflection_top() {
        let mut ball = moving_ball(100.0, BALL_RADIUS - 2.0, 0.0, -3.0);
        collide_walls(&mut ball);
        assert_approx_eq!(ball.y, BALL_RADIUS);
        assert_approx_eq!(ball.vy, 3.0);
    }

    #[test]
    fn test_wall_reflection_bottom() {
        let mut ball = moving_ball(100.0, FIELD_HEIGHT - BALL_RADIUS + 1.0, 0.0, 2.0);
        collide_walls(&mut ball);
        assert_approx_eq!(ball.y, FIELD_HEIGHT - BALL_RADIUS);
        assert_approx_eq!(ball.vy, -2.0);
    }

    #[test]
    fn test_wall_exact_boundary_reflects_once() {
        // Ball resting exactly on the top boundary reflects this tick, then
        // moves away and does not reflect again next tick.
        let mut ball = moving_ball(100.0, BALL_RADIUS, 0.0, -3.0);
        collide_walls(&mut ball);
        assert_approx_eq!(ball.vy, 3.0);

        advance(&mut ball);
        collide_walls(&mut ball);
        assert_approx_eq!(ball.vy, 3.0);
    }

    #[test]
    fn test_paddle_miss_returns_false() {
        let paddle = Paddle::for_side(Side::Left);
        let mut ball = moving_ball(400.0, 300.0, -5.0, 0.0);
        assert!(!collide_paddle(&mut ball, &paddle));
    }

    #[test]
    fn test_paddle_hit_center_sends_ball_flat() {
        let paddle = Paddle::for_side(Side::Left);
        let mut ball = moving_ball(
            paddle.x + PADDLE_WIDTH,
            paddle.y + PADDLE_HEIGHT / 2.0,
            -BALL_SPEED_INITIAL,
            0.0,
        );

        assert!(collide_paddle(&mut ball, &paddle));
        assert_approx_eq!(ball.vy, 0.0);
        assert!(ball.vx > 0.0);
    }

    #[test]
    fn test_paddle_hit_top_edge_steers_up() {
        let paddle = Paddle::for_side(Side::Left);
        // Ball center level with the paddle's top edge: hit position 0.
        let mut ball = moving_ball(paddle.x + PADDLE_WIDTH, paddle.y, -BALL_SPEED_INITIAL, 0.0);

        assert!(collide_paddle(&mut ball, &paddle));
        // vy is set from the pre-ramp speed; full upward deflection.
        assert_approx_eq!(ball.vy, -BALL_SPEED_INITIAL);
        assert_approx_eq!(ball.vx, BALL_SPEED_INITIAL * SPEED_RAMP);
    }

    #[test]
    fn test_paddle_hit_bottom_edge_steers_down() {
        let paddle = Paddle::for_side(Side::Left);
        let mut ball = moving_ball(
            paddle.x + PADDLE_WIDTH,
            paddle.y + PADDLE_HEIGHT,
            -BALL_SPEED_INITIAL,
            0.0,
        );

        assert!(collide_paddle(&mut ball, &paddle));
        assert_approx_eq!(ball.vy, BALL_SPEED_INITIAL);
    }

    #[test]
    fn test_speed_ramp_caps_at_max() {
        let paddle = Paddle::for_side(Side::Left);
        let mut ball = moving_ball(
            paddle.x + PADDLE_WIDTH,
            paddle.y + PADDLE_HEIGHT / 2.0,
            -BALL_SPEED_MAX,
            0.0,
        );
        ball.speed = BALL_SPEED_MAX;

        assert!(collide_paddle(&mut ball, &paddle));
        assert_approx_eq!(ball.speed, BALL_SPEED_MAX);
        assert_approx_eq!(ball.vx.abs(), BALL_SPEED_MAX);
    }

    #[test]
    fn test_paddle_hit_repositions_outside_face() {
        let left = Paddle::for_side(Side::Left);
        let mut ball = moving_ball(
            left.x + PADDLE_WIDTH - 1.0,
            left.y + PADDLE_HEIGHT / 2.0,
            -BALL_SPEED_INITIAL,
            0.0,
        );
        assert!(collide_paddle(&mut ball, &left));
        assert_approx_eq!(ball.x, left.x + PADDLE_WIDTH + BALL_RADIUS);

        let right = Paddle::for_side(Side::Right);
        let mut ball = moving_ball(
            right.x + 1.0,
            right.y + PADDLE_HEIGHT / 2.0,
            BALL_SPEED_INITIAL,
            0.0,
        );
        assert!(collide_paddle(&mut ball, &right));
        assert_approx_eq!(ball.x, right.x - BALL_RADIUS);
    }

    #[test]
    fn test_score_detection_sides() {
        let mut ball = moving_ball(BALL_RADIUS - 0.5, 300.0, -5.0, 0.0);
        assert_eq!(detect_score(&ball), Some(Side::Right));

        ball.x = FIELD_WIDTH - BALL_RADIUS + 0.5;
        assert_eq!(detect_score(&ball), Some(Side::Left));

        ball.x = FIELD_WIDTH / 2.0;
        assert_eq!(detect_score(&ball), None);
    }

    #[test]
    fn test_reset_ball_serves_toward_loser() {
        let mut ball = moving_ball(10.0, 10.0, 7.0, 7.0);
        reset_ball(&mut ball, ServeDirection::TowardLeft, 0.0);
        assert_approx_eq!(ball.x, FIELD_WIDTH / 2.0);
        assert_approx_eq!(ball.y, FIELD_HEIGHT / 2.0);
        assert_approx_eq!(ball.vx, -BALL_SPEED_INITIAL);
        assert_approx_eq!(ball.vy, 0.0);

        reset_ball(&mut ball, ServeDirection::TowardRight, SERVE_ANGLE_MAX_RAD);
        assert!(ball.vx > 0.0);
        assert!(ball.vy > 0.0);
        assert_approx_eq!(
            (ball.vx * ball.vx + ball.vy * ball.vy).sqrt(),
            BALL_SPEED_INITIAL,
            0.001
        );
    }

    #[test]
    fn test_move_paddle_clamps_to_field() {
        let mut paddle = Paddle::for_side(Side::Left);
        paddle.y = 2.0;
        move_paddle(&mut paddle, InputDirection::Up);
        assert_approx_eq!(paddle.y, 0.0);

        paddle.y = FIELD_HEIGHT - PADDLE_HEIGHT - 2.0;
        move_paddle(&mut paddle, InputDirection::Down);
        assert_approx_eq!(paddle.y, FIELD_HEIGHT - PADDLE_HEIGHT);

        let before = paddle.y;
        move_paddle(&mut paddle, InputDirection::None);
        assert_approx_eq!(paddle.y, before);
    }

    #[test]
    fn test_step_hit_and_score_do_not_coincide() {
        // A ball that strikes the left paddle on this tick is repositioned in
        // front of it and must not register as a goal on the same tick.
        let left = Paddle::for_side(Side::Left);
        let right = Paddle::for_side(Side::Right);
        let mut ball = moving_ball(
            left.x + PADDLE_WIDTH + BALL_RADIUS + 2.0,
            left.y + PADDLE_HEIGHT / 2.0,
            -5.0,
            0.0,
        );

        let scored = step(&mut ball, &left, &right);
        assert_eq!(scored, None);
        assert!(ball.vx > 0.0);
    }

    #[test]
    fn test_step_scores_past_idle_paddle() {
        let left = Paddle::for_side(Side::Left);
        let right = Paddle::for_side(Side::Right);
        // Ball below the left paddle's reach, about to cross the goal line.
        let mut ball = moving_ball(BALL_RADIUS + 2.0, 550.0, -5.0, 0.0);

        let scored = step(&mut ball, &left, &right);
        assert_eq!(scored, Some(Side::Right));
    }
}
