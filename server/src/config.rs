//! Runtime configuration for the match service.
//!
//! All tunables are plain values handed to the components at construction;
//! there is no module-level mutable state. Field geometry and ball behavior
//! stay in the `shared` crate — this struct only carries service timing and
//! capacity knobs.

use crate::simulation::SimConfig;
use shared::{MAX_SCORE, SERVE_ANGLE_MAX_RAD, TICK_HZ};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation ticks per second.
    pub tick_hz: u32,
    /// Seconds counted down before the opening serve and after a resume.
    pub countdown_secs: u32,
    /// Seconds counted down before each serve after a point.
    pub serve_countdown_secs: u32,
    /// Points required to win.
    pub max_score: u32,
    /// Maximum serve deviation from horizontal, radians.
    pub serve_angle_max_rad: f32,
    /// How long a disconnected player may return before forfeiting.
    pub reconnect_grace: Duration,
    /// Delay between a match turning terminal and its removal from the
    /// registry, so clients can observe the end frame.
    pub cleanup_delay: Duration,
    /// A connection with no inbound traffic for this long is closed.
    pub heartbeat_timeout: Duration,
    /// Bounded outbound queue depth per connection; snapshots beyond this are
    /// coalesced by dropping the oldest.
    pub outbound_capacity: usize,
    /// Public address clients should open the persistent channel against.
    pub websocket_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_hz: TICK_HZ,
            countdown_secs: 3,
            serve_countdown_secs: 3,
            max_score: MAX_SCORE,
            serve_angle_max_rad: SERVE_ANGLE_MAX_RAD,
            reconnect_grace: Duration::from_secs(30),
            cleanup_delay: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(60),
            outbound_capacity: 32,
            websocket_url: "ws://localhost:8081".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz as f64)
    }

    /// Simulation slice of this configuration.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            tick_hz: self.tick_hz,
            countdown_secs: self.countdown_secs,
            serve_countdown_secs: self.serve_countdown_secs,
            max_score: self.max_score,
            serve_angle_max_rad: self.serve_angle_max_rad,
            rng_seed: None,
        }
    }
}
