//! Time utilities for game simulation

use std::time::{Duration, Instant};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 ticks per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Velocities are expressed per reference tick, positions advance by
/// `velocity * dt * REFERENCE_TPS`.
pub const REFERENCE_TPS: f32 = 60.0;

/// Wall-clock interval of one simulation tick
pub fn tick_interval() -> Duration {
    Duration::from_micros(TICK_DURATION_MICROS)
}

/// Delays between the lifecycle phases of a match
#[derive(Debug, Clone, Copy)]
pub struct MatchTimings {
    /// Pause between `game_start` and the first tick
    pub start_grace: Duration,
    /// Pause between `game_over` and room teardown
    pub teardown_delay: Duration,
    /// Pause between two tournament matches
    pub tournament_pause: Duration,
}

impl Default for MatchTimings {
    fn default() -> Self {
        Self {
            start_grace: Duration::from_secs(3),
            teardown_delay: Duration::from_secs(5),
            tournament_pause: Duration::from_secs(2),
        }
    }
}
