//! Helpers shared by the room, tournament and dispatch tests

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::game::physics::{Ball, FIELD_WIDTH};
use crate::game::{MatchRoom, Side};
use crate::upstream::ai::StubLauncher;
use crate::upstream::history::RecordingHistory;
use crate::util::time::MatchTimings;
use crate::ws::protocol::ServerMsg;

use super::{Identity, RoomRegistry, Session};

/// Roomy enough for a whole match of `game_state` frames
const TEST_OUTBOUND_CAPACITY: usize = 1 << 16;

pub fn session(id: &str, nickname: &str) -> (Arc<Session>, mpsc::Receiver<ServerMsg>) {
    let (tx, rx) = mpsc::channel(TEST_OUTBOUND_CAPACITY);
    let session = Session::new(
        Identity {
            id: id.to_string(),
            nickname: nickname.to_string(),
        },
        tx,
    );
    (session, rx)
}

pub fn registry() -> (Arc<RoomRegistry>, Arc<RecordingHistory>) {
    let history = Arc::new(RecordingHistory::default());
    let registry = RoomRegistry::new(history.clone(), None, MatchTimings::default(), 1);
    (registry, history)
}

pub fn registry_with_opponent(launch_ok: bool) -> (Arc<RoomRegistry>, Arc<StubLauncher>) {
    let launcher = Arc::new(StubLauncher::new(launch_ok));
    let registry = RoomRegistry::new(
        Arc::new(RecordingHistory::default()),
        Some(launcher.clone()),
        MatchTimings::default(),
        1,
    );
    (registry, launcher)
}

/// Everything queued for a session so far
pub fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

/// Let spawned tasks and timers run for `ms` of paused virtual time
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn count<F: Fn(&ServerMsg) -> bool>(events: &[ServerMsg], pred: F) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

/// Set the scores and put the ball one tick away from `scorer`'s goal
pub fn force_point(room: &MatchRoom, scorer: Side, owner_score: u32, guest_score: u32) {
    room.with_core(|core| {
        core.owner.score = owner_score;
        core.guest.score = guest_score;
        core.ball = match scorer {
            Side::Owner => Ball {
                x: FIELD_WIDTH - 2.0,
                y: 100.0,
                vx: 5.0,
                vy: 0.0,
            },
            Side::Guest => Ball {
                x: 2.0,
                y: 100.0,
                vx: -5.0,
                vy: 0.0,
            },
        };
    })
    .expect("match has no state");
}
