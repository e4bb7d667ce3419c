//! Match lifecycle: Forming -> Starting -> Simulating -> Ending -> TornDown

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::rooms::{RoomEntry, RoomRegistry};
use crate::tournament;
use crate::upstream::history::{spawn_record, MatchRecord};
use crate::ws::protocol::ServerMsg;

use super::snapshot::SnapshotBuilder;
use super::{MatchKind, MatchOutcome, MatchRoom};

/// Send `game_start` to both occupants and arm the start grace timer.
/// Returns false when the room was not waiting to start.
pub fn begin_match(registry: &Arc<RoomRegistry>, room: &Arc<MatchRoom>) -> bool {
    let Some(start) = room.enter_starting() else {
        return false;
    };

    // Local mode: one connection sees itself as owner
    start.owner.session.send(SnapshotBuilder::game_start(
        &room.id,
        &start.owner,
        &start.guest,
        start.state.clone(),
        true,
    ));
    if start.guest.session.conn_id != start.owner.session.conn_id {
        start.guest.session.send(SnapshotBuilder::game_start(
            &room.id,
            &start.owner,
            &start.guest,
            start.state,
            false,
        ));
    }

    info!(
        room_id = %room.id,
        kind = ?room.kind,
        owner = %start.owner.user_id(),
        guest = %start.guest.user_id(),
        "Match starting"
    );

    let grace = registry.timings().start_grace;
    let registry = registry.clone();
    let room = room.clone();
    tokio::spawn(async move {
        sleep(grace).await;

        let attached = registry
            .live_match(&room.id)
            .is_some_and(|live| Arc::ptr_eq(&live, &room));
        if !attached {
            debug!(room_id = %room.id, "Room gone before start grace elapsed");
            return;
        }
        if room.enter_simulating() {
            room.start_simulation(&registry);
        }
    });

    true
}

/// Normal end: notify, persist, then tear down after the result delay.
/// Tournament matches hand the result on to their bracket.
pub fn finish_match(registry: &Arc<RoomRegistry>, room: &Arc<MatchRoom>, outcome: MatchOutcome) {
    let parent = match room.kind {
        MatchKind::Tournament => match registry.get(&room.id) {
            Some(RoomEntry::Tournament(t)) => Some(t),
            _ => {
                abort_match(registry, room);
                return;
            }
        },
        _ => None,
    };

    let winner = outcome.winner_seat().player.nickname.clone();
    room.broadcast(&ServerMsg::GameOver {
        winner: winner.clone(),
        final_score: outcome.final_score,
        message: format!("Game over! {winner} wins!"),
    });

    if let Some(t) = parent {
        tournament::on_match_finished(registry, &t, room, outcome);
        return;
    }

    if room.kind.persists_result() {
        spawn_record(
            registry.history(),
            MatchRecord::from(&outcome),
            registry.history_retry_limit(),
        );
    }

    schedule_teardown(registry, room);
}

fn schedule_teardown(registry: &Arc<RoomRegistry>, room: &Arc<MatchRoom>) {
    let delay = registry.timings().teardown_delay;
    let registry = registry.clone();
    let room = room.clone();
    tokio::spawn(async move {
        sleep(delay).await;
        teardown(&registry, &room);
    });
}

/// Ending -> TornDown: clear back-references and drop the registry entry
pub fn teardown(registry: &RoomRegistry, room: &Arc<MatchRoom>) {
    if room.begin_teardown() {
        registry.release_match(room);
        info!(room_id = %room.id, "Match torn down");
    }
}

/// Abnormal end. Only the first call has any effect.
pub fn abort_match(registry: &Arc<RoomRegistry>, room: &Arc<MatchRoom>) {
    let Some(was_live) = room.begin_abort() else {
        return;
    };

    if was_live {
        room.broadcast(&ServerMsg::GameAborted {
            message: "Game has been aborted".to_string(),
        });
    }
    info!(room_id = %room.id, was_live, "Match aborted");

    if room.kind == MatchKind::Tournament {
        if let Some(RoomEntry::Tournament(t)) = registry.get(&room.id) {
            tournament::on_match_aborted(registry, &t, room);
        }
        return;
    }

    registry.release_match(room);
}
