//! Snapshot building for network transmission

use crate::ws::protocol::{FinalScore, ServerMsg, StateSnapshot};

use super::{MatchCore, Seat};

/// Builds the outbound views of a match
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn state(core: &MatchCore) -> StateSnapshot {
        StateSnapshot {
            ball_x: core.ball.x,
            ball_y: core.ball.y,
            ball_vx: core.ball.vx,
            ball_vy: core.ball.vy,
            paddle1_y: core.owner.paddle_y,
            paddle2_y: core.guest.paddle_y,
            owner_score: core.owner.score,
            guest_score: core.guest.score,
        }
    }

    pub fn final_score(core: &MatchCore) -> FinalScore {
        FinalScore {
            owner: core.owner.score,
            guest: core.guest.score,
        }
    }

    /// `game_start` tailored to one recipient
    pub fn game_start(
        room_id: &str,
        owner: &Seat,
        guest: &Seat,
        state: StateSnapshot,
        is_owner: bool,
    ) -> ServerMsg {
        ServerMsg::GameStart {
            room_id: room_id.to_string(),
            message: "Game is starting".to_string(),
            owner: owner.player.clone(),
            guest: guest.player.clone(),
            state,
            is_owner,
        }
    }
}
