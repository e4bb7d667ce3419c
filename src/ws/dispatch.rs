//! Inbound event dispatch. Handlers only do cheap synchronous updates.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::game::{MatchKind, SeatRole, Side};
use crate::rooms::{ReplyKind, RoomError, RoomRegistry, Session};
use crate::tournament;

use super::protocol::{ClientMsg, MoveIntent};

/// Apply one client message to room state
pub fn dispatch(registry: &Arc<RoomRegistry>, session: &Arc<Session>, msg: ClientMsg) {
    let (kind, result) = match msg {
        ClientMsg::CreateRoom {
            is_single_player,
            is_remote,
        } => {
            let kind = if is_single_player {
                MatchKind::Bot
            } else if is_remote {
                MatchKind::Remote
            } else {
                MatchKind::Local
            };
            (ReplyKind::Create, registry.create_room(session, kind).map(drop))
        }
        ClientMsg::JoinRoom { room_id } => (ReplyKind::Join, registry.join_room(session, &room_id)),
        ClientMsg::LeaveRoom => (ReplyKind::Room, registry.leave_room(session)),
        ClientMsg::PaddleMove { move_p1, move_p2 } => {
            paddle_move(registry, session, move_p1, move_p2);
            return;
        }
        ClientMsg::GamePause { paused } => (ReplyKind::Room, game_pause(registry, session, paused)),
        ClientMsg::CreateTournamentRoom => (
            ReplyKind::Create,
            tournament::create(registry, session).map(drop),
        ),
        ClientMsg::JoinTournamentRoom { room_id } => (
            ReplyKind::Join,
            tournament::join(registry, session, &room_id),
        ),
        ClientMsg::StartTournament { room_id } => (
            ReplyKind::Room,
            tournament::start(registry, session, room_id.as_deref()),
        ),
        ClientMsg::LeaveTournament { room_id } => (
            ReplyKind::Room,
            tournament::leave_by_id(registry, session, room_id.as_deref()),
        ),
    };

    if let Err(e) = result {
        debug!(conn_id = %session.conn_id, user_id = %session.identity.id, error = %e, "Request rejected");
        session.send(e.reply(kind));
    }
}

/// Connection closed
pub fn on_disconnect(registry: &Arc<RoomRegistry>, session: &Arc<Session>) {
    registry.detach_session(session);
}

fn paddle_move(registry: &RoomRegistry, session: &Session, move_p1: MoveIntent, move_p2: MoveIntent) {
    let Some(room_id) = session.room_id() else {
        debug!(conn_id = %session.conn_id, "paddle_move without a room");
        return;
    };
    let Some(room) = registry.live_match(&room_id) else {
        debug!(room_id = %room_id, "paddle_move for a room with no match");
        return;
    };

    match room.role_of(session.conn_id) {
        Some(SeatRole::Both) => {
            room.set_intent(Side::Owner, move_p1);
            room.set_intent(Side::Guest, move_p2);
        }
        Some(SeatRole::Owner) => room.set_intent(Side::Owner, single_paddle(move_p1, move_p2)),
        Some(SeatRole::Guest) => room.set_intent(Side::Guest, single_paddle(move_p1, move_p2)),
        None => warn!(room_id = %room_id, conn_id = %session.conn_id, "paddle_move from a connection without a seat"),
    }
}

/// A one-paddle client may drive its paddle through either field
fn single_paddle(move_p1: MoveIntent, move_p2: MoveIntent) -> MoveIntent {
    if move_p1 != MoveIntent::None {
        move_p1
    } else {
        move_p2
    }
}

fn game_pause(registry: &RoomRegistry, session: &Session, paused: bool) -> Result<(), RoomError> {
    let room_id = session.room_id().ok_or(RoomError::NotInRoom)?;
    let room = registry.live_match(&room_id).ok_or(RoomError::NoLiveMatch)?;
    room.role_of(session.conn_id).ok_or(RoomError::NoLiveMatch)?;
    room.set_paused(paused)
}
