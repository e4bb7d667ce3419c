//! Room-layer errors. `Display` strings are the messages players see.

use crate::ws::protocol::ServerMsg;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("You are already in a room")]
    AlreadyInRoom,

    #[error("You are not in a room")]
    NotInRoom,

    #[error("Invalid room ID")]
    InvalidRoomId,

    #[error("Room not found")]
    NotFound,

    #[error("Room is already full")]
    Full,

    #[error("You are not allowed to play against yourself")]
    SelfJoin,

    #[error("No match is running in this room")]
    NoLiveMatch,

    #[error("Single-player mode is currently unavailable")]
    OpponentUnavailable,

    #[error("Tournament not found")]
    TournamentNotFound,

    #[error("Tournament is full")]
    TournamentFull,

    #[error("Tournament has already started")]
    TournamentStarted,

    #[error("Only the tournament owner can start the tournament")]
    NotTournamentOwner,

    #[error("At least {0} players are required to start the tournament")]
    NotEnoughPlayers(usize),
}

/// Which request a failure answers; selects the reply event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Create,
    Join,
    Room,
}

impl RoomError {
    pub fn reply(&self, kind: ReplyKind) -> ServerMsg {
        let message = self.to_string();
        match kind {
            ReplyKind::Create => ServerMsg::CreateError { message },
            ReplyKind::Join => ServerMsg::JoinError { message },
            ReplyKind::Room => ServerMsg::RoomError { message },
        }
    }
}
