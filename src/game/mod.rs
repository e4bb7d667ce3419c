//! Game simulation modules

pub mod lifecycle;
pub mod r#match;
pub mod physics;
pub mod snapshot;

pub use r#match::{MatchCore, MatchKind, MatchOutcome, MatchPhase, MatchRoom, SeatRole};

use std::sync::Arc;

use crate::rooms::Session;
use crate::ws::protocol::PlayerInfo;

/// Room identifier, shared by plain and tournament rooms
pub type RoomId = String;

/// The two ends of the court. The owner defends the left goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Owner,
    Guest,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::Owner => Side::Guest,
            Side::Guest => Side::Owner,
        }
    }
}

/// A participant in a seat: the connection that controls it and the name
/// shown for it. In local mode both seats share one connection.
#[derive(Debug, Clone)]
pub struct Seat {
    pub session: Arc<Session>,
    pub player: PlayerInfo,
}

impl Seat {
    pub fn for_session(session: &Arc<Session>) -> Self {
        Self {
            player: session.player_info(),
            session: session.clone(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.player.id
    }
}
