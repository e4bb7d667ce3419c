//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

/// Requested paddle direction, applied by the next simulation tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveIntent {
    Up,
    Down,
    #[default]
    None,
}

impl MoveIntent {
    pub(crate) fn to_bits(self) -> u8 {
        match self {
            MoveIntent::None => 0,
            MoveIntent::Up => 1,
            MoveIntent::Down => 2,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => MoveIntent::Up,
            2 => MoveIntent::Down,
            _ => MoveIntent::None,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Create a match room
    CreateRoom {
        /// Play against the AI opponent
        #[serde(default)]
        is_single_player: bool,
        /// Wait for a second connection instead of sharing this one
        #[serde(default)]
        is_remote: bool,
    },

    /// Take the guest seat of an existing room
    JoinRoom {
        #[serde(default)]
        room_id: String,
    },

    /// Leave the current room (aborts a live match)
    LeaveRoom,

    /// Paddle input. `moveP2` drives the second paddle in local mode.
    PaddleMove {
        #[serde(default)]
        move_p1: MoveIntent,
        #[serde(default)]
        move_p2: MoveIntent,
    },

    /// Pause or resume the current match
    GamePause { paused: bool },

    CreateTournamentRoom,

    JoinTournamentRoom {
        #[serde(default)]
        room_id: String,
    },

    StartTournament {
        #[serde(default)]
        room_id: Option<String>,
    },

    LeaveTournament {
        #[serde(default)]
        room_id: Option<String>,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    RoomCreated {
        room_id: String,
    },

    CreateError {
        message: String,
    },

    JoinedRoom {
        room_id: String,
        message: String,
    },

    JoinError {
        message: String,
    },

    /// Protocol error not tied to create/join
    RoomError {
        message: String,
    },

    /// Match is starting, sent per recipient
    GameStart {
        room_id: String,
        message: String,
        owner: PlayerInfo,
        guest: PlayerInfo,
        #[serde(flatten)]
        state: StateSnapshot,
        is_owner: bool,
    },

    /// Authoritative state, sent every tick and on every point
    GameState(StateSnapshot),

    GamePauseState {
        is_paused: bool,
    },

    GameOver {
        /// Winner's display name
        winner: String,
        final_score: FinalScore,
        message: String,
    },

    GameAborted {
        message: String,
    },

    TournamentRoomCreated {
        room_id: String,
        players: Vec<PlayerInfo>,
        owner: String,
    },

    JoinedTournamentRoom {
        room_id: String,
        message: String,
        players: Vec<PlayerInfo>,
        total_players: usize,
    },

    TournamentPlayerJoined {
        room_id: String,
        message: String,
        players: Vec<PlayerInfo>,
        total_players: usize,
    },

    TournamentPlayersUpdated {
        players: Vec<PlayerInfo>,
        player_count: usize,
    },

    TournamentStarted {
        room_id: String,
        players: Vec<PlayerInfo>,
    },

    TournamentMatchStart {
        room_id: String,
        match_number: u32,
        owner: PlayerInfo,
        guest: PlayerInfo,
        message: String,
    },

    TournamentMatchEnd {
        /// Winner's user id
        winner: String,
        winner_name: String,
        /// Loser's user id
        loser: String,
        loser_name: String,
        message: String,
    },

    TournamentWinner {
        /// Champion's user id
        winner: String,
        message: String,
    },
}

impl ServerMsg {
    /// Events that end a match or tournament for the recipient
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerMsg::GameOver { .. } | ServerMsg::GameAborted { .. } | ServerMsg::TournamentWinner { .. }
        )
    }
}

/// Public identity of a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub nickname: String,
}

/// Ball, paddle and score state as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub ball_x: f32,
    pub ball_y: f32,
    #[serde(rename = "ballVX")]
    pub ball_vx: f32,
    #[serde(rename = "ballVY")]
    pub ball_vy: f32,
    pub paddle1_y: f32,
    pub paddle2_y: f32,
    pub owner_score: u32,
    pub guest_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub owner: u32,
    pub guest: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paddle_move_uses_client_field_names() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"paddle_move","moveP1":"up","moveP2":"none"}"#)
                .unwrap();
        match msg {
            ClientMsg::PaddleMove { move_p1, move_p2 } => {
                assert_eq!(move_p1, MoveIntent::Up);
                assert_eq!(move_p2, MoveIntent::None);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn create_room_flags_default_to_false() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"create_room","isRemote":true}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMsg::CreateRoom {
                is_single_player: false,
                is_remote: true
            }
        ));
    }

    #[test]
    fn game_state_is_flat_with_upper_case_velocity_keys() {
        let snapshot = StateSnapshot {
            ball_x: 400.0,
            ball_y: 300.0,
            ball_vx: 5.0,
            ball_vy: -3.0,
            paddle1_y: 250.0,
            paddle2_y: 250.0,
            owner_score: 2,
            guest_score: 1,
        };
        let json = serde_json::to_value(ServerMsg::GameState(snapshot)).unwrap();
        assert_eq!(json["type"], "game_state");
        assert_eq!(json["ballVX"], 5.0);
        assert_eq!(json["ballVY"], -3.0);
        assert_eq!(json["paddle1Y"], 250.0);
        assert_eq!(json["ownerScore"], 2);
    }

    #[test]
    fn game_start_carries_recipient_flag_and_state() {
        let msg = ServerMsg::GameStart {
            room_id: "ABC123".into(),
            message: "Game is starting".into(),
            owner: PlayerInfo {
                id: "1".into(),
                nickname: "alice".into(),
            },
            guest: PlayerInfo {
                id: "2".into(),
                nickname: "bob".into(),
            },
            state: StateSnapshot {
                ball_x: 400.0,
                ball_y: 300.0,
                ball_vx: 5.0,
                ball_vy: 3.0,
                paddle1_y: 250.0,
                paddle2_y: 250.0,
                owner_score: 0,
                guest_score: 0,
            },
            is_owner: true,
        };
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["type"], "game_start");
        assert_eq!(json["roomId"], "ABC123");
        assert_eq!(json["isOwner"], true);
        assert_eq!(json["owner"]["nickname"], "alice");
        assert_eq!(json["ballX"], 400.0);
    }
}
