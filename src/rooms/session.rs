//! Connection sessions: one per authenticated WebSocket

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::RoomId;
use crate::ws::protocol::{PlayerInfo, ServerMsg};

/// Outbound queue depth per connection. Frames beyond it are dropped for that
/// connection; terminal events instead wait for room in the queue.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Identity attached to a connection before it reaches the room layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub nickname: String,
}

/// One live connection and its back-reference to at most one room
pub struct Session {
    pub conn_id: Uuid,
    pub identity: Identity,
    outbound: mpsc::Sender<ServerMsg>,
    room: Mutex<Option<RoomId>>,
}

impl Session {
    pub fn new(identity: Identity, outbound: mpsc::Sender<ServerMsg>) -> Arc<Self> {
        Arc::new(Self {
            conn_id: Uuid::new_v4(),
            identity,
            outbound,
            room: Mutex::new(None),
        })
    }

    /// Queue a message for this connection. Never blocks: a full queue drops
    /// the message for this recipient only, except terminal events, which are
    /// handed to a task that waits for the writer to catch up.
    pub fn send(&self, msg: ServerMsg) {
        match self.outbound.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) if msg.is_terminal() => self.send_later(msg),
            Err(e) => {
                debug!(conn_id = %self.conn_id, user_id = %self.identity.id, error = %e, "Dropped outbound message");
            }
        }
    }

    fn send_later(&self, msg: ServerMsg) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(conn_id = %self.conn_id, "No runtime to deliver terminal event, dropped");
            return;
        };
        let outbound = self.outbound.clone();
        let conn_id = self.conn_id;
        runtime.spawn(async move {
            if outbound.send(msg).await.is_err() {
                debug!(conn_id = %conn_id, "Connection closed before terminal event was delivered");
            }
        });
    }

    pub fn player_info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.identity.id.clone(),
            nickname: self.identity.nickname.clone(),
        }
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.room.lock().clone()
    }

    pub(crate) fn bind_room(&self, room_id: &str) {
        *self.room.lock() = Some(room_id.to_string());
    }

    /// Clear the back-reference if it still points at `room_id`
    pub(crate) fn clear_room_if(&self, room_id: &str) -> bool {
        let mut room = self.room.lock();
        if room.as_deref() == Some(room_id) {
            *room = None;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("conn_id", &self.conn_id)
            .field("identity", &self.identity)
            .field("room", &self.room_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_reference_is_only_cleared_for_matching_room() {
        let (tx, _rx) = mpsc::channel(4);
        let session = Session::new(
            Identity {
                id: "1".into(),
                nickname: "alice".into(),
            },
            tx,
        );
        session.bind_room("ABC123");
        assert!(!session.clear_room_if("XYZ999"));
        assert_eq!(session.room_id().as_deref(), Some("ABC123"));
        assert!(session.clear_room_if("ABC123"));
        assert_eq!(session.room_id(), None);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let session = Session::new(
            Identity {
                id: "1".into(),
                nickname: "alice".into(),
            },
            tx,
        );
        session.send(ServerMsg::RoomError {
            message: "first".into(),
        });
        session.send(ServerMsg::RoomError {
            message: "second".into(),
        });
        assert!(matches!(rx.try_recv(), Ok(ServerMsg::RoomError { message }) if message == "first"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn terminal_event_survives_a_full_queue() {
        let (tx, mut rx) = mpsc::channel(1);
        let session = Session::new(
            Identity {
                id: "1".into(),
                nickname: "alice".into(),
            },
            tx,
        );
        session.send(ServerMsg::RoomError {
            message: "backlog".into(),
        });
        session.send(ServerMsg::GameAborted {
            message: "Game has been aborted".into(),
        });
        session.send(ServerMsg::RoomError {
            message: "dropped".into(),
        });

        assert!(matches!(rx.recv().await, Some(ServerMsg::RoomError { message }) if message == "backlog"));
        assert!(matches!(rx.recv().await, Some(ServerMsg::GameAborted { .. })));
        assert!(rx.try_recv().is_err());
    }
}
