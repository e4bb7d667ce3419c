//! Room registry: the only place rooms are created or destroyed

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::{lifecycle, MatchKind, MatchPhase, MatchRoom, RoomId, Seat};
use crate::tournament::{self, TournamentRoom};
use crate::upstream::ai::OpponentLauncher;
use crate::upstream::history::MatchHistory;
use crate::util::time::MatchTimings;
use crate::ws::protocol::{PlayerInfo, ServerMsg};

use super::{RoomError, Session};

const ROOM_ID_LEN: usize = 6;
const ROOM_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TOURNAMENT_PREFIX: &str = "T";

const LOCAL_OWNER_NAME: &str = "Player1";
const LOCAL_GUEST_NAME: &str = "Player2";
const LOCAL_GUEST_ID: &str = "local-guest";

/// A registry entry: a plain match room or a tournament
#[derive(Clone)]
pub enum RoomEntry {
    Plain(Arc<MatchRoom>),
    Tournament(Arc<TournamentRoom>),
}

impl RoomEntry {
    /// The match currently addressable under this entry's id
    pub fn live_match(&self) -> Option<Arc<MatchRoom>> {
        match self {
            RoomEntry::Plain(room) => Some(room.clone()),
            RoomEntry::Tournament(t) => t.live_match(),
        }
    }
}

/// Counters reported by the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub rooms: usize,
    pub tournaments: usize,
    pub live_matches: usize,
    pub connected_players: usize,
}

/// Process-wide room table, constructed once and injected
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomEntry>,
    /// user id -> room holding that user's seat or pool slot
    members: DashMap<String, RoomId>,
    sessions: DashMap<Uuid, Arc<Session>>,
    history: Arc<dyn MatchHistory>,
    opponent: Option<Arc<dyn OpponentLauncher>>,
    timings: MatchTimings,
    history_retry_limit: u32,
}

impl RoomRegistry {
    pub fn new(
        history: Arc<dyn MatchHistory>,
        opponent: Option<Arc<dyn OpponentLauncher>>,
        timings: MatchTimings,
        history_retry_limit: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            members: DashMap::new(),
            sessions: DashMap::new(),
            history,
            opponent,
            timings,
            history_retry_limit,
        })
    }

    pub fn timings(&self) -> MatchTimings {
        self.timings
    }

    pub fn history(&self) -> Arc<dyn MatchHistory> {
        self.history.clone()
    }

    pub fn history_retry_limit(&self) -> u32 {
        self.history_retry_limit
    }

    pub fn get(&self, room_id: &str) -> Option<RoomEntry> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    /// Match addressable under `room_id`, plain or tournament
    pub fn live_match(&self, room_id: &str) -> Option<Arc<MatchRoom>> {
        // Guard dropped before the tournament lock is taken
        let entry = self.get(room_id)?;
        entry.live_match()
    }

    pub fn delete(&self, room_id: &str) -> bool {
        let removed = self.rooms.remove(room_id).is_some();
        if removed {
            info!(room_id = %room_id, "Room deleted");
        }
        removed
    }

    pub fn room_of(&self, user_id: &str) -> Option<RoomId> {
        self.members.get(user_id).map(|r| r.value().clone())
    }

    pub fn stats(&self) -> RegistryStats {
        let entries: Vec<RoomEntry> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut stats = RegistryStats {
            connected_players: self.sessions.len(),
            ..Default::default()
        };
        for entry in entries {
            match &entry {
                RoomEntry::Plain(_) => stats.rooms += 1,
                RoomEntry::Tournament(_) => stats.tournaments += 1,
            }
            if entry.live_match().is_some_and(|room| {
                matches!(room.phase(), MatchPhase::Starting | MatchPhase::Simulating)
            }) {
                stats.live_matches += 1;
            }
        }
        stats
    }

    /// Create a plain room owned by `session`
    pub fn create_room(
        self: &Arc<Self>,
        session: &Arc<Session>,
        kind: MatchKind,
    ) -> Result<RoomId, RoomError> {
        if self.members.contains_key(&session.identity.id) {
            return Err(RoomError::AlreadyInRoom);
        }
        let launcher = match kind {
            MatchKind::Bot => Some(self.opponent.clone().ok_or(RoomError::OpponentUnavailable)?),
            _ => None,
        };

        let mut owner = Seat::for_session(session);
        if kind == MatchKind::Local {
            owner.player.nickname = LOCAL_OWNER_NAME.to_string();
        }
        let seed = rand::thread_rng().gen();
        let room = self.insert_unique(
            "",
            |id| MatchRoom::new(id, kind, owner, seed),
            RoomEntry::Plain,
        );

        if let Err(e) = self.reserve_member(session, &room.id) {
            self.delete(&room.id);
            return Err(e);
        }

        info!(room_id = %room.id, user_id = %session.identity.id, kind = ?kind, "Room created");
        session.send(ServerMsg::RoomCreated {
            room_id: room.id.clone(),
        });

        match kind {
            MatchKind::Local => {
                let guest = Seat {
                    session: session.clone(),
                    player: PlayerInfo {
                        id: LOCAL_GUEST_ID.to_string(),
                        nickname: LOCAL_GUEST_NAME.to_string(),
                    },
                };
                room.seat_guest(guest)?;
                lifecycle::begin_match(self, &room);
            }
            MatchKind::Bot => {
                if let Some(launcher) = launcher {
                    self.launch_opponent(launcher, &room);
                }
            }
            MatchKind::Remote | MatchKind::Tournament => {}
        }

        Ok(room.id.clone())
    }

    fn launch_opponent(self: &Arc<Self>, launcher: Arc<dyn OpponentLauncher>, room: &Arc<MatchRoom>) {
        let registry = self.clone();
        let room = room.clone();
        tokio::spawn(async move {
            if let Err(e) = launcher.launch(room.id.clone()).await {
                warn!(room_id = %room.id, error = %e, "AI opponent failed to start");
                if let Some(owner) = room.owner() {
                    owner.session.send(ServerMsg::CreateError {
                        message: "Failed to start AI opponent".to_string(),
                    });
                }
                lifecycle::abort_match(&registry, &room);
            }
        });
    }

    /// Take the guest seat of `room_id` and start the match
    pub fn join_room(self: &Arc<Self>, session: &Arc<Session>, room_id: &str) -> Result<(), RoomError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(RoomError::InvalidRoomId);
        }
        if self.members.contains_key(&session.identity.id) {
            return Err(RoomError::AlreadyInRoom);
        }
        let room = match self.get(room_id) {
            Some(RoomEntry::Plain(room)) => room,
            _ => return Err(RoomError::NotFound),
        };

        self.reserve_member(session, &room.id)?;
        let guest = Seat::for_session(session);
        if let Err(e) = room.seat_guest(guest) {
            self.release_member(session, &room.id);
            return Err(e);
        }

        info!(room_id = %room.id, user_id = %session.identity.id, "Player joined room");
        room.broadcast(&ServerMsg::JoinedRoom {
            room_id: room.id.clone(),
            message: format!("{} joined the room", session.identity.nickname),
        });
        lifecycle::begin_match(self, &room);
        Ok(())
    }

    /// Leave the caller's current room; a live match is aborted
    pub fn leave_room(self: &Arc<Self>, session: &Arc<Session>) -> Result<(), RoomError> {
        let room_id = session.room_id().ok_or(RoomError::NotInRoom)?;
        match self.get(&room_id) {
            Some(RoomEntry::Plain(room)) => {
                info!(room_id = %room_id, user_id = %session.identity.id, "Player left room");
                lifecycle::abort_match(self, &room);
                Ok(())
            }
            Some(RoomEntry::Tournament(t)) => {
                tournament::leave(self, &t, session);
                Ok(())
            }
            None => {
                self.release_member(session, &room_id);
                Err(RoomError::NotFound)
            }
        }
    }

    /// Drop a finished or aborted plain room and every back-reference to it.
    /// Returns true for the call that removed the entry.
    pub(crate) fn release_match(&self, room: &Arc<MatchRoom>) -> bool {
        let removed = self
            .rooms
            .remove_if(&room.id, |_, entry| {
                matches!(entry, RoomEntry::Plain(r) if Arc::ptr_eq(r, room))
            })
            .is_some();
        for seat in room.seats() {
            self.release_member(&seat.session, &room.id);
        }
        if removed {
            info!(room_id = %room.id, "Room deleted");
        }
        removed
    }

    pub(crate) fn release_tournament(&self, t: &Arc<TournamentRoom>) -> bool {
        let removed = self
            .rooms
            .remove_if(&t.id, |_, entry| {
                matches!(entry, RoomEntry::Tournament(r) if Arc::ptr_eq(r, t))
            })
            .is_some();
        if removed {
            info!(room_id = %t.id, "Tournament deleted");
        }
        removed
    }

    /// Insert a new entry under a fresh collision-checked identifier
    pub(crate) fn insert_unique<T: Clone>(
        &self,
        prefix: &str,
        make: impl FnOnce(RoomId) -> T,
        wrap: impl FnOnce(T) -> RoomEntry,
    ) -> T {
        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (0..ROOM_ID_LEN)
                .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
                .collect();
            let id = format!("{prefix}{suffix}");
            if let Entry::Vacant(slot) = self.rooms.entry(id.clone()) {
                let value = make(id);
                slot.insert(wrap(value.clone()));
                return value;
            }
            debug!(room_id = %id, "Room id collision, retrying");
        }
    }

    pub(crate) fn tournament_prefix() -> &'static str {
        TOURNAMENT_PREFIX
    }

    /// Claim the membership slot for the session's identity
    pub(crate) fn reserve_member(&self, session: &Session, room_id: &str) -> Result<(), RoomError> {
        match self.members.entry(session.identity.id.clone()) {
            Entry::Occupied(_) => Err(RoomError::AlreadyInRoom),
            Entry::Vacant(slot) => {
                slot.insert(room_id.to_string());
                session.bind_room(room_id);
                Ok(())
            }
        }
    }

    pub(crate) fn release_member(&self, session: &Session, room_id: &str) {
        self.members
            .remove_if(&session.identity.id, |_, held| held == room_id);
        session.clear_room_if(room_id);
    }

    /// Register a new connection, taking over a waiting seat held by the
    /// same identity
    pub fn attach_session(&self, session: &Arc<Session>) {
        self.sessions.insert(session.conn_id, session.clone());

        let Some(room_id) = self.room_of(&session.identity.id) else {
            return;
        };
        let replaced = match self.get(&room_id) {
            Some(RoomEntry::Plain(room)) => room.rebind_owner(session),
            Some(RoomEntry::Tournament(t)) => t.rebind(session),
            None => None,
        };
        if let Some(old) = replaced {
            old.clear_room_if(&room_id);
            session.bind_room(&room_id);
            info!(
                room_id = %room_id,
                user_id = %session.identity.id,
                old_conn = %old.conn_id,
                conn_id = %session.conn_id,
                "Connection rebound to waiting seat"
            );
        }
    }

    /// Connection closed: same as an explicit leave
    pub fn detach_session(self: &Arc<Self>, session: &Arc<Session>) {
        self.sessions.remove(&session.conn_id);
        if session.room_id().is_some() {
            let _ = self.leave_room(session);
        }
    }
}
