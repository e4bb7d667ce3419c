//! Tournament rooms: enrollment, then back-to-back matches under one id

use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::game::{lifecycle, MatchKind, MatchOutcome, MatchRoom, RoomId, Seat};
use crate::rooms::{RoomEntry, RoomError, RoomRegistry, Session};
use crate::upstream::history::{spawn_record, MatchRecord};
use crate::ws::protocol::{PlayerInfo, ServerMsg};

use super::bracket::{Bracket, Pairing, MIN_ENTRANTS};

const ABORTED_MESSAGE: &str = "Tournament aborted - not enough players remaining";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TournamentPhase {
    Enrolling,
    Running,
    Finished,
}

struct TournamentInner {
    phase: TournamentPhase,
    owner_id: String,
    bracket: Bracket<Seat>,
    /// Everyone enrolled who has not left; receives tournament events
    roster: Vec<Seat>,
    /// Match currently addressable under the tournament id
    live: Option<Arc<MatchRoom>>,
}

/// A tournament and, while a match is running, that match's room
pub struct TournamentRoom {
    pub id: RoomId,
    inner: Mutex<TournamentInner>,
}

enum Next {
    Match(Arc<MatchRoom>, Pairing<Seat>),
    Champion(Seat),
    Stalled,
    Idle,
}

enum Departure {
    Enrolling { remaining: usize },
    Waiting,
    InPlay(Arc<MatchRoom>),
}

impl TournamentRoom {
    fn new(id: RoomId, owner: Seat) -> Arc<Self> {
        let mut bracket = Bracket::default();
        // A fresh bracket always has room for its creator
        let _ = bracket.enroll(owner.clone());
        Arc::new(Self {
            id,
            inner: Mutex::new(TournamentInner {
                phase: TournamentPhase::Enrolling,
                owner_id: owner.user_id().to_string(),
                bracket,
                roster: vec![owner],
                live: None,
            }),
        })
    }

    #[cfg(test)]
    fn owner_id(&self) -> String {
        self.inner.lock().owner_id.clone()
    }

    pub fn live_match(&self) -> Option<Arc<MatchRoom>> {
        self.inner.lock().live.clone()
    }

    pub fn players(&self) -> Vec<PlayerInfo> {
        self.inner
            .lock()
            .roster
            .iter()
            .map(|seat| seat.player.clone())
            .collect()
    }

    pub fn eliminated(&self) -> Vec<String> {
        self.inner
            .lock()
            .bracket
            .eliminated()
            .iter()
            .map(|seat| seat.user_id().to_string())
            .collect()
    }

    pub fn broadcast(&self, msg: &ServerMsg) {
        let sessions: Vec<Arc<Session>> = self
            .inner
            .lock()
            .roster
            .iter()
            .map(|seat| seat.session.clone())
            .collect();
        for session in sessions {
            session.send(msg.clone());
        }
    }

    fn enroll(&self, seat: Seat) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if inner.phase != TournamentPhase::Enrolling {
            return Err(RoomError::TournamentStarted);
        }
        inner.bracket.enroll(seat.clone())?;
        inner.roster.push(seat);
        Ok(())
    }

    /// Point a waiting enrollment at a new connection of the same identity
    pub(crate) fn rebind(&self, session: &Arc<Session>) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock();
        if inner.phase != TournamentPhase::Enrolling {
            return None;
        }
        let seat = Seat::for_session(session);
        let old = inner.bracket.replace(seat.clone())?;
        if let Some(slot) = inner
            .roster
            .iter_mut()
            .find(|s| s.user_id() == seat.user_id())
        {
            *slot = seat;
        }
        Some(old.session)
    }

    fn begin(&self, user_id: &str) -> Result<Vec<PlayerInfo>, RoomError> {
        let mut inner = self.inner.lock();
        if inner.owner_id != user_id {
            return Err(RoomError::NotTournamentOwner);
        }
        if inner.phase != TournamentPhase::Enrolling {
            return Err(RoomError::TournamentStarted);
        }
        if inner.roster.len() < MIN_ENTRANTS {
            return Err(RoomError::NotEnoughPlayers(MIN_ENTRANTS));
        }
        inner.phase = TournamentPhase::Running;
        Ok(inner.roster.iter().map(|s| s.player.clone()).collect())
    }

    /// Pick the next pairing and build its room, or settle the tournament
    fn advance(&self) -> Next {
        let mut inner = self.inner.lock();
        if inner.phase != TournamentPhase::Running || inner.live.is_some() {
            return Next::Idle;
        }
        if let Some(pairing) = inner.bracket.next_pairing() {
            let seed = rand::thread_rng().gen();
            let room = MatchRoom::new(
                self.id.clone(),
                MatchKind::Tournament,
                pairing.owner.clone(),
                seed,
            );
            if let Err(e) = room.seat_guest(pairing.guest.clone()) {
                warn!(room_id = %self.id, error = %e, "Could not seat tournament pairing");
                inner.bracket.abandon_in_play();
                inner.phase = TournamentPhase::Finished;
                return Next::Stalled;
            }
            inner.live = Some(room.clone());
            return Next::Match(room, pairing);
        }
        inner.phase = TournamentPhase::Finished;
        match inner.bracket.champion() {
            Some(champion) => Next::Champion(champion.clone()),
            None => Next::Stalled,
        }
    }

    /// Close the live match with a result. `None` for a stale room.
    fn settle(&self, room: &Arc<MatchRoom>, winner_id: &str) -> Option<(Seat, Seat)> {
        let mut inner = self.inner.lock();
        if !inner.live.as_ref().is_some_and(|live| Arc::ptr_eq(live, room)) {
            return None;
        }
        inner.live = None;
        inner.bracket.record_result(winner_id)
    }

    /// Drop the live match without a result. False for a stale room.
    fn abandon(&self, room: &Arc<MatchRoom>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.live.as_ref().is_some_and(|live| Arc::ptr_eq(live, room)) {
            return false;
        }
        inner.live = None;
        inner.bracket.abandon_in_play();
        true
    }

    fn depart(&self, user_id: &str) -> Option<Departure> {
        let mut inner = self.inner.lock();
        let position = inner.roster.iter().position(|s| s.user_id() == user_id)?;

        if inner.phase == TournamentPhase::Running && inner.bracket.is_in_play(user_id) {
            return inner.live.clone().map(Departure::InPlay);
        }

        inner.roster.remove(position);
        inner.bracket.withdraw(user_id);
        if inner.phase != TournamentPhase::Enrolling {
            return Some(Departure::Waiting);
        }
        if inner.owner_id == user_id {
            if let Some(next) = inner.roster.first() {
                inner.owner_id = next.user_id().to_string();
            }
        }
        Some(Departure::Enrolling {
            remaining: inner.roster.len(),
        })
    }

    fn close(&self) -> Vec<Seat> {
        let mut inner = self.inner.lock();
        inner.phase = TournamentPhase::Finished;
        inner.live = None;
        std::mem::take(&mut inner.roster)
    }

    fn players_updated(&self) -> ServerMsg {
        let players = self.players();
        ServerMsg::TournamentPlayersUpdated {
            player_count: players.len(),
            players,
        }
    }
}

/// `create_tournament_room`: the creator is the first entrant and the owner
pub fn create(registry: &Arc<RoomRegistry>, session: &Arc<Session>) -> Result<RoomId, RoomError> {
    if registry.room_of(&session.identity.id).is_some() {
        return Err(RoomError::AlreadyInRoom);
    }
    let owner = Seat::for_session(session);
    let t = registry.insert_unique(
        RoomRegistry::tournament_prefix(),
        |id| TournamentRoom::new(id, owner),
        RoomEntry::Tournament,
    );
    if let Err(e) = registry.reserve_member(session, &t.id) {
        registry.release_tournament(&t);
        return Err(e);
    }

    info!(room_id = %t.id, user_id = %session.identity.id, "Tournament created");
    session.send(ServerMsg::TournamentRoomCreated {
        room_id: t.id.clone(),
        players: t.players(),
        owner: session.identity.nickname.clone(),
    });
    Ok(t.id.clone())
}

/// `join_tournament_room`: enroll before the bracket starts
pub fn join(registry: &Arc<RoomRegistry>, session: &Arc<Session>, room_id: &str) -> Result<(), RoomError> {
    let room_id = room_id.trim();
    if room_id.is_empty() {
        return Err(RoomError::InvalidRoomId);
    }
    let Some(RoomEntry::Tournament(t)) = registry.get(room_id) else {
        return Err(RoomError::TournamentNotFound);
    };

    registry.reserve_member(session, &t.id)?;
    if let Err(e) = t.enroll(Seat::for_session(session)) {
        registry.release_member(session, &t.id);
        return Err(e);
    }

    let players = t.players();
    let message = format!("Player {} has joined the tournament", session.identity.nickname);
    info!(room_id = %t.id, user_id = %session.identity.id, total = players.len(), "Player joined tournament");
    t.broadcast(&ServerMsg::JoinedTournamentRoom {
        room_id: t.id.clone(),
        message: message.clone(),
        players: players.clone(),
        total_players: players.len(),
    });
    t.broadcast(&ServerMsg::TournamentPlayerJoined {
        room_id: t.id.clone(),
        message,
        total_players: players.len(),
        players,
    });
    Ok(())
}

/// `start_tournament`: owner only, dispatches the first match
pub fn start(registry: &Arc<RoomRegistry>, session: &Arc<Session>, room_id: Option<&str>) -> Result<(), RoomError> {
    let t = resolve(registry, session, room_id)?;
    let players = t.begin(&session.identity.id)?;

    info!(room_id = %t.id, players = players.len(), "Tournament started");
    t.broadcast(&ServerMsg::TournamentStarted {
        room_id: t.id.clone(),
        players,
    });
    dispatch_next(registry, &t);
    Ok(())
}

/// `leave_tournament` or disconnect
pub fn leave(registry: &Arc<RoomRegistry>, t: &Arc<TournamentRoom>, session: &Arc<Session>) {
    let Some(departure) = t.depart(&session.identity.id) else {
        registry.release_member(session, &t.id);
        return;
    };

    info!(room_id = %t.id, user_id = %session.identity.id, "Player left tournament");
    match departure {
        Departure::InPlay(room) => {
            // Closes the tournament and releases every member
            lifecycle::abort_match(registry, &room);
            registry.release_member(session, &t.id);
        }
        Departure::Enrolling { remaining: 0 } => {
            registry.release_member(session, &t.id);
            registry.release_tournament(t);
        }
        Departure::Enrolling { .. } | Departure::Waiting => {
            registry.release_member(session, &t.id);
            t.broadcast(&t.players_updated());
        }
    }
}

pub fn leave_by_id(registry: &Arc<RoomRegistry>, session: &Arc<Session>, room_id: Option<&str>) -> Result<(), RoomError> {
    let t = resolve(registry, session, room_id)?;
    if session.room_id().as_deref() != Some(t.id.as_str()) {
        return Err(RoomError::NotInRoom);
    }
    leave(registry, &t, session);
    Ok(())
}

fn resolve(
    registry: &RoomRegistry,
    session: &Session,
    room_id: Option<&str>,
) -> Result<Arc<TournamentRoom>, RoomError> {
    let room_id = match room_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => session.room_id().ok_or(RoomError::NotInRoom)?,
    };
    match registry.get(&room_id) {
        Some(RoomEntry::Tournament(t)) => Ok(t),
        _ => Err(RoomError::TournamentNotFound),
    }
}

/// Start the next match, or crown the winner when the ladder is exhausted
pub fn dispatch_next(registry: &Arc<RoomRegistry>, t: &Arc<TournamentRoom>) {
    match t.advance() {
        Next::Match(room, pairing) => {
            info!(
                room_id = %t.id,
                match_number = pairing.number,
                owner = %pairing.owner.user_id(),
                guest = %pairing.guest.user_id(),
                "Tournament match dispatched"
            );
            t.broadcast(&ServerMsg::TournamentMatchStart {
                room_id: t.id.clone(),
                match_number: pairing.number,
                owner: pairing.owner.player.clone(),
                guest: pairing.guest.player.clone(),
                message: format!(
                    "Match {}: {} vs {}",
                    pairing.number, pairing.owner.player.nickname, pairing.guest.player.nickname
                ),
            });
            lifecycle::begin_match(registry, &room);
        }
        Next::Champion(champion) => {
            info!(
                room_id = %t.id,
                winner = %champion.user_id(),
                eliminated = ?t.eliminated(),
                "Tournament finished"
            );
            t.broadcast(&ServerMsg::TournamentWinner {
                winner: champion.user_id().to_string(),
                message: format!("Tournament over! {} wins!", champion.player.nickname),
            });
            close(registry, t);
        }
        Next::Stalled => {
            warn!(room_id = %t.id, "Tournament cannot continue");
            t.broadcast(&ServerMsg::RoomError {
                message: ABORTED_MESSAGE.to_string(),
            });
            close(registry, t);
        }
        Next::Idle => debug!(room_id = %t.id, "Nothing to dispatch"),
    }
}

/// A bracket match reached the winning score
pub fn on_match_finished(
    registry: &Arc<RoomRegistry>,
    t: &Arc<TournamentRoom>,
    room: &Arc<MatchRoom>,
    outcome: MatchOutcome,
) {
    let Some((winner, loser)) = t.settle(room, outcome.winner_seat().user_id()) else {
        debug!(room_id = %t.id, "Ignoring result of a detached tournament match");
        return;
    };
    room.begin_teardown();

    spawn_record(
        registry.history(),
        MatchRecord::from(&outcome),
        registry.history_retry_limit(),
    );

    info!(room_id = %t.id, winner = %winner.user_id(), loser = %loser.user_id(), "Tournament match finished");
    t.broadcast(&ServerMsg::TournamentMatchEnd {
        winner: winner.user_id().to_string(),
        winner_name: winner.player.nickname.clone(),
        loser: loser.user_id().to_string(),
        loser_name: loser.player.nickname.clone(),
        message: format!("{} wins the match against {}", winner.player.nickname, loser.player.nickname),
    });

    let pause = registry.timings().tournament_pause;
    let registry = registry.clone();
    let t = t.clone();
    tokio::spawn(async move {
        sleep(pause).await;
        dispatch_next(&registry, &t);
    });
}

/// A bracket match ended abnormally: the whole tournament goes with it
pub fn on_match_aborted(registry: &Arc<RoomRegistry>, t: &Arc<TournamentRoom>, room: &Arc<MatchRoom>) {
    if !t.abandon(room) {
        return;
    }

    warn!(room_id = %t.id, "Tournament match aborted, closing tournament");
    t.broadcast(&ServerMsg::RoomError {
        message: ABORTED_MESSAGE.to_string(),
    });
    close(registry, t);
}

fn close(registry: &RoomRegistry, t: &Arc<TournamentRoom>) {
    for seat in t.close() {
        registry.release_member(&seat.session, &t.id);
    }
    registry.release_tournament(t);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MatchPhase, Side};
    use crate::rooms::testing::{advance, count, drain, force_point, registry, session};
    use tokio::sync::mpsc;

    type Player = (Arc<Session>, mpsc::Receiver<ServerMsg>);

    fn enroll(registry: &Arc<RoomRegistry>, names: &[&str]) -> (RoomId, Vec<Player>) {
        let players: Vec<Player> = names
            .iter()
            .enumerate()
            .map(|(i, name)| session(&(i + 1).to_string(), name))
            .collect();
        let id = create(registry, &players[0].0).unwrap();
        for (s, _) in &players[1..] {
            join(registry, s, &id).unwrap();
        }
        (id, players)
    }

    fn tournament(registry: &RoomRegistry, id: &str) -> Arc<TournamentRoom> {
        match registry.get(id) {
            Some(RoomEntry::Tournament(t)) => t,
            _ => panic!("tournament {id} missing"),
        }
    }

    /// Play the live match to a 10-0 owner win
    async fn owner_wins(registry: &Arc<RoomRegistry>, id: &str) {
        advance(3_100).await;
        let room = registry.live_match(id).expect("live match");
        assert_eq!(room.phase(), MatchPhase::Simulating);
        force_point(&room, Side::Owner, 9, 0);
        advance(100).await;
    }

    #[tokio::test(start_paused = true)]
    async fn tournament_ids_are_prefixed() {
        let (registry, _) = registry();
        let (id, mut players) = enroll(&registry, &["P1"]);
        assert!(id.starts_with('T'));
        assert_eq!(id.len(), 7);
        let events = drain(&mut players[0].1);
        assert!(matches!(
            &events[..],
            [ServerMsg::TournamentRoomCreated { owner, players, .. }] if owner == "P1" && players.len() == 1
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn four_player_ladder_crowns_the_carried_winner() {
        let (registry, history) = registry();
        let (id, mut players) = enroll(&registry, &["P1", "P2", "P3", "P4"]);
        start(&registry, &players[0].0, Some(&id)).unwrap();

        let t = tournament(&registry, &id);
        let room = t.live_match().unwrap();
        assert_eq!(room.owner().unwrap().user_id(), "1");
        assert_eq!(room.guest().unwrap().user_id(), "2");

        owner_wins(&registry, &id).await;
        // Two-second pause before the next pairing
        assert!(registry.live_match(&id).is_none());
        advance(2_000).await;
        let room = registry.live_match(&id).unwrap();
        assert_eq!(room.owner().unwrap().user_id(), "1");
        assert_eq!(room.guest().unwrap().user_id(), "3");

        owner_wins(&registry, &id).await;
        advance(2_000).await;
        let room = registry.live_match(&id).unwrap();
        assert_eq!(room.guest().unwrap().user_id(), "4");

        assert_eq!(t.eliminated(), vec!["2", "3"]);
        owner_wins(&registry, &id).await;
        assert_eq!(t.eliminated(), vec!["2", "3", "4"]);
        advance(2_000).await;

        let events = drain(&mut players[3].1);
        assert_eq!(count(&events, |e| matches!(e, ServerMsg::TournamentMatchStart { .. })), 3);
        assert_eq!(count(&events, |e| matches!(e, ServerMsg::TournamentMatchEnd { .. })), 3);
        // P4 only sat in the last match
        assert_eq!(count(&events, |e| matches!(e, ServerMsg::GameOver { .. })), 1);
        assert!(matches!(
            events.last(),
            Some(ServerMsg::TournamentWinner { winner, .. }) if winner == "1"
        ));
        assert!(registry.get(&id).is_none());
        for (s, _) in &players {
            assert_eq!(s.room_id(), None);
        }

        advance(1_000).await;
        let records = history.records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.game_type == "tournament" && r.winner_id == "1"));

        // The carried winner sat in every match and saw each one end
        let p1_events = drain(&mut players[0].1);
        let overs: Vec<&ServerMsg> = p1_events
            .iter()
            .filter(|e| matches!(e, ServerMsg::GameOver { .. }))
            .collect();
        assert_eq!(overs.len(), 3);
        assert!(overs.iter().all(|e| matches!(
            e,
            ServerMsg::GameOver { winner, final_score, .. }
                if winner == "P1" && final_score.owner == 10 && final_score.guest == 0
        )));
        assert_eq!(count(&drain(&mut players[1].1), |e| matches!(e, ServerMsg::GameOver { .. })), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_owner_starts_and_needs_two_players() {
        let (registry, _) = registry();
        let (id, players) = enroll(&registry, &["P1"]);
        assert_eq!(
            start(&registry, &players[0].0, Some(&id)),
            Err(RoomError::NotEnoughPlayers(MIN_ENTRANTS))
        );
        let (p2, _r2) = session("2", "P2");
        join(&registry, &p2, &id).unwrap();
        assert_eq!(start(&registry, &p2, Some(&id)), Err(RoomError::NotTournamentOwner));
        start(&registry, &players[0].0, None).unwrap();

        let (p3, _r3) = session("3", "P3");
        assert_eq!(join(&registry, &p3, &id), Err(RoomError::TournamentStarted));
        assert_eq!(p3.room_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_the_live_match_aborts_the_tournament() {
        let (registry, _) = registry();
        let (id, mut players) = enroll(&registry, &["P1", "P2", "P3"]);
        start(&registry, &players[0].0, Some(&id)).unwrap();
        advance(3_100).await;

        leave_by_id(&registry, &players[1].0, None).unwrap();

        let owner_events = drain(&mut players[0].1);
        assert_eq!(count(&owner_events, |e| matches!(e, ServerMsg::GameAborted { .. })), 1);
        assert!(owner_events.iter().any(|e| matches!(
            e,
            ServerMsg::RoomError { message } if message == ABORTED_MESSAGE
        )));
        let pooled = drain(&mut players[2].1);
        assert_eq!(count(&pooled, |e| matches!(e, ServerMsg::GameAborted { .. })), 0);
        assert_eq!(count(&pooled, |e| matches!(e, ServerMsg::RoomError { .. })), 1);
        assert!(registry.get(&id).is_none());
        assert!(players.iter().all(|(s, _)| s.room_id().is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn pooled_player_leaving_does_not_stop_the_ladder() {
        let (registry, _) = registry();
        let (id, mut players) = enroll(&registry, &["P1", "P2", "P3", "P4"]);
        start(&registry, &players[0].0, Some(&id)).unwrap();

        leave_by_id(&registry, &players[2].0, Some(&id)).unwrap();
        let events = drain(&mut players[0].1);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerMsg::TournamentPlayersUpdated { player_count: 3, .. }
        )));

        owner_wins(&registry, &id).await;
        advance(2_000).await;
        let room = registry.live_match(&id).unwrap();
        assert_eq!(room.guest().unwrap().user_id(), "4");
    }

    #[tokio::test(start_paused = true)]
    async fn carried_winner_leaving_between_matches_closes_the_tournament() {
        let (registry, _) = registry();
        let (id, mut players) = enroll(&registry, &["P1", "P2", "P3"]);
        start(&registry, &players[0].0, Some(&id)).unwrap();

        owner_wins(&registry, &id).await;
        leave_by_id(&registry, &players[0].0, None).unwrap();
        advance(2_000).await;

        let events = drain(&mut players[2].1);
        assert_eq!(count(&events, |e| matches!(e, ServerMsg::TournamentWinner { .. })), 0);
        assert!(matches!(
            events.last(),
            Some(ServerMsg::RoomError { message }) if message == ABORTED_MESSAGE
        ));
        assert!(registry.live_match(&id).is_none());
        assert!(registry.get(&id).is_none());
        assert!(players.iter().all(|(s, _)| s.room_id().is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_enrolling_tournament_is_deleted_and_ownership_passes_on() {
        let (registry, _) = registry();
        let (id, players) = enroll(&registry, &["P1", "P2"]);
        let t = tournament(&registry, &id);

        leave_by_id(&registry, &players[0].0, None).unwrap();
        assert_eq!(t.owner_id(), "2");
        leave_by_id(&registry, &players[1].0, None).unwrap();
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_rebinds_enrollment() {
        let (registry, _) = registry();
        let (id, players) = enroll(&registry, &["P1", "P2"]);
        let (p2_again, _rx) = session("2", "P2");
        registry.attach_session(&p2_again);

        assert_eq!(p2_again.room_id(), Some(id.clone()));
        assert_eq!(players[1].0.room_id(), None);
        start(&registry, &players[0].0, None).unwrap();
        let room = registry.live_match(&id).unwrap();
        assert_eq!(room.guest().unwrap().session.conn_id, p2_again.conn_id);
    }
}
