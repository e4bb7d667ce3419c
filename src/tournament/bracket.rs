//! King-of-the-hill ladder: the last winner plays the next pooled player

use std::collections::VecDeque;

use crate::game::Seat;
use crate::rooms::RoomError;

/// Tournament capacity
pub const MAX_ENTRANTS: usize = 8;
/// Players needed before the owner may start
pub const MIN_ENTRANTS: usize = 2;

/// Anything that can be enrolled, identified by user id
pub trait Entrant: Clone {
    fn entrant_id(&self) -> &str;
}

impl Entrant for Seat {
    fn entrant_id(&self) -> &str {
        self.user_id()
    }
}

/// One dispatched match. `owner` is the carried winner when there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct Pairing<T> {
    pub number: u32,
    pub owner: T,
    pub guest: T,
}

#[derive(Debug, Clone)]
pub struct Bracket<T> {
    pool: VecDeque<T>,
    carried: Option<T>,
    in_play: Option<(T, T)>,
    eliminated: Vec<T>,
    matches_dispatched: u32,
    capacity: usize,
}

impl<T: Entrant> Default for Bracket<T> {
    fn default() -> Self {
        Self::new(MAX_ENTRANTS)
    }
}

impl<T: Entrant> Bracket<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: VecDeque::new(),
            carried: None,
            in_play: None,
            eliminated: Vec::new(),
            matches_dispatched: 0,
            capacity,
        }
    }

    /// Add a player at the back of the pool
    pub fn enroll(&mut self, entrant: T) -> Result<(), RoomError> {
        if self.contains(entrant.entrant_id()) {
            return Err(RoomError::AlreadyInRoom);
        }
        if self.pool.len() >= self.capacity {
            return Err(RoomError::TournamentFull);
        }
        self.pool.push_back(entrant);
        Ok(())
    }

    /// Remove a waiting player: pooled or carried, never one in play
    pub fn withdraw(&mut self, id: &str) -> Option<T> {
        if let Some(pos) = self.pool.iter().position(|e| e.entrant_id() == id) {
            return self.pool.remove(pos);
        }
        if self.carried.as_ref().is_some_and(|c| c.entrant_id() == id) {
            return self.carried.take();
        }
        None
    }

    /// Swap in a replacement for a waiting player with the same id
    pub fn replace(&mut self, entrant: T) -> Option<T> {
        let id = entrant.entrant_id().to_string();
        let slot = self
            .pool
            .iter_mut()
            .chain(self.carried.iter_mut())
            .find(|e| e.entrant_id() == id)?;
        Some(std::mem::replace(slot, entrant))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pool.iter().any(|e| e.entrant_id() == id)
            || self.carried.as_ref().is_some_and(|c| c.entrant_id() == id)
            || self.is_in_play(id)
    }

    pub fn is_in_play(&self, id: &str) -> bool {
        self.in_play
            .as_ref()
            .is_some_and(|(a, b)| a.entrant_id() == id || b.entrant_id() == id)
    }

    /// Take the next two players off the ladder
    pub fn next_pairing(&mut self) -> Option<Pairing<T>> {
        if self.in_play.is_some() || self.waiting() < 2 {
            return None;
        }
        let owner = match self.carried.take() {
            Some(winner) => winner,
            None => self.pool.pop_front()?,
        };
        let guest = self.pool.pop_front()?;
        self.matches_dispatched += 1;
        self.in_play = Some((owner.clone(), guest.clone()));
        Some(Pairing {
            number: self.matches_dispatched,
            owner,
            guest,
        })
    }

    /// Close the match in play. The winner is carried into the next one.
    /// Returns `(winner, loser)`.
    pub fn record_result(&mut self, winner_id: &str) -> Option<(T, T)> {
        let (a, b) = self.in_play.take()?;
        let (winner, loser) = if a.entrant_id() == winner_id {
            (a, b)
        } else if b.entrant_id() == winner_id {
            (b, a)
        } else {
            self.in_play = Some((a, b));
            return None;
        };
        self.eliminated.push(loser.clone());
        self.carried = Some(winner.clone());
        Some((winner, loser))
    }

    /// Drop the match in play without a result
    pub fn abandon_in_play(&mut self) -> Option<(T, T)> {
        self.in_play.take()
    }

    /// Winner once no further pairing is possible. Only a carried winner
    /// qualifies; a pooled player left alone has not won anything.
    pub fn champion(&self) -> Option<&T> {
        if self.in_play.is_some() || self.waiting() >= 2 {
            return None;
        }
        self.carried.as_ref()
    }

    fn waiting(&self) -> usize {
        self.pool.len() + usize::from(self.carried.is_some())
    }

    pub fn eliminated(&self) -> &[T] {
        &self.eliminated
    }

    #[cfg(test)]
    fn pool_len(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Entrant for &'static str {
        fn entrant_id(&self) -> &str {
            self
        }
    }

    fn bracket(players: &[&'static str]) -> Bracket<&'static str> {
        let mut bracket = Bracket::default();
        for p in players {
            bracket.enroll(*p).unwrap();
        }
        bracket
    }

    #[test]
    fn four_player_ladder_keeps_the_winner_on() {
        let mut b = bracket(&["P1", "P2", "P3", "P4"]);

        let first = b.next_pairing().unwrap();
        assert_eq!((first.number, first.owner, first.guest), (1, "P1", "P2"));
        assert_eq!(b.pool_len(), 2);
        assert!(b.next_pairing().is_none());
        b.record_result("P1").unwrap();

        let second = b.next_pairing().unwrap();
        assert_eq!((second.owner, second.guest), ("P1", "P3"));
        b.record_result("P1").unwrap();

        let third = b.next_pairing().unwrap();
        assert_eq!((third.owner, third.guest), ("P1", "P4"));
        b.record_result("P1").unwrap();

        assert!(b.next_pairing().is_none());
        assert_eq!(b.champion(), Some(&"P1"));
        assert_eq!(b.eliminated(), &["P2", "P3", "P4"]);
    }

    #[test]
    fn n_players_take_n_minus_one_matches() {
        for n in [2usize, 4, 6, 8] {
            let names: Vec<&'static str> = ["a", "b", "c", "d", "e", "f", "g", "h"][..n].to_vec();
            let mut b = bracket(&names);
            let mut rounds = 0;
            while let Some(pairing) = b.next_pairing() {
                // Alternate winners so both branches of the ladder are exercised
                let winner = if rounds % 2 == 0 { pairing.guest } else { pairing.owner };
                b.record_result(winner).unwrap();
                rounds += 1;
            }
            assert_eq!(rounds, n - 1);
            assert_eq!(b.eliminated().len(), n - 1);
            assert!(b.champion().is_some());
        }
    }

    #[test]
    fn pool_shrinks_by_two_then_by_one() {
        let mut b = bracket(&["a", "b", "c", "d"]);
        b.next_pairing().unwrap();
        assert_eq!(b.pool_len(), 2);
        b.record_result("a").unwrap();
        b.next_pairing().unwrap();
        assert_eq!(b.pool_len(), 1);
    }

    #[test]
    fn capacity_and_duplicates_are_enforced() {
        let mut b: Bracket<&'static str> = Bracket::new(2);
        b.enroll("a").unwrap();
        assert_eq!(b.enroll("a"), Err(RoomError::AlreadyInRoom));
        b.enroll("b").unwrap();
        assert_eq!(b.enroll("c"), Err(RoomError::TournamentFull));
    }

    #[test]
    fn withdrawn_player_is_skipped() {
        let mut b = bracket(&["a", "b", "c"]);
        assert_eq!(b.withdraw("b"), Some("b"));
        let first = b.next_pairing().unwrap();
        assert_eq!((first.owner, first.guest), ("a", "c"));
        assert_eq!(b.withdraw("a"), None);
    }

    #[test]
    fn no_champion_when_the_carried_winner_leaves() {
        let mut b = bracket(&["a", "b", "c"]);
        b.next_pairing().unwrap();
        b.record_result("a").unwrap();
        b.withdraw("a").unwrap();
        assert!(b.next_pairing().is_none());
        assert_eq!(b.champion(), None);
    }

    #[test]
    fn unknown_winner_keeps_match_in_play() {
        let mut b = bracket(&["a", "b"]);
        b.next_pairing().unwrap();
        assert!(b.record_result("zzz").is_none());
        assert!(b.is_in_play("a"));
        assert!(b.champion().is_none());
    }
}
