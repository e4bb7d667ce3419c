//! Match state and authoritative tick loop

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::rooms::{RoomError, RoomRegistry, Session};
use crate::util::time::tick_interval;
use crate::ws::protocol::{FinalScore, MoveIntent, ServerMsg, StateSnapshot};

use super::lifecycle;
use super::physics::{Ball, PhysicsSystem, PADDLE_START_Y, WINNING_SCORE};
use super::snapshot::SnapshotBuilder;
use super::{RoomId, Seat, Side};

/// What kind of match a room hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Owner against the AI opponent
    Bot,
    /// Two paddles driven from one connection
    Local,
    /// Two connections, owner and guest
    Remote,
    /// A bracket match dispatched by a tournament
    Tournament,
}

impl MatchKind {
    /// Game-type tag sent to the match history service
    pub fn game_type(self) -> &'static str {
        match self {
            MatchKind::Bot => "single",
            MatchKind::Local => "local",
            MatchKind::Remote => "remote",
            MatchKind::Tournament => "tournament",
        }
    }

    /// Local matches have a synthetic guest and are not recorded
    pub fn persists_result(self) -> bool {
        !matches!(self, MatchKind::Local)
    }
}

/// Match lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Waiting for the guest seat
    Forming,
    /// Both seats filled, start grace running
    Starting,
    /// Simulation loop owns the state
    Simulating,
    /// Score threshold reached, waiting for teardown
    Ending,
    /// Gone from the registry, or about to be
    TornDown,
}

/// Which seats a connection controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatRole {
    Owner,
    Guest,
    /// Local mode: one connection drives both paddles
    Both,
}

/// Per-side state, reset at every match start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideState {
    pub paddle_y: f32,
    pub score: u32,
}

impl Default for SideState {
    fn default() -> Self {
        Self {
            paddle_y: PADDLE_START_Y,
            score: 0,
        }
    }
}

/// Authoritative physics snapshot for one match
#[derive(Debug, Clone)]
pub struct MatchCore {
    pub ball: Ball,
    /// Last integration instant; delta-time is measured from here
    pub last_update: Instant,
    pub owner: SideState,
    pub guest: SideState,
}

/// Result of advancing a match by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rally,
    Scored(Side),
    Won(Side),
}

impl MatchCore {
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        Self {
            ball: Ball::kickoff(rng),
            last_update: Instant::now(),
            owner: SideState::default(),
            guest: SideState::default(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::Owner => &mut self.owner,
            Side::Guest => &mut self.guest,
        }
    }

    /// Advance the match by `dt` seconds of wall-clock time
    pub fn advance<R: Rng>(
        &mut self,
        owner_intent: MoveIntent,
        guest_intent: MoveIntent,
        dt: f32,
        rng: &mut R,
    ) -> TickOutcome {
        self.owner.paddle_y = PhysicsSystem::move_paddle(self.owner.paddle_y, owner_intent, dt);
        self.guest.paddle_y = PhysicsSystem::move_paddle(self.guest.paddle_y, guest_intent, dt);

        PhysicsSystem::advance_ball(&mut self.ball, dt);
        PhysicsSystem::bounce_walls(&mut self.ball);
        PhysicsSystem::bounce_paddles(
            &mut self.ball,
            self.owner.paddle_y,
            self.guest.paddle_y,
            rng,
        );

        let Some(scorer) = PhysicsSystem::goal_scorer(&self.ball) else {
            return TickOutcome::Rally;
        };

        let side = self.side_mut(scorer);
        side.score += 1;
        let reached = side.score >= WINNING_SCORE;
        // Next serve goes towards the side that conceded
        self.ball = Ball::serve(scorer.opponent(), rng);

        if reached {
            TickOutcome::Won(scorer)
        } else {
            TickOutcome::Scored(scorer)
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        SnapshotBuilder::state(self)
    }
}

/// Input written by handlers and read by the loop, without taking the room lock
#[derive(Debug, Default)]
struct MatchControls {
    owner_intent: AtomicU8,
    guest_intent: AtomicU8,
    paused: AtomicBool,
}

impl MatchControls {
    fn intent(&self, side: Side) -> MoveIntent {
        let slot = match side {
            Side::Owner => &self.owner_intent,
            Side::Guest => &self.guest_intent,
        };
        MoveIntent::from_bits(slot.load(Ordering::Relaxed))
    }

    fn set_intent(&self, side: Side, intent: MoveIntent) {
        let slot = match side {
            Side::Owner => &self.owner_intent,
            Side::Guest => &self.guest_intent,
        };
        slot.store(intent.to_bits(), Ordering::Relaxed);
    }

    fn reset(&self) {
        self.owner_intent.store(0, Ordering::Relaxed);
        self.guest_intent.store(0, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
    }
}

/// Handle to a running simulation task
struct SimHandle {
    generation: u64,
    task: JoinHandle<()>,
}

struct MatchInner {
    phase: MatchPhase,
    owner: Option<Seat>,
    guest: Option<Seat>,
    core: Option<MatchCore>,
    sim: Option<SimHandle>,
    rng: ChaCha8Rng,
}

/// Finished match, handed to the lifecycle controller
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub room_id: RoomId,
    pub kind: MatchKind,
    pub winner: Side,
    pub owner: Seat,
    pub guest: Seat,
    pub final_score: FinalScore,
}

impl MatchOutcome {
    pub fn seat(&self, side: Side) -> &Seat {
        match side {
            Side::Owner => &self.owner,
            Side::Guest => &self.guest,
        }
    }

    pub fn winner_seat(&self) -> &Seat {
        self.seat(self.winner)
    }
}

/// Seats and initial state captured when a match enters `Starting`
pub(crate) struct StartingMatch {
    pub owner: Seat,
    pub guest: Seat,
    pub state: StateSnapshot,
}

enum TickControl {
    Continue,
    /// A newer loop or a lifecycle transition took over
    Superseded,
    /// Room, seats or state vanished underneath the loop
    Orphaned,
    Finished(MatchOutcome),
}

/// One match: two seats, movement intents and the physics state.
/// All mutable state sits behind one lock scoped to this room.
pub struct MatchRoom {
    pub id: RoomId,
    pub kind: MatchKind,
    controls: MatchControls,
    generation: AtomicU64,
    inner: Mutex<MatchInner>,
}

impl MatchRoom {
    pub fn new(id: RoomId, kind: MatchKind, owner: Seat, seed: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            controls: MatchControls::default(),
            generation: AtomicU64::new(0),
            inner: Mutex::new(MatchInner {
                phase: MatchPhase::Forming,
                owner: Some(owner),
                guest: None,
                core: None,
                sim: None,
                rng: ChaCha8Rng::seed_from_u64(seed),
            }),
        })
    }

    pub fn phase(&self) -> MatchPhase {
        self.inner.lock().phase
    }

    pub fn owner(&self) -> Option<Seat> {
        self.inner.lock().owner.clone()
    }

    #[cfg(test)]
    pub fn guest(&self) -> Option<Seat> {
        self.inner.lock().guest.clone()
    }

    pub fn seats(&self) -> Vec<Seat> {
        let inner = self.inner.lock();
        inner.owner.iter().chain(inner.guest.iter()).cloned().collect()
    }

    /// Fill the guest seat of a forming room
    pub fn seat_guest(&self, guest: Seat) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if inner.phase != MatchPhase::Forming || inner.guest.is_some() {
            return Err(RoomError::Full);
        }
        if inner
            .owner
            .as_ref()
            .is_some_and(|owner| owner.user_id() == guest.user_id())
        {
            return Err(RoomError::SelfJoin);
        }
        inner.guest = Some(guest);
        Ok(())
    }

    /// Swap the owner's connection while the room is still forming.
    /// Returns the replaced session.
    pub fn rebind_owner(&self, session: &Arc<Session>) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock();
        if inner.phase != MatchPhase::Forming || inner.guest.is_some() {
            return None;
        }
        let owner = inner.owner.as_mut()?;
        if owner.user_id() != session.identity.id {
            return None;
        }
        Some(std::mem::replace(&mut owner.session, session.clone()))
    }

    /// Seats controlled by a connection, only while both seats are filled
    pub fn role_of(&self, conn_id: Uuid) -> Option<SeatRole> {
        let inner = self.inner.lock();
        let (owner, guest) = (inner.owner.as_ref()?, inner.guest.as_ref()?);
        match (
            owner.session.conn_id == conn_id,
            guest.session.conn_id == conn_id,
        ) {
            (true, true) => Some(SeatRole::Both),
            (true, false) => Some(SeatRole::Owner),
            (false, true) => Some(SeatRole::Guest),
            (false, false) => None,
        }
    }

    /// Latest-wins intent slot for one side
    pub fn set_intent(&self, side: Side, intent: MoveIntent) {
        self.controls.set_intent(side, intent);
    }

    #[cfg(test)]
    pub fn intent(&self, side: Side) -> MoveIntent {
        self.controls.intent(side)
    }

    pub fn is_paused(&self) -> bool {
        self.controls.paused.load(Ordering::Relaxed)
    }

    /// Toggle the pause flag. Resuming restarts delta-time from now so the
    /// paused interval is never integrated.
    pub fn set_paused(&self, paused: bool) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if !matches!(inner.phase, MatchPhase::Starting | MatchPhase::Simulating) {
            return Err(RoomError::NoLiveMatch);
        }
        let was_paused = self.controls.paused.swap(paused, Ordering::Relaxed);
        if was_paused && !paused {
            if let Some(core) = inner.core.as_mut() {
                core.last_update = Instant::now();
            }
        }
        if was_paused != paused {
            notify(
                inner.owner.as_ref(),
                inner.guest.as_ref(),
                &ServerMsg::GamePauseState { is_paused: paused },
            );
        }
        Ok(())
    }

    /// Send to every distinct connection seated in this room
    pub fn broadcast(&self, msg: &ServerMsg) {
        let inner = self.inner.lock();
        notify(inner.owner.as_ref(), inner.guest.as_ref(), msg);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Option<StateSnapshot> {
        self.inner.lock().core.as_ref().map(MatchCore::snapshot)
    }

    pub fn is_simulating(&self) -> bool {
        self.inner.lock().sim.is_some()
    }

    /// Forming -> Starting: fresh state, scores at zero
    pub(crate) fn enter_starting(&self) -> Option<StartingMatch> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.phase != MatchPhase::Forming {
            return None;
        }
        let (owner, guest) = (inner.owner.clone()?, inner.guest.clone()?);
        let core = MatchCore::new(&mut inner.rng);
        let state = core.snapshot();
        inner.core = Some(core);
        inner.phase = MatchPhase::Starting;
        self.controls.reset();
        Some(StartingMatch {
            owner,
            guest,
            state,
        })
    }

    /// Starting -> Simulating once the grace delay has elapsed
    pub(crate) fn enter_simulating(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.phase != MatchPhase::Starting {
            return false;
        }
        let Some(core) = inner.core.as_mut() else {
            return false;
        };
        core.last_update = Instant::now();
        inner.phase = MatchPhase::Simulating;
        true
    }

    /// Spawn the tick loop, stopping any loop already running for this room
    pub fn start_simulation(self: &Arc<Self>, registry: &Arc<RoomRegistry>) {
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.sim.take() {
            warn!(room_id = %self.id, generation = previous.generation, "Replacing running simulation loop");
            previous.task.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let task = tokio::spawn(run_simulation(self.clone(), registry.clone(), generation));
        inner.sim = Some(SimHandle { generation, task });
    }

    /// Stop the tick loop. Safe to call when already stopped.
    pub fn stop_simulation(&self) {
        let mut inner = self.inner.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(sim) = inner.sim.take() {
            sim.task.abort();
        }
    }

    /// Enter `TornDown` from any other phase. Only the first caller gets
    /// `Some`, carrying whether a match was live.
    pub(crate) fn begin_abort(&self) -> Option<bool> {
        let mut inner = self.inner.lock();
        if inner.phase == MatchPhase::TornDown {
            return None;
        }
        let was_live = matches!(inner.phase, MatchPhase::Starting | MatchPhase::Simulating);
        inner.phase = MatchPhase::TornDown;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(sim) = inner.sim.take() {
            sim.task.abort();
        }
        Some(was_live)
    }

    /// Ending -> TornDown after the result has been shown
    pub(crate) fn begin_teardown(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.phase != MatchPhase::Ending {
            return false;
        }
        inner.phase = MatchPhase::TornDown;
        true
    }

    fn tick(&self, generation: u64, attached: bool) -> TickControl {
        let mut guard = self.inner.lock();
        let MatchInner {
            phase,
            owner,
            guest,
            core,
            sim,
            rng,
        } = &mut *guard;

        if self.generation.load(Ordering::SeqCst) != generation
            || *phase != MatchPhase::Simulating
        {
            return TickControl::Superseded;
        }

        let (Some(owner), Some(guest), Some(core)) = (owner.as_ref(), guest.as_ref(), core.as_mut())
        else {
            sim.take();
            return TickControl::Orphaned;
        };
        if !attached {
            sim.take();
            return TickControl::Orphaned;
        }

        if self.is_paused() {
            return TickControl::Continue;
        }

        let now = Instant::now();
        let dt = now.saturating_duration_since(core.last_update).as_secs_f32();
        core.last_update = now;

        let outcome = core.advance(
            self.controls.intent(Side::Owner),
            self.controls.intent(Side::Guest),
            dt,
            rng,
        );

        match outcome {
            TickOutcome::Rally => {
                notify(Some(owner), Some(guest), &ServerMsg::GameState(core.snapshot()));
                TickControl::Continue
            }
            TickOutcome::Scored(scorer) => {
                debug!(
                    room_id = %self.id,
                    scorer = ?scorer,
                    owner_score = core.owner.score,
                    guest_score = core.guest.score,
                    "Point scored"
                );
                // A point goes out in the tick it is scored
                notify(Some(owner), Some(guest), &ServerMsg::GameState(core.snapshot()));
                TickControl::Continue
            }
            TickOutcome::Won(winner) => {
                let outcome = MatchOutcome {
                    room_id: self.id.clone(),
                    kind: self.kind,
                    winner,
                    owner: owner.clone(),
                    guest: guest.clone(),
                    final_score: SnapshotBuilder::final_score(core),
                };
                *phase = MatchPhase::Ending;
                sim.take();
                TickControl::Finished(outcome)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_core<T>(&self, f: impl FnOnce(&mut MatchCore) -> T) -> Option<T> {
        self.inner.lock().core.as_mut().map(f)
    }
}

/// Deliver to the owner and, unless it shares the owner's connection, the guest
fn notify(owner: Option<&Seat>, guest: Option<&Seat>, msg: &ServerMsg) {
    if let Some(owner) = owner {
        owner.session.send(msg.clone());
    }
    if let Some(guest) = guest {
        let shared = owner.is_some_and(|o| o.session.conn_id == guest.session.conn_id);
        if !shared {
            guest.session.send(msg.clone());
        }
    }
}

/// Fixed-rate loop for one room. Exits when superseded, orphaned or won.
async fn run_simulation(room: Arc<MatchRoom>, registry: Arc<RoomRegistry>, generation: u64) {
    info!(room_id = %room.id, generation, "Simulation loop started");

    let mut ticker = interval(tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let attached = registry
            .live_match(&room.id)
            .is_some_and(|live| Arc::ptr_eq(&live, &room));

        match room.tick(generation, attached) {
            TickControl::Continue => {}
            TickControl::Superseded => {
                debug!(room_id = %room.id, generation, "Simulation loop superseded");
                return;
            }
            TickControl::Orphaned => {
                warn!(room_id = %room.id, "Room state vanished under simulation loop, aborting");
                lifecycle::abort_match(&registry, &room);
                return;
            }
            TickControl::Finished(outcome) => {
                info!(
                    room_id = %room.id,
                    winner = ?outcome.winner,
                    owner_score = outcome.final_score.owner,
                    guest_score = outcome.final_score.guest,
                    "Match finished"
                );
                lifecycle::finish_match(&registry, &room, outcome);
                return;
            }
        }
    }
}
