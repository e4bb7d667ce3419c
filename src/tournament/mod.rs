//! Single-elimination ladder tournaments

pub mod bracket;
pub mod orchestrator;

pub use orchestrator::{
    create, join, leave, leave_by_id, on_match_aborted, on_match_finished, start,
    TournamentRoom,
};
