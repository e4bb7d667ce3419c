//! Connection sessions and the room registry

pub mod error;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ReplyKind, RoomError};
pub use registry::{RoomEntry, RoomRegistry};
pub use session::{Identity, Session, OUTBOUND_CAPACITY};
