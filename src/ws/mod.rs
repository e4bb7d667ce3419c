//! WebSocket transport, wire protocol and event dispatch

pub mod dispatch;
pub mod handler;
pub mod protocol;
