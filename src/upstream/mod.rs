//! Clients for the services this server calls out to

pub mod ai;
pub mod client;
pub mod history;

pub use client::{ServiceClient, UpstreamError};
