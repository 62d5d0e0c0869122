//! Client side of the monitored node's RPC API.

mod client;
mod documents;

pub use client::{FetchError, NodeClient};
pub use documents::{NetInfo, NetInfoResponse, Status, StatusResponse, SyncInfo};
