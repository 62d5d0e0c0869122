//! JSON documents returned by the node RPC.
//!
//! Only the fields the exporter reads are modelled; everything else in the
//! responses is ignored. Numeric values arrive string-encoded and are kept as
//! strings here so that conversion failures surface as collection errors
//! rather than decode errors.

use serde::Deserialize;

/// Body of `GET /status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub result: Status,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub sync_info: SyncInfo,
}

/// Chain sync progress as reported by the node.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncInfo {
    /// Decimal string, e.g. `"18305112"`
    pub latest_block_height: String,
    /// `YYYY-MM-DDTHH:MM:SS.nnnnnnnnnZ`
    pub latest_block_time: String,
}

/// Body of `GET /net_info`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetInfoResponse {
    pub result: NetInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetInfo {
    /// Decimal string count of connected peers
    pub n_peers: String,
}
