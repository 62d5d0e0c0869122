//! gaia-exporter - Prometheus exporter for Gaia / Tendermint nodes
//!
//! On every scrape the exporter queries the node RPC (`/status` and
//! `/net_info`) and republishes:
//! - `gaia_latest_block_height`
//! - `gaia_latest_block_time_lag` (seconds, negative if the node is ahead)
//! - `gaia_number_of_peers`
//!
//! A failed collection exposes none of the three gauges for that scrape.

pub mod config;
pub mod metrics;
pub mod node;
pub mod util;

pub use config::Config;
