//! Node metric collection and exposition.

mod collector;
mod exposition;
mod server;

pub use collector::{
    lag_seconds, parse_block_time, CollectError, CollectStage, MetricSet, NodeCollector,
    BLOCK_TIME_FORMAT, NET_INFO_PATH, STATUS_PATH,
};
pub use exposition::{Descriptor, Descriptors, Exporter, FailureLabels};
pub use server::MetricsServer;
