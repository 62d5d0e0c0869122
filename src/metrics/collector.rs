//! On-demand collection of node health.
//!
//! Each call to [`NodeCollector::collect`] fetches `/status` and `/net_info`
//! from the node, then derives a [`MetricSet`]. Nothing is cached between
//! calls; a failure anywhere yields no metric set at all.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use prometheus_client::encoding::{EncodeLabelValue, LabelValueEncoder};
use std::fmt::Write;
use std::num::ParseIntError;
use tracing::debug;

use crate::node::{FetchError, NetInfoResponse, NodeClient, StatusResponse};

/// RPC path of the status document.
pub const STATUS_PATH: &str = "/status";

/// RPC path of the peer information document.
pub const NET_INFO_PATH: &str = "/net_info";

/// strftime layout of `latest_block_time`.
pub const BLOCK_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%9fZ";

/// Character classes of a block time, `d` being any ASCII digit.
const BLOCK_TIME_SHAPE: &[u8] = b"dddd-dd-ddTdd:dd:dd.dddddddddZ";

/// Values produced by one successful collection.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSet {
    /// Latest block height reported by the node.
    pub block_height: u64,
    /// Seconds between now and the latest block time. Negative when the
    /// block time is ahead of the local clock.
    pub block_time_lag: f64,
    /// Number of connected peers.
    pub peers: u64,
}

/// Step of a collection that failed.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum CollectStage {
    Status,
    NetInfo,
    BlockTime,
    BlockHeight,
    Peers,
}

impl CollectStage {
    /// Label value used in logs and the failure counter.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectStage::Status => "status",
            CollectStage::NetInfo => "net_info",
            CollectStage::BlockTime => "block_time",
            CollectStage::BlockHeight => "block_height",
            CollectStage::Peers => "peers",
        }
    }
}

impl EncodeLabelValue for CollectStage {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        encoder.write_str(self.as_str())
    }
}

/// Why a collection produced no metrics.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("fetching {endpoint} failed: {source}")]
    Fetch {
        endpoint: &'static str,
        #[source]
        source: FetchError,
    },

    #[error("latest_block_time '{0}' does not match YYYY-MM-DDTHH:MM:SS.nnnnnnnnnZ")]
    BlockTime(String),

    #[error("{field} '{value}' is not a non-negative integer: {source}")]
    Integer {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

impl CollectError {
    /// The step this error aborted.
    pub fn stage(&self) -> CollectStage {
        match self {
            CollectError::Fetch { endpoint, .. } if *endpoint == NET_INFO_PATH => {
                CollectStage::NetInfo
            }
            CollectError::Fetch { .. } => CollectStage::Status,
            CollectError::BlockTime(_) => CollectStage::BlockTime,
            CollectError::Integer { field, .. } if *field == "n_peers" => CollectStage::Peers,
            CollectError::Integer { .. } => CollectStage::BlockHeight,
        }
    }
}

impl MetricSet {
    /// Derive the metric set from the two node documents as of `now`.
    pub fn derive(
        status: &StatusResponse,
        net_info: &NetInfoResponse,
        now: DateTime<Utc>,
    ) -> Result<Self, CollectError> {
        let sync_info = &status.result.sync_info;

        let block_time = parse_block_time(&sync_info.latest_block_time)?;
        let block_time_lag = lag_seconds(now, block_time);

        let block_height = parse_count("latest_block_height", &sync_info.latest_block_height)?;
        let peers = parse_count("n_peers", &net_info.result.n_peers)?;

        Ok(Self {
            block_height,
            block_time_lag,
            peers,
        })
    }
}

/// Parse a block time in the node's fixed nanosecond layout.
///
/// Exactly nine fractional digits and a literal `Z` are required. Leap
/// seconds (`:60`) are out of range.
pub fn parse_block_time(raw: &str) -> Result<DateTime<Utc>, CollectError> {
    let shaped = raw.len() == BLOCK_TIME_SHAPE.len()
        && raw
            .bytes()
            .zip(BLOCK_TIME_SHAPE)
            .all(|(c, &class)| match class {
                b'd' => c.is_ascii_digit(),
                literal => c == literal,
            });
    if !shaped || &raw[17..19] >= "60" {
        return Err(CollectError::BlockTime(raw.to_string()));
    }

    NaiveDateTime::parse_from_str(raw, BLOCK_TIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| CollectError::BlockTime(raw.to_string()))
}

/// Signed seconds from `then` to `now`.
pub fn lag_seconds(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    let delta = now.signed_duration_since(then);
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        // Beyond ~292 years of skew; millisecond precision is plenty
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

fn parse_count(field: &'static str, raw: &str) -> Result<u64, CollectError> {
    raw.parse::<u64>().map_err(|source| CollectError::Integer {
        field,
        value: raw.to_string(),
        source,
    })
}

/// Collects node health from one target.
#[derive(Clone, Debug)]
pub struct NodeCollector {
    client: NodeClient,
}

impl NodeCollector {
    /// Create a collector over the given node client.
    pub fn new(client: NodeClient) -> Self {
        Self { client }
    }

    /// Base URL of the monitored node.
    pub fn target(&self) -> &str {
        self.client.base_url()
    }

    /// Run one collection cycle.
    ///
    /// `/status` is fetched before `/net_info`; a failed status fetch means
    /// `/net_info` is never requested.
    pub async fn collect(&self) -> Result<MetricSet, CollectError> {
        let status: StatusResponse = self
            .client
            .get_json(STATUS_PATH)
            .await
            .map_err(|source| CollectError::Fetch {
                endpoint: STATUS_PATH,
                source,
            })?;

        let net_info: NetInfoResponse = self
            .client
            .get_json(NET_INFO_PATH)
            .await
            .map_err(|source| CollectError::Fetch {
                endpoint: NET_INFO_PATH,
                source,
            })?;

        let metrics = MetricSet::derive(&status, &net_info, Utc::now())?;

        debug!(
            node = %self.target(),
            block_height = metrics.block_height,
            block_time_lag = metrics.block_time_lag,
            peers = metrics.peers,
            "collected node metrics"
        );

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NetInfo, Status, SyncInfo};

    fn status(height: &str, time: &str) -> StatusResponse {
        StatusResponse {
            result: Status {
                sync_info: SyncInfo {
                    latest_block_height: height.to_string(),
                    latest_block_time: time.to_string(),
                },
            },
        }
    }

    fn net_info(peers: &str) -> NetInfoResponse {
        NetInfoResponse {
            result: NetInfo {
                n_peers: peers.to_string(),
            },
        }
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_derive_frozen_clock() {
        let metrics = MetricSet::derive(
            &status("100", "2023-01-01T00:00:00.000000000Z"),
            &net_info("4"),
            at("2023-01-01T00:00:10Z"),
        )
        .unwrap();

        assert_eq!(
            metrics,
            MetricSet {
                block_height: 100,
                block_time_lag: 10.0,
                peers: 4,
            }
        );
    }

    #[test]
    fn test_derive_sub_second_lag() {
        let metrics = MetricSet::derive(
            &status("18305112", "2023-11-20T09:14:03.250000000Z"),
            &net_info("42"),
            at("2023-11-20T09:14:05Z"),
        )
        .unwrap();

        assert_eq!(metrics.block_height, 18305112);
        assert_eq!(metrics.peers, 42);
        assert!((metrics.block_time_lag - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_future_block_time_gives_negative_lag() {
        let metrics = MetricSet::derive(
            &status("1", "2023-01-01T00:00:30.500000000Z"),
            &net_info("0"),
            at("2023-01-01T00:00:00Z"),
        )
        .unwrap();

        assert!((metrics.block_time_lag + 30.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_block_time_nanoseconds() {
        let parsed = parse_block_time("2023-11-20T09:14:03.123456789Z").unwrap();
        assert_eq!(parsed, at("2023-11-20T09:14:03.123456789Z"));
    }

    #[test]
    fn test_parse_block_time_rejects_other_layouts() {
        for raw in [
            "2023-01-01T00:00:00Z",
            "2023-01-01T00:00:00.123Z",
            "2023-01-01T00:00:00.1234567890Z",
            "2023-01-01T00:00:00.000000000+00:00",
            "2023-01-01T00:00:00.000000000",
            "2023-01-01 00:00:00.000000000Z",
            "2023-13-01T00:00:00.000000000Z",
            "2023-02-30T00:00:00.000000000Z",
            "2023-01-01T23:59:60.000000000Z",
            "2023-01-01T23:59:99.000000000Z",
            "",
        ] {
            assert!(
                matches!(parse_block_time(raw), Err(CollectError::BlockTime(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn test_parse_block_time_last_second_of_minute() {
        let parsed = parse_block_time("2023-01-01T23:59:59.999999999Z").unwrap();
        assert_eq!(parsed, at("2023-01-01T23:59:59.999999999Z"));
    }

    #[test]
    fn test_malformed_block_time_fails_derive() {
        let err = MetricSet::derive(
            &status("100", "2023-01-01T00:00:00Z"),
            &net_info("4"),
            Utc::now(),
        )
        .unwrap_err();

        assert_eq!(err.stage(), CollectStage::BlockTime);
    }

    #[test]
    fn test_non_numeric_height_fails() {
        let err = MetricSet::derive(
            &status("abc", "2023-01-01T00:00:00.000000000Z"),
            &net_info("4"),
            Utc::now(),
        )
        .unwrap_err();

        assert_eq!(err.stage(), CollectStage::BlockHeight);
        assert!(err.to_string().contains("latest_block_height 'abc'"));
    }

    #[test]
    fn test_bad_peer_counts_fail() {
        for raw in ["", "-1", "4.0", " 4"] {
            let err = MetricSet::derive(
                &status("100", "2023-01-01T00:00:00.000000000Z"),
                &net_info(raw),
                Utc::now(),
            )
            .unwrap_err();

            assert_eq!(err.stage(), CollectStage::Peers, "accepted {raw:?}");
        }
    }

    #[test]
    fn test_fetch_error_stages() {
        let status_err = CollectError::Fetch {
            endpoint: STATUS_PATH,
            source: FetchError::Timeout(std::time::Duration::from_secs(10)),
        };
        assert_eq!(status_err.stage(), CollectStage::Status);
        assert!(status_err.to_string().contains("/status"));

        let net_err = CollectError::Fetch {
            endpoint: NET_INFO_PATH,
            source: FetchError::Timeout(std::time::Duration::from_secs(10)),
        };
        assert_eq!(net_err.stage(), CollectStage::NetInfo);
    }

    #[tokio::test]
    async fn test_collect_unreachable_target() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let collector = NodeCollector::new(NodeClient::new(
            &format!("http://{}", addr),
            std::time::Duration::from_secs(2),
        ));

        let err = collector.collect().await.unwrap_err();
        assert_eq!(err.stage(), CollectStage::Status);
    }
}
