//! Prometheus exposition of collected node metrics.
//!
//! The gauge descriptors are built once and handed to the [`Exporter`].
//! Every scrape runs a fresh collection and encodes whatever it produced
//! together with the exporter's own failure counter.

use prometheus_client::collector::Collector;
use prometheus_client::encoding::text::{encode_eof, encode_registry};
use prometheus_client::encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::ConstGauge;
use prometheus_client::registry::Registry;
use tracing::warn;

use crate::metrics::collector::{CollectStage, MetricSet, NodeCollector};

/// Name and help text of one unlabelled gauge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub name: &'static str,
    pub help: &'static str,
}

/// Descriptors of the three node gauges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptors {
    pub block_height: Descriptor,
    pub block_time_lag: Descriptor,
    pub peers: Descriptor,
}

impl Descriptors {
    pub fn new() -> Self {
        Self {
            block_height: Descriptor {
                name: "gaia_latest_block_height",
                help: "The latest block height",
            },
            block_time_lag: Descriptor {
                name: "gaia_latest_block_time_lag",
                help: "Delta in seconds between localtime and latest block time",
            },
            peers: Descriptor {
                name: "gaia_number_of_peers",
                help: "Number of peers",
            },
        }
    }
}

impl Default for Descriptors {
    fn default() -> Self {
        Self::new()
    }
}

/// One scrape's metric set bound to its descriptors.
#[derive(Debug)]
struct Snapshot {
    descriptors: Descriptors,
    metrics: MetricSet,
}

impl Collector for Snapshot {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), std::fmt::Error> {
        // Heights and peer counts never approach i64::MAX; saturate rather than wrap.
        let block_height =
            ConstGauge::new(i64::try_from(self.metrics.block_height).unwrap_or(i64::MAX));
        let block_time_lag = ConstGauge::new(self.metrics.block_time_lag);
        let peers = ConstGauge::new(i64::try_from(self.metrics.peers).unwrap_or(i64::MAX));

        encode_gauge(&mut encoder, &self.descriptors.block_height, &block_height)?;
        encode_gauge(&mut encoder, &self.descriptors.block_time_lag, &block_time_lag)?;
        encode_gauge(&mut encoder, &self.descriptors.peers, &peers)?;
        Ok(())
    }
}

fn encode_gauge(
    encoder: &mut DescriptorEncoder,
    descriptor: &Descriptor,
    gauge: &impl EncodeMetric,
) -> Result<(), std::fmt::Error> {
    let metric_encoder =
        encoder.encode_descriptor(descriptor.name, descriptor.help, None, gauge.metric_type())?;
    gauge.encode(metric_encoder)?;
    Ok(())
}

/// Labels for the collection failure counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailureLabels {
    pub stage: CollectStage,
}

/// Serves scrapes: collects from the node and encodes the result.
#[derive(Debug)]
pub struct Exporter {
    collector: NodeCollector,
    descriptors: Descriptors,
    /// Collection failures by stage.
    failures: Family<FailureLabels, Counter>,
    /// Registry for the exporter's own metrics.
    registry: Registry,
}

impl Exporter {
    /// Create an exporter over `collector` using the given descriptors.
    pub fn new(collector: NodeCollector, descriptors: Descriptors) -> Self {
        let mut registry = Registry::default();
        let failures = Family::<FailureLabels, Counter>::default();

        registry.register(
            "gaia_exporter_collection_failures",
            "Number of scrapes whose node collection failed, by failed step",
            failures.clone(),
        );

        Self {
            collector,
            descriptors,
            failures,
            registry,
        }
    }

    /// The collector used for each scrape.
    pub fn collector(&self) -> &NodeCollector {
        &self.collector
    }

    /// Run a collection and encode the text exposition.
    ///
    /// A failed collection is logged and counted; the output then carries no
    /// node gauges but is otherwise well-formed.
    pub async fn scrape(&self) -> Result<String, std::fmt::Error> {
        let snapshot = match self.collector.collect().await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(
                    node = %self.collector.target(),
                    stage = e.stage().as_str(),
                    error = %e,
                    "collection failed"
                );
                self.failures
                    .get_or_create(&FailureLabels { stage: e.stage() })
                    .inc();
                None
            }
        };

        self.encode(snapshot)
    }

    /// Encode an optional metric set plus the exporter's own metrics.
    pub fn encode(&self, snapshot: Option<MetricSet>) -> Result<String, std::fmt::Error> {
        let mut scrape_registry = Registry::default();
        if let Some(metrics) = snapshot {
            scrape_registry.register_collector(Box::new(Snapshot {
                descriptors: self.descriptors.clone(),
                metrics,
            }));
        }

        let mut buffer = String::new();
        encode_registry(&mut buffer, &scrape_registry)?;
        encode_registry(&mut buffer, &self.registry)?;
        encode_eof(&mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeClient;
    use std::time::Duration;

    fn exporter(target: &str) -> Exporter {
        let client = NodeClient::new(target, Duration::from_secs(1));
        Exporter::new(NodeCollector::new(client), Descriptors::new())
    }

    #[test]
    fn test_descriptor_names() {
        let descriptors = Descriptors::new();
        assert_eq!(descriptors.block_height.name, "gaia_latest_block_height");
        assert_eq!(descriptors.block_time_lag.name, "gaia_latest_block_time_lag");
        assert_eq!(descriptors.peers.name, "gaia_number_of_peers");
    }

    #[test]
    fn test_encode_metric_set() {
        let exporter = exporter("http://127.0.0.1:26657");
        let output = exporter
            .encode(Some(MetricSet {
                block_height: 100,
                block_time_lag: 10.0,
                peers: 4,
            }))
            .unwrap();

        assert!(output.contains("# HELP gaia_latest_block_height The latest block height"));
        assert!(output.contains("# TYPE gaia_latest_block_height gauge"));
        assert!(output.contains("gaia_latest_block_height 100\n"));
        assert!(output.contains("# TYPE gaia_latest_block_time_lag gauge"));
        assert!(output.contains("gaia_latest_block_time_lag 10.0\n"));
        assert!(output.contains("gaia_number_of_peers 4\n"));
        assert!(output.ends_with("# EOF\n"));
        assert_eq!(output.matches("# EOF").count(), 1);
    }

    #[test]
    fn test_encode_negative_lag() {
        let exporter = exporter("http://127.0.0.1:26657");
        let output = exporter
            .encode(Some(MetricSet {
                block_height: 1,
                block_time_lag: -2.5,
                peers: 0,
            }))
            .unwrap();

        assert!(output.contains("gaia_latest_block_time_lag -2.5\n"));
    }

    #[test]
    fn test_encode_without_metric_set() {
        let exporter = exporter("http://127.0.0.1:26657");
        let output = exporter.encode(None).unwrap();

        assert!(!output.contains("gaia_latest_block_height"));
        assert!(!output.contains("gaia_number_of_peers"));
        assert!(output.ends_with("# EOF\n"));
    }

    #[tokio::test]
    async fn test_scrape_counts_failures() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let exporter = exporter(&format!("http://{}", addr));
        let _ = exporter.scrape().await.unwrap();
        let output = exporter.scrape().await.unwrap();

        assert!(!output.contains("gaia_latest_block_height"));
        assert!(output.contains("gaia_exporter_collection_failures_total{stage=\"status\"} 2"));
    }

    #[tokio::test]
    async fn test_failure_stage_labels_are_snake_case() {
        // Valid /status, undecodable /net_info
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let body = if request.starts_with("GET /status ") {
                    r#"{"result":{"sync_info":{"latest_block_height":"1","latest_block_time":"2023-01-01T00:00:00.000000000Z"}}}"#
                } else {
                    "not json"
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        let exporter = exporter(&format!("http://{}", addr));
        let output = exporter.scrape().await.unwrap();

        assert!(output.contains("gaia_exporter_collection_failures_total{stage=\"net_info\"} 1"));
        assert!(!output.contains("NetInfo"));
    }

    #[test]
    fn test_stage_label_values() {
        assert_eq!(CollectStage::Status.as_str(), "status");
        assert_eq!(CollectStage::NetInfo.as_str(), "net_info");
        assert_eq!(CollectStage::BlockTime.as_str(), "block_time");
        assert_eq!(CollectStage::BlockHeight.as_str(), "block_height");
        assert_eq!(CollectStage::Peers.as_str(), "peers");
    }
}
