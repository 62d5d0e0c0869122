//! Prometheus metrics HTTP server.
//!
//! Each request to the metrics path triggers one collection from the node.

use crate::metrics::Exporter;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Content type of the OpenMetrics text produced by `prometheus-client`.
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Prometheus metrics HTTP server.
pub struct MetricsServer {
    /// Bound listener.
    listener: TcpListener,
    /// Path for metrics endpoint.
    path: String,
    /// Collects and encodes on each scrape.
    exporter: Arc<Exporter>,
}

impl MetricsServer {
    /// Bind the metrics server.
    ///
    /// Binding is the only fallible step; once bound the server never exits
    /// on its own.
    pub async fn bind(
        address: SocketAddr,
        path: String,
        exporter: Arc<Exporter>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;

        info!(address = %listener.local_addr()?, path = %path, "metrics server bound");

        Ok(Self {
            listener,
            path,
            exporter,
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the metrics server until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(target_node = %self.exporter.collector().target(), "metrics server started");

        let path = Arc::new(self.path);

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let exporter = Arc::clone(&self.exporter);
                            let path = Arc::clone(&path);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let exporter = Arc::clone(&exporter);
                                    let path = Arc::clone(&path);
                                    async move {
                                        handle_request(req, &exporter, &path).await
                                    }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(error = %e, "metrics connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept metrics connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("metrics server shutting down");
                    break;
                }
            }
        }
    }
}

/// Handle an incoming metrics request.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    exporter: &Exporter,
    metrics_path: &str,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let method = req.method();

    debug!(path = %path, method = %method, "metrics request");

    if method != Method::GET {
        return Ok(text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed\n".to_string(),
        ));
    }

    if path == metrics_path {
        match exporter.scrape().await {
            Ok(body) => {
                let mut response = text_response(StatusCode::OK, body);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(OPENMETRICS_CONTENT_TYPE));
                Ok(response)
            }
            Err(e) => {
                error!(error = %e, "failed to encode metrics");
                Ok(text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to encode metrics\n".to_string(),
                ))
            }
        }
    } else if path == "/health" || path == "/healthz" {
        Ok(text_response(StatusCode::OK, "OK\n".to_string()))
    } else if path == "/" {
        let body = format!(
            "gaia-exporter\n\nTarget: {}\n\nEndpoints:\n  {} - Prometheus metrics\n  /health - Health check\n",
            exporter.collector().target(),
            metrics_path
        );
        Ok(text_response(StatusCode::OK, body))
    } else {
        Ok(text_response(StatusCode::NOT_FOUND, "Not found\n".to_string()))
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
