//! Network liveness probes for running services

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::{Error, Result};

/// Round-trip check against a service's port
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Returns the round-trip latency on success
    async fn probe(&self, service_id: &str, port: u16) -> Result<Duration>;
}

/// `GET /health` over HTTP on the loopback interface
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    host: String,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("Failed to build probe client: {}", e)))?;
        Ok(Self {
            client,
            host: "127.0.0.1".to_string(),
        })
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn probe(&self, service_id: &str, port: u16) -> Result<Duration> {
        let url = format!("http://{}:{}/health", self.host, port);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::HealthCheck {
                id: service_id.to_string(),
                message: format!("request to {} failed: {}", url, e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HealthCheck {
                id: service_id.to_string(),
                message: format!("{} returned {}", url, status),
            });
        }

        let elapsed = started.elapsed();
        trace!(
            service_id,
            port,
            latency_ms = elapsed.as_millis() as u64,
            "Health probe succeeded"
        );
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "{}\r\ncontent-type: application/json\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{{}}",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_probe_success() {
        let port = serve_once("HTTP/1.1 200 OK").await;
        let probe = HttpProbe::new(Duration::from_secs(2)).unwrap();
        assert!(probe.probe("svc-1", port).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_rejects_error_status() {
        let port = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let probe = HttpProbe::new(Duration::from_secs(2)).unwrap();
        let err = probe.probe("svc-1", port).await.unwrap_err();
        assert_eq!(err.code(), "HEALTH_CHECK_ERROR");
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::new(Duration::from_millis(500)).unwrap();
        assert!(probe.probe("svc-1", port).await.is_err());
    }
}
