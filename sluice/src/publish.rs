//! Delivery of data point batches to the monitoring backend.
//!
//! The reporter hands each [`Publish`] implementation at most
//! [`MAX_BATCH_SIZE`] points per call. Publishers do not retry: a failed
//! batch is reported to the caller and is gone.

use async_trait::async_trait;
use serde::Deserialize;

use crate::datum::DataPoint;

pub mod http;
pub mod log;

/// The most data points a single publish call may carry.
pub const MAX_BATCH_SIZE: usize = 20;

/// Errors produced by [`Publish`] implementations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request could not be built, sent or completed in time.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("Backend rejected batch with status {0}")]
    Status(reqwest::StatusCode),
}

/// A sink for batches of [`DataPoint`].
#[async_trait]
pub trait Publish: Send + Sync {
    /// Publish `data` under `namespace`. Callers never pass more than
    /// [`MAX_BATCH_SIZE`] points.
    async fn publish(&self, namespace: &str, data: &[DataPoint]) -> Result<(), Error>;
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Configuration for [`Publisher`]
pub enum Config {
    /// See [`crate::publish::http::Http`] for details.
    Http(http::Config),
    /// See [`crate::publish::log::Log`] for details.
    Log,
}

/// The publisher chosen by [`Config`].
#[derive(Debug)]
pub enum Publisher {
    /// See [`crate::publish::http::Http`] for details.
    Http(http::Http),
    /// See [`crate::publish::log::Log`] for details.
    Log(log::Log),
}

impl Publisher {
    /// Create a new [`Publisher`] instance
    ///
    /// # Errors
    ///
    /// Function will error if the HTTP client cannot be constructed.
    pub fn new(config: Config) -> Result<Self, Error> {
        Ok(match config {
            Config::Http(conf) => Self::Http(http::Http::new(conf)?),
            Config::Log => Self::Log(log::Log),
        })
    }
}

#[async_trait]
impl Publish for Publisher {
    async fn publish(&self, namespace: &str, data: &[DataPoint]) -> Result<(), Error> {
        match self {
            Publisher::Http(inner) => inner.publish(namespace, data).await,
            Publisher::Log(inner) => inner.publish(namespace, data).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_publisher_accepts_a_batch() {
        let publisher = Publisher::new(Config::Log).unwrap();
        assert!(matches!(publisher, Publisher::Log(_)));

        let data: Vec<DataPoint> = (0..MAX_BATCH_SIZE)
            .map(|i| DataPoint {
                name: format!("point-{i}"),
                value: 1.0,
                timestamp: 0,
                unit: None,
                dimensions: vec![],
            })
            .collect();
        publisher.publish("Sluice/Test", &data).await.unwrap();
        publisher.publish("Sluice/Test", &[]).await.unwrap();
    }

    #[test]
    fn http_config_builds_http_publisher() {
        let publisher = Publisher::new(Config::Http(http::Config {
            uri: "http://localhost:8080/put".to_string(),
            timeout_milliseconds: 100,
        }))
        .unwrap();
        assert!(matches!(publisher, Publisher::Http(_)));
    }
}
