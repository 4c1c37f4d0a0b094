//! HTTP JSON publisher
//!
//! Each batch is POSTed as one JSON document in the shape of a
//! `PutMetricData` request: `{"Namespace": .., "MetricData": [..]}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Error, Publish};
use crate::datum::DataPoint;

fn default_timeout_milliseconds() -> u64 {
    5_000
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration for [`Http`]
pub struct Config {
    /// URI batches are POSTed to
    pub uri: String,
    /// Per-request timeout. A batch that takes longer fails.
    #[serde(default = "default_timeout_milliseconds")]
    pub timeout_milliseconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRequest<'a> {
    namespace: &'a str,
    metric_data: &'a [DataPoint],
}

/// Publishes batches over HTTP.
#[derive(Debug)]
pub struct Http {
    uri: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl Http {
    /// Create a new [`Http`] publisher.
    ///
    /// # Errors
    ///
    /// Function will error if the TLS backend cannot be initialized.
    pub fn new(config: Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            uri: config.uri,
            timeout: Duration::from_millis(config.timeout_milliseconds),
            client,
        })
    }
}

#[async_trait]
impl Publish for Http {
    async fn publish(&self, namespace: &str, data: &[DataPoint]) -> Result<(), Error> {
        let body = PutRequest {
            namespace,
            metric_data: data,
        };
        let resp = self
            .client
            .post(&self.uri)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        trace!("published {} points to {}: {status}", data.len(), self.uri);
        if !status.is_success() {
            return Err(Error::Status(status));
        }
        Ok(())
    }
}
