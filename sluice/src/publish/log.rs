//! Publisher that writes data points to the log instead of a backend. Useful
//! for trying out a filter configuration.

use async_trait::async_trait;
use tracing::info;

use super::{Error, Publish};
use crate::datum::DataPoint;

/// Logs every data point at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct Log;

#[async_trait]
impl Publish for Log {
    async fn publish(&self, namespace: &str, data: &[DataPoint]) -> Result<(), Error> {
        for point in data {
            info!(
                namespace,
                name = %point.name,
                value = point.value,
                unit = ?point.unit,
                timestamp = point.timestamp,
                "data point"
            );
        }
        Ok(())
    }
}
