use crate::error::CollectorError;
use async_trait::async_trait;
use model::period::ReportPeriod;
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

/// A job that refreshes upstream data (grading feeds, auction prices) the
/// farm reports read from.
#[async_trait]
pub trait UpstreamCollector: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the number of rows collected.
    async fn collect(&self, period: &ReportPeriod) -> Result<u64, CollectorError>;
}

/// Runs every collector in registration order. Failures are logged and
/// skipped; returns how many collectors succeeded.
pub async fn run_collectors(
    collectors: &[Arc<dyn UpstreamCollector>],
    period: &ReportPeriod,
) -> usize {
    let mut succeeded = 0;
    for collector in collectors {
        let started = Instant::now();
        match collector.collect(period).await {
            Ok(rows) => {
                succeeded += 1;
                info!(
                    collector = collector.name(),
                    rows,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Collector finished"
                );
            }
            Err(err) => warn!(collector = collector.name(), error = %err, "Collector failed, continuing"),
        }
    }
    succeeded
}
