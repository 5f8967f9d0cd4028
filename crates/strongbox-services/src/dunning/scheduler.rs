use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::engine::DunningEngine;

/// In-process trigger for the dunning runner
#[derive(Clone)]
pub struct DunningScheduler {
    engine: Arc<DunningEngine>,
    period: Duration,
}

impl DunningScheduler {
    pub fn new(engine: Arc<DunningEngine>, interval_secs: u64) -> Self {
        Self {
            engine,
            period: Duration::from_secs(interval_secs.max(1)),
        }
    }

    /// Start the background task. The first run happens immediately.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);

            loop {
                ticker.tick().await;

                tracing::info!("Starting scheduled dunning run");

                match self.engine.run().await {
                    Ok(summary) => tracing::info!(
                        processed = summary.processed,
                        recovered = summary.recovered,
                        errors = summary.errors,
                        "Scheduled dunning run completed"
                    ),
                    Err(e) => tracing::error!(error = %e, "Scheduled dunning run failed"),
                }
            }
        })
    }
}
