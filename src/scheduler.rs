//! Timer-driven collection trigger.
//!
//! Every tick asks the pipeline for a non-forced cycle, so a tick that lands
//! while the previous cycle is still in flight is coalesced.

use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::ControlError;
use crate::pipeline::NewsPipeline;

/// Spawn the collection timer. The first tick fires immediately.
/// `None` interval means manual triggering only.
pub fn spawn_scheduler(
    pipeline: Arc<NewsPipeline>,
    interval: Option<Duration>,
) -> Option<JoinHandle<()>> {
    let every = interval?;
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match pipeline.start_collection(false).await {
                Ok(outcome) => {
                    gauge!("scheduler_last_tick_ts").set(chrono::Utc::now().timestamp() as f64);
                    debug!(
                        target: "scheduler",
                        started = outcome.started(),
                        cycle = %outcome.token(),
                        "scheduler tick"
                    );
                }
                Err(ControlError::ShuttingDown) => break,
                Err(e) => warn!(target: "scheduler", error = %e, "scheduled trigger failed"),
            }
        }
        debug!(target: "scheduler", "scheduler stopped");
    }))
}
