//! Shared collector lifecycle and verify contract for every concrete
//! source.
//!
//! Grounded on `original_source/verifier/core/abstract_source.py`: each
//! source owns a dedicated single-threaded runtime (the Python original
//! spins up its own `asyncio` event loop on its own OS thread), a stop
//! signal, and a `run_collector` loop that restarts `collect()` after a
//! fixed delay whenever it errors, logging the exception instead of
//! propagating it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::result::VerifierResult;

/// Delay before a crashed collector is restarted (spec.md §5,
/// `original_source`'s `AbstractSource.RESTART_TIME`).
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Observable collector lifecycle state, mirrored into the
/// `collector_status{source}` metric (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SourceState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// Opaque extraction parameters handed to `verify` for one pulse,
/// decoded from the beacon's `extValue` response (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyParams {
    pub metadata: String,
    pub raw: String,
    pub status: u32,
}

/// Lifecycle and verification contract shared by every concrete source.
///
/// Implementors run entirely on the dedicated single-threaded runtime
/// the manager spins up for them (SPEC_FULL §6); `collect` and `verify`
/// are never invoked concurrently with each other.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable name used in logs, metrics labels, and `params` lookup.
    fn name(&self) -> &str;

    /// One-time setup before the collection loop starts.
    async fn init_collector(&mut self) -> anyhow::Result<()>;

    /// Single collection step; called repeatedly until stopped.
    async fn collect(&mut self) -> anyhow::Result<()>;

    /// Teardown once the stop signal is observed.
    async fn finish_collector(&mut self) -> anyhow::Result<()>;

    /// Verifies one pulse's extraction parameters against the buffer.
    ///
    /// Must never fail: every path returns a [`VerifierResult`],
    /// including unexpected internal errors (recorded as status 299 by
    /// the caller if this trait object's implementation cannot produce
    /// one itself).
    async fn verify(&mut self, params: &VerifyParams) -> VerifierResult;

    /// Count of currently buffered entries that are still marker
    /// candidates, used to populate `VerifierResult::possible` and the
    /// `verification_possible{source}` metric.
    fn possible(&self) -> usize;

    /// Current buffer occupancy, for `collector_buffer_size{source}`.
    fn buffer_len(&self) -> usize;
}

/// Drives a [`Source`]'s collection loop with the restart discipline
/// from `original_source`'s `run_collector`: on any error from
/// `collect()`, log it, sleep [`RESTART_DELAY`], and start over from
/// `init_collector()`. Returns only once `stop` fires and
/// `finish_collector` completes.
pub async fn run_collector<S: Source + ?Sized>(
    source: &mut S,
    mut stop: tokio::sync::watch::Receiver<bool>,
    on_state: impl Fn(SourceState),
) {
    on_state(SourceState::Starting);
    loop {
        info!(source = source.name(), "starting collector");
        let outcome = run_until_stopped(source, &mut stop, &on_state).await;
        match outcome {
            Ok(()) => {
                on_state(SourceState::Stopping);
                if let Err(e) = source.finish_collector().await {
                    error!(source = source.name(), error = %e, "error finishing collector");
                }
                on_state(SourceState::Stopped);
                return;
            }
            Err(e) => {
                error!(
                    source = source.name(),
                    error = %e,
                    "exception in collector, restarting in {:?}",
                    RESTART_DELAY
                );
                tokio::time::sleep(RESTART_DELAY).await;
            }
        }
    }
}

async fn run_until_stopped<S: Source + ?Sized>(
    source: &mut S,
    stop: &mut tokio::sync::watch::Receiver<bool>,
    on_state: &impl Fn(SourceState),
) -> anyhow::Result<()> {
    source.init_collector().await?;
    on_state(SourceState::Running);
    while !*stop.borrow() {
        source.collect().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels_match_metric_vocabulary() {
        assert_eq!(SourceState::Starting.as_str(), "starting");
        assert_eq!(SourceState::Running.as_str(), "running");
        assert_eq!(SourceState::Stopping.as_str(), "stopping");
        assert_eq!(SourceState::Stopped.as_str(), "stopped");
    }
}
