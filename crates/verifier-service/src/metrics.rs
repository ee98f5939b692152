//! Metrics sink: owns the installed Prometheus recorder handle and
//! exposes typed methods so sources and the manager never format metric
//! names inline.
//!
//! Grounded on `service/api.rs`'s `metrics()` handler, generalized per
//! spec.md §9's design note ("metrics are held in a sink object owned by
//! the manager and shared by reference with each source") and mapped
//! onto the concrete metric names in spec.md §6 / SPEC_FULL §8.

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use verifier_core::{PulseResult, SourceState, VerifierResult};

/// Shared handle to the process's Prometheus recorder, plus typed
/// recording methods for every metric spec.md §6 names.
#[derive(Clone)]
pub struct MetricsSink {
    handle: PrometheusHandle,
}

impl MetricsSink {
    /// Installs the global Prometheus recorder. Must be called exactly
    /// once per process, before any `metrics::*!` macro use.
    ///
    /// # Errors
    /// Returns an error if a recorder is already installed.
    pub fn install() -> anyhow::Result<Self> {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| anyhow::anyhow!("cannot install metrics recorder: {e}"))?;
        Ok(Self { handle })
    }

    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// `collector_status{source}`: encodes the lifecycle state as the
    /// ordinal spec.md §9 assigns (0=starting,1=running,2=stopping,3=stopped).
    pub fn set_collector_state(&self, source: &str, state: SourceState) {
        let value = match state {
            SourceState::Starting => 0.0,
            SourceState::Running => 1.0,
            SourceState::Stopping => 2.0,
            SourceState::Stopped => 3.0,
        };
        metrics::gauge!("collector_status", "source" => source.to_string()).set(value);
    }

    /// `collector_buffer_size{source}`.
    pub fn set_buffer_size(&self, source: &str, size: usize) {
        metrics::gauge!("collector_buffer_size", "source" => source.to_string()).set(size as f64);
    }

    /// Increments `exceptions_number` by one.
    pub fn record_exception(&self) {
        metrics::counter!("exceptions_number").increment(1);
    }

    /// Records `pulse_number{chain}` and `pulse_status{code}` for one
    /// completed verification cycle.
    pub fn record_pulse(&self, result: &PulseResult) {
        if let Some(chain) = result.chain_id() {
            if let Some(id) = result.pulse_id() {
                metrics::gauge!("pulse_number", "chain" => chain.to_string()).set(id as f64);
            }
        }
        metrics::counter!("pulse_status", "code" => result.status.code().to_string()).increment(1);
    }

    /// Records every per-source metric spec.md §6 names for one
    /// [`VerifierResult`]: `verification_possible`,
    /// `verification_ext_value_status`, `verification_status`, and
    /// `verification_seconds`.
    pub fn record_verification(&self, result: &VerifierResult) {
        metrics::histogram!("verification_possible", "source" => result.scope.clone())
            .record(result.possible as f64);
        for (ext_val, set) in result.ext_value_map() {
            if set {
                metrics::histogram!(
                    "verification_ext_value_status",
                    "source" => result.scope.clone(),
                    "code" => ext_val,
                )
                .record(1.0);
            }
        }
        metrics::histogram!(
            "verification_status",
            "source" => result.scope.clone(),
            "code" => result.status.code().to_string(),
        )
        .record(1.0);
        metrics::histogram!("verification_seconds", "source" => result.scope.clone())
            .record(result.running_time());
    }
}

/// Builds the `/metrics` Axum router (spec.md §6: "Prometheus text
/// exposition, at `/metrics` on `metrics_port`").
#[must_use]
pub fn router(sink: MetricsSink) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(sink)
}

async fn metrics_handler(State(sink): State<MetricsSink>) -> String {
    sink.render()
}

#[cfg(test)]
impl MetricsSink {
    /// A sink with its own local recorder handle, for tests that need a
    /// `MetricsSink` without touching the process-global recorder
    /// (`install` may only succeed once per test binary).
    pub(crate) fn for_test() -> Self {
        Self { handle: PrometheusBuilder::new().build_recorder().handle() }
    }
}
