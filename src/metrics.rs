//! Prometheus metrics registration and export.
//!
//! Metrics live in `OnceLock` statics and are created by `init_metrics`.
//! The `record_*` helpers are no-ops until then, so library code can record
//! unconditionally and tests never need a registry.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all quiz-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Pipeline runs, labeled by pipeline and outcome.
pub static PIPELINE_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Structured agent calls, labeled by agent and outcome.
pub static AGENT_CALLS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Node execution time in seconds, labeled by pipeline and node.
pub static NODE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. A second call is a no-op.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let pipeline_runs = CounterVec::new(
        Opts::new("quiz_forge_pipeline_runs_total", "Total pipeline runs"),
        &["pipeline", "outcome"],
    )?;

    let agent_calls = CounterVec::new(
        Opts::new("quiz_forge_agent_calls_total", "Total structured agent calls"),
        &["agent", "outcome"],
    )?;

    let node_duration = HistogramVec::new(
        HistogramOpts::new(
            "quiz_forge_node_duration_seconds",
            "Workflow node execution time in seconds",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]),
        &["pipeline", "node"],
    )?;

    registry.register(Box::new(pipeline_runs.clone()))?;
    registry.register(Box::new(agent_calls.clone()))?;
    registry.register(Box::new(node_duration.clone()))?;

    let _ = PIPELINE_RUNS_TOTAL.set(pipeline_runs);
    let _ = AGENT_CALLS_TOTAL.set(agent_calls);
    let _ = NODE_DURATION.set(node_duration);
    let _ = REGISTRY.set(registry);

    Ok(())
}

/// Records the outcome of one pipeline run.
pub fn record_pipeline_run(pipeline: &str, outcome: &str) {
    if let Some(counter) = PIPELINE_RUNS_TOTAL.get() {
        counter.with_label_values(&[pipeline, outcome]).inc();
    }
}

/// Records the outcome of one structured agent attempt.
pub fn record_agent_call(agent: &str, outcome: &str) {
    if let Some(counter) = AGENT_CALLS_TOTAL.get() {
        counter.with_label_values(&[agent, outcome]).inc();
    }
}

/// Records how long a workflow node took.
pub fn record_node_duration(pipeline: &str, node: &str, seconds: f64) {
    if let Some(histogram) = NODE_DURATION.get() {
        histogram.with_label_values(&[pipeline, node]).observe(seconds);
    }
}

/// Renders all registered metrics in the Prometheus text format.
///
/// Returns an empty string if metrics were never initialised.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return String::new();
    };

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_export() {
        init_metrics().expect("metrics register");
        // Idempotent.
        init_metrics().expect("second init is a no-op");

        record_pipeline_run("quiz_creation", "success");
        record_agent_call("summarize", "success");
        record_node_duration("quiz_creation", "summarize", 0.25);

        let text = export_metrics();
        assert!(text.contains("quiz_forge_pipeline_runs_total"));
        assert!(text.contains("quiz_forge_agent_calls_total"));
        assert!(text.contains("quiz_forge_node_duration_seconds"));
    }
}
