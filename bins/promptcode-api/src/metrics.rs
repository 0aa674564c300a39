// Prometheus metrics for the PromptCode API

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref SUBMISSIONS_ACCEPTED: IntCounter = IntCounter::new(
        "promptcode_submissions_accepted_total",
        "Submissions validated and queued"
    )
    .expect("metric definition is valid");

    pub static ref SUBMISSIONS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("promptcode_submissions_rejected_total", "Submissions rejected by validation"),
        &["reason"]
    )
    .expect("metric definition is valid");

    pub static ref RESULTS_SERVED: IntCounter = IntCounter::new(
        "promptcode_results_served_total",
        "Submission results returned to clients"
    )
    .expect("metric definition is valid");

    pub static ref RESULT_SCORE: Histogram = Histogram::with_opts(
        HistogramOpts::new("promptcode_result_score", "Overall score of served results")
            .buckets(vec![0.0, 0.25, 0.5, 0.75, 0.9, 1.0])
    )
    .expect("metric definition is valid");
}

/// Register every metric with the registry. Call once at startup.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(SUBMISSIONS_ACCEPTED.clone()))?;
    REGISTRY.register(Box::new(SUBMISSIONS_REJECTED.clone()))?;
    REGISTRY.register(Box::new(RESULTS_SERVED.clone()))?;
    REGISTRY.register(Box::new(RESULT_SCORE.clone()))?;
    Ok(())
}

/// Render all registered metrics in the text exposition format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
