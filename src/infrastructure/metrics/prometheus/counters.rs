use metrics::{counter, histogram};
use std::time::Instant;

/// Count a finished ceremony by kind and outcome.
pub fn increment_ceremony(ceremony: &'static str, outcome: &'static str) {
    counter!("passkey_ceremonies_total", "ceremony" => ceremony, "outcome" => outcome)
        .increment(1);
}

/// Count a successful invite or share claim.
pub fn increment_claim(source_type: &'static str) {
    counter!("entitlement_claims_total", "source_type" => source_type).increment(1);
}

/// Track HTTP request latency using a histogram.
pub fn track_http_request(start: Instant, path: &str, method: &str, status: u16) {
    // ---
    let elapsed = start.elapsed();
    histogram!(
        "http_request_duration_seconds",
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .record(elapsed);
}
