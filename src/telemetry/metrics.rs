//! Prometheus metrics setup and metric definitions

use metrics::{counter, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let buckets = [
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets(&buckets)?
        .install_recorder()?;
    Ok(handle)
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines from startup.
pub fn describe_metrics() {
    describe_counter!(
        "rollcall_invites_sent_total",
        "Invitation emails sent, by kind (email/resend/multiuse)"
    );
    describe_counter!(
        "rollcall_confirmations_total",
        "Confirmation key resolutions by result"
    );
    describe_counter!(
        "rollcall_scheduled_emails_total",
        "Scheduled email operations by outcome"
    );
    describe_counter!(
        "rollcall_registrations_total",
        "Completed registrations by source"
    );
    describe_histogram!(
        "rollcall_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    counter!("rollcall_invites_sent_total", "kind" => "email").absolute(0);
    counter!("rollcall_confirmations_total", "result" => "ok").absolute(0);
    counter!("rollcall_scheduled_emails_total", "outcome" => "delivered").absolute(0);
    counter!("rollcall_registrations_total", "source" => "invitation").absolute(0);
}

/// Record one confirmation resolution outcome
pub fn record_confirmation(result: &'static str) {
    counter!("rollcall_confirmations_total", "result" => result).increment(1);
}

/// Record invitations sent
pub fn record_invites_sent(kind: &'static str, count: u64) {
    counter!("rollcall_invites_sent_total", "kind" => kind).increment(count);
}

pub fn record_scheduled_email(outcome: &'static str) {
    counter!("rollcall_scheduled_emails_total", "outcome" => outcome).increment(1);
}

pub fn record_registration(source: &'static str) {
    counter!("rollcall_registrations_total", "source" => source).increment(1);
}
