//! Prometheus metrics (lock-free atomics).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- Traffic ---
    pub relay_total: AtomicU64,
    pub relay_success: AtomicU64,
    pub relay_error: AtomicU64,
    pub admission_rejected: AtomicU64,

    pub relay_duration_us_sum: AtomicU64,

    // --- Background loops ---
    pub bootstrap_passes: AtomicU64,
    pub registrations: AtomicU64,
    pub hub_reconfigurations: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            relay_total: AtomicU64::new(0),
            relay_success: AtomicU64::new(0),
            relay_error: AtomicU64::new(0),
            admission_rejected: AtomicU64::new(0),
            relay_duration_us_sum: AtomicU64::new(0),
            bootstrap_passes: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            hub_reconfigurations: AtomicU64::new(0),
        }
    }

    pub fn record_relay_duration(&self, start: Instant) {
        let us = start.elapsed().as_micros() as u64;
        self.relay_duration_us_sum.fetch_add(us, Ordering::Relaxed);
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self, ready: bool) -> String {
        let relay_total = self.relay_total.load(Ordering::Relaxed);
        let relay_success = self.relay_success.load(Ordering::Relaxed);
        let relay_error = self.relay_error.load(Ordering::Relaxed);
        let rejected = self.admission_rejected.load(Ordering::Relaxed);
        let dur_sum_s = self.relay_duration_us_sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let passes = self.bootstrap_passes.load(Ordering::Relaxed);
        let registrations = self.registrations.load(Ordering::Relaxed);
        let reconfigurations = self.hub_reconfigurations.load(Ordering::Relaxed);
        let ready = u8::from(ready);

        format!(
            "\
# HELP relay_requests_total Relay requests admitted to the handler.\n\
# TYPE relay_requests_total counter\n\
relay_requests_total {relay_total}\n\
# HELP relay_success_total Relay requests signed and broadcast.\n\
# TYPE relay_success_total counter\n\
relay_success_total {relay_success}\n\
# HELP relay_error_total Relay requests that failed to decode or relay.\n\
# TYPE relay_error_total counter\n\
relay_error_total {relay_error}\n\
# HELP relay_admission_rejected_total Relay requests refused before dispatch.\n\
# TYPE relay_admission_rejected_total counter\n\
relay_admission_rejected_total {rejected}\n\
# HELP relay_duration_seconds_sum Total relay handler time (seconds).\n\
# TYPE relay_duration_seconds_sum counter\n\
relay_duration_seconds_sum {dur_sum_s:.6}\n\
# HELP relay_bootstrap_passes_total Completed bootstrap passes.\n\
# TYPE relay_bootstrap_passes_total counter\n\
relay_bootstrap_passes_total {passes}\n\
# HELP relay_registrations_total Successful keep-alive registrations.\n\
# TYPE relay_registrations_total counter\n\
relay_registrations_total {registrations}\n\
# HELP relay_hub_reconfigurations_total Hub address changes.\n\
# TYPE relay_hub_reconfigurations_total counter\n\
relay_hub_reconfigurations_total {reconfigurations}\n\
# HELP relay_ready Whether the relay admits requests.\n\
# TYPE relay_ready gauge\n\
relay_ready {ready}\n"
        )
    }
}
