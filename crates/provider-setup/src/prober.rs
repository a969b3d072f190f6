use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    chatdesk_common::ProviderId,
    chrono::{DateTime, Utc},
    tracing::{info, warn},
};

use crate::{
    backend::{ConnectionReport, ProviderBackend, bounded},
    provider::{Credentials, TestResult},
};

/// Single connectivity check against a candidate credential set.
///
/// Holds no state between calls. Every outcome, including transport errors
/// and timeouts, comes back as a [`TestResult`].
#[derive(Clone)]
pub struct ConnectivityProber {
    backend: Arc<dyn ProviderBackend>,
    timeout: Duration,
}

impl ConnectivityProber {
    pub fn new(backend: Arc<dyn ProviderBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn probe(&self, provider: &ProviderId, credentials: &Credentials) -> TestResult {
        let started = Instant::now();
        let outcome = bounded(
            "testProviderConnection",
            self.timeout,
            self.backend.test_provider_connection(provider, credentials),
        )
        .await;
        let measured_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(report) => {
                let result = from_report(report, measured_ms);
                if result.success {
                    info!(provider = %provider, latency_ms = result.latency_ms, "connection test passed");
                } else {
                    warn!(provider = %provider, message = %result.message, "connection test failed");
                }
                result
            },
            Err(e) => {
                warn!(provider = %provider, error = %e, "connection test failed");
                TestResult {
                    success: false,
                    message: e.to_string(),
                    latency_ms: Some(measured_ms),
                    timestamp: Utc::now(),
                }
            },
        }
    }
}

fn from_report(report: ConnectionReport, measured_ms: u64) -> TestResult {
    let message = if report.message.trim().is_empty() {
        if report.success {
            "Connection successful".to_string()
        } else {
            "Connection failed".to_string()
        }
    } else {
        report.message
    };
    let latency_ms = report
        .latency
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.round() as u64)
        .unwrap_or(measured_ms);
    let timestamp = DateTime::parse_from_rfc3339(&report.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    TestResult {
        success: report.success,
        message,
        latency_ms: Some(latency_ms),
        timestamp,
    }
}
