// SPDX-License-Identifier: MIT
//
// Under Construction Gate: Maintenance-Mode Front for Websites
// Copyright (c) 2025 Under Construction Gate Contributors

//! Metrics collection and reporting

use crate::gate::Decision;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Global metrics collector
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,

    // Gate decisions
    requests_total: AtomicU64,
    passed_disabled: AtomicU64,
    passed_role: AtomicU64,
    passed_ip: AtomicU64,
    notices_served: AtomicU64,

    // Settings and cache
    settings_saves: AtomicU64,
    purges_total: AtomicU64,
    purges_failed: AtomicU64,

    // Admin surface
    logins_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                requests_total: AtomicU64::new(0),
                passed_disabled: AtomicU64::new(0),
                passed_role: AtomicU64::new(0),
                passed_ip: AtomicU64::new(0),
                notices_served: AtomicU64::new(0),
                settings_saves: AtomicU64::new(0),
                purges_total: AtomicU64::new(0),
                purges_failed: AtomicU64::new(0),
                logins_failed: AtomicU64::new(0),
            }),
        }
    }

    // Gate metrics
    pub fn record_decision(&self, decision: Decision) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        let counter = match decision {
            Decision::Disabled => &self.inner.passed_disabled,
            Decision::RoleBypass => &self.inner.passed_role,
            Decision::IpBypass => &self.inner.passed_ip,
            Decision::Blocked => &self.inner.notices_served,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.inner.requests_total.load(Ordering::Relaxed)
    }

    pub fn notices_served(&self) -> u64 {
        self.inner.notices_served.load(Ordering::Relaxed)
    }

    pub fn bypasses(&self, decision: Decision) -> u64 {
        match decision {
            Decision::Disabled => self.inner.passed_disabled.load(Ordering::Relaxed),
            Decision::RoleBypass => self.inner.passed_role.load(Ordering::Relaxed),
            Decision::IpBypass => self.inner.passed_ip.load(Ordering::Relaxed),
            Decision::Blocked => 0,
        }
    }

    // Settings metrics
    pub fn record_settings_save(&self) {
        self.inner.settings_saves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn settings_saves(&self) -> u64 {
        self.inner.settings_saves.load(Ordering::Relaxed)
    }

    pub fn record_purge(&self) {
        self.inner.purges_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purge_failure(&self) {
        self.inner.purges_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn purges_total(&self) -> u64 {
        self.inner.purges_total.load(Ordering::Relaxed)
    }

    pub fn purges_failed(&self) -> u64 {
        self.inner.purges_failed.load(Ordering::Relaxed)
    }

    pub fn record_login_failure(&self) {
        self.inner.logins_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn logins_failed(&self) -> u64 {
        self.inner.logins_failed.load(Ordering::Relaxed)
    }

    // Derived metrics
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn prometheus_format(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP uc_requests_total Page requests evaluated by the gate\n");
        output.push_str("# TYPE uc_requests_total counter\n");
        output.push_str(&format!("uc_requests_total {}\n", self.requests_total()));

        output.push_str("# HELP uc_notices_served_total Requests answered with the notice\n");
        output.push_str("# TYPE uc_notices_served_total counter\n");
        output.push_str(&format!("uc_notices_served_total {}\n", self.notices_served()));

        output.push_str("# HELP uc_passed_total Requests let through, by reason\n");
        output.push_str("# TYPE uc_passed_total counter\n");
        for decision in [Decision::Disabled, Decision::RoleBypass, Decision::IpBypass] {
            output.push_str(&format!(
                "uc_passed_total{{reason=\"{}\"}} {}\n",
                decision.as_str(),
                self.bypasses(decision)
            ));
        }

        output.push_str("# HELP uc_settings_saves_total Settings form saves\n");
        output.push_str("# TYPE uc_settings_saves_total counter\n");
        output.push_str(&format!("uc_settings_saves_total {}\n", self.settings_saves()));

        output.push_str("# HELP uc_cache_purges_total Successful cache purges\n");
        output.push_str("# TYPE uc_cache_purges_total counter\n");
        output.push_str(&format!("uc_cache_purges_total {}\n", self.purges_total()));

        output.push_str("# HELP uc_cache_purges_failed_total Failed cache purges\n");
        output.push_str("# TYPE uc_cache_purges_failed_total counter\n");
        output.push_str(&format!("uc_cache_purges_failed_total {}\n", self.purges_failed()));

        output.push_str("# HELP uc_logins_failed_total Rejected admin logins\n");
        output.push_str("# TYPE uc_logins_failed_total counter\n");
        output.push_str(&format!("uc_logins_failed_total {}\n", self.logins_failed()));

        output.push_str("# HELP uc_uptime_seconds Service uptime in seconds\n");
        output.push_str("# TYPE uc_uptime_seconds gauge\n");
        output.push_str(&format!("uc_uptime_seconds {}\n", self.uptime_seconds()));

        output
    }
}
