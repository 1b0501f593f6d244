//! Per-service request counters and resource sampling

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use sysinfo::{Pid, System};

use crate::service::ServiceMetrics;

/// Rolling counters for one service
///
/// The average response time only covers the last `window` samples.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    window: usize,
    samples: VecDeque<f64>,
    request_count: u64,
    error_count: u64,
    peak_memory_bytes: u64,
    peak_cpu_percent: f32,
    started_at: DateTime<Utc>,
}

impl MetricsTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            request_count: 0,
            error_count: 0,
            peak_memory_bytes: 0,
            peak_cpu_percent: 0.0,
            started_at: Utc::now(),
        }
    }

    /// Reset the uptime origin, keeping counters
    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.started_at = at;
    }

    pub fn record_request(&mut self, latency_ms: f64) {
        self.request_count += 1;
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms.max(0.0));
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Fold one resource sample into the peaks
    pub fn record_resources(&mut self, memory_bytes: u64, cpu_percent: f32) {
        self.peak_memory_bytes = self.peak_memory_bytes.max(memory_bytes);
        if cpu_percent > self.peak_cpu_percent {
            self.peak_cpu_percent = cpu_percent;
        }
    }

    pub fn average_response_time_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn snapshot(&self, service_id: &str) -> ServiceMetrics {
        let now = Utc::now();
        ServiceMetrics {
            service_id: service_id.to_string(),
            request_count: self.request_count,
            error_count: self.error_count,
            average_response_time_ms: self.average_response_time_ms(),
            peak_memory_bytes: self.peak_memory_bytes,
            peak_cpu_percent: self.peak_cpu_percent,
            uptime_seconds: now
                .signed_duration_since(self.started_at)
                .num_seconds()
                .max(0) as u64,
            computed_at: now,
        }
    }
}

/// Samples memory and CPU usage of child processes
pub struct ProcessSampler {
    system: System,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Resident memory in bytes and CPU percent of `pid`, if it still exists
    ///
    /// CPU usage is computed against the previous refresh of the same pid, so
    /// the first sample of a process reports 0.
    pub fn sample(&mut self, pid: u32) -> Option<(u64, f32)> {
        let pid = Pid::from_u32(pid);
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system
            .process(pid)
            .map(|process| (process.memory(), process.cpu_usage()))
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSampler").finish_non_exhaustive()
    }
}
