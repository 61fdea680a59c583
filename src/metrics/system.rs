//! Host CPU/RAM sampling for the `/metrics` `system_metrics` section
//! (grounded on the original server's system-metrics model — CPU, memory,
//! and an optional GPU section). This gateway bundles no GPU vendor SDK, so
//! `gpus` is always empty and `gpu_monitoring_available` is always `false`.

use std::sync::Mutex;

use sysinfo::System;

use crate::models::{
    common::unix_now,
    metrics::{CpuInfo, MemoryInfo, SystemMetricsResponse, SystemMetricsSummary},
};

pub struct SystemMetricsCollector {
    system: Mutex<System>,
}

impl SystemMetricsCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
        }
    }

    pub fn snapshot(&self) -> SystemMetricsResponse {
        let mut system = self.system.lock().expect("system metrics lock poisoned");
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_usage_percent = if system.cpus().is_empty() {
            None
        } else {
            let total: f32 = system.cpus().iter().map(|cpu| cpu.cpu_usage()).sum();
            Some((total / system.cpus().len() as f32) as f64)
        };

        let total_bytes = system.total_memory();
        let used_bytes = system.used_memory();
        let free_bytes = total_bytes.saturating_sub(used_bytes);
        let ram_utilization_percent = if total_bytes > 0 {
            Some(used_bytes as f64 / total_bytes as f64 * 100.0)
        } else {
            None
        };

        SystemMetricsResponse {
            timestamp: unix_now(),
            cpu: CpuInfo {
                usage_percent: cpu_usage_percent,
            },
            memory: MemoryInfo {
                total_bytes,
                used_bytes,
                free_bytes,
                utilization_percent: ram_utilization_percent,
            },
            gpus: Vec::new(),
            gpu_monitoring_available: false,
            summary: SystemMetricsSummary {
                cpu_usage_percent,
                ram_utilization_percent,
                gpu_count: 0,
                average_gpu_utilization_percent: None,
                average_vram_utilization_percent: None,
            },
        }
    }
}

impl Default for SystemMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_nonzero_total_memory() {
        let collector = SystemMetricsCollector::new();
        let snapshot = collector.snapshot();
        assert!(snapshot.memory.total_bytes > 0);
        assert!(!snapshot.gpu_monitoring_available);
        assert!(snapshot.gpus.is_empty());
    }
}
