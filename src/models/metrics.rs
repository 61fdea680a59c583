use std::collections::HashMap;

use serde::Serialize;

/// A point-in-time snapshot of one engine's counters plus the derived rates
/// from §4.7 (success rate, average TTFT, tokens/sec, requests/sec).
#[derive(Debug, Clone, Serialize, Default)]
pub struct EngineMetricsSnapshot {
    pub total_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub input_tokens_total: u64,
    pub output_tokens_total: u64,
    pub success_rate_percent: f64,
    pub avg_ttft_ms: f64,
    pub tps: f64,
    pub output_tps: f64,
    pub rps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CompletionMetricsResponse {
    pub engines: HashMap<String, EngineMetricsSnapshot>,
    pub totals: EngineMetricsSnapshot,
}

/// CPU utilization, sampled host-wide.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CpuInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_percent: Option<f64>,
}

/// One GPU's utilization and memory figures. This gateway has no bundled GPU
/// probe (no vendor SDK dependency), so `gpus` is always empty and
/// `gpu_monitoring_available` is always `false`; the shape is kept so a
/// deployment that links a GPU collector has somewhere to put the data.
#[derive(Debug, Clone, Serialize)]
pub struct GpuInfo {
    pub id: u32,
    pub name: String,
    pub vendor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_utilization_percent: Option<f64>,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub free_memory_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SystemMetricsSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_utilization_percent: Option<f64>,
    pub gpu_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_gpu_utilization_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_vram_utilization_percent: Option<f64>,
}

/// Host CPU/RAM/GPU snapshot, mirroring the original server's
/// `system_metrics` section of its combined-metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetricsResponse {
    pub timestamp: u64,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub gpus: Vec<GpuInfo>,
    pub gpu_monitoring_available: bool,
    pub summary: SystemMetricsSummary,
}

impl Default for SystemMetricsResponse {
    fn default() -> Self {
        Self {
            timestamp: 0,
            cpu: CpuInfo::default(),
            memory: MemoryInfo::default(),
            gpus: Vec::new(),
            gpu_monitoring_available: false,
            summary: SystemMetricsSummary::default(),
        }
    }
}

/// `/metrics` and `/v1/metrics`: host-level system metrics alongside the
/// per-engine completion metrics (§4.7).
#[derive(Debug, Clone, Serialize, Default)]
pub struct CombinedMetricsResponse {
    pub system_metrics: SystemMetricsResponse,
    pub completion_metrics: CompletionMetricsResponse,
    pub timestamp: u64,
}
