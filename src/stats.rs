//! Per-transfer results and derived metrics.
//!
//! Every transfer produces a [`TransferReport`] value, even when nothing
//! arrived; there is no failed terminal state. Metrics are computed once at
//! construction so reports serialize as plain data.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::Protocol;

/// Floor applied to measured durations so rate math never divides by zero.
const MIN_DURATION_SECS: f64 = 1e-6;

/// Throughput in bits per second over a measured wall-clock duration.
pub fn throughput_bps(bytes: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64().max(MIN_DURATION_SECS);
    (bytes as f64 * 8.0) / secs
}

/// Share of expected segments that arrived, as a percentage.
pub fn success_percent(received: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (received as f64 / total as f64) * 100.0
}

/// Outcome of one finished transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    pub protocol: Protocol,
    /// 1-based connection index within its test run.
    pub index: usize,
    /// Payload bytes received, headers excluded.
    pub bytes: u64,
    pub duration_secs: f64,
    pub throughput_bps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp: Option<UdpStats>,
}

/// Segment accounting for a UDP transfer.
///
/// Segments are counted per receipt, so a duplicating network path can push
/// `success_percent` past 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpStats {
    pub total_segments: u64,
    pub segments_received: u64,
    pub success_percent: f64,
}

impl TransferReport {
    pub fn tcp(index: usize, bytes: u64, duration: Duration) -> Self {
        Self {
            protocol: Protocol::Tcp,
            index,
            bytes,
            duration_secs: duration.as_secs_f64(),
            throughput_bps: throughput_bps(bytes, duration),
            udp: None,
        }
    }

    pub fn udp(
        index: usize,
        bytes: u64,
        duration: Duration,
        total_segments: u64,
        segments_received: u64,
    ) -> Self {
        Self {
            protocol: Protocol::Udp,
            index,
            bytes,
            duration_secs: duration.as_secs_f64(),
            throughput_bps: throughput_bps(bytes, duration),
            udp: Some(UdpStats {
                total_segments,
                segments_received,
                success_percent: success_percent(segments_received, total_segments),
            }),
        }
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transfer #{}: {} in {:.3}s ({})",
            self.protocol,
            self.index,
            bytes_to_human(self.bytes),
            self.duration_secs,
            bps_to_human(self.throughput_bps),
        )?;
        if let Some(ref udp) = self.udp {
            write!(
                f,
                ", {}/{} segments ({:.2}%)",
                udp.segments_received, udp.total_segments, udp.success_percent
            )?;
        }
        Ok(())
    }
}

pub fn output_json(reports: &[TransferReport]) -> String {
    serde_json::to_string_pretty(reports).unwrap_or_else(|_| "[]".to_string())
}

pub fn bytes_to_human(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn bps_to_human(bps: f64) -> String {
    const KBPS: f64 = 1_000.0;
    const MBPS: f64 = 1_000_000.0;
    const GBPS: f64 = 1_000_000_000.0;

    if bps >= GBPS {
        format!("{:.2} Gbps", bps / GBPS)
    } else if bps >= MBPS {
        format!("{:.2} Mbps", bps / MBPS)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps / KBPS)
    } else {
        format!("{:.0} bps", bps)
    }
}
