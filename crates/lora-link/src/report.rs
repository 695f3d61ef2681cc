//! Aggregates over finished transfers on either side.

use lora_stats::{QualityDistribution, SignalStats, SignalSummary};

use crate::session::{percent, CompletedSession, TransmissionRecord};

#[derive(Debug, Clone)]
pub struct ReceptionReport {
    pub sessions: usize,
    pub reconstructed: usize,
    pub avg_reception_secs: f64,
    /// All samples of all completed sessions, pooled.
    pub signal: Option<SignalSummary>,
    pub distribution: QualityDistribution,
}

impl ReceptionReport {
    /// None if nothing completed yet.
    pub fn from_sessions(sessions: &[CompletedSession]) -> Option<Self> {
        if sessions.is_empty() {
            return None;
        }

        let mut pooled = SignalStats::new();
        for session in sessions {
            pooled.extend(&session.signal);
        }

        let total_secs: f64 = sessions.iter().map(|s| s.reception_secs).sum();
        Some(Self {
            sessions: sessions.len(),
            reconstructed: sessions.iter().filter(|s| s.reconstructed()).count(),
            avg_reception_secs: total_secs / sessions.len() as f64,
            signal: pooled.summary(),
            distribution: pooled.distribution(),
        })
    }

    pub fn success_rate(&self) -> f64 {
        percent(self.reconstructed, self.sessions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmissionReport {
    /// Every recorded session, aborted ones included.
    pub images: usize,
    pub aborted: usize,
    pub avg_duration_secs: f64,
    pub avg_success_rate: f64,
    pub total_bytes: usize,
    pub avg_throughput_kbps: f64,
}

impl TransmissionReport {
    pub fn from_records(records: &[TransmissionRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        Some(Self {
            images: records.len(),
            aborted: records.iter().filter(|r| r.aborted()).count(),
            avg_duration_secs: records.iter().map(|r| r.duration_secs()).sum::<f64>() / n,
            avg_success_rate: records.iter().map(|r| r.success_rate()).sum::<f64>() / n,
            total_bytes: records.iter().map(|r| r.image_size).sum(),
            avg_throughput_kbps: records.iter().map(|r| r.throughput_kbps()).sum::<f64>() / n,
        })
    }
}
