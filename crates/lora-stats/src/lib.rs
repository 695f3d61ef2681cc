//! Link-quality accounting: RSSI/SNR samples per packet and their bands.
#![forbid(unsafe_code)]

mod quality;
pub use quality::{RssiQuality, SnrQuality, Stability};

// Advice thresholds for pooled reception statistics.
const ADVICE_WEAK_RSSI_DBM: f64 = -90.0;
const ADVICE_SPREAD_DB: i32 = 15;

/// Parallel RSSI/SNR sample sequences, one pair per received packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalStats {
    rssi: Vec<i32>,
    snr: Vec<i32>,
}

impl SignalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rssi_dbm: i32, snr_db: i32) {
        self.rssi.push(rssi_dbm);
        self.snr.push(snr_db);
    }

    /// Pools another collector's samples after ours.
    pub fn extend(&mut self, other: &SignalStats) {
        self.rssi.extend_from_slice(&other.rssi);
        self.snr.extend_from_slice(&other.snr);
    }

    pub fn rssi_samples(&self) -> &[i32] {
        &self.rssi
    }

    pub fn snr_samples(&self) -> &[i32] {
        &self.snr
    }

    pub fn len(&self) -> usize {
        self.rssi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rssi.is_empty()
    }

    /// None until at least one sample was recorded.
    pub fn summary(&self) -> Option<SignalSummary> {
        let (avg_rssi, min_rssi, max_rssi) = mean_min_max(&self.rssi)?;
        let (avg_snr, min_snr, max_snr) = mean_min_max(&self.snr)?;
        Some(SignalSummary {
            samples: self.rssi.len(),
            avg_rssi,
            min_rssi,
            max_rssi,
            avg_snr,
            min_snr,
            max_snr,
        })
    }

    pub fn distribution(&self) -> QualityDistribution {
        QualityDistribution::from_samples(&self.rssi)
    }
}

fn mean_min_max(samples: &[i32]) -> Option<(f64, i32, i32)> {
    let min = *samples.iter().min()?;
    let max = *samples.iter().max()?;
    let sum: i64 = samples.iter().map(|&s| s as i64).sum();
    Some((sum as f64 / samples.len() as f64, min, max))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSummary {
    pub samples: usize,
    pub avg_rssi: f64,
    pub min_rssi: i32,
    pub max_rssi: i32,
    pub avg_snr: f64,
    pub min_snr: i32,
    pub max_snr: i32,
}

impl SignalSummary {
    pub fn rssi_spread(&self) -> i32 {
        self.max_rssi - self.min_rssi
    }

    pub fn rssi_quality(&self) -> RssiQuality {
        RssiQuality::classify(self.avg_rssi)
    }

    pub fn snr_quality(&self) -> SnrQuality {
        SnrQuality::classify(self.avg_snr)
    }

    pub fn stability(&self) -> Stability {
        Stability::classify(self.rssi_spread())
    }

    pub fn advice(&self) -> Advice {
        if self.avg_rssi < ADVICE_WEAK_RSSI_DBM {
            Advice::MoveCloser
        } else if self.rssi_spread() > ADVICE_SPREAD_DB {
            Advice::CheckInterference
        } else {
            Advice::LinkHealthy
        }
    }
}

/// Sample counts per RSSI band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityDistribution {
    pub excellent: usize,
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
}

impl QualityDistribution {
    pub fn from_samples(rssi: &[i32]) -> Self {
        let mut dist = Self::default();
        for &r in rssi {
            match RssiQuality::classify(r as f64) {
                RssiQuality::Excellent => dist.excellent += 1,
                RssiQuality::Good => dist.good += 1,
                RssiQuality::Fair => dist.fair += 1,
                RssiQuality::Poor => dist.poor += 1,
            }
        }
        dist
    }

    pub fn total(&self) -> usize {
        self.excellent + self.good + self.fair + self.poor
    }

    pub fn count(&self, band: RssiQuality) -> usize {
        match band {
            RssiQuality::Excellent => self.excellent,
            RssiQuality::Good => self.good,
            RssiQuality::Fair => self.fair,
            RssiQuality::Poor => self.poor,
        }
    }

    /// Share of samples in `band`, in percent.
    pub fn percent(&self, band: RssiQuality) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(band) as f64 * 100.0 / total as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    MoveCloser,
    CheckInterference,
    LinkHealthy,
}

impl Advice {
    pub fn hints(&self) -> &'static [&'static str] {
        match self {
            Advice::MoveCloser => &[
                "Consider moving devices closer together",
                "Check for obstacles between transmitter and receiver",
                "Try repositioning antennas for better line of sight",
            ],
            Advice::CheckInterference => &[
                "Signal varies significantly - check for interference",
                "Consider stabilizing device positions",
            ],
            Advice::LinkHealthy => &[
                "Signal quality is good for current setup",
                "Current distance and positioning work well",
            ],
        }
    }
}
