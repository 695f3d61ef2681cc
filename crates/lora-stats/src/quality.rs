use core::fmt;

// Band cut points. Each band includes its upper edge.
const RSSI_EXCELLENT_DBM: f64 = -70.0;
const RSSI_GOOD_DBM: f64 = -85.0;
const RSSI_FAIR_DBM: f64 = -100.0;

const SNR_EXCELLENT_DB: f64 = 10.0;
const SNR_GOOD_DB: f64 = 5.0;
const SNR_FAIR_DB: f64 = 0.0;

const SPREAD_VERY_STABLE_DB: i32 = 5;
const SPREAD_STABLE_DB: i32 = 10;
const SPREAD_MODERATE_DB: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RssiQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl RssiQuality {
    pub const ALL: [RssiQuality; 4] =
        [RssiQuality::Excellent, RssiQuality::Good, RssiQuality::Fair, RssiQuality::Poor];

    /// Works for single samples and for averages alike.
    pub fn classify(rssi_dbm: f64) -> Self {
        if rssi_dbm >= RSSI_EXCELLENT_DBM {
            RssiQuality::Excellent
        } else if rssi_dbm >= RSSI_GOOD_DBM {
            RssiQuality::Good
        } else if rssi_dbm >= RSSI_FAIR_DBM {
            RssiQuality::Fair
        } else {
            RssiQuality::Poor
        }
    }
}

impl fmt::Display for RssiQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RssiQuality::Excellent => "EXCELLENT",
            RssiQuality::Good => "GOOD",
            RssiQuality::Fair => "FAIR",
            RssiQuality::Poor => "POOR",
        })
    }
}

/// Stability judged from the RSSI spread (max - min) of a sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    VeryStable,
    Stable,
    Moderate,
    Unstable,
}

impl Stability {
    pub fn classify(spread_db: i32) -> Self {
        if spread_db <= SPREAD_VERY_STABLE_DB {
            Stability::VeryStable
        } else if spread_db <= SPREAD_STABLE_DB {
            Stability::Stable
        } else if spread_db <= SPREAD_MODERATE_DB {
            Stability::Moderate
        } else {
            Stability::Unstable
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stability::VeryStable => "VERY STABLE",
            Stability::Stable => "STABLE",
            Stability::Moderate => "MODERATE",
            Stability::Unstable => "UNSTABLE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnrQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl SnrQuality {
    pub fn classify(snr_db: f64) -> Self {
        if snr_db >= SNR_EXCELLENT_DB {
            SnrQuality::Excellent
        } else if snr_db >= SNR_GOOD_DB {
            SnrQuality::Good
        } else if snr_db >= SNR_FAIR_DB {
            SnrQuality::Fair
        } else {
            SnrQuality::Poor
        }
    }
}

impl fmt::Display for SnrQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SnrQuality::Excellent => "EXCELLENT",
            SnrQuality::Good => "GOOD",
            SnrQuality::Fair => "FAIR",
            SnrQuality::Poor => "POOR",
        })
    }
}
