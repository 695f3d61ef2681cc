use std::collections::BTreeMap;
use std::path::PathBuf;

use lora_core::{ImageId, StartPacket};
use lora_stats::{SignalStats, SignalSummary};

use crate::tx::TxState;

/// Receiver-side bookkeeping for one image, keyed by its id.
#[derive(Debug, Clone)]
pub struct InboundSession {
    pub image_id: ImageId,
    pub total_size: u16,
    pub total_fragments: u16,
    /// Sender clock at Start.
    pub start_timestamp: f64,
    /// Receiver monotonic clock when Start was processed.
    pub receive_start_us: u64,
    fragments: BTreeMap<u16, Vec<u8>>,
    received_count: usize,
    pub signal: SignalStats,
}

impl InboundSession {
    pub fn new(start: &StartPacket, rssi: i32, snr: i32, now_us: u64) -> Self {
        let mut signal = SignalStats::new();
        signal.record(rssi, snr);
        Self {
            image_id: start.image_id.clone(),
            total_size: start.total_size,
            total_fragments: start.total_fragments,
            start_timestamp: start.start_timestamp,
            receive_start_us: now_us,
            fragments: BTreeMap::new(),
            received_count: 0,
            signal,
        }
    }

    /// Insert-if-absent. Samples are recorded for duplicates too.
    /// Returns true on the first insert of `index`.
    pub fn insert_fragment(&mut self, index: u16, payload: Vec<u8>, rssi: i32, snr: i32) -> bool {
        self.signal.record(rssi, snr);
        if self.fragments.contains_key(&index) {
            return false;
        }
        self.fragments.insert(index, payload);
        self.received_count += 1;
        true
    }

    pub fn fragments(&self) -> &BTreeMap<u16, Vec<u8>> {
        &self.fragments
    }

    pub fn received_count(&self) -> usize {
        self.received_count
    }

    pub fn is_complete(&self) -> bool {
        self.received_count == self.total_fragments as usize
    }

    pub fn missing(&self) -> usize {
        (self.total_fragments as usize).saturating_sub(self.received_count)
    }

    pub fn progress_percent(&self) -> f64 {
        percent(self.received_count, self.total_fragments as usize)
    }
}

/// What happened to the byte stream of an ended session.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstruction {
    Saved { path: PathBuf, width: u32, height: u32 },
    /// All fragments arrived but the codec rejected or could not store the stream.
    Failed(String),
    /// End arrived with fragments missing. Nothing was attempted.
    Incomplete { missing: usize },
}

/// Immutable snapshot of a session after its End packet.
#[derive(Debug, Clone)]
pub struct CompletedSession {
    pub image_id: ImageId,
    pub total_size: u16,
    pub total_fragments: u16,
    pub received_count: usize,
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    /// End - Start, both from the sender clock.
    pub transmission_secs: f64,
    /// Wall time on the receiver between Start and End.
    pub reception_secs: f64,
    /// Receiver wall clock at End (seconds since the Unix epoch).
    pub completed_at: f64,
    pub signal: SignalStats,
    pub summary: Option<SignalSummary>,
    pub outcome: Reconstruction,
}

impl CompletedSession {
    pub fn reconstructed(&self) -> bool {
        matches!(self.outcome, Reconstruction::Saved { .. })
    }

    pub fn missing(&self) -> usize {
        (self.total_fragments as usize).saturating_sub(self.received_count)
    }

    pub fn success_rate(&self) -> f64 {
        percent(self.received_count, self.total_fragments as usize)
    }

    pub fn throughput_bps(&self) -> f64 {
        if self.reception_secs > 0.0 {
            self.total_size as f64 * 8.0 / self.reception_secs
        } else {
            0.0
        }
    }
}

/// Transmitter-side result of one send call.
#[derive(Debug, Clone)]
pub struct TransmissionRecord {
    pub image_id: ImageId,
    pub image_size: usize,
    pub total_fragments: usize,
    pub successful_fragments: usize,
    pub failed_fragments: Vec<usize>,
    pub start_time: f64,
    pub end_time: f64,
    /// False when the End packet was not accepted by the module.
    pub end_acknowledged: bool,
    /// `Completed` or `Aborted`.
    pub state: TxState,
}

impl TransmissionRecord {
    pub fn aborted(&self) -> bool {
        self.state == TxState::Aborted
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn success_rate(&self) -> f64 {
        percent(self.successful_fragments, self.total_fragments)
    }

    pub fn throughput_kbps(&self) -> f64 {
        let secs = self.duration_secs();
        if secs > 0.0 { self.image_size as f64 * 8.0 / (secs * 1000.0) } else { 0.0 }
    }
}

pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 { 100.0 } else { part as f64 * 100.0 / whole as f64 }
}
