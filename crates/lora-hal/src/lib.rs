#![forbid(unsafe_code)]

use lora_core::{LinkError, LinkResult};

/// Transmit-confirmation event emitted by the module after airtime.
pub const TX_DONE_EVENT: &str = "+EVT:TXP2P";
/// Receive event prefix: `+EVT:RXP2P:<rssi>:<snr>:<hex>`.
pub const RX_EVENT: &str = "+EVT:RXP2P";
pub const BUSY_ERROR: &str = "AT_BUSY_ERROR";

/// How the module answered a single send command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxResponse {
    /// Explicit transmit-done event.
    Confirmed,
    /// Command accepted (`OK`).
    Accepted,
    /// Nothing came back. The link is half-duplex, so silence is not an error.
    Silent,
    /// Module still busy with the previous packet.
    Busy,
    Rejected(String),
}

impl TxResponse {
    pub fn classify(response: &str) -> Self {
        let response = response.trim();
        if response.contains(TX_DONE_EVENT) {
            TxResponse::Confirmed
        } else if response.contains("OK") {
            TxResponse::Accepted
        } else if response.is_empty() {
            TxResponse::Silent
        } else if response.contains(BUSY_ERROR) {
            TxResponse::Busy
        } else {
            TxResponse::Rejected(response.to_string())
        }
    }

    /// Acknowledged explicitly by the module.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, TxResponse::Confirmed | TxResponse::Accepted)
    }
}

/// The line-oriented radio module.
pub trait RadioTransport: Send {
    /// Submit one hex-encoded packet through the module's send command
    /// and return its answer once the airtime has elapsed.
    fn submit(&mut self, hex_payload: &str) -> LinkResult<TxResponse>;

    /// Read one line from the module.
    /// INVARIANT: Must be Non-Blocking.
    fn recv_line(&mut self) -> nb::Result<String, LinkError>;
}

/// The Wall Clock.
pub trait PlatformClock: Send + Sync {
    /// Monotonic microseconds, for measuring durations.
    fn now_us(&self) -> u64;

    /// Seconds since the Unix epoch. Carried in Start/End packets.
    fn unix_time(&self) -> f64;

    /// Block the caller. Used for the radio duty-cycle gaps.
    fn pause_ms(&self, ms: u64);
}
