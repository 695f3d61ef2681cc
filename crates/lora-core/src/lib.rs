#![forbid(unsafe_code)]

pub mod packet;

pub use packet::{EndPacket, FragmentPacket, Packet, PacketType, StartPacket};

use core::fmt;

/// Fragment header: tag(1) + image_id(8) + index(2) + total(2) + payload_len(2).
pub const FRAGMENT_HEADER_SIZE: usize = 15;
pub const START_PACKET_SIZE: usize = 21;
pub const END_PACKET_SIZE: usize = 17;

/// Width of the image identifier slot on the wire.
pub const IMAGE_ID_LEN: usize = 8;

/// Default packet payload budget of the radio (bytes per AT+PSEND).
pub const DEFAULT_MAX_PAYLOAD: usize = 180;

/// Sanity bound on fragments per image. At ~1.8s of airtime per fragment
/// this is already a multi-week transfer.
pub const DEFAULT_MAX_FRAGMENTS: usize = 1_000_000;

/// Observed airtime per fragment including the inter-packet gap.
pub const SECONDS_PER_FRAGMENT: f64 = 1.8;

pub type LinkResult<T> = Result<T, LinkError>;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Undersized or structurally invalid packet. Dropped without touching any session.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// Fragment or End for an id that has no active session.
    #[error("unknown session '{0}'")]
    UnknownSession(ImageId),

    #[error("session too large: {fragments} fragments exceeds ceiling of {ceiling}")]
    SessionTooLarge { fragments: usize, ceiling: usize },

    /// The Start packet declares the size as u16.
    #[error("image of {size} bytes exceeds the {limit}-byte wire limit")]
    ImageTooLarge { size: usize, limit: usize },

    #[error("start packet was not accepted by the transport")]
    StartPacketFailed,

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("reconstruction failed: {0}")]
    ReconstructionFailed(String),

    /// Stop signal observed between packets.
    #[error("interrupted by stop signal")]
    Interrupted,

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session identifier. At most 8 bytes of UTF-8, zero padded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(String);

impl ImageId {
    /// Builds an id from a name, cutting it to the 8-byte slot.
    /// The cut never splits a UTF-8 sequence, so the receiver can always decode it.
    /// Trailing NULs are dropped since the slot padding cannot carry them.
    pub fn new(name: &str) -> Self {
        let name = name.trim_end_matches('\0');
        let mut end = name.len().min(IMAGE_ID_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Self(name[..end].trim_end_matches('\0').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_slot(&self) -> [u8; IMAGE_ID_LEN] {
        let mut slot = [0u8; IMAGE_ID_LEN];
        let bytes = self.0.as_bytes();
        slot[..bytes.len()].copy_from_slice(bytes);
        slot
    }

    pub fn from_slot(slot: &[u8]) -> LinkResult<Self> {
        if slot.len() != IMAGE_ID_LEN {
            return Err(LinkError::MalformedPacket("image id slot must be 8 bytes"));
        }
        let end = slot.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let text = core::str::from_utf8(&slot[..end])
            .map_err(|_| LinkError::MalformedPacket("image id is not valid UTF-8"))?;
        Ok(Self(text.to_string()))
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Tunables of the link. Timing values are in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfig {
    pub max_payload: usize,
    pub fragment_overhead: usize,
    pub max_fragments: usize,
    /// Gap between Start and the first Fragment (radio duty cycle).
    pub start_gap_ms: u64,
    /// Gap after every Fragment (radio duty cycle).
    pub fragment_gap_ms: u64,
    /// Wait after submitting a packet before reading the module response.
    pub settle_ms: u64,
    /// Backoff before the single retry on a busy module.
    pub busy_backoff_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
            fragment_overhead: FRAGMENT_HEADER_SIZE,
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            start_gap_ms: 500,
            fragment_gap_ms: 300,
            settle_ms: 1500,
            busy_backoff_ms: 2000,
        }
    }
}

impl LinkConfig {
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Payload bytes carried by one Fragment packet.
    pub fn chunk_size(&self) -> LinkResult<usize> {
        let chunk = self
            .max_payload
            .checked_sub(self.fragment_overhead)
            .filter(|&c| c > 0)
            .ok_or(LinkError::InvalidConfig("payload budget must exceed the fragment header"))?;
        if chunk > u16::MAX as usize {
            return Err(LinkError::InvalidConfig("fragment payload must fit a u16 length"));
        }
        Ok(chunk)
    }

    /// Rough airtime estimate for an image of `len` bytes.
    pub fn estimate_seconds(&self, len: usize) -> f64 {
        match self.chunk_size() {
            Ok(chunk) => len.div_ceil(chunk) as f64 * SECONDS_PER_FRAGMENT,
            Err(_) => 0.0,
        }
    }
}
