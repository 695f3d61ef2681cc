use std::collections::HashMap;

use log::{debug, info, warn};

use lora_core::{EndPacket, FragmentPacket, ImageId, LinkError, LinkResult, Packet, PacketType, StartPacket};
use lora_hal::{PlatformClock, RadioTransport, RX_EVENT};
use lora_stats::RssiQuality;

use crate::reassembly::Reassembler;
use crate::report::ReceptionReport;
use crate::session::{CompletedSession, InboundSession, Reconstruction};

/// A receive event split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub rssi: i32,
    pub snr: i32,
    pub payload: Vec<u8>,
}

/// Parses `...+EVT:RXP2P:<rssi>:<snr>:<hex>`.
/// Returns Ok(None) for lines without the receive marker.
pub fn parse_line(line: &str) -> LinkResult<Option<RxFrame>> {
    let Some(pos) = line.find(RX_EVENT) else {
        return Ok(None);
    };
    let mut fields = line[pos + RX_EVENT.len()..].trim_start_matches(':').splitn(3, ':');

    let rssi = parse_signal(fields.next())?;
    let snr = parse_signal(fields.next())?;
    let hex_field = fields.next().ok_or(LinkError::MalformedPacket("receive event without payload"))?;

    let digits: String = hex_field.chars().filter(char::is_ascii_hexdigit).collect();
    if digits.is_empty() {
        return Err(LinkError::MalformedPacket("empty hex payload"));
    }
    if digits.len() % 2 != 0 {
        return Err(LinkError::MalformedPacket("odd-length hex payload"));
    }
    let payload = hex::decode(&digits).map_err(|_| LinkError::MalformedPacket("invalid hex payload"))?;

    Ok(Some(RxFrame { rssi, snr, payload }))
}

fn parse_signal(field: Option<&str>) -> LinkResult<i32> {
    field
        .and_then(|f| f.trim().parse().ok())
        .ok_or(LinkError::MalformedPacket("receive event with bad RSSI/SNR field"))
}

/// What one transport line amounted to.
#[derive(Debug, Clone)]
pub enum Inbound {
    Started {
        image_id: ImageId,
        total_size: u16,
        total_fragments: u16,
        /// An active session with the same id was discarded.
        replaced: bool,
        rssi: i32,
        snr: i32,
    },
    Progress {
        image_id: ImageId,
        index: u16,
        received: usize,
        total: u16,
        duplicate: bool,
        rssi: i32,
        band: RssiQuality,
    },
    Completed(CompletedSession),
    /// Non-protocol payload that decodes as UTF-8.
    Text { text: String, rssi: i32, snr: i32 },
    /// Non-protocol payload that is not UTF-8.
    Data { len: usize, rssi: i32, snr: i32 },
    /// Anything else the module printed.
    Module(String),
}

/// Demultiplexes receive events into sessions keyed by image id.
pub struct ReceiverSessionTracker {
    active: HashMap<ImageId, InboundSession>,
    completed: Vec<CompletedSession>,
    reassembler: Reassembler,
    clock: Box<dyn PlatformClock>,
}

impl ReceiverSessionTracker {
    pub fn new(reassembler: Reassembler, clock: Box<dyn PlatformClock>) -> Self {
        Self { active: HashMap::new(), completed: Vec::new(), reassembler, clock }
    }

    /// Reads at most one line from the transport.
    /// None when nothing is pending or the line was blank.
    pub fn poll(&mut self, transport: &mut dyn RadioTransport) -> Option<LinkResult<Inbound>> {
        match transport.recv_line() {
            Ok(line) => self.handle_line(&line).transpose(),
            Err(nb::Error::WouldBlock) => None,
            Err(nb::Error::Other(e)) => Some(Err(e)),
        }
    }

    /// Processes one line. Errors leave every session untouched.
    pub fn handle_line(&mut self, line: &str) -> LinkResult<Option<Inbound>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let frame = match parse_line(line) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Module: {}", line);
                return Ok(Some(Inbound::Module(line.to_string())));
            }
            Err(e) => {
                warn!("Dropping receive event: {}", e);
                return Err(e);
            }
        };

        if !PacketType::is_protocol(&frame.payload) {
            return Ok(Some(Self::informational(frame)));
        }

        let result = Packet::from_bytes(&frame.payload).and_then(|packet| match packet {
            Packet::Start(start) => Ok(self.on_start(start, frame.rssi, frame.snr)),
            Packet::Fragment(fragment) => self.on_fragment(fragment, frame.rssi, frame.snr),
            Packet::End(end) => self.on_end(end),
        });
        if let Err(e) = &result {
            warn!("Dropping packet (RSSI {} dBm): {}", frame.rssi, e);
        }
        result.map(Some)
    }

    fn informational(frame: RxFrame) -> Inbound {
        match String::from_utf8(frame.payload) {
            Ok(text) => {
                info!("Text message: '{}' (RSSI {} dBm, SNR {} dB)", text, frame.rssi, frame.snr);
                Inbound::Text { text, rssi: frame.rssi, snr: frame.snr }
            }
            Err(e) => {
                let len = e.as_bytes().len();
                info!("Binary data: {} bytes (RSSI {} dBm, SNR {} dB)", len, frame.rssi, frame.snr);
                Inbound::Data { len, rssi: frame.rssi, snr: frame.snr }
            }
        }
    }

    fn on_start(&mut self, start: StartPacket, rssi: i32, snr: i32) -> Inbound {
        let session = InboundSession::new(&start, rssi, snr, self.clock.now_us());
        let replaced = self.active.insert(start.image_id.clone(), session).is_some();
        if replaced {
            warn!("Start for active session '{}': previous progress discarded", start.image_id);
        }
        info!(
            "Receiving '{}': {} bytes in {} fragments (RSSI {} dBm, SNR {} dB)",
            start.image_id, start.total_size, start.total_fragments, rssi, snr
        );
        Inbound::Started {
            image_id: start.image_id,
            total_size: start.total_size,
            total_fragments: start.total_fragments,
            replaced,
            rssi,
            snr,
        }
    }

    fn on_fragment(&mut self, fragment: FragmentPacket, rssi: i32, snr: i32) -> LinkResult<Inbound> {
        let session = self
            .active
            .get_mut(&fragment.image_id)
            .ok_or_else(|| LinkError::UnknownSession(fragment.image_id.clone()))?;
        if fragment.index >= session.total_fragments {
            return Err(LinkError::MalformedPacket("fragment index beyond declared total"));
        }

        let duplicate = !session.insert_fragment(fragment.index, fragment.payload, rssi, snr);
        let band = RssiQuality::classify(rssi as f64);
        if duplicate {
            debug!("Duplicate fragment {} of '{}'", fragment.index, fragment.image_id);
        } else {
            info!(
                "Fragment {}/{} of '{}' ({:.1}%) RSSI {} dBm [{}]",
                session.received_count(),
                session.total_fragments,
                fragment.image_id,
                session.progress_percent(),
                rssi,
                band
            );
        }

        Ok(Inbound::Progress {
            image_id: fragment.image_id,
            index: fragment.index,
            received: session.received_count(),
            total: session.total_fragments,
            duplicate,
            rssi,
            band,
        })
    }

    fn on_end(&mut self, end: EndPacket) -> LinkResult<Inbound> {
        let session = self
            .active
            .remove(&end.image_id)
            .ok_or_else(|| LinkError::UnknownSession(end.image_id.clone()))?;

        let completed_at = self.clock.unix_time();
        let reception_secs = self.clock.now_us().saturating_sub(session.receive_start_us) as f64 / 1_000_000.0;

        let outcome = if session.is_complete() {
            self.reassembler.reconstruct(&session.image_id, session.fragments(), completed_at)
        } else {
            warn!(
                "Session '{}' ended incomplete: {}/{} fragments, {} missing",
                session.image_id,
                session.received_count(),
                session.total_fragments,
                session.missing()
            );
            Reconstruction::Incomplete { missing: session.missing() }
        };

        let received_count = session.received_count();
        let summary = session.signal.summary();
        let completed = CompletedSession {
            image_id: session.image_id,
            total_size: session.total_size,
            total_fragments: session.total_fragments,
            received_count,
            start_timestamp: session.start_timestamp,
            end_timestamp: end.end_timestamp,
            transmission_secs: end.end_timestamp - session.start_timestamp,
            reception_secs,
            completed_at,
            summary,
            signal: session.signal,
            outcome,
        };
        info!(
            "Session '{}' complete: {}/{} fragments ({:.1}%) in {:.1}s",
            completed.image_id,
            completed.received_count,
            completed.total_fragments,
            completed.success_rate(),
            completed.reception_secs
        );

        self.completed.push(completed.clone());
        Ok(Inbound::Completed(completed))
    }

    pub fn active_sessions(&self) -> usize {
        self.active.len()
    }

    pub fn active(&self, image_id: &ImageId) -> Option<&InboundSession> {
        self.active.get(image_id)
    }

    pub fn completed(&self) -> &[CompletedSession] {
        &self.completed
    }

    pub fn report(&self) -> Option<ReceptionReport> {
        ReceptionReport::from_sessions(&self.completed)
    }
}
