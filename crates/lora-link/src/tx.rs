use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use lora_core::{
    EndPacket, FragmentPacket, ImageId, LinkConfig, LinkError, LinkResult, Packet, StartPacket,
};
use lora_hal::{PlatformClock, RadioTransport, TxResponse};

use crate::fragment::{Fragment, Fragmenter};
use crate::report::TransmissionReport;
use crate::session::TransmissionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    SendingStart,
    SendingFragments,
    SendingEnd,
    Completed,
    Aborted,
}

/// Hex-encodes `bytes` and submits them once, plus a single retry
/// after `busy_backoff_ms` if the module reports busy.
///
/// First attempt: confirmed, accepted or silent all count as sent.
/// Retry: only an explicit acknowledgment counts.
pub fn send_packet(
    transport: &mut dyn RadioTransport,
    clock: &dyn PlatformClock,
    config: &LinkConfig,
    bytes: &[u8],
) -> LinkResult<()> {
    let hex_payload = hex::encode_upper(bytes);

    match transport.submit(&hex_payload)? {
        TxResponse::Confirmed | TxResponse::Accepted | TxResponse::Silent => Ok(()),
        TxResponse::Busy => {
            debug!("Module busy, retrying in {} ms", config.busy_backoff_ms);
            clock.pause_ms(config.busy_backoff_ms);
            match transport.submit(&hex_payload)? {
                r if r.is_acknowledged() => Ok(()),
                TxResponse::Silent => Err(LinkError::TransportError("no answer after busy retry".into())),
                TxResponse::Busy => Err(LinkError::TransportError("module still busy after retry".into())),
                TxResponse::Rejected(line) => Err(LinkError::TransportError(line)),
                other => Err(LinkError::TransportError(format!("{:?}", other))),
            }
        }
        TxResponse::Rejected(line) => Err(LinkError::TransportError(line)),
    }
}

/// A session that ended in `Aborted`.
/// `record` is None only when the pre-flight checks refused the image.
#[derive(Debug)]
pub struct TxAborted {
    pub error: LinkError,
    pub record: Option<TransmissionRecord>,
}

/// One outbound transfer. Exists for the duration of a single send call.
pub struct TransmitterSession<'a> {
    transport: &'a mut dyn RadioTransport,
    clock: &'a dyn PlatformClock,
    config: &'a LinkConfig,
    stop: Option<&'a AtomicBool>,
    state: TxState,
}

impl<'a> TransmitterSession<'a> {
    pub fn new(
        transport: &'a mut dyn RadioTransport,
        clock: &'a dyn PlatformClock,
        config: &'a LinkConfig,
        stop: Option<&'a AtomicBool>,
    ) -> Self {
        Self { transport, clock, config, stop, state: TxState::Idle }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    fn stop_requested(&self) -> bool {
        self.stop.is_some_and(|s| s.load(Ordering::Relaxed))
    }

    fn refuse(&mut self, error: LinkError) -> TxAborted {
        self.state = TxState::Aborted;
        TxAborted { error, record: None }
    }

    fn abort(&mut self, error: LinkError, mut record: TransmissionRecord) -> TxAborted {
        self.state = TxState::Aborted;
        record.state = TxState::Aborted;
        record.end_time = self.clock.unix_time();
        TxAborted { error, record: Some(record) }
    }

    fn send(&mut self, packet: &Packet) -> LinkResult<()> {
        let bytes = packet.to_bytes()?;
        send_packet(&mut *self.transport, self.clock, self.config, &bytes)
    }

    /// Start, fragments in index order, End.
    /// Only a failed Start or the stop flag aborts; fragment failures are recorded.
    pub fn run(
        &mut self,
        image_id: &ImageId,
        image_size: usize,
        fragments: &[Fragment],
    ) -> Result<TransmissionRecord, TxAborted> {
        if image_size > u16::MAX as usize {
            return Err(self.refuse(LinkError::ImageTooLarge { size: image_size, limit: u16::MAX as usize }));
        }
        let total = fragments.len();
        let Ok(total_u16) = u16::try_from(total) else {
            return Err(self.refuse(LinkError::SessionTooLarge { fragments: total, ceiling: u16::MAX as usize }));
        };

        let start_time = self.clock.unix_time();
        let mut record = TransmissionRecord {
            image_id: image_id.clone(),
            image_size,
            total_fragments: total,
            successful_fragments: 0,
            failed_fragments: Vec::new(),
            start_time,
            end_time: start_time,
            end_acknowledged: false,
            state: TxState::Idle,
        };

        if self.stop_requested() {
            return Err(self.abort(LinkError::Interrupted, record));
        }
        self.state = TxState::SendingStart;
        let start = Packet::Start(StartPacket {
            image_id: image_id.clone(),
            total_size: image_size as u16,
            total_fragments: total_u16,
            start_timestamp: start_time,
        });
        if let Err(e) = self.send(&start) {
            warn!("Start packet for '{}' failed: {}", image_id, e);
            return Err(self.abort(LinkError::StartPacketFailed, record));
        }
        info!("Start packet sent for '{}' ({} bytes, {} fragments)", image_id, image_size, total);
        self.clock.pause_ms(self.config.start_gap_ms);

        self.state = TxState::SendingFragments;
        for fragment in fragments {
            if self.stop_requested() {
                return Err(self.abort(LinkError::Interrupted, record));
            }
            let packet = Packet::Fragment(FragmentPacket {
                image_id: image_id.clone(),
                index: fragment.index as u16,
                total_fragments: total_u16,
                payload: fragment.payload.clone(),
            });
            match self.send(&packet) {
                Ok(()) => {
                    record.successful_fragments += 1;
                    debug!("Fragment {}/{} sent ({} bytes)", fragment.index + 1, total, fragment.payload.len());
                }
                Err(e) => {
                    warn!("Fragment {}/{} failed: {}", fragment.index + 1, total, e);
                    record.failed_fragments.push(fragment.index);
                }
            }
            self.clock.pause_ms(self.config.fragment_gap_ms);
        }

        if self.stop_requested() {
            return Err(self.abort(LinkError::Interrupted, record));
        }
        self.state = TxState::SendingEnd;
        record.end_time = self.clock.unix_time();
        let end = Packet::End(EndPacket { image_id: image_id.clone(), end_timestamp: record.end_time });
        record.end_acknowledged = match self.send(&end) {
            Ok(()) => true,
            Err(e) => {
                warn!("End packet for '{}' was not acknowledged: {}", image_id, e);
                false
            }
        };
        self.state = TxState::Completed;
        record.state = TxState::Completed;
        Ok(record)
    }
}

/// Owns the transport and clock on the sending side and keeps the log
/// of finished transfers.
pub struct Transmitter {
    transport: Box<dyn RadioTransport>,
    clock: Box<dyn PlatformClock>,
    config: LinkConfig,
    fragmenter: Fragmenter,
    stop: Option<Arc<AtomicBool>>,
    records: Vec<TransmissionRecord>,
    last_state: TxState,
}

impl Transmitter {
    pub fn new(
        transport: Box<dyn RadioTransport>,
        clock: Box<dyn PlatformClock>,
        config: LinkConfig,
    ) -> LinkResult<Self> {
        let fragmenter = Fragmenter::new(&config)?;
        Ok(Self {
            transport,
            clock,
            config,
            fragmenter,
            stop: None,
            records: Vec::new(),
            last_state: TxState::Idle,
        })
    }

    /// Checked before every packet. A send already in flight is not interrupted.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn send_image(&mut self, image_id: &ImageId, data: &[u8]) -> LinkResult<TransmissionRecord> {
        let fragments = self.fragmenter.split(data)?;
        info!(
            "Sending '{}': {} bytes in {} fragments of up to {} bytes, estimated {:.1}s",
            image_id,
            data.len(),
            fragments.len(),
            self.fragmenter.chunk_size(),
            self.config.estimate_seconds(data.len()),
        );

        let mut session = TransmitterSession::new(
            &mut *self.transport,
            &*self.clock,
            &self.config,
            self.stop.as_deref(),
        );
        let result = session.run(image_id, data.len(), &fragments);
        self.last_state = session.state();

        let record = match result {
            Ok(record) => record,
            Err(TxAborted { error, record }) => {
                if let Some(record) = record {
                    warn!(
                        "Transmission of '{}' aborted after {}/{} fragments: {}",
                        record.image_id, record.successful_fragments, record.total_fragments, error
                    );
                    self.records.push(record);
                }
                return Err(error);
            }
        };
        info!(
            "Transmission of '{}' finished: {}/{} fragments ({:.1}%) in {:.1}s",
            record.image_id,
            record.successful_fragments,
            record.total_fragments,
            record.success_rate(),
            record.duration_secs(),
        );
        self.records.push(record.clone());
        Ok(record)
    }

    /// A single plain text packet. Same send path and retry policy as protocol packets.
    pub fn send_text(&mut self, text: &str) -> LinkResult<()> {
        if self.stop.as_ref().is_some_and(|s| s.load(Ordering::Relaxed)) {
            return Err(LinkError::Interrupted);
        }
        send_packet(&mut *self.transport, &*self.clock, &self.config, text.as_bytes())?;
        info!("Text message sent ({} bytes)", text.len());
        Ok(())
    }

    /// Completed and aborted sessions, in call order.
    /// Images refused before Start leave no record.
    pub fn records(&self) -> &[TransmissionRecord] {
        &self.records
    }

    pub fn last_state(&self) -> TxState {
        self.last_state
    }

    pub fn report(&self) -> Option<TransmissionReport> {
        TransmissionReport::from_records(&self.records)
    }
}
