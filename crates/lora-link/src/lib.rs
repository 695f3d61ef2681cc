//! Image transfer over a lossy radio link: fragment, send, track, reassemble.
#![forbid(unsafe_code)]

pub mod fragment;
pub mod reassembly;
pub mod report;
pub mod rx;
pub mod session;
pub mod tx;

pub use fragment::{Fragment, Fragmenter};
pub use reassembly::Reassembler;
pub use report::{ReceptionReport, TransmissionReport};
pub use rx::{parse_line, Inbound, ReceiverSessionTracker, RxFrame};
pub use session::{CompletedSession, InboundSession, Reconstruction, TransmissionRecord};
pub use tx::{send_packet, Transmitter, TransmitterSession, TxAborted, TxState};
