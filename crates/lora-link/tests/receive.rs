use lora_core::{
    EndPacket, FragmentPacket, ImageId, LinkConfig, LinkError, LinkResult, Packet, StartPacket,
};
use lora_hal::{PlatformClock, RadioTransport, TxResponse};
use lora_link::{Fragmenter, Inbound, Reassembler, ReceiverSessionTracker, Reconstruction, Transmitter};
use lora_store::{DecodedImage, ImageCodec, JpegFileStore};
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// --- MOCKS ---
#[derive(Clone)]
struct MockClock {
    t: Arc<AtomicU64>,
}
impl MockClock {
    fn new() -> Self {
        Self { t: Arc::new(AtomicU64::new(1_000)) }
    }
}
impl PlatformClock for MockClock {
    fn now_us(&self) -> u64 { self.t.load(Ordering::SeqCst) }
    fn unix_time(&self) -> f64 { 1_700_000_000.0 + self.now_us() as f64 / 1e6 }
    fn pause_ms(&self, ms: u64) { self.t.fetch_add(ms * 1000, Ordering::SeqCst); }
}

/// Accepts every non-empty stream and keeps what it was asked to save.
#[derive(Clone, Default)]
struct MemoryCodec {
    saved: Arc<Mutex<Vec<(ImageId, Vec<u8>)>>>,
}
impl ImageCodec for MemoryCodec {
    fn decode(&self, data: &[u8]) -> LinkResult<DecodedImage> {
        if data.is_empty() {
            return Err(LinkError::ReconstructionFailed("empty stream".into()));
        }
        Ok(DecodedImage { bytes: data.to_vec(), width: 4, height: 3 })
    }
    fn save(&mut self, image: &DecodedImage, image_id: &ImageId, _: f64) -> LinkResult<PathBuf> {
        self.saved.lock().unwrap().push((image_id.clone(), image.bytes.clone()));
        Ok(PathBuf::from(format!("/mem/{}.jpg", image_id)))
    }
}

/// Records every submitted packet as the receive line the far end would print.
#[derive(Clone, Default)]
struct Air {
    sent: Arc<Mutex<Vec<String>>>,
}
impl RadioTransport for Air {
    fn submit(&mut self, hex_payload: &str) -> LinkResult<TxResponse> {
        self.sent.lock().unwrap().push(format!("+EVT:RXP2P:-72:8:{}", hex_payload));
        Ok(TxResponse::Accepted)
    }
    fn recv_line(&mut self) -> nb::Result<String, LinkError> {
        Err(nb::Error::WouldBlock)
    }
}

struct Inbox {
    lines: VecDeque<String>,
}
impl RadioTransport for Inbox {
    fn submit(&mut self, _: &str) -> LinkResult<TxResponse> { Ok(TxResponse::Silent) }
    fn recv_line(&mut self) -> nb::Result<String, LinkError> {
        self.lines.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

// --- HELPERS ---
fn tracker() -> (ReceiverSessionTracker, MemoryCodec, MockClock) {
    let codec = MemoryCodec::default();
    let clock = MockClock::new();
    let tracker = ReceiverSessionTracker::new(Reassembler::new(Box::new(codec.clone())), Box::new(clock.clone()));
    (tracker, codec, clock)
}

fn line(packet: &Packet, rssi: i32, snr: i32) -> String {
    format!("+EVT:RXP2P:{}:{}:{}", rssi, snr, hex::encode_upper(packet.to_bytes().unwrap()))
}

fn random_image(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

/// Start, one line per fragment, End.
fn session_lines(id: &str, data: &[u8], max_payload: usize) -> (String, Vec<String>, String) {
    let id = ImageId::new(id);
    let config = LinkConfig::default().with_max_payload(max_payload);
    let fragments = Fragmenter::new(&config).unwrap().split(data).unwrap();
    let total = fragments.len() as u16;

    let start = Packet::Start(StartPacket {
        image_id: id.clone(),
        total_size: data.len() as u16,
        total_fragments: total,
        start_timestamp: 1_700_000_000.0,
    });
    let frags = fragments
        .iter()
        .map(|f| {
            let p = Packet::Fragment(FragmentPacket {
                image_id: id.clone(),
                index: f.index as u16,
                total_fragments: total,
                payload: f.payload.clone(),
            });
            line(&p, -75, 7)
        })
        .collect();
    let end = Packet::End(EndPacket { image_id: id, end_timestamp: 1_700_000_012.5 });
    (line(&start, -70, 9), frags, line(&end, -71, 8))
}

fn feed(tracker: &mut ReceiverSessionTracker, lines: &[String]) -> Vec<LinkResult<Option<Inbound>>> {
    lines.iter().map(|l| tracker.handle_line(l)).collect()
}

fn expect_completed(result: LinkResult<Option<Inbound>>) -> lora_link::CompletedSession {
    match result {
        Ok(Some(Inbound::Completed(done))) => done,
        other => panic!("expected completion, got {:?}", other),
    }
}

// --- TESTS ---
#[test]
fn test_transmitted_image_round_trips() {
    let air = Air::default();
    let clock = MockClock::new();
    let mut tx = Transmitter::new(Box::new(air.clone()), Box::new(clock), LinkConfig::default()).unwrap();

    let data = random_image(7, 4_321);
    let record = tx.send_image(&ImageId::new("rt000001"), &data).unwrap();
    assert_eq!(record.total_fragments, 27);
    assert_eq!(record.successful_fragments, 27);

    let (mut rx, codec, _) = tracker();
    let lines = air.sent.lock().unwrap().clone();
    assert_eq!(lines.len(), 29);

    let mut results = feed(&mut rx, &lines);
    let done = expect_completed(results.pop().unwrap());
    assert!(done.reconstructed());
    assert_eq!(done.missing(), 0);

    let saved = codec.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0.as_str(), "rt000001");
    assert_eq!(saved[0].1, data);
}

#[test]
fn test_delivery_order_does_not_matter() {
    let data = random_image(11, 2_000);
    let (start, frags, end) = session_lines("shuffle", &data, 120);

    for seed in 0..8u64 {
        let mut order = frags.clone();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

        let (mut rx, codec, _) = tracker();
        rx.handle_line(&start).unwrap();
        for l in &order {
            rx.handle_line(l).unwrap();
        }
        let done = expect_completed(rx.handle_line(&end));
        assert!(done.reconstructed(), "seed {}", seed);
        assert_eq!(codec.saved.lock().unwrap()[0].1, data, "seed {}", seed);
    }
}

#[test]
fn test_duplicate_fragments_are_idempotent() {
    let data = random_image(3, 700);
    let (start, frags, end) = session_lines("dup", &data, 180);

    let (mut rx, codec, _) = tracker();
    rx.handle_line(&start).unwrap();
    for l in &frags {
        rx.handle_line(l).unwrap();
    }
    match rx.handle_line(&frags[1]).unwrap() {
        Some(Inbound::Progress { duplicate, received, .. }) => {
            assert!(duplicate);
            assert_eq!(received, frags.len());
        }
        other => panic!("unexpected {:?}", other),
    }

    let session = rx.active(&ImageId::new("dup")).unwrap();
    assert_eq!(session.received_count(), frags.len());
    // Start + every fragment + the duplicate
    assert_eq!(session.signal.len(), frags.len() + 2);

    let done = expect_completed(rx.handle_line(&end));
    assert!(done.reconstructed());
    assert_eq!(codec.saved.lock().unwrap()[0].1, data);
}

#[test]
fn test_thousand_bytes_reverse_order() {
    let data = random_image(1, 1000);
    let (start, frags, end) = session_lines("img1000", &data, 180);
    assert_eq!(frags.len(), 7);

    let (mut rx, _, _) = tracker();
    match rx.handle_line(&start).unwrap() {
        Some(Inbound::Started { total_size, total_fragments, replaced, .. }) => {
            assert_eq!(total_size, 1000);
            assert_eq!(total_fragments, 7);
            assert!(!replaced);
        }
        other => panic!("unexpected {:?}", other),
    }
    for l in frags.iter().rev() {
        rx.handle_line(l).unwrap();
    }
    let done = expect_completed(rx.handle_line(&end));
    assert!(done.reconstructed());
    assert_eq!(done.missing(), 0);
    assert_eq!(done.received_count, 7);
    assert_eq!(rx.active_sessions(), 0);
}

#[test]
fn test_lost_fragment_is_counted_missing() {
    let data = random_image(1, 1000);
    let (start, frags, end) = session_lines("img1000", &data, 180);

    let (mut rx, codec, _) = tracker();
    rx.handle_line(&start).unwrap();
    for (i, l) in frags.iter().enumerate() {
        if i != 3 {
            rx.handle_line(l).unwrap();
        }
    }
    let done = expect_completed(rx.handle_line(&end));
    assert!(!done.reconstructed());
    assert_eq!(done.missing(), 1);
    assert_eq!(done.outcome, Reconstruction::Incomplete { missing: 1 });
    assert!((done.success_rate() - 600.0 / 7.0).abs() < 1e-9);
    assert!(codec.saved.lock().unwrap().is_empty());
}

#[test]
fn test_packets_without_session_are_rejected() {
    let data = random_image(2, 300);
    let (_, frags, end) = session_lines("ghost", &data, 180);

    let (mut rx, _, _) = tracker();
    assert!(matches!(rx.handle_line(&frags[0]), Err(LinkError::UnknownSession(_))));
    assert!(matches!(rx.handle_line(&end), Err(LinkError::UnknownSession(_))));
    assert_eq!(rx.active_sessions(), 0);
    assert!(rx.completed().is_empty());
}

#[test]
fn test_fragment_after_end_is_unknown() {
    let data = random_image(2, 300);
    let (start, frags, end) = session_lines("late", &data, 180);

    let (mut rx, _, _) = tracker();
    rx.handle_line(&start).unwrap();
    rx.handle_line(&frags[0]).unwrap();
    expect_completed(rx.handle_line(&end));
    assert!(matches!(rx.handle_line(&frags[1]), Err(LinkError::UnknownSession(_))));
    assert_eq!(rx.completed().len(), 1);
    assert_eq!(rx.completed()[0].received_count, 1);
}

#[test]
fn test_second_start_replaces_session() {
    let data = random_image(4, 900);
    let (start, frags, end) = session_lines("again", &data, 180);

    let (mut rx, _, _) = tracker();
    rx.handle_line(&start).unwrap();
    rx.handle_line(&frags[0]).unwrap();
    rx.handle_line(&frags[1]).unwrap();

    match rx.handle_line(&start).unwrap() {
        Some(Inbound::Started { replaced, .. }) => assert!(replaced),
        other => panic!("unexpected {:?}", other),
    }
    let session = rx.active(&ImageId::new("again")).unwrap();
    assert_eq!(session.received_count(), 0);
    assert_eq!(session.signal.len(), 1);

    rx.handle_line(&frags[2]).unwrap();
    let done = expect_completed(rx.handle_line(&end));
    assert_eq!(done.received_count, 1);
    assert!(!done.reconstructed());
}

#[test]
fn test_interleaved_sessions() {
    let a = random_image(5, 400);
    let b = random_image(6, 500);
    let (sa, fa, ea) = session_lines("alpha", &a, 180);
    let (sb, fb, eb) = session_lines("bravo", &b, 180);

    let (mut rx, codec, _) = tracker();
    rx.handle_line(&sa).unwrap();
    rx.handle_line(&sb).unwrap();
    assert_eq!(rx.active_sessions(), 2);
    for (x, y) in fa.iter().zip(fb.iter()) {
        rx.handle_line(y).unwrap();
        rx.handle_line(x).unwrap();
    }
    for l in fb.iter().skip(fa.len()) {
        rx.handle_line(l).unwrap();
    }
    assert!(expect_completed(rx.handle_line(&eb)).reconstructed());
    assert!(expect_completed(rx.handle_line(&ea)).reconstructed());

    let saved = codec.saved.lock().unwrap();
    assert_eq!(saved[0], (ImageId::new("bravo"), b));
    assert_eq!(saved[1], (ImageId::new("alpha"), a));
}

#[test]
fn test_fragment_index_beyond_total() {
    let (mut rx, _, _) = tracker();
    let (start, _, _) = session_lines("bounds", &[1, 2, 3], 180);
    rx.handle_line(&start).unwrap();

    let rogue = Packet::Fragment(FragmentPacket {
        image_id: ImageId::new("bounds"),
        index: 5,
        total_fragments: 1,
        payload: vec![9],
    });
    assert!(matches!(rx.handle_line(&line(&rogue, -80, 3)), Err(LinkError::MalformedPacket(_))));
    assert_eq!(rx.active(&ImageId::new("bounds")).unwrap().received_count(), 0);
}

#[test]
fn test_codec_failure_still_completes() {
    let (mut rx, _, _) = tracker();
    let id = ImageId::new("empty");
    let start = Packet::Start(StartPacket {
        image_id: id.clone(),
        total_size: 0,
        total_fragments: 0,
        start_timestamp: 1.0,
    });
    let end = Packet::End(EndPacket { image_id: id, end_timestamp: 2.0 });

    rx.handle_line(&line(&start, -60, 10)).unwrap();
    let done = expect_completed(rx.handle_line(&line(&end, -60, 10)));
    assert!(matches!(done.outcome, Reconstruction::Failed(_)));
    assert_eq!(done.missing(), 0);
    assert_eq!(rx.completed().len(), 1);
}

#[test]
fn test_timing_and_signal_summary() {
    let data = random_image(8, 330);
    let (start, frags, end) = session_lines("timing", &data, 180);

    let (mut rx, _, clock) = tracker();
    rx.handle_line(&start).unwrap();
    for l in &frags {
        clock.pause_ms(1_800);
        rx.handle_line(l).unwrap();
    }
    clock.pause_ms(400);
    let done = expect_completed(rx.handle_line(&end));

    assert!((done.reception_secs - 4.0).abs() < 1e-9);
    assert!((done.transmission_secs - 12.5).abs() < 1e-9);
    assert!((done.throughput_bps() - 330.0 * 8.0 / 4.0).abs() < 1e-9);

    // End carries no sample: Start (-70) and two fragments (-75).
    let summary = done.summary.unwrap();
    assert_eq!(summary.samples, 3);
    assert_eq!(summary.min_rssi, -75);
    assert_eq!(summary.max_rssi, -70);
    assert_eq!(summary.rssi_spread(), 5);
}

#[test]
fn test_text_data_and_module_lines() {
    let (mut rx, _, _) = tracker();

    match rx.handle_line("+EVT:RXP2P:-65:11:48656C6C6F").unwrap() {
        Some(Inbound::Text { text, rssi, snr }) => {
            assert_eq!(text, "Hello");
            assert_eq!((rssi, snr), (-65, 11));
        }
        other => panic!("unexpected {:?}", other),
    }
    match rx.handle_line("+EVT:RXP2P:-65:11:FFFE00").unwrap() {
        Some(Inbound::Data { len, .. }) => assert_eq!(len, 3),
        other => panic!("unexpected {:?}", other),
    }
    // Separators inside the payload are ignored.
    match rx.handle_line("+EVT:RXP2P:-65:11:48 65-6C").unwrap() {
        Some(Inbound::Text { text, .. }) => assert_eq!(text, "Hel"),
        other => panic!("unexpected {:?}", other),
    }
    match rx.handle_line("+EVT:TXP2P DONE").unwrap() {
        Some(Inbound::Module(l)) => assert_eq!(l, "+EVT:TXP2P DONE"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(rx.handle_line("   \r\n").unwrap().is_none());
    assert_eq!(rx.active_sessions(), 0);
}

#[test]
fn test_malformed_lines() {
    let (mut rx, _, _) = tracker();
    for bad in [
        "+EVT:RXP2P:-65:11:ABC",
        "+EVT:RXP2P:-65:11:zz",
        "+EVT:RXP2P:-65:11:",
        "+EVT:RXP2P:loud:11:5300",
        // Start tag, too short
        "+EVT:RXP2P:-65:11:5341424344",
    ] {
        assert!(matches!(rx.handle_line(bad), Err(LinkError::MalformedPacket(_))), "{}", bad);
    }
    assert_eq!(rx.active_sessions(), 0);
}

#[test]
fn test_poll_reads_transport() {
    let data = random_image(9, 200);
    let (start, frags, end) = session_lines("poll", &data, 180);
    let mut lines: VecDeque<String> = VecDeque::new();
    lines.push_back("OK".to_string());
    lines.push_back(start);
    lines.extend(frags);
    lines.push_back(end);
    let mut inbox = Inbox { lines };

    let (mut rx, _, _) = tracker();
    let mut events = Vec::new();
    while let Some(event) = rx.poll(&mut inbox) {
        events.push(event.unwrap());
    }
    assert!(matches!(events[0], Inbound::Module(_)));
    assert!(matches!(events.last(), Some(Inbound::Completed(done)) if done.reconstructed()));
    assert!(rx.poll(&mut inbox).is_none());
}

#[test]
fn test_reception_report() {
    let (mut rx, _, _) = tracker();
    assert!(rx.report().is_none());

    let good = random_image(10, 300);
    let (s, f, e) = session_lines("good", &good, 180);
    feed(&mut rx, &[s]);
    feed(&mut rx, &f);
    feed(&mut rx, &[e]);

    let (s, f, e) = session_lines("lossy", &good, 180);
    feed(&mut rx, &[s]);
    feed(&mut rx, &f[..1]);
    feed(&mut rx, &[e]);

    let report = rx.report().unwrap();
    assert_eq!(report.sessions, 2);
    assert_eq!(report.reconstructed, 1);
    assert!((report.success_rate() - 50.0).abs() < 1e-9);
    // 2 Starts at -70 (excellent), 3 fragments at -75 (good)
    assert_eq!(report.distribution.excellent, 2);
    assert_eq!(report.distribution.good, 3);
    assert_eq!(report.signal.unwrap().samples, 5);
}

#[test]
fn test_jpeg_store_end_to_end() {
    let dir = std::env::temp_dir().join("lora_link_jpeg_e2e");
    let _ = std::fs::remove_dir_all(&dir);

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x78, 0x00, 0xA0];
    jpeg.extend_from_slice(&[0x03, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
    jpeg.extend_from_slice(&random_image(12, 400));
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let store = JpegFileStore::new(&dir).unwrap();
    let mut rx = ReceiverSessionTracker::new(Reassembler::new(Box::new(store)), Box::new(MockClock::new()));

    let (s, f, e) = session_lines("photo", &jpeg, 180);
    feed(&mut rx, &[s]);
    feed(&mut rx, &f);
    let done = expect_completed(rx.handle_line(&e));

    match &done.outcome {
        Reconstruction::Saved { path, width, height } => {
            assert_eq!((*width, *height), (160, 120));
            assert_eq!(std::fs::read(path).unwrap(), jpeg);
            assert!(path.file_name().unwrap().to_str().unwrap().starts_with("photo_"));
        }
        other => panic!("unexpected {:?}", other),
    }
    let _ = std::fs::remove_dir_all(&dir);
}
