use clap::Parser;
use colored::{ColoredString, Colorize};
use log::{info, warn};
use lora_core::LinkError;
use lora_link::{CompletedSession, Inbound, Reassembler, ReceiverSessionTracker, Reconstruction};
use lora_linux::{setup, LinuxClock, Rak3172, RadioSettings};
use lora_stats::RssiQuality;
use lora_store::JpegFileStore;
use std::path::PathBuf;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Receive JPEG images over a RAK3172 LoRa P2P link")]
struct Cli {
    #[arg(long, default_value = "/dev/ttyUSB0")] device: String,
    #[arg(long, default_value_t = 115200)] baud: u32,
    #[arg(long, default_value = "received_images")] output: PathBuf,
    /// Idle wait between polls when the module has nothing to say.
    #[arg(long, default_value_t = 10)] idle_ms: u64,
}

fn band(quality: RssiQuality) -> ColoredString {
    let label = quality.to_string();
    match quality {
        RssiQuality::Excellent => label.green(),
        RssiQuality::Good => label.yellow(),
        RssiQuality::Fair => label.truecolor(255, 165, 0),
        RssiQuality::Poor => label.red(),
    }
}

fn print_completion(done: &CompletedSession) {
    println!("\n{} '{}'", "Image transfer complete:".bold(), done.image_id);
    println!("   Fragments:    {}/{} ({:.1}%)", done.received_count, done.total_fragments, done.success_rate());
    println!("   Transmission: {:.2}s (sender clock)", done.transmission_secs);
    println!("   Reception:    {:.2}s, {:.0} bps", done.reception_secs, done.throughput_bps());
    if let Some(s) = &done.summary {
        println!(
            "   RSSI:         avg {:.1} dBm [{}], range {}..{} dBm, spread {} dB ({})",
            s.avg_rssi, band(s.rssi_quality()), s.min_rssi, s.max_rssi, s.rssi_spread(), s.stability()
        );
        println!(
            "   SNR:          avg {:.1} dB [{}], range {}..{} dB",
            s.avg_snr, s.snr_quality(), s.min_snr, s.max_snr
        );
    }
    match &done.outcome {
        Reconstruction::Saved { path, width, height } => {
            println!("   {} {} ({}x{})", "Saved".green().bold(), path.display(), width, height)
        }
        Reconstruction::Failed(reason) => println!("   {} {}", "Reconstruction failed:".red().bold(), reason),
        Reconstruction::Incomplete { missing } => {
            println!("   {} {} fragments missing", "Incomplete:".red().bold(), missing)
        }
    }
}

fn print_statistics(rx: &ReceiverSessionTracker) {
    let Some(report) = rx.report() else {
        println!("{}", "No images received yet".dimmed());
        return;
    };
    println!("\n{}", "Reception Statistics".bold());
    println!("   Total images received:      {}", report.sessions);
    println!("   Successfully reconstructed: {}", report.reconstructed);
    println!("   Success rate:               {:.1}%", report.success_rate());
    println!("   Average reception time:     {:.2}s", report.avg_reception_secs);

    let Some(s) = report.signal else { return };
    println!("\n{} (all {} packets)", "RSSI Analysis".bold(), s.samples);
    println!("   Average: {:.1} dBm, range {}..{} dBm, spread {} dB", s.avg_rssi, s.min_rssi, s.max_rssi, s.rssi_spread());
    for quality in RssiQuality::ALL {
        println!(
            "     {:<10} {}/{} ({:.1}%)",
            band(quality),
            report.distribution.count(quality),
            report.distribution.total(),
            report.distribution.percent(quality)
        );
    }
    println!("\n{}", "SNR Analysis".bold());
    println!("   Average: {:.1} dB, range {}..{} dB [{}]", s.avg_snr, s.min_snr, s.max_snr, s.snr_quality());

    println!("\n{}", "Recommendations".bold());
    for hint in s.advice().hints() {
        println!("   - {}", hint);
    }
}

fn run(cli: &Cli, radio: &mut Rak3172, rx: &mut ReceiverSessionTracker, stop: &AtomicBool) {
    info!("Listening. Press Ctrl+C to stop.");
    while !stop.load(Ordering::SeqCst) {
        match rx.poll(radio) {
            None => std::thread::sleep(Duration::from_millis(cli.idle_ms)),
            Some(Ok(Inbound::Completed(done))) => print_completion(&done),
            Some(Ok(Inbound::Started { image_id, total_size, total_fragments, rssi, .. })) => println!(
                "{} '{}': {} bytes, {} fragments (RSSI {} dBm)",
                "Receiving".cyan().bold(), image_id, total_size, total_fragments, rssi
            ),
            Some(Ok(Inbound::Progress { received, total, rssi, band: quality, duplicate: false, .. })) => println!(
                "   fragment {}/{} ({:.1}%) RSSI {} dBm [{}]",
                received,
                total,
                received as f64 * 100.0 / total.max(1) as f64,
                rssi,
                band(quality)
            ),
            Some(Ok(Inbound::Text { text, rssi, snr })) => {
                println!("{} '{}' (RSSI {} dBm, SNR {} dB)", "Text:".cyan(), text, rssi, snr)
            }
            Some(Ok(Inbound::Data { len, rssi, snr })) => {
                println!("{} {} bytes (RSSI {} dBm, SNR {} dB)", "Data:".cyan(), len, rssi, snr)
            }
            Some(Ok(_)) => {}
            // Malformed and unknown-session packets were already logged.
            Some(Err(LinkError::Io(e))) => warn!("Serial read failed: {}", e),
            Some(Err(_)) => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!(">>> LORA RX: {} @ {} baud -> {} <<<", cli.device, cli.baud, cli.output.display());

    let store = JpegFileStore::new(&cli.output)?;
    let mut radio = Rak3172::open(&cli.device, cli.baud, 0)?;
    setup::configure_receiver(&mut radio, &RadioSettings::default())?;

    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping...");
        s.store(true, Ordering::SeqCst);
    })?;

    let mut rx = ReceiverSessionTracker::new(Reassembler::new(Box::new(store)), Box::new(LinuxClock::new()));
    run(&cli, &mut radio, &mut rx, &stop);

    print_statistics(&rx);
    if rx.active_sessions() > 0 {
        warn!("{} session(s) still in progress were dropped", rx.active_sessions());
    }
    Ok(())
}
