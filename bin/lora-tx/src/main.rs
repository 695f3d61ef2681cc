use clap::Parser;
use colored::Colorize;
use log::{info, warn};
use lora_core::{ImageId, LinkConfig, LinkError, DEFAULT_MAX_PAYLOAD};
use lora_link::Transmitter;
use lora_linux::{setup, LinuxClock, Rak3172, RadioSettings};
use std::path::{Path, PathBuf};
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Send JPEG images over a RAK3172 LoRa P2P link")]
struct Cli {
    #[arg(long, default_value = "/dev/ttyUSB0")] device: String,
    #[arg(long, default_value_t = 115200)] baud: u32,
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)] max_payload: usize,
    /// Session id (8 bytes max). Defaults to the file stem.
    #[arg(long)] id: Option<String>,
    /// Send a plain text message before any image.
    #[arg(long)] text: Option<String>,
    /// Seconds to wait between images.
    #[arg(long, default_value_t = 5)] pause: u64,
    files: Vec<PathBuf>,
}

fn image_id(cli: &Cli, path: &Path) -> ImageId {
    match &cli.id {
        Some(id) => ImageId::new(id),
        None => ImageId::new(&path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default()),
    }
}

fn run(cli: &Cli, tx: &mut Transmitter, stop: &AtomicBool) -> anyhow::Result<()> {
    if let Some(text) = &cli.text {
        match tx.send_text(text) {
            Ok(()) => println!("{} '{}'", "Text sent:".green(), text),
            Err(e) => println!("{} {}", "Text send failed:".red(), e),
        }
    }

    for (i, path) in cli.files.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if i > 0 {
            std::thread::sleep(Duration::from_secs(cli.pause));
        }

        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let id = image_id(cli, path);
        info!("[{}/{}] {} as '{}'", i + 1, cli.files.len(), path.display(), id);

        match tx.send_image(&id, &data) {
            Ok(record) => println!(
                "{} '{}': {}/{} fragments ({:.1}%) in {:.1}s, {:.2} kbps{}",
                "Sent".green().bold(),
                record.image_id,
                record.successful_fragments,
                record.total_fragments,
                record.success_rate(),
                record.duration_secs(),
                record.throughput_kbps(),
                if record.end_acknowledged { String::new() } else { " (end not acknowledged)".yellow().to_string() },
            ),
            Err(LinkError::Interrupted) => break,
            Err(e) => println!("{} '{}': {}", "Failed".red().bold(), id, e),
        }
    }
    Ok(())
}

fn print_statistics(tx: &Transmitter) {
    let Some(report) = tx.report() else {
        println!("{}", "No transmissions yet".dimmed());
        return;
    };
    println!("\n{}", "Transmission Statistics".bold());
    println!("   Total images sent:    {} ({} aborted)", report.images, report.aborted);
    println!("   Average duration:     {:.2}s", report.avg_duration_secs);
    println!("   Average success rate: {:.1}%", report.avg_success_rate);
    println!("   Total data sent:      {:.1} KB", report.total_bytes as f64 / 1024.0);
    println!("   Average throughput:   {:.2} kbps", report.avg_throughput_kbps);
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!(">>> LORA TX: {} @ {} baud <<<", cli.device, cli.baud);

    let config = LinkConfig::default().with_max_payload(cli.max_payload);
    let mut radio = Rak3172::open(&cli.device, cli.baud, config.settle_ms)?;
    setup::configure_transmitter(&mut radio, &RadioSettings::default())?;

    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping after the current packet...");
        s.store(true, Ordering::SeqCst);
    })?;

    let mut tx = Transmitter::new(Box::new(radio), Box::new(LinuxClock::new()), config)?
        .with_stop_flag(stop.clone());

    let result = run(&cli, &mut tx, &stop);
    print_statistics(&tx);
    result
}
