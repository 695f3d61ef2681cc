use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use log::{debug, info};

use lora_core::{LinkError, LinkResult};
use lora_hal::{PlatformClock, RadioTransport, TxResponse};

pub mod setup;
pub use setup::{AtCommand, RadioSettings, Role};

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        _ => return None,
    })
}

/// Raw 8N1 tty in non-blocking mode. Closed when dropped.
pub struct SerialPort {
    file: File,
    path: String,
}

impl SerialPort {
    pub fn open(path: &str, baud: u32) -> anyhow::Result<Self> {
        let speed = baud_constant(baud).ok_or_else(|| anyhow::anyhow!("unsupported baud rate {}", baud))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .with_context(|| format!("cannot open serial device {}", path))?;

        let fd = file.as_raw_fd();
        configure_tty(fd, speed).with_context(|| format!("cannot configure {}", path))?;

        info!("Serial port {} open at {} baud", path, baud);
        Ok(Self { file, path: path.to_string() })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\r\n")?;
        self.file.flush()
    }

    /// Everything the device has buffered right now. Never blocks.
    pub fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        debug!("Closing serial port {}", self.path);
    }
}

fn configure_tty(fd: RawFd, speed: libc::speed_t) -> io::Result<()> {
    unsafe {
        let mut tty: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tty) != 0 {
            return Err(io::Error::last_os_error());
        }
        // 8N1, no flow control, no line discipline
        libc::cfmakeraw(&mut tty);
        tty.c_cflag |= libc::CLOCAL | libc::CREAD;
        tty.c_cflag &= !(libc::CSTOPB | libc::PARENB);
        tty.c_cc[libc::VMIN] = 0;
        tty.c_cc[libc::VTIME] = 0;
        libc::cfsetispeed(&mut tty, speed);
        libc::cfsetospeed(&mut tty, speed);
        if libc::tcsetattr(fd, libc::TCSANOW, &tty) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::tcflush(fd, libc::TCIOFLUSH);
    }
    Ok(())
}

/// RAK3172 in LoRa P2P mode, driven through its AT command set.
pub struct Rak3172 {
    port: SerialPort,
    settle_ms: u64,
    pending: Vec<u8>,
}

impl Rak3172 {
    /// `settle_ms` is how long `submit` waits for airtime before reading the answer.
    pub fn open(path: &str, baud: u32, settle_ms: u64) -> anyhow::Result<Self> {
        Ok(Self { port: SerialPort::open(path, baud)?, settle_ms, pending: Vec::new() })
    }

    pub fn port(&self) -> &SerialPort {
        &self.port
    }
}

impl AtCommand for Rak3172 {
    fn command(&mut self, cmd: &str, wait_ms: u64) -> LinkResult<String> {
        self.port.write_line(cmd)?;
        thread::sleep(Duration::from_millis(wait_ms));
        let raw = self.port.read_available()?;
        Ok(String::from_utf8_lossy(&raw).trim().to_string())
    }
}

impl RadioTransport for Rak3172 {
    fn submit(&mut self, hex_payload: &str) -> LinkResult<TxResponse> {
        let response = self.command(&format!("AT+PSEND={}", hex_payload), self.settle_ms)?;
        let answer = TxResponse::classify(&response);
        debug!("PSEND ({} hex chars) -> {:?}", hex_payload.len(), answer);
        Ok(answer)
    }

    fn recv_line(&mut self) -> nb::Result<String, LinkError> {
        if !self.pending.contains(&b'\n') {
            let raw = self.port.read_available().map_err(|e| nb::Error::Other(LinkError::Io(e)))?;
            self.pending.extend_from_slice(&raw);
        }
        match self.pending.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                Ok(String::from_utf8_lossy(&line).trim().to_string())
            }
            None => Err(nb::Error::WouldBlock),
        }
    }
}

pub struct LinuxClock(Instant);

impl LinuxClock {
    pub fn new() -> Self {
        Self(Instant::now())
    }
}

impl Default for LinuxClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformClock for LinuxClock {
    fn now_us(&self) -> u64 {
        self.0.elapsed().as_micros() as u64
    }

    fn unix_time(&self) -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    fn pause_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
