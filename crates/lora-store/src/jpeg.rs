//! Minimal JPEG container check: SOI/EOI markers and the frame header.

use core::fmt;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const SOS: u8 = 0xDA;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegError {
    MissingStart,
    MissingEnd,
    Truncated,
    NoFrameHeader,
    EmptyFrame,
}

impl fmt::Display for JpegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JpegError::MissingStart => write!(f, "stream does not start with a JPEG SOI marker"),
            JpegError::MissingEnd => write!(f, "stream has no JPEG EOI marker"),
            JpegError::Truncated => write!(f, "JPEG segment runs past end of stream"),
            JpegError::NoFrameHeader => write!(f, "no JPEG frame header before scan data"),
            JpegError::EmptyFrame => write!(f, "JPEG frame has zero width or height"),
        }
    }
}

// SOF0..SOF15, minus DHT (C4), JPG (C8) and DAC (CC) which share the range.
fn is_frame_header(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Returns (width, height) from the first frame header.
pub fn frame_size(data: &[u8]) -> Result<(u32, u32), JpegError> {
    if !data.starts_with(&SOI) {
        return Err(JpegError::MissingStart);
    }
    // Padding after EOI is tolerated; the scan stops at the last one.
    let end = data
        .windows(2)
        .rposition(|w| w == EOI)
        .filter(|&i| i >= 2)
        .ok_or(JpegError::MissingEnd)?;
    let data = &data[..end + 2];

    let mut pos = 2;
    while pos < data.len() {
        if data[pos] != 0xFF {
            return Err(JpegError::NoFrameHeader);
        }
        // Fill bytes
        while pos < data.len() && data[pos] == 0xFF {
            pos += 1;
        }
        let marker = *data.get(pos).ok_or(JpegError::Truncated)?;
        pos += 1;

        // Standalone markers carry no length.
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }
        if marker == SOS || marker == EOI[1] {
            return Err(JpegError::NoFrameHeader);
        }

        let len_bytes = data.get(pos..pos + 2).ok_or(JpegError::Truncated)?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if len < 2 || pos + len > data.len() {
            return Err(JpegError::Truncated);
        }

        if is_frame_header(marker) {
            // precision(1) height(2) width(2)
            let body = data.get(pos + 2..pos + 7).ok_or(JpegError::Truncated)?;
            let height = u16::from_be_bytes([body[1], body[2]]) as u32;
            let width = u16::from_be_bytes([body[3], body[4]]) as u32;
            if width == 0 || height == 0 {
                return Err(JpegError::EmptyFrame);
            }
            return Ok((width, height));
        }
        pos += len;
    }
    Err(JpegError::NoFrameHeader)
}
