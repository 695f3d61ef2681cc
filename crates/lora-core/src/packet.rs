//! Wire format of the three image packets. All integers little-endian.
//!
//! ```text
//! Start    'S' | image_id[8] | total_size u16 | total_fragments u16 | start_ts f64   (21 bytes)
//! Fragment 'F' | image_id[8] | index u16 | total_fragments u16 | len u16 | payload  (15 + len)
//! End      'E' | image_id[8] | end_ts f64                                          (17 bytes)
//! ```

use crate::{
    ImageId, LinkError, LinkResult, END_PACKET_SIZE, FRAGMENT_HEADER_SIZE, IMAGE_ID_LEN,
    START_PACKET_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Start = b'S',
    Fragment = b'F',
    End = b'E',
}

impl PacketType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'S' => Some(PacketType::Start),
            b'F' => Some(PacketType::Fragment),
            b'E' => Some(PacketType::End),
            _ => None,
        }
    }

    /// True if the first byte of a payload marks protocol traffic.
    pub fn is_protocol(payload: &[u8]) -> bool {
        payload.first().and_then(|&b| Self::from_tag(b)).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartPacket {
    pub image_id: ImageId,
    pub total_size: u16,
    pub total_fragments: u16,
    /// Sender wall clock, seconds since the Unix epoch.
    pub start_timestamp: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentPacket {
    pub image_id: ImageId,
    pub index: u16,
    pub total_fragments: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndPacket {
    pub image_id: ImageId,
    pub end_timestamp: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Start(StartPacket),
    Fragment(FragmentPacket),
    End(EndPacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Start(_) => PacketType::Start,
            Packet::Fragment(_) => PacketType::Fragment,
            Packet::End(_) => PacketType::End,
        }
    }

    pub fn image_id(&self) -> &ImageId {
        match self {
            Packet::Start(p) => &p.image_id,
            Packet::Fragment(p) => &p.image_id,
            Packet::End(p) => &p.image_id,
        }
    }

    pub fn to_bytes(&self) -> LinkResult<Vec<u8>> {
        match self {
            Packet::Start(p) => {
                let mut buf = Vec::with_capacity(START_PACKET_SIZE);
                buf.push(PacketType::Start as u8);
                buf.extend_from_slice(&p.image_id.to_slot());
                buf.extend_from_slice(&p.total_size.to_le_bytes());
                buf.extend_from_slice(&p.total_fragments.to_le_bytes());
                buf.extend_from_slice(&p.start_timestamp.to_le_bytes());
                Ok(buf)
            }
            Packet::Fragment(p) => {
                let len = u16::try_from(p.payload.len())
                    .map_err(|_| LinkError::MalformedPacket("fragment payload exceeds u16 length"))?;
                let mut buf = Vec::with_capacity(FRAGMENT_HEADER_SIZE + p.payload.len());
                buf.push(PacketType::Fragment as u8);
                buf.extend_from_slice(&p.image_id.to_slot());
                buf.extend_from_slice(&p.index.to_le_bytes());
                buf.extend_from_slice(&p.total_fragments.to_le_bytes());
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(&p.payload);
                Ok(buf)
            }
            Packet::End(p) => {
                let mut buf = Vec::with_capacity(END_PACKET_SIZE);
                buf.push(PacketType::End as u8);
                buf.extend_from_slice(&p.image_id.to_slot());
                buf.extend_from_slice(&p.end_timestamp.to_le_bytes());
                Ok(buf)
            }
        }
    }

    pub fn from_bytes(buf: &[u8]) -> LinkResult<Self> {
        let tag = *buf.first().ok_or(LinkError::MalformedPacket("empty packet"))?;
        let kind = PacketType::from_tag(tag).ok_or(LinkError::MalformedPacket("unknown packet tag"))?;

        match kind {
            PacketType::Start => {
                if buf.len() < START_PACKET_SIZE {
                    return Err(LinkError::MalformedPacket("start packet too short"));
                }
                Ok(Packet::Start(StartPacket {
                    image_id: ImageId::from_slot(&buf[1..1 + IMAGE_ID_LEN])?,
                    total_size: read_u16(buf, 9),
                    total_fragments: read_u16(buf, 11),
                    start_timestamp: read_f64(buf, 13),
                }))
            }
            PacketType::Fragment => {
                if buf.len() < FRAGMENT_HEADER_SIZE {
                    return Err(LinkError::MalformedPacket("fragment packet too short"));
                }
                let len = read_u16(buf, 13) as usize;
                if buf.len() < FRAGMENT_HEADER_SIZE + len {
                    return Err(LinkError::MalformedPacket("fragment payload truncated"));
                }
                Ok(Packet::Fragment(FragmentPacket {
                    image_id: ImageId::from_slot(&buf[1..1 + IMAGE_ID_LEN])?,
                    index: read_u16(buf, 9),
                    total_fragments: read_u16(buf, 11),
                    payload: buf[FRAGMENT_HEADER_SIZE..FRAGMENT_HEADER_SIZE + len].to_vec(),
                }))
            }
            PacketType::End => {
                if buf.len() < END_PACKET_SIZE {
                    return Err(LinkError::MalformedPacket("end packet too short"));
                }
                Ok(Packet::End(EndPacket {
                    image_id: ImageId::from_slot(&buf[1..1 + IMAGE_ID_LEN])?,
                    end_timestamp: read_f64(buf, 9),
                }))
            }
        }
    }
}

// Callers check the length first.
fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_f64(buf: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    f64::from_le_bytes(raw)
}
