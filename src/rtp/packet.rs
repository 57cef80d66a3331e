//! RTP-shaped packet header: a 12-byte big-endian framing reused for every
//! media and control payload so one receive loop demultiplexes everything
//! by `PayloadType`.

use std::time::Instant;

pub const RTP_VERSION: u8 = 2;
pub const RTP_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    VideoH264 = 96,
    AudioOpus = 97,
    Control = 98,
    ControlAck = 99,
}

impl PayloadType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            96 => Some(PayloadType::VideoH264),
            97 => Some(PayloadType::AudioOpus),
            98 => Some(PayloadType::Control),
            99 => Some(PayloadType::ControlAck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: PayloadType,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl Default for RtpHeader {
    fn default() -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type: PayloadType::VideoH264,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
        }
    }
}

impl RtpHeader {
    /// Writes the 12-byte header into `buffer`. Returns `false` if the
    /// buffer is too small to hold it.
    pub fn serialize(&self, buffer: &mut [u8]) -> bool {
        if buffer.len() < RTP_HEADER_SIZE {
            return false;
        }
        buffer[0] = (self.version & 0x03) << 6
            | (self.padding as u8) << 5
            | (self.extension as u8) << 4
            | (self.csrc_count & 0x0F);
        buffer[1] = (self.marker as u8) << 7 | (self.payload_type as u8 & 0x7F);
        buffer[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        buffer[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buffer[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        true
    }

    pub fn parse(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < RTP_HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: (buffer[0] >> 6) & 0x03,
            padding: (buffer[0] >> 5) & 0x01 != 0,
            extension: (buffer[0] >> 4) & 0x01 != 0,
            csrc_count: buffer[0] & 0x0F,
            marker: (buffer[1] >> 7) & 0x01 != 0,
            payload_type: PayloadType::from_u8(buffer[1] & 0x7F)?,
            sequence_number: u16::from_be_bytes([buffer[2], buffer[3]]),
            timestamp: u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]),
            ssrc: u32::from_be_bytes([buffer[8], buffer[9], buffer[10], buffer[11]]),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Vec<u8>,
    pub arrival_time: Option<Instant>,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Vec<u8>) -> Self {
        Self {
            header,
            payload,
            arrival_time: None,
        }
    }

    pub fn serialize(&self) -> Option<Vec<u8>> {
        let mut buffer = vec![0u8; RTP_HEADER_SIZE + self.payload.len()];
        if !self.header.serialize(&mut buffer) {
            return None;
        }
        buffer[RTP_HEADER_SIZE..].copy_from_slice(&self.payload);
        Some(buffer)
    }

    /// Parses a wire packet and stamps `arrival_time` with the current
    /// instant, for jitter-buffer bookkeeping downstream.
    pub fn parse(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < RTP_HEADER_SIZE {
            return None;
        }
        let header = RtpHeader::parse(buffer)?;
        Some(Self {
            header,
            payload: buffer[RTP_HEADER_SIZE..].to_vec(),
            arrival_time: Some(Instant::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = RtpHeader {
            marker: true,
            payload_type: PayloadType::AudioOpus,
            sequence_number: 0xABCD,
            timestamp: 0x1122_3344,
            ssrc: 0xDEAD_BEEF,
            ..Default::default()
        };
        let mut buf = [0u8; RTP_HEADER_SIZE];
        assert!(header.serialize(&mut buf));
        let parsed = RtpHeader::parse(&buf).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn packet_round_trips_with_payload() {
        let header = RtpHeader {
            payload_type: PayloadType::VideoH264,
            sequence_number: 7,
            timestamp: 1000,
            ssrc: 42,
            ..Default::default()
        };
        let packet = RtpPacket::new(header, vec![1, 2, 3, 4, 5]);
        let wire = packet.serialize().unwrap();
        assert_eq!(wire.len(), RTP_HEADER_SIZE + 5);

        let parsed = RtpPacket::parse(&wire).unwrap();
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.payload, vec![1, 2, 3, 4, 5]);
        assert!(parsed.arrival_time.is_some());
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert!(RtpHeader::parse(&[0u8; 4]).is_none());
        assert!(RtpPacket::parse(&[0u8; 4]).is_none());
    }

    #[test]
    fn parse_rejects_unknown_payload_type() {
        let mut buf = [0u8; RTP_HEADER_SIZE];
        buf[1] = 50; // not a known PayloadType
        assert!(RtpHeader::parse(&buf).is_none());
    }

    #[test]
    fn empty_payload_round_trips() {
        let header = RtpHeader::default();
        let packet = RtpPacket::new(header, Vec::new());
        let wire = packet.serialize().unwrap();
        assert_eq!(wire.len(), RTP_HEADER_SIZE);
        let parsed = RtpPacket::parse(&wire).unwrap();
        assert!(parsed.payload.is_empty());
    }
}
