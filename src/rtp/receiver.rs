//! Parses inbound RTP packets and tracks sequence-number continuity.

use log::{error, warn};

use super::packet::{RtpHeader, RtpPacket};
use crate::error::ErrorKind;
use crate::net::Connection;

const RECV_BUFFER_SIZE: usize = 65536;
const MAX_MISSING_SEQUENCES: usize = 100;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_lost: u64,
    pub last_sequence_number: u16,
    pub last_timestamp: u32,
}

pub struct RtpReceiver {
    stats: ReceiverStats,
    expected_sequence_number: u16,
    has_received_first_packet: bool,
}

impl Default for RtpReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl RtpReceiver {
    pub fn new() -> Self {
        Self {
            stats: ReceiverStats::default(),
            expected_sequence_number: 0,
            has_received_first_packet: false,
        }
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn receive_packet(&mut self, connection: &dyn Connection, timeout_ms: i64) -> Option<RtpPacket> {
        if !connection.is_open() {
            error!("connection not open");
            return None;
        }

        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        match connection.recv(&mut buffer, timeout_ms) {
            crate::error::Result::Ok(n) => self.parse_packet(&buffer[..n]),
            crate::error::Result::Err(e) => {
                if e.kind() != ErrorKind::Timeout {
                    error!("failed to receive: {}", e.full_message());
                }
                None
            }
        }
    }

    pub fn parse_packet(&mut self, buffer: &[u8]) -> Option<RtpPacket> {
        let packet = match RtpPacket::parse(buffer) {
            Some(p) => p,
            None => {
                warn!("failed to parse RTP packet");
                return None;
            }
        };
        self.update_stats(&packet.header, packet.payload.len());
        Some(packet)
    }

    /// Lists every sequence number strictly between `prev_seq` and
    /// `curr_seq`, wrap-aware. Capped at 100 entries to avoid treating a
    /// stream reset as tens of thousands of losses.
    pub fn detect_missing_sequences(prev_seq: u16, curr_seq: u16) -> Vec<u16> {
        let mut missing = Vec::new();
        let mut expected = prev_seq.wrapping_add(1);
        while expected != curr_seq {
            missing.push(expected);
            expected = expected.wrapping_add(1);
            if missing.len() > MAX_MISSING_SEQUENCES {
                error!("too many missing sequences, possible reset");
                break;
            }
        }
        missing
    }

    fn update_stats(&mut self, header: &RtpHeader, payload_len: usize) {
        self.stats.packets_received += 1;
        self.stats.bytes_received += payload_len as u64;
        self.stats.last_sequence_number = header.sequence_number;
        self.stats.last_timestamp = header.timestamp;

        if self.has_received_first_packet {
            if header.sequence_number != self.expected_sequence_number {
                let missing = Self::detect_missing_sequences(
                    self.expected_sequence_number.wrapping_sub(1),
                    header.sequence_number,
                );
                self.stats.packets_lost += missing.len() as u64;
                if !missing.is_empty() {
                    warn!("detected {} missing packet(s)", missing.len());
                }
            }
        } else {
            self.has_received_first_packet = true;
        }

        self.expected_sequence_number = header.sequence_number.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::packet::{PayloadType, RtpHeader, RtpPacket};

    fn packet_with_seq(seq: u16) -> RtpPacket {
        RtpPacket::new(
            RtpHeader {
                payload_type: PayloadType::VideoH264,
                sequence_number: seq,
                ..Default::default()
            },
            vec![1, 2, 3],
        )
    }

    #[test]
    fn contiguous_sequence_reports_no_loss() {
        let mut recv = RtpReceiver::new();
        for seq in 0..5u16 {
            let wire = packet_with_seq(seq).serialize().unwrap();
            assert!(recv.parse_packet(&wire).is_some());
        }
        assert_eq!(recv.stats().packets_lost, 0);
    }

    #[test]
    fn gap_in_sequence_is_detected() {
        let mut recv = RtpReceiver::new();
        let first = packet_with_seq(10).serialize().unwrap();
        assert!(recv.parse_packet(&first).is_some());
        let next = packet_with_seq(13).serialize().unwrap();
        assert!(recv.parse_packet(&next).is_some());
        assert_eq!(recv.stats().packets_lost, 2);
    }

    #[test]
    fn sequence_number_wraps_around() {
        let missing = RtpReceiver::detect_missing_sequences(u16::MAX, 1);
        assert_eq!(missing, vec![0]);
    }

    #[test]
    fn malformed_buffer_returns_none() {
        let mut recv = RtpReceiver::new();
        assert!(recv.parse_packet(&[0u8; 2]).is_none());
    }
}
