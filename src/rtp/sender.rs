//! Builds and sends RTP packets over a [`crate::net::Connection`], keeping
//! one independent sequence counter per media kind.

use log::error;

use super::packet::{PayloadType, RtpHeader, RtpPacket};
use crate::net::Connection;

#[derive(Debug, Default, Clone, Copy)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub last_sequence_number: u16,
}

pub struct RtpSender {
    ssrc: u32,
    video_sequence_number: u16,
    audio_sequence_number: u16,
    control_sequence_number: u16,
    stats: SenderStats,
}

impl RtpSender {
    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            video_sequence_number: 0,
            audio_sequence_number: 0,
            control_sequence_number: 0,
            stats: SenderStats::default(),
        }
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    pub fn send_video_frame(
        &mut self,
        connection: &dyn Connection,
        data: &[u8],
        timestamp_90khz: u32,
        marker: bool,
    ) -> bool {
        let seq = self.video_sequence_number;
        self.video_sequence_number = self.video_sequence_number.wrapping_add(1);
        let header = self.build_header(PayloadType::VideoH264, seq, timestamp_90khz, marker);
        self.send(connection, header, data, "video")
    }

    pub fn send_audio_packet(
        &mut self,
        connection: &dyn Connection,
        data: &[u8],
        timestamp_48khz: u32,
    ) -> bool {
        let seq = self.audio_sequence_number;
        self.audio_sequence_number = self.audio_sequence_number.wrapping_add(1);
        let header = self.build_header(PayloadType::AudioOpus, seq, timestamp_48khz, false);
        self.send(connection, header, data, "audio")
    }

    pub fn send_control_message(
        &mut self,
        connection: &dyn Connection,
        data: &[u8],
        timestamp_ms: u32,
    ) -> bool {
        let seq = self.control_sequence_number;
        self.control_sequence_number = self.control_sequence_number.wrapping_add(1);
        let header = self.build_header(PayloadType::Control, seq, timestamp_ms, false);
        self.send(connection, header, data, "control")
    }

    pub fn send_raw_rtp_packet(&mut self, connection: &dyn Connection, packet: &RtpPacket) -> bool {
        self.send(connection, packet.header, &packet.payload, "raw")
    }

    fn build_header(&self, payload_type: PayloadType, seq: u16, timestamp: u32, marker: bool) -> RtpHeader {
        RtpHeader {
            marker,
            payload_type,
            sequence_number: seq,
            timestamp,
            ssrc: self.ssrc,
            ..Default::default()
        }
    }

    fn send(&mut self, connection: &dyn Connection, header: RtpHeader, payload: &[u8], kind: &str) -> bool {
        if !connection.is_open() {
            error!("connection not open");
            return false;
        }

        let packet = RtpPacket::new(header, payload.to_vec());
        let buffer = match packet.serialize() {
            Some(b) => b,
            None => {
                error!("failed to serialize {kind} RTP packet");
                return false;
            }
        };

        match connection.send(&buffer) {
            crate::error::Result::Ok(_) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += buffer.len() as u64;
                self.stats.last_sequence_number = header.sequence_number;
                true
            }
            crate::error::Result::Err(e) => {
                error!("failed to send {kind} packet: {}", e.full_message());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::{Connection, ConnectionType};
    use crate::error::Result;
    use std::sync::Mutex;

    struct FakeConnection {
        open: bool,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Connection for FakeConnection {
        fn open(&mut self) -> Result<()> {
            self.open = true;
            Result::ok(())
        }
        fn close(&mut self) {
            self.open = false;
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn send(&self, data: &[u8]) -> Result<usize> {
            self.sent.lock().unwrap().push(data.to_vec());
            Result::ok(data.len())
        }
        fn recv(&self, _buffer: &mut [u8], _timeout_ms: i64) -> Result<usize> {
            Result::err(crate::error::ErrorKind::Timeout, "no data")
        }
        fn connection_type(&self) -> ConnectionType {
            ConnectionType::Direct
        }
    }

    #[test]
    fn sequence_numbers_increment_independently_per_kind() {
        let conn = FakeConnection {
            open: true,
            sent: Mutex::new(Vec::new()),
        };
        let mut sender = RtpSender::new(0xAABB);
        assert!(sender.send_video_frame(&conn, b"frame0", 0, false));
        assert!(sender.send_video_frame(&conn, b"frame1", 90000, false));
        assert!(sender.send_audio_packet(&conn, b"audio0", 0));

        let sent = conn.sent.lock().unwrap();
        let second_video = RtpHeader::parse(&sent[1]).unwrap();
        assert_eq!(second_video.sequence_number, 1);
        let first_audio = RtpHeader::parse(&sent[2]).unwrap();
        assert_eq!(first_audio.sequence_number, 0);

        let stats = sender.stats();
        assert_eq!(stats.packets_sent, 3);
    }

    #[test]
    fn send_fails_when_connection_closed() {
        let conn = FakeConnection {
            open: false,
            sent: Mutex::new(Vec::new()),
        };
        let mut sender = RtpSender::new(1);
        assert!(!sender.send_video_frame(&conn, b"x", 0, false));
    }
}
