//! Timestamp-bucketed reassembly buffer absorbing arrival-time jitter
//! before frames are handed to the decoder.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::warn;

use super::packet::RtpPacket;

#[derive(Debug, Clone, Copy)]
pub struct JitterBufferConfig {
    pub buffer_ms: u32,
    pub max_packets: usize,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            buffer_ms: 50,
            max_packets: 100,
        }
    }
}

struct PacketInfo {
    packet: RtpPacket,
    insert_time: Instant,
}

/// Buckets packets by RTP timestamp in a `BTreeMap` so the oldest bucket is
/// always `buffer_.iter().next()` — mirrors the reference implementation's
/// `std::map` ordering.
pub struct JitterBuffer {
    config: JitterBufferConfig,
    buffer: BTreeMap<u32, Vec<PacketInfo>>,
    expected_timestamp: Option<u32>,
    first_packet_time: Option<Instant>,
}

impl JitterBuffer {
    pub fn new(config: JitterBufferConfig) -> Self {
        Self {
            config,
            buffer: BTreeMap::new(),
            expected_timestamp: None,
            first_packet_time: None,
        }
    }

    pub fn insert_packet(&mut self, packet: RtpPacket) {
        if self.buffer.len() >= self.config.max_packets {
            warn!("jitter buffer overflow, dropping oldest frame");
            if let Some(&oldest) = self.buffer.keys().next() {
                self.buffer.remove(&oldest);
            }
        }

        let insert_time = Instant::now();
        if self.first_packet_time.is_none() {
            self.first_packet_time = Some(insert_time);
        }
        if self.expected_timestamp.is_none() {
            self.expected_timestamp = Some(packet.header.timestamp);
        }

        let timestamp = packet.header.timestamp;
        self.buffer
            .entry(timestamp)
            .or_default()
            .push(PacketInfo { packet, insert_time });
    }

    /// Extracts the oldest bucket once it has sat for at least `buffer_ms`,
    /// concatenating its packets' payloads in arrival order. Returns
    /// `(frame_data, timestamp)`.
    pub fn try_extract_frame(&mut self) -> Option<(Vec<u8>, u32)> {
        let &oldest_ts = self.buffer.keys().next()?;
        let bucket = self.buffer.get(&oldest_ts)?;
        let front = bucket.first()?;

        if front.insert_time.elapsed() < Duration::from_millis(self.config.buffer_ms as u64) {
            return None;
        }

        let bucket = self.buffer.remove(&oldest_ts)?;
        let mut frame_data = Vec::new();
        for info in &bucket {
            frame_data.extend_from_slice(&info.packet.payload);
        }
        Some((frame_data, oldest_ts))
    }

    /// Elapsed time since the very first packet inserted since the last
    /// reset — not the age of the current oldest bucket.
    pub fn buffered_ms(&self) -> u32 {
        if self.buffer.is_empty() {
            return 0;
        }
        match self.first_packet_time {
            Some(t) => t.elapsed().as_millis() as u32,
            None => 0,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_timestamp = None;
        self.first_packet_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::packet::RtpHeader;

    fn packet_with(timestamp: u32, payload: Vec<u8>) -> RtpPacket {
        RtpPacket::new(
            RtpHeader {
                timestamp,
                ..Default::default()
            },
            payload,
        )
    }

    #[test]
    fn withholds_frame_until_buffer_ms_elapses() {
        let mut jb = JitterBuffer::new(JitterBufferConfig {
            buffer_ms: 30,
            max_packets: 10,
        });
        jb.insert_packet(packet_with(100, vec![1, 2, 3]));
        assert!(jb.try_extract_frame().is_none());
        std::thread::sleep(Duration::from_millis(40));
        let (data, ts) = jb.try_extract_frame().unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(ts, 100);
    }

    #[test]
    fn concatenates_packets_sharing_a_timestamp() {
        let mut jb = JitterBuffer::new(JitterBufferConfig {
            buffer_ms: 0,
            max_packets: 10,
        });
        jb.insert_packet(packet_with(5, vec![1, 2]));
        jb.insert_packet(packet_with(5, vec![3, 4]));
        let (data, ts) = jb.try_extract_frame().unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
        assert_eq!(ts, 5);
    }

    #[test]
    fn overflow_evicts_oldest_bucket() {
        let mut jb = JitterBuffer::new(JitterBufferConfig {
            buffer_ms: 0,
            max_packets: 2,
        });
        jb.insert_packet(packet_with(1, vec![1]));
        jb.insert_packet(packet_with(2, vec![2]));
        jb.insert_packet(packet_with(3, vec![3]));
        // timestamp 1 should have been evicted; 2 extracts first.
        let (_, ts) = jb.try_extract_frame().unwrap();
        assert_eq!(ts, 2);
    }

    #[test]
    fn reset_clears_state() {
        let mut jb = JitterBuffer::new(JitterBufferConfig::default());
        jb.insert_packet(packet_with(1, vec![9]));
        jb.reset();
        assert_eq!(jb.buffered_ms(), 0);
        assert!(jb.try_extract_frame().is_none());
    }
}
