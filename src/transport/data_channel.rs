//! A labelled, optionally-ordered byte-message stream riding the control
//! RTP payload types, shaped like [`crate::reliable::ReliableInputSender`]
//! / `ReliableInputReceiver` but carrying opaque bytes instead of a typed
//! `InputEvent`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::error::{ErrorKind, Result};
use crate::net::Connection;
use crate::rtp::control::{AckPayload, ControlMessage, ControlMessageType};
use crate::rtp::packet::{PayloadType, RtpHeader, RtpPacket};

const DEFAULT_RETRY_TIMEOUT_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct DataChannelConfig {
    pub ordered: bool,
    pub max_retransmits: u32,
    pub max_packet_life_time_ms: u32,
}

impl Default for DataChannelConfig {
    fn default() -> Self {
        Self {
            ordered: true,
            max_retransmits: 3,
            max_packet_life_time_ms: 0,
        }
    }
}

struct PendingMessage {
    payload: Vec<u8>,
    sequence: u16,
    send_time: Instant,
    retry_count: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DataChannelStats {
    pub messages_sent: u64,
    pub messages_acked: u64,
    pub messages_retried: u64,
    pub messages_failed: u64,
    pub messages_received: u64,
}

pub type MessageCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Wraps the same sequence/ack/retry shape as `ReliableInputSender` /
/// `ReliableInputReceiver` behind a labelled channel with an explicit
/// connecting → open → closing → closed state machine. Forward transitions
/// only; a closed channel never reopens.
pub struct DataChannel {
    label: String,
    config: DataChannelConfig,
    ssrc: u32,
    state: DataChannelState,
    next_sequence: u16,
    ack_sequence: u16,
    pending: VecDeque<PendingMessage>,
    stats: DataChannelStats,
    on_message: Option<MessageCallback>,
}

impl DataChannel {
    pub fn new(label: impl Into<String>, ssrc: u32, config: DataChannelConfig) -> Self {
        Self {
            label: label.into(),
            config,
            ssrc,
            state: DataChannelState::Connecting,
            next_sequence: 0,
            ack_sequence: 0,
            pending: VecDeque::new(),
            stats: DataChannelStats::default(),
            on_message: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> DataChannelState {
        self.state
    }

    pub fn config(&self) -> DataChannelConfig {
        self.config
    }

    pub fn stats(&self) -> DataChannelStats {
        self.stats
    }

    pub fn set_message_callback(&mut self, callback: MessageCallback) {
        self.on_message = Some(callback);
    }

    /// `PeerConnection.connect` calls this once the underlying connection
    /// is open.
    pub fn mark_open(&mut self) {
        if self.state == DataChannelState::Connecting {
            self.state = DataChannelState::Open;
            debug!("data channel '{}' open", self.label);
        }
    }

    pub fn begin_close(&mut self) {
        if self.state == DataChannelState::Open {
            self.state = DataChannelState::Closing;
        }
    }

    pub fn mark_closed(&mut self) {
        self.state = DataChannelState::Closed;
        self.pending.clear();
    }

    fn retry_timeout(&self) -> Duration {
        if self.config.max_packet_life_time_ms > 0 {
            Duration::from_millis(self.config.max_packet_life_time_ms as u64)
        } else {
            Duration::from_millis(DEFAULT_RETRY_TIMEOUT_MS)
        }
    }

    /// Sends one message's bytes as a reliable control-channel payload.
    pub fn send(&mut self, connection: &dyn Connection, bytes: &[u8]) -> Result<()> {
        match self.state {
            DataChannelState::Open => {}
            DataChannelState::Connecting => {
                return Result::err(ErrorKind::NotInitialized, "data channel not yet open")
            }
            DataChannelState::Closing | DataChannelState::Closed => {
                return Result::err(ErrorKind::InvalidOperation, "data channel is closed")
            }
        }

        let seq = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        if !self.send_via_rtp(connection, bytes, seq) {
            return Result::err(ErrorKind::DataChannelError, "failed to send data channel message");
        }

        if self.config.ordered {
            self.pending.push_back(PendingMessage {
                payload: bytes.to_vec(),
                sequence: seq,
                send_time: Instant::now(),
                retry_count: 0,
            });
        }
        self.stats.messages_sent += 1;
        Result::ok(())
    }

    /// Resends anything past the retry timeout with retries remaining;
    /// drops (never requeues) anything that has exhausted `max_retransmits`.
    pub fn process_retries(&mut self, connection: &dyn Connection) {
        if !self.config.ordered {
            return;
        }
        let now = Instant::now();
        let timeout = self.retry_timeout();
        let mut remaining = VecDeque::with_capacity(self.pending.len());

        while let Some(mut msg) = self.pending.pop_front() {
            if now.duration_since(msg.send_time) < timeout {
                remaining.push_back(msg);
                continue;
            }
            if msg.retry_count < self.config.max_retransmits {
                msg.retry_count += 1;
                msg.send_time = now;
                if self.send_via_rtp(connection, &msg.payload, msg.sequence) {
                    warn!("retrying data channel '{}' message seq={}", self.label, msg.sequence);
                    self.stats.messages_retried += 1;
                    remaining.push_back(msg);
                } else {
                    self.stats.messages_failed += 1;
                }
            } else {
                error!(
                    "data channel '{}' message failed after {} retries: seq={}",
                    self.label, self.config.max_retransmits, msg.sequence
                );
                self.stats.messages_failed += 1;
            }
        }

        self.pending = remaining;
    }

    /// Dispatches an inbound control/control-ack RTP payload: input-event
    /// types deliver to the message callback and ack back; ack types drop
    /// the matching pending entry (cumulative, like `ReliableInputSender`).
    pub fn on_control_payload(&mut self, connection: &dyn Connection, payload_type: PayloadType, bytes: &[u8]) {
        let ctrl = match ControlMessage::parse(bytes) {
            Some(m) => m,
            None => {
                warn!("failed to parse control message on data channel '{}'", self.label);
                return;
            }
        };

        match (payload_type, ctrl.message_type) {
            (PayloadType::Control, ControlMessageType::InputEvent) => {
                self.stats.messages_received += 1;
                if let Some(cb) = &self.on_message {
                    cb(&ctrl.payload);
                }
                self.send_ack(connection, ctrl.sequence);
            }
            (PayloadType::ControlAck, ControlMessageType::InputAck) => {
                if let Some(ack) = AckPayload::parse(&ctrl.payload) {
                    self.on_ack(ack);
                }
            }
            _ => {}
        }
    }

    fn on_ack(&mut self, ack: AckPayload) {
        loop {
            let Some(front) = self.pending.front() else {
                break;
            };
            if front.sequence == ack.acked_sequence {
                self.stats.messages_acked += 1;
                self.pending.pop_front();
                break;
            } else if front.sequence < ack.acked_sequence {
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }

    fn send_ack(&mut self, connection: &dyn Connection, seq: u16) {
        let timestamp_ms = crate::rtp::control::timestamp_ms();
        let ack = AckPayload {
            acked_sequence: seq,
            original_timestamp_ms: timestamp_ms,
        };
        let ack_seq = self.ack_sequence;
        self.ack_sequence = self.ack_sequence.wrapping_add(1);

        let ctrl = ControlMessage {
            message_type: ControlMessageType::InputAck,
            sequence: ack_seq,
            timestamp_ms,
            payload: ack.serialize(),
        };
        let packet = RtpPacket::new(
            RtpHeader {
                payload_type: PayloadType::ControlAck,
                sequence_number: ack_seq,
                timestamp: timestamp_ms,
                ssrc: self.ssrc,
                ..Default::default()
            },
            ctrl.serialize(),
        );
        if let Some(buffer) = packet.serialize() {
            let _ = connection.send(&buffer);
        }
    }

    fn send_via_rtp(&self, connection: &dyn Connection, bytes: &[u8], seq: u16) -> bool {
        let timestamp_ms = crate::rtp::control::timestamp_ms();
        let ctrl = ControlMessage {
            message_type: ControlMessageType::InputEvent,
            sequence: seq,
            timestamp_ms,
            payload: bytes.to_vec(),
        };
        let packet = RtpPacket::new(
            RtpHeader {
                payload_type: PayloadType::Control,
                sequence_number: seq,
                timestamp: timestamp_ms,
                ssrc: self.ssrc,
                ..Default::default()
            },
            ctrl.serialize(),
        );
        match packet.serialize() {
            Some(buffer) => connection.send(&buffer).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct FakeConnection {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Connection for FakeConnection {
        fn open(&mut self) -> Result<()> {
            Result::ok(())
        }
        fn close(&mut self) {}
        fn is_open(&self) -> bool {
            true
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
    fn send_before_open_is_not_initialized() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let mut ch = DataChannel::new("input", 1, DataChannelConfig::default());
        let r = ch.send(&conn, b"hello");
        assert_eq!(r.code(), Some(ErrorKind::NotInitialized));
    }

    #[test]
    fn send_after_close_is_invalid_operation() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let mut ch = DataChannel::new("input", 1, DataChannelConfig::default());
        ch.mark_open();
        ch.mark_closed();
        let r = ch.send(&conn, b"hello");
        assert_eq!(r.code(), Some(ErrorKind::InvalidOperation));
    }

    #[test]
    fn open_channel_queues_and_acks_drop_pending() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let mut ch = DataChannel::new("input", 1, DataChannelConfig::default());
        ch.mark_open();
        assert!(ch.send(&conn, b"one").is_ok());
        assert!(ch.send(&conn, b"two").is_ok());
        assert_eq!(ch.pending.len(), 2);

        ch.on_ack(AckPayload {
            acked_sequence: 0,
            original_timestamp_ms: 0,
        });
        assert_eq!(ch.pending.len(), 1);
        assert_eq!(ch.stats().messages_acked, 1);
    }

    #[test]
    fn received_input_event_invokes_callback_and_acks() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let mut ch = DataChannel::new("input", 7, DataChannelConfig::default());
        ch.mark_open();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        ch.set_message_callback(Box::new(move |_bytes| {
            count2.fetch_add(1, Ordering::SeqCst);
        }));

        let inner = ControlMessage {
            message_type: ControlMessageType::InputEvent,
            sequence: 4,
            timestamp_ms: 0,
            payload: vec![1, 2, 3],
        };
        ch.on_control_payload(&conn, PayloadType::Control, &inner.serialize());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(conn.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn unordered_channel_never_queues_pending() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let mut ch = DataChannel::new(
            "unordered",
            1,
            DataChannelConfig {
                ordered: false,
                ..Default::default()
            },
        );
        ch.mark_open();
        assert!(ch.send(&conn, b"x").is_ok());
        assert!(ch.pending.is_empty());
    }
}
