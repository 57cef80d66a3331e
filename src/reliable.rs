//! Reliable delivery for discrete input events over an otherwise
//! best-effort RTP control channel: cumulative acking plus a bounded,
//! drop-without-requeue retry policy.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::net::Connection;
use crate::rtp::control::{
    AckPayload, ControlMessage, ControlMessageType, InputEvent,
};
use crate::rtp::packet::{PayloadType, RtpHeader, RtpPacket};

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_TIMEOUT_MS: u64 = 50;

#[derive(Debug, Default, Clone, Copy)]
pub struct SenderStats {
    pub events_sent: u64,
    pub events_acked: u64,
    pub events_retried: u64,
    pub events_failed: u64,
}

struct PendingMessage {
    event: InputEvent,
    sequence_number: u16,
    send_time: Instant,
    retry_count: u32,
}

/// Queues each sent input event until it is cumulatively acked or exhausts
/// its retry budget, at which point it is dropped — never requeued.
pub struct ReliableInputSender {
    ssrc: u32,
    next_sequence_number: u16,
    pending: VecDeque<PendingMessage>,
    stats: SenderStats,
}

impl ReliableInputSender {
    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            next_sequence_number: 0,
            pending: VecDeque::new(),
            stats: SenderStats::default(),
        }
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    pub fn send_input_event(&mut self, connection: &dyn Connection, event: InputEvent) -> bool {
        let seq = self.next_sequence_number;
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1);

        if !self.send_via_rtp(connection, &event, seq) {
            error!("failed to send input event");
            return false;
        }

        self.pending.push_back(PendingMessage {
            event,
            sequence_number: seq,
            send_time: Instant::now(),
            retry_count: 0,
        });
        self.stats.events_sent += 1;
        debug!("input event sent: seq={seq}");
        true
    }

    /// Cumulative ack: every pending message at or before `acked_sequence`
    /// is dropped from the queue; anything after it is left untouched.
    pub fn on_ack_message(&mut self, ack: AckPayload) {
        loop {
            let Some(front) = self.pending.front() else {
                break;
            };
            if front.sequence_number == ack.acked_sequence {
                let rtt = front.send_time.elapsed();
                debug!(
                    "input ack received: seq={}, rtt={}ms",
                    ack.acked_sequence,
                    rtt.as_millis()
                );
                self.stats.events_acked += 1;
                self.pending.pop_front();
                break;
            } else if front.sequence_number < ack.acked_sequence {
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }

    /// Resends anything past `RETRY_TIMEOUT_MS` with retries remaining;
    /// drops anything that has exhausted `MAX_RETRIES` without requeuing.
    pub fn process_retries(&mut self, connection: &dyn Connection) {
        let now = Instant::now();
        let mut remaining = VecDeque::with_capacity(self.pending.len());

        while let Some(mut msg) = self.pending.pop_front() {
            let elapsed = now.duration_since(msg.send_time);
            if elapsed < Duration::from_millis(RETRY_TIMEOUT_MS) {
                remaining.push_back(msg);
                continue;
            }

            if msg.retry_count < MAX_RETRIES {
                msg.retry_count += 1;
                msg.send_time = now;
                if self.send_via_rtp(connection, &msg.event, msg.sequence_number) {
                    warn!(
                        "retrying input event: seq={}, attempt={}",
                        msg.sequence_number, msg.retry_count
                    );
                    self.stats.events_retried += 1;
                    remaining.push_back(msg);
                } else {
                    error!("retry send failed: seq={}", msg.sequence_number);
                    self.stats.events_failed += 1;
                }
            } else {
                error!(
                    "input event failed after {} retries: seq={}",
                    MAX_RETRIES, msg.sequence_number
                );
                self.stats.events_failed += 1;
            }
        }

        self.pending = remaining;
    }

    fn send_via_rtp(&self, connection: &dyn Connection, event: &InputEvent, seq: u16) -> bool {
        let timestamp_ms = crate::rtp::control::timestamp_ms();
        let ctrl_msg = ControlMessage {
            message_type: ControlMessageType::InputEvent,
            sequence: seq,
            timestamp_ms,
            payload: event.serialize(),
        };

        let packet = RtpPacket::new(
            RtpHeader {
                payload_type: PayloadType::Control,
                sequence_number: seq,
                timestamp: timestamp_ms,
                ssrc: self.ssrc,
                ..Default::default()
            },
            ctrl_msg.serialize(),
        );

        let buffer = match packet.serialize() {
            Some(b) => b,
            None => return false,
        };
        connection.send(&buffer).is_ok()
    }
}

pub type InputEventCallback = Box<dyn Fn(InputEvent) + Send + Sync>;

/// Applies inbound input events and acks each one back to the sender.
pub struct ReliableInputReceiver {
    ssrc: u32,
    callback: Option<InputEventCallback>,
    ack_sequence_number: u16,
}

impl ReliableInputReceiver {
    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            callback: None,
            ack_sequence_number: 0,
        }
    }

    pub fn set_callback(&mut self, callback: InputEventCallback) {
        self.callback = Some(callback);
    }

    pub fn on_control_message(&mut self, connection: &dyn Connection, payload: &[u8]) {
        let ctrl_msg = match ControlMessage::parse(payload) {
            Some(m) => m,
            None => {
                warn!("failed to parse control message");
                return;
            }
        };

        if ctrl_msg.message_type != ControlMessageType::InputEvent {
            return;
        }

        let event = match InputEvent::parse(&ctrl_msg.payload) {
            Some(e) => e,
            None => {
                warn!("failed to parse input event");
                return;
            }
        };

        if let Some(cb) = &self.callback {
            cb(event);
        }

        self.send_ack(connection, ctrl_msg.sequence);
        debug!("input event applied: seq={}", ctrl_msg.sequence);
    }

    fn send_ack(&mut self, connection: &dyn Connection, seq: u16) {
        let timestamp_ms = crate::rtp::control::timestamp_ms();
        let ack = AckPayload {
            acked_sequence: seq,
            original_timestamp_ms: timestamp_ms,
        };

        let ack_seq = self.ack_sequence_number;
        self.ack_sequence_number = self.ack_sequence_number.wrapping_add(1);

        let ctrl_msg = ControlMessage {
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
            ctrl_msg.serialize(),
        );

        if let Some(buffer) = packet.serialize() {
            let _ = connection.send(&buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionType;
    use crate::error::Result;
    use crate::rtp::control::InputEventType;
    use std::sync::Mutex;

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
    fn ack_drops_pending_message() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let mut sender = ReliableInputSender::new(1);
        sender.send_input_event(&conn, InputEvent::default());
        assert_eq!(sender.pending.len(), 1);
        sender.on_ack_message(AckPayload {
            acked_sequence: 0,
            original_timestamp_ms: 0,
        });
        assert!(sender.pending.is_empty());
        assert_eq!(sender.stats().events_acked, 1);
    }

    #[test]
    fn cumulative_ack_drops_earlier_unacked_messages() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let mut sender = ReliableInputSender::new(1);
        sender.send_input_event(&conn, InputEvent::default());
        sender.send_input_event(&conn, InputEvent::default());
        sender.send_input_event(&conn, InputEvent::default());
        sender.on_ack_message(AckPayload {
            acked_sequence: 1,
            original_timestamp_ms: 0,
        });
        assert_eq!(sender.pending.len(), 1);
        assert_eq!(sender.pending[0].sequence_number, 2);
    }

    #[test]
    fn retry_gives_up_after_max_retries() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let mut sender = ReliableInputSender::new(1);
        sender.send_input_event(&conn, InputEvent::default());
        for _ in 0..MAX_RETRIES {
            std::thread::sleep(Duration::from_millis(RETRY_TIMEOUT_MS + 5));
            sender.process_retries(&conn);
        }
        assert!(!sender.pending.is_empty());
        std::thread::sleep(Duration::from_millis(RETRY_TIMEOUT_MS + 5));
        sender.process_retries(&conn);
        assert!(sender.pending.is_empty());
        assert_eq!(sender.stats().events_failed, 1);
    }

    #[test]
    fn receiver_invokes_callback_and_acks() {
        let conn = FakeConnection {
            sent: Mutex::new(Vec::new()),
        };
        let seen = std::sync::Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        let mut receiver = ReliableInputReceiver::new(7);
        receiver.set_callback(Box::new(move |event| {
            *seen2.lock().unwrap() = Some(event);
        }));

        let event = InputEvent {
            event_type: InputEventType::KeyDown,
            key_code: 65,
            ..Default::default()
        };
        let ctrl = ControlMessage {
            message_type: ControlMessageType::InputEvent,
            sequence: 3,
            timestamp_ms: 0,
            payload: event.serialize(),
        };
        receiver.on_control_message(&conn, &ctrl.serialize());

        assert_eq!(seen.lock().unwrap().unwrap(), event);
        assert_eq!(conn.sent.lock().unwrap().len(), 1);
    }
}
