//! Control-channel envelope and its payload shapes, carried over
//! [`super::packet::PayloadType::Control`] / `ControlAck` RTP packets.
//!
//! Every field inside a control payload is little-endian, distinct from the
//! big-endian RTP header it rides in — that split matches the reference
//! implementation and is preserved here rather than "fixed" to be uniform.

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlMessageType {
    Handshake = 0x01,
    HandshakeAck = 0x02,
    InputEvent = 0x10,
    InputAck = 0x11,
    Heartbeat = 0x20,
}

impl ControlMessageType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(ControlMessageType::Handshake),
            0x02 => Some(ControlMessageType::HandshakeAck),
            0x10 => Some(ControlMessageType::InputEvent),
            0x11 => Some(ControlMessageType::InputAck),
            0x20 => Some(ControlMessageType::Heartbeat),
            _ => None,
        }
    }
}

const CONTROL_MESSAGE_HEADER_SIZE: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    pub message_type: ControlMessageType,
    pub sequence: u16,
    pub timestamp_ms: u32,
    pub payload: Vec<u8>,
}

impl ControlMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(CONTROL_MESSAGE_HEADER_SIZE + self.payload.len());
        buffer.push(self.message_type as u8);
        buffer.extend_from_slice(&self.sequence.to_le_bytes());
        buffer.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        buffer.extend_from_slice(&self.payload);
        buffer
    }

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < CONTROL_MESSAGE_HEADER_SIZE {
            return None;
        }
        Some(Self {
            message_type: ControlMessageType::from_u8(data[0])?,
            sequence: u16::from_le_bytes([data[1], data[2]]),
            timestamp_ms: u32::from_le_bytes([data[3], data[4], data[5], data[6]]),
            payload: data[CONTROL_MESSAGE_HEADER_SIZE..].to_vec(),
        })
    }
}

pub const HANDSHAKE_PAYLOAD_SIZE: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandshakePayload {
    pub version: u32,
    pub session_id: u32,
    pub ssrc: u32,
    pub supported_codecs: u8,
    pub capabilities_flags: u16,
}

impl Default for HandshakePayload {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            session_id: 0,
            ssrc: 0,
            supported_codecs: 0,
            capabilities_flags: 0,
        }
    }
}

impl HandshakePayload {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HANDSHAKE_PAYLOAD_SIZE);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.session_id.to_le_bytes());
        out.extend_from_slice(&self.ssrc.to_le_bytes());
        out.push(self.supported_codecs);
        out.extend_from_slice(&self.capabilities_flags.to_le_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HANDSHAKE_PAYLOAD_SIZE {
            return None;
        }
        Some(Self {
            version: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            session_id: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            supported_codecs: data[12],
            capabilities_flags: u16::from_le_bytes([data[13], data[14]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InputEventType {
    MouseMove = 0,
    MouseClick = 1,
    MouseWheel = 2,
    KeyDown = 3,
    KeyUp = 4,
    TouchEvent = 5,
}

impl InputEventType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(InputEventType::MouseMove),
            1 => Some(InputEventType::MouseClick),
            2 => Some(InputEventType::MouseWheel),
            3 => Some(InputEventType::KeyDown),
            4 => Some(InputEventType::KeyUp),
            5 => Some(InputEventType::TouchEvent),
            _ => None,
        }
    }
}

pub const INPUT_EVENT_SIZE: usize = 17;

/// Absolute-pixel input event. Coordinates are always in capture-source
/// pixel space; scaling to the local display happens at the renderer, not
/// here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub event_type: InputEventType,
    pub x: u16,
    pub y: u16,
    pub button: u8,
    pub state: u8,
    pub wheel_delta: i16,
    pub key_code: u32,
    pub modifier_keys: u32,
}

impl Default for InputEvent {
    fn default() -> Self {
        Self {
            event_type: InputEventType::MouseMove,
            x: 0,
            y: 0,
            button: 0,
            state: 0,
            wheel_delta: 0,
            key_code: 0,
            modifier_keys: 0,
        }
    }
}

impl InputEvent {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(INPUT_EVENT_SIZE);
        out.push(self.event_type as u8);
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.push(self.button);
        out.push(self.state);
        out.extend_from_slice(&(self.wheel_delta as u16).to_le_bytes());
        out.extend_from_slice(&self.key_code.to_le_bytes());
        out.extend_from_slice(&self.modifier_keys.to_le_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < INPUT_EVENT_SIZE {
            return None;
        }
        Some(Self {
            event_type: InputEventType::from_u8(data[0])?,
            x: u16::from_le_bytes([data[1], data[2]]),
            y: u16::from_le_bytes([data[3], data[4]]),
            button: data[5],
            state: data[6],
            wheel_delta: u16::from_le_bytes([data[7], data[8]]) as i16,
            key_code: u32::from_le_bytes([data[9], data[10], data[11], data[12]]),
            modifier_keys: u32::from_le_bytes([data[13], data[14], data[15], data[16]]),
        })
    }
}

pub const ACK_PAYLOAD_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckPayload {
    pub acked_sequence: u16,
    pub original_timestamp_ms: u32,
}

impl AckPayload {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ACK_PAYLOAD_SIZE);
        out.extend_from_slice(&self.acked_sequence.to_le_bytes());
        out.extend_from_slice(&self.original_timestamp_ms.to_le_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ACK_PAYLOAD_SIZE {
            return None;
        }
        Some(Self {
            acked_sequence: u16::from_le_bytes([data[0], data[1]]),
            original_timestamp_ms: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
        })
    }
}

/// Milliseconds since an arbitrary epoch, truncated to 32 bits. Only ever
/// compared against other values from this same clock within one process.
pub fn timestamp_ms() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_millis() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_message_round_trips_with_payload() {
        let msg = ControlMessage {
            message_type: ControlMessageType::InputEvent,
            sequence: 12,
            timestamp_ms: 99999,
            payload: vec![9, 8, 7],
        };
        let wire = msg.serialize();
        let parsed = ControlMessage::parse(&wire).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn control_message_rejects_short_buffer() {
        assert!(ControlMessage::parse(&[0u8; 3]).is_none());
    }

    #[test]
    fn handshake_payload_round_trips() {
        let hs = HandshakePayload {
            version: 1,
            session_id: 0xCAFEBABE,
            ssrc: 0x1234,
            supported_codecs: 0b0000_0011,
            capabilities_flags: 0xBEEF,
        };
        let wire = hs.serialize();
        assert_eq!(wire.len(), HANDSHAKE_PAYLOAD_SIZE);
        assert_eq!(HandshakePayload::parse(&wire).unwrap(), hs);
    }

    #[test]
    fn input_event_round_trips_negative_wheel_delta() {
        let ev = InputEvent {
            event_type: InputEventType::MouseWheel,
            x: 640,
            y: 480,
            wheel_delta: -120,
            ..Default::default()
        };
        let wire = ev.serialize();
        assert_eq!(wire.len(), INPUT_EVENT_SIZE);
        assert_eq!(InputEvent::parse(&wire).unwrap(), ev);
    }

    #[test]
    fn ack_payload_round_trips() {
        let ack = AckPayload {
            acked_sequence: 42,
            original_timestamp_ms: 123456,
        };
        let wire = ack.serialize();
        assert_eq!(wire.len(), ACK_PAYLOAD_SIZE);
        assert_eq!(AckPayload::parse(&wire).unwrap(), ack);
    }
}
