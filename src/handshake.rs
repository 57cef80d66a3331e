//! Three-way session handshake exchanged over the RTP control channel
//! before either side starts sending media or input.

use log::{error, info, warn};

use crate::net::Connection;
use crate::rtp::control::{ControlMessage, ControlMessageType, HandshakePayload, PROTOCOL_VERSION};
use crate::rtp::packet::PayloadType;
use crate::rtp::receiver::RtpReceiver;
use crate::rtp::sender::RtpSender;

const SUPPORTED_CODECS: u8 = 0x03;
const CAPABILITIES_FLAGS: u16 = 0x0007;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Idle,
    RequestSent,
    ResponseReceived,
    Completed,
    Failed,
}

/// Drives the handshake's send/receive sequence. Owns an `RtpSender` and
/// `RtpReceiver` scoped to the control channel only.
pub struct HandshakeManager {
    ssrc: u32,
    rtp_sender: RtpSender,
    rtp_receiver: RtpReceiver,
    state: HandshakeState,
    session_id: u32,
    remote_ssrc: u32,
}

impl HandshakeManager {
    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            rtp_sender: RtpSender::new(ssrc),
            rtp_receiver: RtpReceiver::new(),
            state: HandshakeState::Idle,
            session_id: 0,
            remote_ssrc: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == HandshakeState::Completed
    }

    pub fn remote_ssrc(&self) -> u32 {
        self.remote_ssrc
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Controller side: send the initial handshake request.
    pub fn initiate_handshake(&mut self, connection: &dyn Connection, session_id: u32) -> bool {
        if self.state != HandshakeState::Idle {
            error!("handshake already in progress or completed");
            return false;
        }

        self.session_id = session_id;
        let payload = HandshakePayload {
            version: PROTOCOL_VERSION,
            session_id,
            ssrc: self.ssrc,
            supported_codecs: SUPPORTED_CODECS,
            capabilities_flags: CAPABILITIES_FLAGS,
        };

        if !self.send_handshake(connection, ControlMessageType::Handshake, &payload) {
            self.state = HandshakeState::Failed;
            return false;
        }

        self.state = HandshakeState::RequestSent;
        info!("handshake request sent: session_id=0x{session_id:08X}, ssrc=0x{:08X}", self.ssrc);
        true
    }

    /// Controller side: block for the peer's handshake acknowledgement.
    pub fn wait_for_handshake_response(&mut self, connection: &dyn Connection, timeout_ms: i64) -> bool {
        if self.state != HandshakeState::RequestSent {
            error!("invalid state for waiting on a handshake response");
            return false;
        }

        let ctrl_msg = match self.receive_control_message(connection, timeout_ms) {
            Some(m) => m,
            None => {
                error!("failed to receive handshake response");
                self.state = HandshakeState::Failed;
                return false;
            }
        };

        if ctrl_msg.message_type != ControlMessageType::HandshakeAck {
            error!("expected handshake ack, got {:?}", ctrl_msg.message_type);
            self.state = HandshakeState::Failed;
            return false;
        }

        let response = match HandshakePayload::parse(&ctrl_msg.payload) {
            Some(p) => p,
            None => {
                error!("failed to parse handshake response");
                self.state = HandshakeState::Failed;
                return false;
            }
        };

        if response.session_id != self.session_id {
            error!("session id mismatch");
            self.state = HandshakeState::Failed;
            return false;
        }

        if response.version != PROTOCOL_VERSION {
            error!("protocol version mismatch: got {}, expected {PROTOCOL_VERSION}", response.version);
            self.state = HandshakeState::Failed;
            return false;
        }

        self.remote_ssrc = response.ssrc;
        self.state = HandshakeState::Completed;
        info!("handshake completed: remote_ssrc=0x{:08X}", self.remote_ssrc);
        true
    }

    /// Controlled side: reply to a received handshake request.
    pub fn send_handshake_response(
        &mut self,
        connection: &dyn Connection,
        session_id: u32,
        remote_ssrc: u32,
    ) -> bool {
        self.session_id = session_id;
        self.remote_ssrc = remote_ssrc;

        let payload = HandshakePayload {
            version: PROTOCOL_VERSION,
            session_id,
            ssrc: self.ssrc,
            supported_codecs: SUPPORTED_CODECS,
            capabilities_flags: CAPABILITIES_FLAGS,
        };

        if !self.send_handshake(connection, ControlMessageType::HandshakeAck, &payload) {
            self.state = HandshakeState::Failed;
            return false;
        }

        self.state = HandshakeState::Completed;
        info!("handshake response sent and completed");
        true
    }

    /// Controlled side: block for the peer's handshake request, then
    /// immediately respond.
    pub fn wait_for_handshake_request(&mut self, connection: &dyn Connection, timeout_ms: i64) -> bool {
        if self.state != HandshakeState::Idle {
            error!("invalid state for waiting on a handshake request");
            return false;
        }

        let ctrl_msg = match self.receive_control_message(connection, timeout_ms) {
            Some(m) => m,
            None => {
                error!("failed to receive handshake request");
                return false;
            }
        };

        if ctrl_msg.message_type != ControlMessageType::Handshake {
            error!("expected handshake request, got {:?}", ctrl_msg.message_type);
            return false;
        }

        let request = match HandshakePayload::parse(&ctrl_msg.payload) {
            Some(p) => p,
            None => {
                error!("failed to parse handshake request");
                return false;
            }
        };

        if request.version != PROTOCOL_VERSION {
            error!("protocol version mismatch: got {}, expected {PROTOCOL_VERSION}", request.version);
            self.state = HandshakeState::Failed;
            return false;
        }

        info!(
            "handshake request received: session_id=0x{:08X}, remote_ssrc=0x{:08X}",
            request.session_id, request.ssrc
        );

        self.send_handshake_response(connection, request.session_id, request.ssrc)
    }

    fn send_handshake(&mut self, connection: &dyn Connection, message_type: ControlMessageType, payload: &HandshakePayload) -> bool {
        let timestamp_ms = crate::rtp::control::timestamp_ms();
        let ctrl_msg = ControlMessage {
            message_type,
            sequence: 0,
            timestamp_ms,
            payload: payload.serialize(),
        };
        let wire = ctrl_msg.serialize();
        self.rtp_sender
            .send_control_message(connection, &wire, timestamp_ms)
    }

    fn receive_control_message(&mut self, connection: &dyn Connection, timeout_ms: i64) -> Option<ControlMessage> {
        let packet = self.rtp_receiver.receive_packet(connection, timeout_ms)?;
        if packet.header.payload_type != PayloadType::Control {
            warn!("received non-control packet during handshake");
            return None;
        }
        ControlMessage::parse(&packet.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::net::connection::ConnectionType;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Loops a single peer's outbound writes back as its own inbound reads,
    /// enough to drive the handshake's own serialize/parse round trip.
    struct LoopbackConnection {
        inbox: Mutex<VecDeque<Vec<u8>>>,
    }

    impl Connection for LoopbackConnection {
        fn open(&mut self) -> Result<()> {
            Result::ok(())
        }
        fn close(&mut self) {}
        fn is_open(&self) -> bool {
            true
        }
        fn send(&self, data: &[u8]) -> Result<usize> {
            self.inbox.lock().unwrap().push_back(data.to_vec());
            Result::ok(data.len())
        }
        fn recv(&self, buffer: &mut [u8], _timeout_ms: i64) -> Result<usize> {
            match self.inbox.lock().unwrap().pop_front() {
                Some(data) => {
                    buffer[..data.len()].copy_from_slice(&data);
                    Result::ok(data.len())
                }
                None => Result::err(crate::error::ErrorKind::Timeout, "no data queued"),
            }
        }
        fn connection_type(&self) -> ConnectionType {
            ConnectionType::Direct
        }
    }

    #[test]
    fn full_handshake_round_trip_via_loopback() {
        let conn = LoopbackConnection {
            inbox: Mutex::new(VecDeque::new()),
        };
        let mut controller = HandshakeManager::new(0x1111);
        assert!(controller.initiate_handshake(&conn, 0xCAFE));
        assert_eq!(controller.state(), HandshakeState::RequestSent);

        let mut controlled = HandshakeManager::new(0x2222);
        assert!(controlled.wait_for_handshake_request(&conn, 1000));
        assert!(controlled.is_completed());
        assert_eq!(controlled.session_id(), 0xCAFE);
        assert_eq!(controlled.remote_ssrc(), 0x1111);

        assert!(controller.wait_for_handshake_response(&conn, 1000));
        assert!(controller.is_completed());
        assert_eq!(controller.remote_ssrc(), 0x2222);
    }

    #[test]
    fn session_id_mismatch_fails_handshake() {
        let conn = LoopbackConnection {
            inbox: Mutex::new(VecDeque::new()),
        };
        let mut controller = HandshakeManager::new(1);
        controller.initiate_handshake(&conn, 42);
        controller.state = HandshakeState::RequestSent;
        controller.session_id = 42;

        // Inject a response carrying a different session id.
        let mismatched = HandshakePayload {
            version: PROTOCOL_VERSION,
            session_id: 99,
            ssrc: 5,
            supported_codecs: 3,
            capabilities_flags: 7,
        };
        let ctrl_msg = ControlMessage {
            message_type: ControlMessageType::HandshakeAck,
            sequence: 0,
            timestamp_ms: 0,
            payload: mismatched.serialize(),
        };
        conn.inbox.lock().unwrap().clear();
        conn.send(
            &crate::rtp::packet::RtpPacket::new(
                crate::rtp::packet::RtpHeader {
                    payload_type: PayloadType::Control,
                    ..Default::default()
                },
                ctrl_msg.serialize(),
            )
            .serialize()
            .unwrap(),
        )
        .value_or(0);

        assert!(!controller.wait_for_handshake_response(&conn, 1000));
        assert_eq!(controller.state(), HandshakeState::Failed);
    }
}
