//! RTP-shaped media framing and the protocol built on top of it.

pub mod control;
pub mod jitter;
pub mod packet;
pub mod pacer;
pub mod receiver;
pub mod sender;

pub use control::{AckPayload, ControlMessage, ControlMessageType, HandshakePayload, InputEvent, InputEventType};
pub use jitter::JitterBuffer;
pub use pacer::Pacer;
pub use packet::{PayloadType, RtpHeader, RtpPacket, RTP_HEADER_SIZE, RTP_VERSION};
pub use receiver::{ReceiverStats, RtpReceiver};
pub use sender::RtpSender;
