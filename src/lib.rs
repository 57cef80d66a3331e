//! meridian-core - peer-to-peer remote-desktop transport and media-pipeline core.
//!
//! Captures a screen and microphone, compresses the media, and streams it
//! over an unreliable datagram transport to a viewer, which decodes,
//! renders, and ships user-input events back. See [`session`] for the two
//! pipeline assemblers (`ControllerSession` on the capturing side,
//! `ControlledSession` on the viewing side) that tie the lower layers
//! together.

pub mod capture;
pub mod codec;
pub mod component_state;
pub mod config;
pub mod error;
pub mod handshake;
pub mod net;
pub mod player_state;
pub mod queue;
pub mod reliable;
pub mod render;
pub mod rtp;
pub mod session;
pub mod timer;
pub mod transport;

pub use component_state::{ComponentState, ComponentStateCell};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use handshake::{HandshakeManager, HandshakeState};
pub use player_state::{PlayerState, PlayerStateManager};
pub use session::{ControlledSession, ControlledSessionConfig, ControllerSession, ControllerSessionConfig};
