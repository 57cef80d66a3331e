//! The two pipeline assemblers: the capturing side (`ControllerSession`) and
//! the viewing side (`ControlledSession`), both built on the same
//! [`crate::transport::peer_connection::PeerConnection`].

pub mod controlled;
pub mod controller;

pub use controlled::{ControlledSession, ControlledSessionConfig};
pub use controller::{ControllerSession, ControllerSessionConfig};
