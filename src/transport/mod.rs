//! Transport layer: tracks, data channels, and the peer connection that
//! assembles them over a single demultiplexed RTP receive loop.

pub mod data_channel;
pub mod peer_connection;
pub mod track;

pub use data_channel::{DataChannel, DataChannelConfig, DataChannelState, DataChannelStats};
pub use peer_connection::{ConnectionMode, PeerConnection, PeerConnectionConfig};
pub use track::{AudioTrackConfig, MediaTrack, SharedTrack, TrackKind, VideoTrackConfig};
