//! Pipeline assembler on the capturing side: constructs a `PeerConnection`
//! in direct mode with a configured remote endpoint, a video track, an
//! optional audio track, and an ordered input-event data channel, and
//! drives `connect`.
//!
//! A thin assembler: it carries no buffering or rate logic that
//! `PeerConnection`/`MediaTrack`/`DataChannel` do not already encapsulate.

use log::info;

use crate::error::{ErrorKind, Result};
use crate::net::connection::Endpoint;
use crate::transport::data_channel::DataChannelConfig;
use crate::transport::peer_connection::{ConnectionMode, PeerConnection, PeerConnectionConfig};
use crate::transport::track::{AudioTrackConfig, MediaTrack, VideoTrackConfig};

const VIDEO_TRACK_ID: &str = "video0";
const AUDIO_TRACK_ID: &str = "audio0";
const INPUT_CHANNEL_LABEL: &str = "input";

pub type InputEventCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ControllerSessionConfig {
    pub local_ip: String,
    pub local_port: u16,
    pub remote: Endpoint,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub video: VideoTrackConfig,
    pub audio: AudioTrackConfig,
    /// `0` disables the heartbeat (the default).
    pub heartbeat_interval_ms: u64,
}

impl Default for ControllerSessionConfig {
    fn default() -> Self {
        Self {
            local_ip: "0.0.0.0".to_string(),
            local_port: 0,
            remote: Endpoint::new("", 0),
            video_enabled: true,
            audio_enabled: true,
            video: VideoTrackConfig::default(),
            audio: AudioTrackConfig::default(),
            heartbeat_interval_ms: 0,
        }
    }
}

pub struct ControllerSession {
    peer: PeerConnection,
}

impl ControllerSession {
    pub fn new() -> Self {
        Self {
            peer: PeerConnection::new(),
        }
    }

    pub fn initialize(&mut self, config: ControllerSessionConfig) -> Result<()> {
        if let crate::error::Result::Err(e) = self.peer.initialize(PeerConnectionConfig {
            mode: ConnectionMode::Direct,
            local_ip: config.local_ip.clone(),
            local_port: config.local_port,
            remote: Some(config.remote.clone()),
            relay: None,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            ..Default::default()
        }) {
            return crate::error::Result::Err(e);
        }

        if config.video_enabled {
            if let crate::error::Result::Err(e) = self
                .peer
                .add_track(MediaTrack::new_video(VIDEO_TRACK_ID, random_ssrc(), config.video))
                .map(|_| ())
            {
                return crate::error::Result::Err(e);
            }
        }
        if config.audio_enabled {
            if let crate::error::Result::Err(e) = self
                .peer
                .add_track(MediaTrack::new_audio(AUDIO_TRACK_ID, random_ssrc(), config.audio))
                .map(|_| ())
            {
                return crate::error::Result::Err(e);
            }
        }

        if let crate::error::Result::Err(e) = self.peer.create_data_channel(
            INPUT_CHANNEL_LABEL,
            DataChannelConfig {
                ordered: true,
                max_retransmits: 3,
                max_packet_life_time_ms: 0,
            },
        ) {
            return crate::error::Result::Err(e);
        }

        if let crate::error::Result::Err(e) = self.peer.connect() {
            return crate::error::Result::Err(e);
        }

        info!("controller session connected to {}:{}", config.remote.address, config.remote.port);
        Result::ok(())
    }

    /// Registers the handler invoked for each input-event message arriving
    /// on the input-event data channel.
    pub fn set_input_event_callback(&mut self, callback: InputEventCallback) -> Result<()> {
        let Some(channel) = self.peer.get_data_channel(INPUT_CHANNEL_LABEL) else {
            return Result::err(ErrorKind::NotInitialized, "input data channel not created");
        };
        channel.lock().unwrap().set_message_callback(callback);
        Result::ok(())
    }

    pub fn send_video_frame(&self, bytes: &[u8], timestamp: u32) -> Result<()> {
        self.peer.send_on_track(VIDEO_TRACK_ID, bytes, timestamp)
    }

    pub fn send_audio_packet(&self, bytes: &[u8], timestamp: u32) -> Result<()> {
        self.peer.send_on_track(AUDIO_TRACK_ID, bytes, timestamp)
    }

    pub fn set_video_enabled(&self, enabled: bool) -> Result<()> {
        let Some(track) = self.peer.get_track(VIDEO_TRACK_ID) else {
            return Result::err(ErrorKind::InvalidParameter, "no video track");
        };
        track.lock().unwrap().set_enabled(enabled);
        Result::ok(())
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        let Some(track) = self.peer.get_track(AUDIO_TRACK_ID) else {
            return Result::err(ErrorKind::InvalidParameter, "no audio track");
        };
        track.lock().unwrap().set_enabled(enabled);
        Result::ok(())
    }

    pub fn shutdown(&mut self) {
        self.peer.disconnect();
    }
}

impl Default for ControllerSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-level track SSRCs are independent random draws per spec §3's
/// "SSRC (random in [1000, 1e6))"; the peer connection seeds its own
/// counter separately.
fn random_ssrc() -> u32 {
    use rand::Rng;
    rand::thread_rng().gen_range(1000..1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_without_audio_skips_audio_track() {
        let mut session = ControllerSession::new();
        let r = session.initialize(ControllerSessionConfig {
            local_ip: "127.0.0.1".into(),
            remote: Endpoint::new("127.0.0.1", 1),
            audio_enabled: false,
            ..Default::default()
        });
        assert!(r.is_ok());
        assert!(session.set_audio_enabled(true).is_err());
        session.shutdown();
    }

    #[test]
    fn set_input_event_callback_before_initialize_fails() {
        let mut session = ControllerSession::new();
        let r = session.set_input_event_callback(Box::new(|_| {}));
        assert_eq!(r.code(), Some(ErrorKind::NotInitialized));
    }
}
