//! Pipeline assembler on the viewing side: constructs a `PeerConnection` in
//! direct mode with a local port and no preconfigured remote, so it accepts
//! whichever peer sends the first datagram, then attaches a decode path to
//! each incoming track and an outbound path for locally produced input
//! events.
//!
//! A thin assembler, same as `ControllerSession`: it carries no buffering or
//! rate logic that `PeerConnection`/`MediaTrack`/`DataChannel` do not already
//! encapsulate.

use std::sync::{Arc, Mutex};

use log::info;

use crate::error::{ErrorKind, Result};
use crate::rtp::control::{InputEvent, InputEventType};
use crate::transport::data_channel::DataChannelConfig;
use crate::transport::peer_connection::{ConnectionMode, PeerConnection, PeerConnectionConfig};
use crate::transport::track::{AudioTrackConfig, MediaTrack, VideoTrackConfig};

const VIDEO_TRACK_ID: &str = "video0";
const AUDIO_TRACK_ID: &str = "audio0";
const INPUT_CHANNEL_LABEL: &str = "input";

pub type VideoFrameCallback = Box<dyn Fn(&[u8], u32) + Send + Sync>;
pub type AudioPacketCallback = Box<dyn Fn(&[u8], u32) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ControlledSessionConfig {
    pub local_ip: String,
    pub local_port: u16,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub video: VideoTrackConfig,
    pub audio: AudioTrackConfig,
    /// `0` disables the heartbeat (the default).
    pub heartbeat_interval_ms: u64,
}

impl Default for ControlledSessionConfig {
    fn default() -> Self {
        Self {
            local_ip: "0.0.0.0".to_string(),
            local_port: 0,
            video_enabled: true,
            audio_enabled: true,
            video: VideoTrackConfig::default(),
            audio: AudioTrackConfig::default(),
            heartbeat_interval_ms: 0,
        }
    }
}

type FrameSlot<T> = Arc<Mutex<Option<T>>>;

pub struct ControlledSession {
    peer: PeerConnection,
    video_frame_cb: Option<FrameSlot<VideoFrameCallback>>,
    audio_packet_cb: Option<FrameSlot<AudioPacketCallback>>,
}

impl ControlledSession {
    pub fn new() -> Self {
        Self {
            peer: PeerConnection::new(),
            video_frame_cb: None,
            audio_packet_cb: None,
        }
    }

    /// Binds a local port with no remote endpoint, attaches a video/audio
    /// decode path per the config toggles, creates an outbound input-event
    /// data channel, and connects. The remote endpoint is learned from
    /// whichever peer sends the first datagram.
    pub fn initialize(&mut self, config: ControlledSessionConfig) -> Result<()> {
        if let crate::error::Result::Err(e) = self.peer.initialize(PeerConnectionConfig {
            mode: ConnectionMode::Direct,
            local_ip: config.local_ip.clone(),
            local_port: config.local_port,
            remote: None,
            relay: None,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            ..Default::default()
        }) {
            return crate::error::Result::Err(e);
        }

        if config.video_enabled {
            let slot: FrameSlot<VideoFrameCallback> = Arc::new(Mutex::new(None));
            let forward = slot.clone();
            let track = match self
                .peer
                .add_track(MediaTrack::new_video(VIDEO_TRACK_ID, random_ssrc(), config.video))
            {
                crate::error::Result::Ok(t) => t,
                crate::error::Result::Err(e) => return crate::error::Result::Err(e),
            };
            track.lock().unwrap().set_frame_callback(Box::new(move |data, ts| {
                if let Some(cb) = forward.lock().unwrap().as_ref() {
                    cb(data, ts);
                }
            }));
            self.video_frame_cb = Some(slot);
        }

        if config.audio_enabled {
            let slot: FrameSlot<AudioPacketCallback> = Arc::new(Mutex::new(None));
            let forward = slot.clone();
            let track = match self
                .peer
                .add_track(MediaTrack::new_audio(AUDIO_TRACK_ID, random_ssrc(), config.audio))
            {
                crate::error::Result::Ok(t) => t,
                crate::error::Result::Err(e) => return crate::error::Result::Err(e),
            };
            track.lock().unwrap().set_frame_callback(Box::new(move |data, ts| {
                if let Some(cb) = forward.lock().unwrap().as_ref() {
                    cb(data, ts);
                }
            }));
            self.audio_packet_cb = Some(slot);
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

        info!("controlled session listening on {}:{}", config.local_ip, config.local_port);
        Result::ok(())
    }

    pub fn set_video_frame_callback(&self, callback: VideoFrameCallback) -> Result<()> {
        let Some(slot) = &self.video_frame_cb else {
            return Result::err(ErrorKind::NotInitialized, "video track not enabled");
        };
        *slot.lock().unwrap() = Some(callback);
        Result::ok(())
    }

    pub fn set_audio_packet_callback(&self, callback: AudioPacketCallback) -> Result<()> {
        let Some(slot) = &self.audio_packet_cb else {
            return Result::err(ErrorKind::NotInitialized, "audio track not enabled");
        };
        *slot.lock().unwrap() = Some(callback);
        Result::ok(())
    }

    pub fn send_mouse_move(&self, x: u16, y: u16) -> Result<()> {
        self.send_input_event(InputEvent {
            event_type: InputEventType::MouseMove,
            x,
            y,
            ..Default::default()
        })
    }

    pub fn send_mouse_click(&self, button: u8, is_down: bool, x: u16, y: u16) -> Result<()> {
        self.send_input_event(InputEvent {
            event_type: InputEventType::MouseClick,
            x,
            y,
            button,
            state: is_down as u8,
            ..Default::default()
        })
    }

    pub fn send_key_event(&self, key_code: u32, is_down: bool, modifiers: u32) -> Result<()> {
        self.send_input_event(InputEvent {
            event_type: if is_down { InputEventType::KeyDown } else { InputEventType::KeyUp },
            key_code,
            modifier_keys: modifiers,
            ..Default::default()
        })
    }

    fn send_input_event(&self, event: InputEvent) -> Result<()> {
        self.peer.send_on_channel(INPUT_CHANNEL_LABEL, &event.serialize())
    }

    pub fn shutdown(&mut self) {
        self.peer.disconnect();
    }
}

impl Default for ControlledSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-level track SSRCs are independent random draws per the
/// "SSRC (random in [1000, 1e6))" rule shared with the controller side;
/// the peer connection seeds its own counter separately.
fn random_ssrc() -> u32 {
    use rand::Rng;
    rand::thread_rng().gen_range(1000..1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_without_video_skips_video_track() {
        let mut session = ControlledSession::new();
        let r = session.initialize(ControlledSessionConfig {
            local_ip: "127.0.0.1".into(),
            video_enabled: false,
            ..Default::default()
        });
        assert!(r.is_ok());
        assert!(session.set_video_frame_callback(Box::new(|_, _| {})).is_err());
        session.shutdown();
    }

    #[test]
    fn set_video_frame_callback_before_initialize_fails() {
        let session = ControlledSession::new();
        let r = session.set_video_frame_callback(Box::new(|_, _| {}));
        assert_eq!(r.code(), Some(ErrorKind::NotInitialized));
    }

    #[test]
    fn send_input_before_connect_fails() {
        let session = ControlledSession::new();
        let r = session.send_mouse_move(10, 20);
        assert!(r.is_err());
    }

    #[test]
    fn initialize_with_no_remote_learns_first_peer() {
        let mut controlled = ControlledSession::new();
        assert!(controlled
            .initialize(ControlledSessionConfig {
                local_ip: "127.0.0.1".into(),
                audio_enabled: false,
                ..Default::default()
            })
            .is_ok());
        let controlled_port = controlled.peer.local_port().unwrap();

        let received = Arc::new(Mutex::new(None));
        let received2 = received.clone();
        assert!(controlled
            .set_video_frame_callback(Box::new(move |data, _ts| {
                *received2.lock().unwrap() = Some(data.to_vec());
            }))
            .is_ok());

        let mut controller = crate::session::controller::ControllerSession::new();
        assert!(controller
            .initialize(crate::session::controller::ControllerSessionConfig {
                local_ip: "127.0.0.1".into(),
                remote: crate::net::connection::Endpoint::new("127.0.0.1", controlled_port),
                audio_enabled: false,
                ..Default::default()
            })
            .is_ok());

        assert!(controller.send_video_frame(b"frame", 0).is_ok());
        std::thread::sleep(std::time::Duration::from_millis(100));

        assert_eq!(received.lock().unwrap().as_deref(), Some(&b"frame"[..]));

        controller.shutdown();
        controlled.shutdown();
    }
}
