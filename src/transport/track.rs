//! A single media track (video or audio) carried over a `PeerConnection`.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{ErrorKind, Result};
use crate::net::Connection;
use crate::rtp::packet::PayloadType;
use crate::rtp::sender::RtpSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Video-specific codec parameters. RTP timestamps for video run on a
/// 90 kHz clock regardless of the configured framerate.
#[derive(Debug, Clone, Copy)]
pub struct VideoTrackConfig {
    pub bitrate: u32,
    pub framerate: u32,
}

impl Default for VideoTrackConfig {
    fn default() -> Self {
        Self {
            bitrate: 4_000_000,
            framerate: 30,
        }
    }
}

/// Audio-specific codec parameters. RTP timestamps for audio run on the
/// configured sample rate's clock (48 kHz for Opus).
#[derive(Debug, Clone, Copy)]
pub struct AudioTrackConfig {
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for AudioTrackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

pub type FrameReceivedCallback = Box<dyn Fn(&[u8], u32) + Send + Sync>;

/// An identifier-keyed, kind-typed carrier of one media stream's RTP
/// packets. A track is bound to at most one connection at a time; the
/// `RtpSender` is constructed lazily on `set_connection` and torn down on
/// `detach`.
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    ssrc: u32,
    enabled: bool,
    video_config: VideoTrackConfig,
    audio_config: AudioTrackConfig,
    sender: Option<RtpSender>,
    on_frame: Mutex<Option<FrameReceivedCallback>>,
}

impl MediaTrack {
    pub fn new_video(id: impl Into<String>, ssrc: u32, config: VideoTrackConfig) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Video,
            ssrc,
            enabled: true,
            video_config: config,
            audio_config: AudioTrackConfig::default(),
            sender: None,
            on_frame: Mutex::new(None),
        }
    }

    pub fn new_audio(id: impl Into<String>, ssrc: u32, config: AudioTrackConfig) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
            ssrc,
            enabled: true,
            video_config: VideoTrackConfig::default(),
            audio_config: config,
            sender: None,
            on_frame: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn video_config(&self) -> VideoTrackConfig {
        self.video_config
    }

    pub fn audio_config(&self) -> AudioTrackConfig {
        self.audio_config
    }

    pub fn is_attached(&self) -> bool {
        self.sender.is_some()
    }

    /// Binds this track to a live connection, constructing its `RtpSender`.
    /// Passing `None` detaches it.
    pub fn set_connection(&mut self, connected: bool) {
        if connected {
            if self.sender.is_none() {
                self.sender = Some(RtpSender::new(self.ssrc));
            }
        } else {
            self.sender = None;
        }
    }

    pub fn set_frame_callback(&self, callback: FrameReceivedCallback) {
        *self.on_frame.lock().unwrap() = Some(callback);
    }

    /// Invoked by the owning `PeerConnection`'s receive loop for every
    /// packet whose payload type matches this track's kind.
    pub fn deliver_received_frame(&self, data: &[u8], timestamp: u32) {
        if let Some(cb) = self.on_frame.lock().unwrap().as_ref() {
            cb(data, timestamp);
        }
    }

    /// Sends one frame's worth of already-encoded bytes. `timestamp` is in
    /// the track's native clock (90 kHz for video, the configured sample
    /// rate for audio).
    pub fn send_frame(&mut self, connection: &dyn Connection, bytes: &[u8], timestamp: u32) -> Result<()> {
        if !self.enabled {
            return Result::err(ErrorKind::TrackDisabled, "track is disabled");
        }
        let sender = match &mut self.sender {
            Some(s) => s,
            None => return Result::err(ErrorKind::TrackNotConnected, "track has no connection attached"),
        };

        let sent = match self.kind {
            TrackKind::Video => sender.send_video_frame(connection, bytes, timestamp, true),
            TrackKind::Audio => sender.send_audio_packet(connection, bytes, timestamp),
        };

        if sent {
            Result::ok(())
        } else {
            Result::err(ErrorKind::MediaTrackError, "failed to send track frame")
        }
    }

    pub(crate) fn payload_type(&self) -> PayloadType {
        match self.kind {
            TrackKind::Video => PayloadType::VideoH264,
            TrackKind::Audio => PayloadType::AudioOpus,
        }
    }
}

/// Thread-safe handle shared between a `PeerConnection` and its receive
/// loop.
pub type SharedTrack = Arc<Mutex<MediaTrack>>;

pub(crate) fn log_duplicate_track(id: &str) {
    warn!("track id already exists: {id}");
}

pub(crate) fn log_track_attached(id: &str, kind: TrackKind) {
    debug!("track attached: id={id}, kind={kind:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionType;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeConnection {
        open: bool,
        sent: StdMutex<Vec<Vec<u8>>>,
    }

    impl Connection for FakeConnection {
        fn open(&mut self) -> Result<()> {
            self.open = true;
            Result::ok(())
        }
        fn close(&mut self) {
            self.open = false;
        }
        fn is_open(&self) -> bool {
            self.open
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
    fn disabled_track_refuses_to_send() {
        let mut track = MediaTrack::new_video("v0", 1000, VideoTrackConfig::default());
        track.set_connection(true);
        track.set_enabled(false);
        let conn = FakeConnection {
            open: true,
            sent: StdMutex::new(Vec::new()),
        };
        let r = track.send_frame(&conn, b"frame", 0);
        assert_eq!(r.code(), Some(ErrorKind::TrackDisabled));
    }

    #[test]
    fn unattached_track_refuses_to_send() {
        let mut track = MediaTrack::new_audio("a0", 2000, AudioTrackConfig::default());
        let conn = FakeConnection {
            open: true,
            sent: StdMutex::new(Vec::new()),
        };
        let r = track.send_frame(&conn, b"pcm", 0);
        assert_eq!(r.code(), Some(ErrorKind::TrackNotConnected));
    }

    #[test]
    fn attach_then_send_succeeds() {
        let mut track = MediaTrack::new_video("v0", 1000, VideoTrackConfig::default());
        track.set_connection(true);
        let conn = FakeConnection {
            open: true,
            sent: StdMutex::new(Vec::new()),
        };
        let r = track.send_frame(&conn, b"frame", 0);
        assert!(r.is_ok());
        assert_eq!(conn.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn received_frame_invokes_callback() {
        let track = MediaTrack::new_video("v0", 1000, VideoTrackConfig::default());
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        track.set_frame_callback(Box::new(move |_data, _ts| {
            seen2.store(true, Ordering::SeqCst);
        }));
        track.deliver_received_frame(b"data", 123);
        assert!(seen.load(Ordering::SeqCst));
    }
}
