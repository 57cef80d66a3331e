//! Configuration surface for assembling a controller or controlled session.
//!
//! Mirrors the donor crate's `config/mod.rs` shape: serde-derived
//! sub-structs, `#[serde(default = "fn")]` free functions for individual
//! field defaults, and a `Config::load`/`Config::validate` pair. The field
//! list follows spec §6's config surface: connection parameters, the peer
//! connection's relay/TURN knobs, track codec parameters, and capture
//! parameters.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::CaptureConfig;
use crate::net::connection::Endpoint;
use crate::transport::peer_connection::ConnectionMode;
use crate::transport::track::{AudioTrackConfig, VideoTrackConfig};

pub mod watcher;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub video_track: VideoTrackSettings,
    #[serde(default)]
    pub audio_track: AudioTrackSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub auto_save: AutoSaveConfig,
}

/// `{local_ip, local_port, remote.address, remote.port, socket_buffer_size,
/// recv_timeout_ms}` per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    #[serde(default)]
    pub local_port: u16,
    #[serde(default)]
    pub remote_address: String,
    #[serde(default)]
    pub remote_port: u16,
    #[serde(default = "default_socket_buffer_size")]
    pub socket_buffer_size: usize,
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: i64,
}

impl ConnectionConfig {
    pub fn remote(&self) -> Endpoint {
        Endpoint::new(self.remote_address.clone(), self.remote_port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            local_port: 0,
            remote_address: String::new(),
            remote_port: 0,
            socket_buffer_size: default_socket_buffer_size(),
            recv_timeout_ms: default_recv_timeout_ms(),
        }
    }
}

/// `{mode, turn_server, turn_username, turn_password}` per spec §6. The
/// TURN fields are accepted and validated but, matching
/// [`crate::net::connection::RelayConnection`]'s interface-complete-stub
/// status (spec §9's open question on relay protocol semantics), not yet
/// consumed by a real relay handshake.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PeerConfig {
    #[serde(default)]
    pub mode: PeerMode,
    #[serde(default)]
    pub turn_server: Option<String>,
    #[serde(default)]
    pub turn_username: Option<String>,
    #[serde(default)]
    pub turn_password: Option<String>,
    /// `0` (the default) disables the heartbeat; see
    /// [`crate::transport::peer_connection::PeerConnectionConfig::heartbeat_interval_ms`].
    #[serde(default)]
    pub heartbeat_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeerMode {
    #[default]
    Direct,
    Relay,
    /// Forward-compatibility placeholder; behaves as `Direct` today.
    Auto,
}

impl From<PeerMode> for ConnectionMode {
    fn from(mode: PeerMode) -> Self {
        match mode {
            PeerMode::Direct => ConnectionMode::Direct,
            PeerMode::Relay => ConnectionMode::Relay,
            PeerMode::Auto => ConnectionMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoTrackSettings {
    #[serde(default = "default_video_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_video_framerate")]
    pub framerate: u32,
}

impl Default for VideoTrackSettings {
    fn default() -> Self {
        Self {
            bitrate: default_video_bitrate(),
            framerate: default_video_framerate(),
        }
    }
}

impl From<VideoTrackSettings> for VideoTrackConfig {
    fn from(s: VideoTrackSettings) -> Self {
        VideoTrackConfig {
            bitrate: s.bitrate,
            framerate: s.framerate,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioTrackSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u8,
}

impl Default for AudioTrackSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

impl From<AudioTrackSettings> for AudioTrackConfig {
    fn from(s: AudioTrackSettings) -> Self {
        AudioTrackConfig {
            sample_rate: s.sample_rate,
            channels: s.channels,
        }
    }
}

/// `{output_index, target_fps, enable_dirty_rect, enable_move_rect}` per
/// spec §6.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default)]
    pub output_index: u32,
    #[serde(default = "default_video_framerate")]
    pub target_fps: u32,
    #[serde(default = "default_true")]
    pub enable_dirty_rect: bool,
    #[serde(default)]
    pub enable_move_rect: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            output_index: 0,
            target_fps: default_video_framerate(),
            enable_dirty_rect: true,
            enable_move_rect: false,
        }
    }
}

impl From<CaptureSettings> for CaptureConfig {
    fn from(s: CaptureSettings) -> Self {
        CaptureConfig {
            output_index: s.output_index,
            target_fps: s.target_fps,
            enable_dirty_rect: s.enable_dirty_rect,
            enable_move_rect: s.enable_move_rect,
        }
    }
}

/// Auto-save policy for the config subsystem, per spec §6. The secondary
/// thread pool the reference design uses to drive the debounce timer is
/// out of scope (spec §1); here the debounce is driven by a single
/// [`crate::timer::Timer`] instead, per SPEC_FULL.md §1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    #[serde(default)]
    pub policy: AutoSavePolicy,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            policy: AutoSavePolicy::Manual,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AutoSavePolicy {
    #[default]
    Manual,
    Immediate,
    Debounced,
    OnExit,
}

impl Config {
    /// Loads from TOML at `path`, or returns [`Config::default`] when the
    /// file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Cross-field sanity checks in the donor's `validate()` style.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.video_track.bitrate == 0 {
            return Err("video_track.bitrate must be non-zero".into());
        }
        if self.video_track.framerate == 0 {
            return Err("video_track.framerate must be non-zero".into());
        }
        if self.audio_track.sample_rate == 0 {
            return Err("audio_track.sample_rate must be non-zero".into());
        }
        if self.audio_track.channels == 0 || self.audio_track.channels > 2 {
            return Err("audio_track.channels must be 1 or 2".into());
        }
        if self.capture.target_fps == 0 {
            return Err("capture.target_fps must be non-zero".into());
        }
        if self.peer.mode == PeerMode::Relay && self.peer.turn_server.is_none() {
            return Err("peer.mode is relay but no turn_server is configured".into());
        }
        if self.connection.socket_buffer_size == 0 {
            return Err("connection.socket_buffer_size must be non-zero".into());
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_local_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_socket_buffer_size() -> usize {
    1024 * 1024
}

fn default_recv_timeout_ms() -> i64 {
    1000
}

fn default_video_bitrate() -> u32 {
    4_000_000
}

fn default_video_framerate() -> u32 {
    30
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u8 {
    2
}

fn default_debounce_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_bitrate_rejected() {
        let mut cfg = Config::default();
        cfg.video_track.bitrate = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn relay_mode_requires_turn_server() {
        let mut cfg = Config::default();
        cfg.peer.mode = PeerMode::Relay;
        assert!(cfg.validate().is_err());
        cfg.peer.turn_server = Some("turn.example.com:3478".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_missing_file_returns_default() {
        let cfg = Config::load("/nonexistent/path/meridian.toml").unwrap();
        assert_eq!(cfg.connection.local_port, 0);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let toml_string = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.video_track.bitrate, cfg.video_track.bitrate);
    }
}
