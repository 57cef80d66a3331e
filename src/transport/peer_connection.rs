//! Assembles a `Connection`, a set of `MediaTrack`s, and a set of
//! `DataChannel`s behind a single receive loop.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rand::Rng;

use crate::error::{ErrorKind, Result};
use crate::net::connection::{DirectConnection, DirectConnectionConfig, Endpoint, RelayConnection};
use crate::net::Connection;
use crate::rtp::control::{timestamp_ms, ControlMessage, ControlMessageType};
use crate::rtp::packet::{PayloadType, RtpHeader, RtpPacket};
use crate::timer::{Timer, TimerFactory};
use crate::transport::data_channel::{DataChannel, DataChannelConfig};
use crate::transport::track::{MediaTrack, SharedTrack, TrackKind};

const RECV_BUFFER_SIZE: usize = 65_536;
const RECV_TIMEOUT_MS: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionMode {
    Direct,
    Relay,
    /// Forward-compatibility placeholder; currently behaves as `Direct`.
    Auto,
}

#[derive(Debug, Clone)]
pub struct PeerConnectionConfig {
    pub mode: ConnectionMode,
    pub local_ip: String,
    pub local_port: u16,
    pub remote: Option<Endpoint>,
    pub relay: Option<Endpoint>,
    pub socket_buffer_size: usize,
    pub recv_timeout_ms: i64,
    /// `0` disables the heartbeat entirely (the default); otherwise an
    /// empty heartbeat control message is sent on this interval and a
    /// last-seen-heartbeat instant is tracked on receipt. Purely a
    /// liveness statistic — it never triggers teardown by itself.
    pub heartbeat_interval_ms: u64,
}

impl Default for PeerConnectionConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Direct,
            local_ip: "0.0.0.0".to_string(),
            local_port: 0,
            remote: None,
            relay: None,
            socket_buffer_size: 1024 * 1024,
            recv_timeout_ms: 1000,
            heartbeat_interval_ms: 0,
        }
    }
}

pub type TrackObserver = Box<dyn Fn(SharedTrack) + Send + Sync>;
pub type DataChannelObserver = Box<dyn Fn(Arc<Mutex<DataChannel>>) + Send + Sync>;

struct Entry<T> {
    key: String,
    value: T,
}

type SharedConnection = Arc<Mutex<Box<dyn Connection>>>;

/// Assembles a transport connection with a bound set of media tracks and
/// data channels, and drives a single receive thread that demultiplexes
/// inbound RTP packets by payload type.
pub struct PeerConnection {
    connection: Option<SharedConnection>,
    tracks: Vec<Entry<SharedTrack>>,
    channels: Vec<Entry<Arc<Mutex<DataChannel>>>>,
    next_ssrc: u32,
    stop_flag: Arc<AtomicBool>,
    recv_thread: Option<JoinHandle<()>>,
    on_track: Option<TrackObserver>,
    on_data_channel: Option<DataChannelObserver>,
    heartbeat_interval_ms: u64,
    heartbeat_ssrc: u32,
    heartbeat_timer: Option<Timer>,
    last_heartbeat: Arc<Mutex<Option<Instant>>>,
}

impl Default for PeerConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerConnection {
    pub fn new() -> Self {
        Self {
            connection: None,
            tracks: Vec::new(),
            channels: Vec::new(),
            next_ssrc: random_ssrc(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            recv_thread: None,
            on_track: None,
            on_data_channel: None,
            heartbeat_interval_ms: 0,
            heartbeat_ssrc: random_ssrc(),
            heartbeat_timer: None,
            last_heartbeat: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_on_track(&mut self, observer: TrackObserver) {
        self.on_track = Some(observer);
    }

    pub fn set_on_data_channel(&mut self, observer: DataChannelObserver) {
        self.on_data_channel = Some(observer);
    }

    pub fn initialize(&mut self, config: PeerConnectionConfig) -> Result<()> {
        let connection: Box<dyn Connection> = match config.mode {
            ConnectionMode::Direct | ConnectionMode::Auto => {
                Box::new(DirectConnection::new(DirectConnectionConfig {
                    local_ip: config.local_ip.clone(),
                    local_port: config.local_port,
                    remote: config.remote.clone().unwrap_or_else(|| Endpoint::new("", 0)),
                    socket_buffer_size: config.socket_buffer_size,
                    recv_timeout_ms: config.recv_timeout_ms,
                }))
            }
            ConnectionMode::Relay => {
                let relay = match config.relay.clone() {
                    Some(r) => r,
                    None => return Result::err(ErrorKind::InvalidParameter, "relay mode requires a relay endpoint"),
                };
                Box::new(RelayConnection::new(relay))
            }
        };
        self.connection = Some(Arc::new(Mutex::new(connection)));
        self.heartbeat_interval_ms = config.heartbeat_interval_ms;
        Result::ok(())
    }

    pub fn add_track(&mut self, track: MediaTrack) -> Result<SharedTrack> {
        if self.tracks.iter().any(|e| e.key == track.id()) {
            return Result::err(ErrorKind::InvalidOperation, format!("duplicate track id: {}", track.id()));
        }
        let id = track.id().to_string();
        let shared: SharedTrack = Arc::new(Mutex::new(track));
        self.tracks.push(Entry {
            key: id,
            value: shared.clone(),
        });
        if let Some(cb) = &self.on_track {
            cb(shared.clone());
        }
        Result::ok(shared)
    }

    pub fn remove_track(&mut self, id: &str) {
        self.tracks.retain(|e| e.key != id);
    }

    pub fn get_track(&self, id: &str) -> Option<SharedTrack> {
        self.tracks.iter().find(|e| e.key == id).map(|e| e.value.clone())
    }

    pub fn get_tracks(&self) -> Vec<SharedTrack> {
        self.tracks.iter().map(|e| e.value.clone()).collect()
    }

    pub fn create_data_channel(&mut self, label: impl Into<String>, config: DataChannelConfig) -> Result<Arc<Mutex<DataChannel>>> {
        let label = label.into();
        if self.channels.iter().any(|e| e.key == label) {
            return Result::err(ErrorKind::InvalidOperation, format!("duplicate data channel label: {label}"));
        }
        let ssrc = self.allocate_ssrc();
        let channel = Arc::new(Mutex::new(DataChannel::new(label.clone(), ssrc, config)));
        self.channels.push(Entry {
            key: label,
            value: channel.clone(),
        });
        if let Some(cb) = &self.on_data_channel {
            cb(channel.clone());
        }
        Result::ok(channel)
    }

    pub fn get_data_channel(&self, label: &str) -> Option<Arc<Mutex<DataChannel>>> {
        self.channels.iter().find(|e| e.key == label).map(|e| e.value.clone())
    }

    fn allocate_ssrc(&mut self) -> u32 {
        let ssrc = self.next_ssrc;
        self.next_ssrc = self.next_ssrc.wrapping_add(1);
        ssrc
    }

    pub fn is_open(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.lock().unwrap().is_open())
    }

    /// The locally bound UDP port, once `connect` has opened the
    /// connection. Useful for a controlled session to report which port it
    /// is listening on.
    pub fn local_port(&self) -> Option<u16> {
        self.connection.as_ref().and_then(|c| c.lock().unwrap().local_port())
    }

    /// Sends one frame on the named track, locking the connection for the
    /// duration of the call.
    pub fn send_on_track(&self, track_id: &str, bytes: &[u8], timestamp: u32) -> Result<()> {
        let connection = match &self.connection {
            Some(c) => c,
            None => return Result::err(ErrorKind::NotInitialized, "peer connection not initialized"),
        };
        let track = match self.get_track(track_id) {
            Some(t) => t,
            None => return Result::err(ErrorKind::InvalidParameter, format!("unknown track id: {track_id}")),
        };
        let guard = connection.lock().unwrap();
        track.lock().unwrap().send_frame(guard.as_ref().as_ref(), bytes, timestamp)
    }

    /// Sends one message on the named data channel, locking the connection
    /// for the duration of the call.
    pub fn send_on_channel(&self, label: &str, bytes: &[u8]) -> Result<()> {
        let connection = match &self.connection {
            Some(c) => c,
            None => return Result::err(ErrorKind::NotInitialized, "peer connection not initialized"),
        };
        let channel = match self.get_data_channel(label) {
            Some(c) => c,
            None => return Result::err(ErrorKind::InvalidParameter, format!("unknown data channel: {label}")),
        };
        let guard = connection.lock().unwrap();
        channel.lock().unwrap().send(guard.as_ref().as_ref(), bytes)
    }

    /// Opens the connection, attaches every track and channel, and spawns
    /// the receive thread.
    pub fn connect(&mut self) -> Result<()> {
        let connection = match self.connection.clone() {
            Some(c) => c,
            None => return Result::err(ErrorKind::NotInitialized, "peer connection not initialized"),
        };

        let open_result = connection.lock().unwrap().open();
        if let crate::error::Result::Err(e) = open_result {
            return crate::error::Result::Err(e);
        }

        for entry in &self.tracks {
            entry.value.lock().unwrap().set_connection(true);
        }
        for entry in &self.channels {
            entry.value.lock().unwrap().mark_open();
        }

        self.stop_flag.store(false, Ordering::SeqCst);
        let stop_flag = self.stop_flag.clone();
        let tracks: Vec<SharedTrack> = self.tracks.iter().map(|e| e.value.clone()).collect();
        let channels: Vec<Arc<Mutex<DataChannel>>> = self.channels.iter().map(|e| e.value.clone()).collect();
        let recv_conn = connection.clone();
        let last_heartbeat = self.last_heartbeat.clone();

        self.recv_thread = Some(std::thread::spawn(move || {
            receive_loop(recv_conn, tracks, channels, last_heartbeat, stop_flag);
        }));

        if self.heartbeat_interval_ms > 0 {
            let heartbeat_conn = connection.clone();
            let ssrc = self.heartbeat_ssrc;
            let sequence = Arc::new(AtomicU16::new(0));
            let timer = TimerFactory::create_repeating(
                self.heartbeat_interval_ms,
                Arc::new(move || send_heartbeat(&heartbeat_conn, ssrc, &sequence)),
            );
            timer.start();
            self.heartbeat_timer = Some(timer);
        }

        info!("peer connection connected");
        Result::ok(())
    }

    /// Elapsed time since a heartbeat control message was last received, if
    /// any has arrived yet. A diagnostic only — nothing in this crate acts
    /// on a stale or absent heartbeat.
    pub fn time_since_last_heartbeat(&self) -> Option<Duration> {
        self.last_heartbeat.lock().unwrap().map(|t| t.elapsed())
    }

    pub fn disconnect(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
        }
        if let Some(timer) = self.heartbeat_timer.take() {
            timer.stop();
        }
        for entry in &self.tracks {
            entry.value.lock().unwrap().set_connection(false);
        }
        for entry in &self.channels {
            entry.value.lock().unwrap().mark_closed();
        }
        if let Some(connection) = &self.connection {
            connection.lock().unwrap().close();
        }
        *self.last_heartbeat.lock().unwrap() = None;
        debug!("peer connection disconnected");
    }
}

fn send_heartbeat(connection: &SharedConnection, ssrc: u32, sequence: &AtomicU16) {
    let timestamp_ms = timestamp_ms();
    let seq = sequence.fetch_add(1, Ordering::Relaxed);
    let ctrl_msg = ControlMessage {
        message_type: ControlMessageType::Heartbeat,
        sequence: seq,
        timestamp_ms,
        payload: Vec::new(),
    };
    let packet = RtpPacket::new(
        RtpHeader {
            payload_type: PayloadType::Control,
            sequence_number: seq,
            timestamp: timestamp_ms,
            ssrc,
            ..Default::default()
        },
        ctrl_msg.serialize(),
    );
    let Some(wire) = packet.serialize() else {
        return;
    };
    let guard = connection.lock().unwrap();
    if let crate::error::Result::Err(e) = guard.as_ref().send(&wire) {
        warn!("heartbeat send failed: {}", e.full_message());
    }
}

fn receive_loop(
    connection: SharedConnection,
    tracks: Vec<SharedTrack>,
    channels: Vec<Arc<Mutex<DataChannel>>>,
    last_heartbeat: Arc<Mutex<Option<Instant>>>,
    stop_flag: Arc<AtomicBool>,
) {
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    while !stop_flag.load(Ordering::SeqCst) {
        let recv_result = connection.lock().unwrap().recv(&mut buffer, RECV_TIMEOUT_MS);
        match recv_result {
            crate::error::Result::Ok(n) => {
                let packet = match RtpPacket::parse(&buffer[..n]) {
                    Some(p) => p,
                    None => {
                        warn!("received malformed RTP packet, dropping");
                        continue;
                    }
                };
                dispatch_packet(&connection, &tracks, &channels, &last_heartbeat, packet);
            }
            crate::error::Result::Err(e) => {
                if e.kind() == ErrorKind::Timeout {
                    continue;
                }
                error!("receive loop exiting after persistent error: {}", e.full_message());
                break;
            }
        }
    }
}

fn dispatch_packet(
    connection: &SharedConnection,
    tracks: &[SharedTrack],
    channels: &[Arc<Mutex<DataChannel>>],
    last_heartbeat: &Arc<Mutex<Option<Instant>>>,
    packet: RtpPacket,
) {
    match packet.header.payload_type {
        PayloadType::VideoH264 => dispatch_media(tracks, TrackKind::Video, &packet),
        PayloadType::AudioOpus => dispatch_media(tracks, TrackKind::Audio, &packet),
        PayloadType::Control | PayloadType::ControlAck => {
            if is_heartbeat(&packet) {
                *last_heartbeat.lock().unwrap() = Some(Instant::now());
                return;
            }
            if let Some(channel) = channels.first() {
                let guard = connection.lock().unwrap();
                channel
                    .lock()
                    .unwrap()
                    .on_control_payload(guard.as_ref().as_ref(), packet.header.payload_type, &packet.payload);
            }
        }
    }
}

fn is_heartbeat(packet: &RtpPacket) -> bool {
    packet.header.payload_type == PayloadType::Control
        && ControlMessage::parse(&packet.payload)
            .is_some_and(|m| m.message_type == ControlMessageType::Heartbeat)
}

fn dispatch_media(tracks: &[SharedTrack], kind: TrackKind, packet: &RtpPacket) {
    for entry in tracks {
        let track = entry.lock().unwrap();
        if track.kind() == kind {
            track.deliver_received_frame(&packet.payload, packet.header.timestamp);
            return;
        }
    }
    debug!("no {kind:?} track bound yet, dropping received frame");
}

fn random_ssrc() -> u32 {
    rand::thread_rng().gen_range(1000..1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::track::VideoTrackConfig;

    #[test]
    fn duplicate_track_id_rejected() {
        let mut pc = PeerConnection::new();
        assert!(pc.add_track(MediaTrack::new_video("v0", 1000, VideoTrackConfig::default())).is_ok());
        let r = pc.add_track(MediaTrack::new_video("v0", 1001, VideoTrackConfig::default()));
        assert_eq!(r.code(), Some(ErrorKind::InvalidOperation));
    }

    #[test]
    fn duplicate_data_channel_label_rejected() {
        let mut pc = PeerConnection::new();
        assert!(pc.create_data_channel("input", DataChannelConfig::default()).is_ok());
        let r = pc.create_data_channel("input", DataChannelConfig::default());
        assert_eq!(r.code(), Some(ErrorKind::InvalidOperation));
    }

    #[test]
    fn connect_without_initialize_fails() {
        let mut pc = PeerConnection::new();
        let r = pc.connect();
        assert_eq!(r.code(), Some(ErrorKind::NotInitialized));
    }

    #[test]
    fn connect_and_disconnect_round_trip() {
        let mut pc = PeerConnection::new();
        assert!(pc
            .initialize(PeerConnectionConfig {
                local_ip: "127.0.0.1".into(),
                ..Default::default()
            })
            .is_ok());
        assert!(pc.connect().is_ok());
        assert!(pc.is_open());
        pc.disconnect();
        assert!(!pc.is_open());
    }

    #[test]
    fn send_on_unknown_track_is_invalid_parameter() {
        let mut pc = PeerConnection::new();
        pc.initialize(PeerConnectionConfig {
            local_ip: "127.0.0.1".into(),
            ..Default::default()
        })
        .value_or(());
        pc.connect().value_or(());
        let r = pc.send_on_track("missing", b"x", 0);
        assert_eq!(r.code(), Some(ErrorKind::InvalidParameter));
        pc.disconnect();
    }

    #[test]
    fn heartbeat_updates_last_seen_instant() {
        let mut listener = PeerConnection::new();
        assert!(listener
            .initialize(PeerConnectionConfig {
                local_ip: "127.0.0.1".into(),
                ..Default::default()
            })
            .is_ok());
        assert!(listener.connect().is_ok());
        let listener_port = listener.local_port().unwrap();

        let mut sender = PeerConnection::new();
        assert!(sender
            .initialize(PeerConnectionConfig {
                local_ip: "127.0.0.1".into(),
                remote: Some(Endpoint::new("127.0.0.1", listener_port)),
                heartbeat_interval_ms: 20,
                ..Default::default()
            })
            .is_ok());
        assert!(sender.connect().is_ok());

        assert!(listener.time_since_last_heartbeat().is_none());
        std::thread::sleep(Duration::from_millis(150));
        assert!(listener.time_since_last_heartbeat().is_some());

        sender.disconnect();
        listener.disconnect();
    }
}
