//! GStreamer-backed `VideoEncoder`: an `appsrc ! ... ! <encoder> ! appsink`
//! pipeline per instance, fed frame-by-frame and drained packet-by-packet.
//!
//! Generalizes the donor's `src/gstreamer/encoder.rs` hardware-detection
//! factory (`EncoderInfo` tables, `detect_hardware_encoder`,
//! `EncoderSelection::select`) from the donor's RTP-payloaded streaming
//! pipeline to this crate's frame-in/packet-out `VideoEncoder` contract: no
//! RTP payloader here, `RtpSender` owns framing further up the stack.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use log::{debug, info, warn};

use crate::capture::{Frame, PixelFormat};
use crate::error::{ErrorKind, Result};

use super::encoder::{
    CodecId, EncodedPacket, EncoderConfig, EncoderPreset, EncoderProfile,
    EncoderStats, EncoderType, HwEncoderType, VideoEncoder,
};

struct EncoderInfo {
    name: &'static str,
    hw_type: HwEncoderType,
    codec: CodecId,
    priority: u8,
}

const SOFTWARE_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo { name: "x264enc", hw_type: HwEncoderType::None, codec: CodecId::H264, priority: 50 },
    EncoderInfo { name: "openh264enc", hw_type: HwEncoderType::None, codec: CodecId::H264, priority: 40 },
    EncoderInfo { name: "x265enc", hw_type: HwEncoderType::None, codec: CodecId::Hevc, priority: 50 },
];

const VAAPI_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo { name: "vaapih264enc", hw_type: HwEncoderType::Vaapi, codec: CodecId::H264, priority: 90 },
    EncoderInfo { name: "vaapih265enc", hw_type: HwEncoderType::Vaapi, codec: CodecId::Hevc, priority: 90 },
];

const NVENC_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo { name: "nvh264enc", hw_type: HwEncoderType::Nvenc, codec: CodecId::H264, priority: 95 },
    EncoderInfo { name: "nvh265enc", hw_type: HwEncoderType::Nvenc, codec: CodecId::Hevc, priority: 95 },
];

const QSV_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo { name: "qsvh264enc", hw_type: HwEncoderType::Qsv, codec: CodecId::H264, priority: 92 },
    EncoderInfo { name: "qsvh265enc", hw_type: HwEncoderType::Qsv, codec: CodecId::Hevc, priority: 92 },
];

fn element_available(name: &str) -> bool {
    gst::ElementFactory::find(name).is_some()
}

fn detect_candidates(codec: CodecId) -> Vec<&'static EncoderInfo> {
    let mut found = Vec::new();
    for table in [NVENC_ENCODERS, QSV_ENCODERS, VAAPI_ENCODERS, SOFTWARE_ENCODERS] {
        for info in table {
            if info.codec == codec && element_available(info.name) {
                found.push(info);
            }
        }
    }
    found.sort_by(|a, b| b.priority.cmp(&a.priority));
    found
}

fn select_encoder(config: &EncoderConfig) -> Option<&'static EncoderInfo> {
    let candidates = detect_candidates(config.codec_id);
    if config.encoder_type == EncoderType::Software {
        return candidates.into_iter().find(|c| c.hw_type == HwEncoderType::None);
    }
    if config.hw_encoder_type != HwEncoderType::None {
        if let Some(c) = candidates.iter().find(|c| c.hw_type == config.hw_encoder_type) {
            return Some(c);
        }
    }
    candidates.into_iter().next()
}

fn preset_name(preset: EncoderPreset) -> &'static str {
    match preset {
        EncoderPreset::UltraFast => "ultrafast",
        EncoderPreset::SuperFast => "superfast",
        EncoderPreset::VeryFast => "veryfast",
        EncoderPreset::Fast => "fast",
        EncoderPreset::Medium => "medium",
        EncoderPreset::Slow => "slow",
        EncoderPreset::LowLatency => "superfast",
    }
}

fn profile_name(profile: EncoderProfile) -> &'static str {
    match profile {
        EncoderProfile::Baseline => "baseline",
        EncoderProfile::Main => "main",
        EncoderProfile::High => "high",
    }
}

fn build_gst_encoder(info: &EncoderInfo, config: &EncoderConfig) -> std::result::Result<gst::Element, String> {
    let builder = gst::ElementFactory::make(info.name).name("encoder");
    let element = match info.name {
        "x264enc" => builder
            .property_from_str("tune", "zerolatency")
            .property_from_str("speed-preset", preset_name(config.preset))
            .property_from_str("profile", profile_name(config.profile))
            .property("bitrate", config.bitrate / 1000)
            .property("key-int-max", config.gop_size)
            .property("bframes", config.max_b_frames)
            .property("threads", config.thread_count)
            .build(),
        "x265enc" => builder
            .property_from_str("speed-preset", preset_name(config.preset))
            .property("bitrate", config.bitrate / 1000)
            .property("key-int-max", config.gop_size as i32)
            .build(),
        "openh264enc" => builder
            .property("bitrate", config.bitrate)
            .property("gop-size", config.gop_size)
            .build(),
        "vaapih264enc" | "vaapih265enc" => builder
            .property("bitrate", config.bitrate / 1000)
            .property("keyframe-period", config.gop_size)
            .build(),
        "nvh264enc" | "nvh265enc" => builder
            .property("bitrate", config.bitrate / 1000)
            .property("gop-size", config.gop_size as i32)
            .property_from_str("preset", "low-latency-hq")
            .property("zerolatency", config.zero_latency)
            .build(),
        "qsvh264enc" | "qsvh265enc" => builder
            .property("bitrate", config.bitrate / 1000)
            .property("gop-size", config.gop_size)
            .property("low-latency", config.zero_latency)
            .build(),
        other => return Err(format!("no element-building rule for encoder '{other}'")),
    };
    element.map_err(|e| format!("failed to construct '{}': {e}", info.name))
}

fn raw_caps(config: &EncoderConfig) -> String {
    let format = match config.input_format {
        PixelFormat::Bgra32 => "BGRA",
        PixelFormat::Rgba32 => "RGBA",
    };
    format!(
        "video/x-raw,format={},width={},height={},framerate={}/1",
        format, config.width, config.height, config.framerate
    )
}

/// `appsrc ! capsfilter ! videoconvert ! <encoder> ! appsink`, driven by
/// `encode()`/`flush()` instead of a free-running pipeline clock: frames are
/// pushed and the sink pulled with a zero timeout, so a missing sample
/// surfaces as `None` (the contract's drain-on-EAGAIN behavior) rather than
/// blocking the caller.
pub struct GstVideoEncoder {
    pipeline: Option<gst::Pipeline>,
    appsrc: Option<gst_app::AppSrc>,
    appsink: Option<gst_app::AppSink>,
    config: EncoderConfig,
    encoder_name: String,
    encoder_kind: EncoderType,
    initialized: bool,
    force_key: bool,
    frame_counter: u64,
    stats: EncoderStats,
}

impl Default for GstVideoEncoder {
    fn default() -> Self {
        Self {
            pipeline: None,
            appsrc: None,
            appsink: None,
            config: EncoderConfig::default(),
            encoder_name: String::new(),
            encoder_kind: EncoderType::Software,
            initialized: false,
            force_key: true,
            frame_counter: 0,
            stats: EncoderStats::default(),
        }
    }
}

impl GstVideoEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_pipeline(&mut self, config: &EncoderConfig) -> Result<()> {
        if let Err(e) = gst::init() {
            return Result::err(ErrorKind::EncoderInitFailed, format!("gstreamer init failed: {e}"));
        }

        let info = match select_encoder(config) {
            Some(i) => i,
            None => return Result::err(ErrorKind::EncoderNotFound, "no suitable encoder element found"),
        };

        let pipeline = gst::Pipeline::new();
        let appsrc = gst_app::AppSrc::builder()
            .caps(&raw_caps(config).parse::<gst::Caps>().unwrap())
            .format(gst::Format::Time)
            .is_live(true)
            .build();
        let convert = match gst::ElementFactory::make("videoconvert").build() {
            Ok(e) => e,
            Err(e) => return Result::err(ErrorKind::EncoderInitFailed, format!("videoconvert: {e}")),
        };
        let encoder = match build_gst_encoder(info, config) {
            Ok(e) => e,
            Err(msg) => return Result::err(ErrorKind::EncoderInitFailed, msg),
        };
        let appsink = gst_app::AppSink::builder().sync(false).max_buffers(4).drop(false).build();

        if let Err(e) = pipeline.add_many([appsrc.upcast_ref(), &convert, &encoder, appsink.upcast_ref()]) {
            return Result::err(ErrorKind::EncoderInitFailed, format!("failed to add elements: {e}"));
        }
        if let Err(e) = gst::Element::link_many([appsrc.upcast_ref(), &convert, &encoder, appsink.upcast_ref()]) {
            return Result::err(ErrorKind::EncoderInitFailed, format!("failed to link elements: {e}"));
        }
        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            return Result::err(ErrorKind::EncoderInitFailed, format!("failed to start pipeline: {e}"));
        }

        info!("video encoder initialized: {} ({:?})", info.name, info.hw_type);
        self.encoder_name = info.name.to_string();
        self.encoder_kind = if info.hw_type == HwEncoderType::None { EncoderType::Software } else { EncoderType::Hardware };
        self.pipeline = Some(pipeline);
        self.appsrc = Some(appsrc);
        self.appsink = Some(appsink);
        Result::ok(())
    }

    fn pull_packet(&mut self) -> Option<EncodedPacket> {
        let appsink = self.appsink.as_ref()?;
        let sample = appsink.try_pull_sample(gst::ClockTime::ZERO)?;
        let buffer = sample.buffer()?;
        let map = buffer.map_readable().ok()?;
        let is_key = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);
        let pts = buffer.pts().map(|t| t.useconds() as i64).unwrap_or(0);
        let dts = buffer.dts().map(|t| t.useconds() as i64).unwrap_or(pts);
        let duration = buffer.duration().map(|t| t.useconds() as i64).unwrap_or(0);
        let data = map.as_slice().to_vec();

        self.stats.frames_encoded += 1;
        self.stats.bytes_encoded += data.len() as u64;
        if is_key {
            self.stats.key_frames_encoded += 1;
        }

        Some(EncodedPacket { data, pts, dts, is_key_frame: is_key, duration })
    }
}

impl VideoEncoder for GstVideoEncoder {
    fn initialize(&mut self, config: EncoderConfig) -> Result<()> {
        self.config = config.clone();
        if let crate::error::Result::Err(e) = self.build_pipeline(&config) {
            return crate::error::Result::Err(e);
        }
        self.initialized = true;
        Result::ok(())
    }

    fn shutdown(&mut self) {
        if let Some(p) = self.pipeline.take() {
            let _ = p.set_state(gst::State::Null);
        }
        self.appsrc = None;
        self.appsink = None;
        self.initialized = false;
    }

    fn encode(&mut self, frame: &Frame) -> Option<EncodedPacket> {
        if !self.initialized {
            return None;
        }
        let appsrc = self.appsrc.as_ref()?;

        if self.force_key {
            let event = gst_video::UpstreamForceKeyUnitEvent::builder().all_headers(true).build();
            let _ = appsrc.send_event(event);
            self.force_key = false;
        }

        let mut buffer = gst::Buffer::from_slice(frame.data().to_vec());
        {
            let buffer_mut = buffer.get_mut().unwrap();
            let pts_us = (self.frame_counter * 1_000_000) / self.config.framerate.max(1) as u64;
            buffer_mut.set_pts(gst::ClockTime::from_useconds(pts_us));
        }
        self.frame_counter += 1;

        if appsrc.push_buffer(buffer).is_err() {
            self.stats.frames_dropped += 1;
            warn!("encoder '{}' rejected a pushed frame", self.encoder_name);
            return None;
        }

        self.pull_packet()
    }

    fn flush(&mut self) -> Vec<EncodedPacket> {
        let mut packets = Vec::new();
        if let Some(appsrc) = &self.appsrc {
            let _ = appsrc.end_of_stream();
        }
        while let Some(p) = self.pull_packet() {
            packets.push(p);
        }
        debug!("encoder '{}' flushed {} packets", self.encoder_name, packets.len());
        packets
    }

    fn force_key_frame(&mut self) {
        self.force_key = true;
    }

    fn update_bitrate(&mut self, bps: u32) -> Result<()> {
        let Some(pipeline) = &self.pipeline else {
            return Result::err(ErrorKind::NotInitialized, "encoder not initialized");
        };
        let Some(encoder) = pipeline.by_name("encoder") else {
            return Result::err(ErrorKind::EncoderError, "encoder element missing from pipeline");
        };
        if encoder.has_property("bitrate") {
            encoder.set_property("bitrate", bps / 1000);
            self.config.bitrate = bps;
            Result::ok(())
        } else {
            Result::err(ErrorKind::NotSupported, "encoder element has no bitrate property")
        }
    }

    fn stats(&self) -> EncoderStats {
        self.stats
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn encoder_type(&self) -> EncoderType {
        self.encoder_kind
    }

    fn encoder_name(&self) -> &str {
        &self.encoder_name
    }
}

/// Tries a hardware encoder first when requested, falling back to software
/// on any initialization failure and logging the fallback, per spec §4.17.
pub fn create_video_encoder(config: EncoderConfig) -> Result<Box<dyn VideoEncoder>> {
    let mut attempt = config.clone();
    if config.encoder_type == EncoderType::Hardware {
        let mut encoder = GstVideoEncoder::new();
        if encoder.initialize(attempt.clone()).is_ok() {
            return Result::ok(Box::new(encoder));
        }
        warn!("hardware encoder init failed, falling back to software");
        attempt.encoder_type = EncoderType::Software;
    }

    let mut encoder = GstVideoEncoder::new();
    match encoder.initialize(attempt) {
        crate::error::Result::Ok(()) => Result::ok(Box::new(encoder)),
        crate::error::Result::Err(e) => crate::error::Result::Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_and_profile_names_are_stable() {
        assert_eq!(preset_name(EncoderPreset::LowLatency), "superfast");
        assert_eq!(profile_name(EncoderProfile::Baseline), "baseline");
    }

    #[test]
    fn raw_caps_string_reflects_config() {
        let mut config = EncoderConfig::default();
        config.width = 640;
        config.height = 480;
        config.framerate = 24;
        let caps = raw_caps(&config);
        assert!(caps.contains("width=640"));
        assert!(caps.contains("height=480"));
        assert!(caps.contains("framerate=24/1"));
    }
}
