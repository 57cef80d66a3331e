//! The `VideoEncoder` contract: frame-in, packetized-bitstream-out.

use crate::capture::{Frame, PixelFormat};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    Hevc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderType {
    Software,
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwEncoderType {
    Nvenc,
    Qsv,
    Amf,
    VideoToolbox,
    Vaapi,
    /// Auto-detect at factory time.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateControl {
    Cbr,
    Vbr,
    Crf,
    Cqp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderPreset {
    UltraFast,
    SuperFast,
    VeryFast,
    Fast,
    Medium,
    Slow,
    /// Aliases to the fastest preset the selected backend offers.
    LowLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderProfile {
    Baseline,
    Main,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRange {
    Limited,
    Full,
}

/// Every knob the pipeline recognizes, per spec §4.17's table. Fields not
/// meaningful for a given `encoder_type`/`hw_encoder_type` pair are ignored
/// rather than rejected.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub input_format: PixelFormat,
    pub encoder_type: EncoderType,
    pub hw_encoder_type: HwEncoderType,
    pub codec_id: CodecId,
    pub rate_control: RateControl,
    pub bitrate: u32,
    pub max_bitrate: u32,
    pub crf: u32,
    pub qp: u32,
    pub preset: EncoderPreset,
    pub profile: EncoderProfile,
    pub gop_size: u32,
    pub max_b_frames: u32,
    pub zero_latency: bool,
    pub thread_count: u32,
    pub colorspace: &'static str,
    pub color_primaries: &'static str,
    pub color_trc: &'static str,
    pub color_range: ColorRange,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            framerate: 30,
            input_format: PixelFormat::Bgra32,
            encoder_type: EncoderType::Hardware,
            hw_encoder_type: HwEncoderType::None,
            codec_id: CodecId::H264,
            rate_control: RateControl::Vbr,
            bitrate: 4_000_000,
            max_bitrate: 8_000_000,
            crf: 23,
            qp: 26,
            preset: EncoderPreset::LowLatency,
            profile: EncoderProfile::Baseline,
            gop_size: 60,
            max_b_frames: 0,
            zero_latency: true,
            thread_count: 0,
            colorspace: "bt709",
            color_primaries: "bt709",
            color_trc: "bt709",
            color_range: ColorRange::Limited,
        }
    }
}

/// One encoded access unit. Immutable once yielded; owned by the caller.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    pub pts: i64,
    pub dts: i64,
    pub is_key_frame: bool,
    pub duration: i64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub frames_dropped: u64,
    pub bytes_encoded: u64,
    pub key_frames_encoded: u64,
    pub last_encode_time_us: u64,
}

/// Frame-in, packetized-bitstream-out, with rate-control hooks. An
/// implementation drains internally on an encoder-side EAGAIN, so a single
/// `encode` call may or may not yield a packet for the frame just pushed in
/// (B-frame reordering, encoder-side buffering).
pub trait VideoEncoder: Send {
    fn initialize(&mut self, config: EncoderConfig) -> Result<()>;
    fn shutdown(&mut self);

    fn encode(&mut self, frame: &Frame) -> Option<EncodedPacket>;

    /// Drains every packet still buffered inside the encoder, e.g. before
    /// shutdown or a codec switch.
    fn flush(&mut self) -> Vec<EncodedPacket>;

    fn force_key_frame(&mut self);
    fn update_bitrate(&mut self, bps: u32) -> Result<()>;

    fn stats(&self) -> EncoderStats;
    fn is_initialized(&self) -> bool;
    fn encoder_type(&self) -> EncoderType;
    fn encoder_name(&self) -> &str;
}
