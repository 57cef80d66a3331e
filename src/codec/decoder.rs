//! The `VideoDecoder` contract: packet-in, frame-out, optionally producing
//! hardware-surface handles for a zero-copy render path.

use crate::capture::{Frame, PixelFormat};
use crate::error::Result;

use super::encoder::CodecId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwDecoderType {
    D3d11va,
    Dxva2,
    Cuda,
    Vaapi,
    Vdpau,
    VideoToolbox,
    Qsv,
    /// Software decode only.
    None,
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub codec_id: CodecId,
    pub hw_decoder_type: HwDecoderType,
    /// Expected output format when decoding in software; ignored on the
    /// hardware path, where the codec library's frame pool dictates format.
    pub output_format: PixelFormat,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            codec_id: CodecId::H264,
            hw_decoder_type: HwDecoderType::None,
            output_format: PixelFormat::Bgra32,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub bytes_decoded: u64,
    pub last_decode_time_us: u64,
}

/// Opaque handle to a hardware decoder's device/context, threaded through to
/// a `VideoRenderer` for the zero-copy path (spec §4.18/§4.19). Concrete
/// contents are platform-specific; the decoder and renderer on the same
/// platform agree on the downcast.
pub trait HwContext: Send {
    fn platform_name(&self) -> &'static str;
}

/// Packet-in, frame-out, with a hardware format-selection negotiation
/// mirroring the encoder's drain-on-EAGAIN shape. `decode_packet` takes an
/// already-framed `EncodedPacket`-shaped payload; `decode` is the
/// lower-level entry point taking raw bytes plus explicit timestamps, used
/// when the caller has already stripped framing.
pub trait VideoDecoder: Send {
    fn initialize(&mut self, config: DecoderConfig) -> Result<()>;
    fn shutdown(&mut self);

    fn decode(&mut self, bytes: &[u8], pts: i64, dts: i64) -> Option<Frame>;
    fn decode_packet(&mut self, packet: &super::encoder::EncodedPacket) -> Option<Frame> {
        self.decode(&packet.data, packet.pts, packet.dts)
    }

    fn flush(&mut self) -> Vec<Frame>;
    fn flush_buffers(&mut self);

    fn hw_decoder_type(&self) -> HwDecoderType;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn pixel_format(&self) -> PixelFormat;
    fn codec_name(&self) -> &str;

    /// `Some` once a hardware path has negotiated a device/context;
    /// `None` on the software path or before negotiation completes.
    fn hw_context(&self) -> Option<&dyn HwContext>;

    fn stats(&self) -> DecoderStats;
    fn is_initialized(&self) -> bool;
}
