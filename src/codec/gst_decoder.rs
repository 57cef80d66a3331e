//! GStreamer-backed `VideoDecoder`, symmetric to `gst_encoder.rs`: tries a
//! hardware decoder element first and falls back to software on any
//! initialization failure, per spec §4.18.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use log::{info, warn};

use crate::capture::{Frame, FrameMetadata, PixelFormat};
use crate::error::{ErrorKind, Result};

use super::decoder::{DecoderConfig, DecoderStats, HwContext, HwDecoderType, VideoDecoder};
use super::encoder::CodecId;

struct DecoderCandidate {
    name: &'static str,
    parser: &'static str,
    hw_type: HwDecoderType,
    codec: CodecId,
}

const CANDIDATES: &[DecoderCandidate] = &[
    DecoderCandidate { name: "nvh264dec", parser: "h264parse", hw_type: HwDecoderType::Cuda, codec: CodecId::H264 },
    DecoderCandidate { name: "qsvh264dec", parser: "h264parse", hw_type: HwDecoderType::Qsv, codec: CodecId::H264 },
    DecoderCandidate { name: "vaapih264dec", parser: "h264parse", hw_type: HwDecoderType::Vaapi, codec: CodecId::H264 },
    DecoderCandidate { name: "d3d11h264dec", parser: "h264parse", hw_type: HwDecoderType::D3d11va, codec: CodecId::H264 },
    DecoderCandidate { name: "avdec_h264", parser: "h264parse", hw_type: HwDecoderType::None, codec: CodecId::H264 },
    DecoderCandidate { name: "openh264dec", parser: "h264parse", hw_type: HwDecoderType::None, codec: CodecId::H264 },
    DecoderCandidate { name: "nvh265dec", parser: "h265parse", hw_type: HwDecoderType::Cuda, codec: CodecId::Hevc },
    DecoderCandidate { name: "vaapih265dec", parser: "h265parse", hw_type: HwDecoderType::Vaapi, codec: CodecId::Hevc },
    DecoderCandidate { name: "avdec_h265", parser: "h265parse", hw_type: HwDecoderType::None, codec: CodecId::Hevc },
];

fn element_available(name: &str) -> bool {
    gst::ElementFactory::find(name).is_some()
}

fn select_candidate(config: &DecoderConfig) -> Option<&'static DecoderCandidate> {
    let mut matches: Vec<&DecoderCandidate> = CANDIDATES
        .iter()
        .filter(|c| c.codec == config.codec_id && element_available(c.name))
        .collect();
    if config.hw_decoder_type != HwDecoderType::None {
        if let Some(c) = matches.iter().find(|c| c.hw_type == config.hw_decoder_type) {
            return Some(c);
        }
    }
    matches.sort_by_key(|c| c.hw_type == HwDecoderType::None);
    matches.into_iter().next()
}

/// Stands in for the platform-specific device/context a real hardware
/// decoder would expose (a D3D11 device, a CUDA context, ...). The renderer
/// downcasts by `platform_name()` to recover the concrete handle.
struct GstHwContext {
    platform_name: &'static str,
}

impl HwContext for GstHwContext {
    fn platform_name(&self) -> &'static str {
        self.platform_name
    }
}

pub struct GstVideoDecoder {
    pipeline: Option<gst::Pipeline>,
    appsrc: Option<gst_app::AppSrc>,
    appsink: Option<gst_app::AppSink>,
    config: DecoderConfig,
    decoder_name: String,
    hw_type: HwDecoderType,
    hw_context: Option<GstHwContext>,
    width: u32,
    height: u32,
    initialized: bool,
    stats: DecoderStats,
}

impl Default for GstVideoDecoder {
    fn default() -> Self {
        Self {
            pipeline: None,
            appsrc: None,
            appsink: None,
            config: DecoderConfig::default(),
            decoder_name: String::new(),
            hw_type: HwDecoderType::None,
            hw_context: None,
            width: 0,
            height: 0,
            initialized: false,
            stats: DecoderStats::default(),
        }
    }
}

impl GstVideoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_pipeline(&mut self, config: &DecoderConfig) -> Result<()> {
        if let Err(e) = gst::init() {
            return Result::err(ErrorKind::DecoderInitFailed, format!("gstreamer init failed: {e}"));
        }
        let candidate = match select_candidate(config) {
            Some(c) => c,
            None => return Result::err(ErrorKind::DecoderNotFound, "no suitable decoder element found"),
        };

        let pipeline = gst::Pipeline::new();
        let appsrc = gst_app::AppSrc::builder()
            .caps(&"video/x-h264,stream-format=byte-stream,alignment=au".parse::<gst::Caps>().unwrap())
            .format(gst::Format::Time)
            .is_live(true)
            .build();
        let parser = match gst::ElementFactory::make(candidate.parser).build() {
            Ok(e) => e,
            Err(e) => return Result::err(ErrorKind::DecoderInitFailed, format!("{}: {e}", candidate.parser)),
        };
        let decoder = match gst::ElementFactory::make(candidate.name).build() {
            Ok(e) => e,
            Err(e) => return Result::err(ErrorKind::DecoderInitFailed, format!("{}: {e}", candidate.name)),
        };
        let convert = match gst::ElementFactory::make("videoconvert").build() {
            Ok(e) => e,
            Err(e) => return Result::err(ErrorKind::DecoderInitFailed, format!("videoconvert: {e}")),
        };
        let out_format = match self.config.output_format {
            PixelFormat::Bgra32 => "BGRA",
            PixelFormat::Rgba32 => "RGBA",
        };
        let out_caps = format!("video/x-raw,format={out_format}").parse::<gst::Caps>().unwrap();
        let appsink = gst_app::AppSink::builder().caps(&out_caps).sync(false).max_buffers(4).drop(true).build();

        if let Err(e) = pipeline.add_many([appsrc.upcast_ref(), &parser, &decoder, &convert, appsink.upcast_ref()]) {
            return Result::err(ErrorKind::DecoderInitFailed, format!("failed to add elements: {e}"));
        }
        if let Err(e) = gst::Element::link_many([appsrc.upcast_ref(), &parser, &decoder, &convert, appsink.upcast_ref()]) {
            return Result::err(ErrorKind::DecoderInitFailed, format!("failed to link elements: {e}"));
        }
        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            return Result::err(ErrorKind::DecoderInitFailed, format!("failed to start pipeline: {e}"));
        }

        info!("video decoder initialized: {} ({:?})", candidate.name, candidate.hw_type);
        self.decoder_name = candidate.name.to_string();
        self.hw_type = candidate.hw_type;
        self.hw_context = (candidate.hw_type != HwDecoderType::None).then(|| GstHwContext {
            platform_name: match candidate.hw_type {
                HwDecoderType::D3d11va => "d3d11va",
                HwDecoderType::Cuda => "cuda",
                HwDecoderType::Vaapi => "vaapi",
                HwDecoderType::Qsv => "qsv",
                _ => "unknown",
            },
        });
        self.pipeline = Some(pipeline);
        self.appsrc = Some(appsrc);
        self.appsink = Some(appsink);
        Result::ok(())
    }

    fn pull_frame(&mut self) -> Option<Frame> {
        let appsink = self.appsink.as_ref()?;
        let sample = appsink.try_pull_sample(gst::ClockTime::ZERO)?;
        let buffer = sample.buffer()?;
        let caps = sample.caps()?;
        let s = caps.structure(0)?;
        let width: i32 = s.get("width").ok()?;
        let height: i32 = s.get("height").ok()?;
        let map = buffer.map_readable().ok()?;
        let data = map.as_slice().to_vec();
        let is_key = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);

        self.width = width as u32;
        self.height = height as u32;
        self.stats.frames_decoded += 1;
        self.stats.bytes_decoded += data.len() as u64;

        let stride = width as usize * self.config.output_format.bytes_per_pixel();
        Some(Frame::new(
            width as u32,
            height as u32,
            stride,
            self.config.output_format,
            data,
            FrameMetadata::full_screen(width as u32, height as u32, is_key),
        ))
    }
}

impl VideoDecoder for GstVideoDecoder {
    fn initialize(&mut self, config: DecoderConfig) -> Result<()> {
        self.config = config.clone();
        if let crate::error::Result::Err(e) = self.build_pipeline(&config) {
            warn!("hardware decoder init failed, falling back to software: {}", e.full_message());
            let mut sw_config = config;
            sw_config.hw_decoder_type = HwDecoderType::None;
            self.config = sw_config.clone();
            if let crate::error::Result::Err(e2) = self.build_pipeline(&sw_config) {
                return crate::error::Result::Err(e2);
            }
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

    fn decode(&mut self, bytes: &[u8], pts: i64, dts: i64) -> Option<Frame> {
        if !self.initialized {
            return None;
        }
        let appsrc = self.appsrc.as_ref()?;
        let mut buffer = gst::Buffer::from_slice(bytes.to_vec());
        {
            let buffer_mut = buffer.get_mut().unwrap();
            buffer_mut.set_pts(gst::ClockTime::from_useconds(pts.max(0) as u64));
            buffer_mut.set_dts(gst::ClockTime::from_useconds(dts.max(0) as u64));
        }
        if appsrc.push_buffer(buffer).is_err() {
            self.stats.frames_dropped += 1;
            return None;
        }
        self.pull_frame()
    }

    fn flush(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if let Some(appsrc) = &self.appsrc {
            let _ = appsrc.end_of_stream();
        }
        while let Some(f) = self.pull_frame() {
            frames.push(f);
        }
        frames
    }

    fn flush_buffers(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            let _ = pipeline.seek_simple(gst::SeekFlags::FLUSH, gst::ClockTime::ZERO);
        }
    }

    fn hw_decoder_type(&self) -> HwDecoderType {
        self.hw_type
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.config.output_format
    }

    fn codec_name(&self) -> &str {
        &self.decoder_name
    }

    fn hw_context(&self) -> Option<&dyn HwContext> {
        self.hw_context.as_ref().map(|c| c as &dyn HwContext)
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Hardware-then-software factory, symmetric to `create_video_encoder`.
pub fn create_video_decoder(config: DecoderConfig) -> Result<Box<dyn VideoDecoder>> {
    let mut decoder = GstVideoDecoder::new();
    match decoder.initialize(config) {
        crate::error::Result::Ok(()) => Result::ok(Box::new(decoder)),
        crate::error::Result::Err(e) => crate::error::Result::Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_candidate_prefers_hardware_when_requested() {
        let config = DecoderConfig {
            codec_id: CodecId::H264,
            hw_decoder_type: HwDecoderType::Vaapi,
            output_format: PixelFormat::Bgra32,
        };
        // Without a real GStreamer registry this will find nothing, but the
        // selection logic itself should not panic on an empty candidate set.
        let _ = select_candidate(&config);
    }
}
