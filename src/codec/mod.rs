//! Encode/decode contracts plus a GStreamer hardware/software factory for
//! each, and the CPU color-conversion adapter that sits between capture and
//! encode.

pub mod color_convert;
pub mod decoder;
pub mod encoder;

#[cfg(feature = "gstreamer-codec")]
pub mod gst_decoder;
#[cfg(feature = "gstreamer-codec")]
pub mod gst_encoder;

pub use color_convert::ColorConverter;
pub use decoder::{DecoderConfig, DecoderStats, HwContext, HwDecoderType, VideoDecoder};
pub use encoder::{
    CodecId, ColorRange, EncodedPacket, EncoderConfig, EncoderPreset, EncoderProfile, EncoderStats,
    EncoderType, HwEncoderType, RateControl, VideoEncoder,
};

#[cfg(feature = "gstreamer-codec")]
pub use gst_decoder::{create_video_decoder, GstVideoDecoder};
#[cfg(feature = "gstreamer-codec")]
pub use gst_encoder::{create_video_encoder, GstVideoEncoder};
