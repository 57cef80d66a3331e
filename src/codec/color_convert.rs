//! CPU pixel-format/resize adapter sitting between capture and encoder.
//!
//! Grounded on the donor's `convert_raw_to_rgb`-style manual pixel-shuffling
//! in `src/capture/xshm.rs`: no external image-processing crate, just
//! straight-line byte reordering, matching the donor's own capture-side
//! conversion idiom.

use crate::capture::{Frame, FrameMetadata, PixelFormat};

/// Swaps BGRA<->RGBA channel order and performs simple box-filter or
/// nearest-neighbor resizing ahead of an encoder that expects a fixed
/// `(width, height, format)` triple.
pub struct ColorConverter {
    target_format: PixelFormat,
    target_width: u32,
    target_height: u32,
    scratch: Vec<u8>,
}

impl ColorConverter {
    pub fn new(target_format: PixelFormat, target_width: u32, target_height: u32) -> Self {
        Self {
            target_format,
            target_width,
            target_height,
            scratch: Vec::new(),
        }
    }

    pub fn target_format(&self) -> PixelFormat {
        self.target_format
    }

    pub fn set_target_resolution(&mut self, width: u32, height: u32) {
        self.target_width = width;
        self.target_height = height;
    }

    /// Converts (and, if the source resolution differs, nearest-neighbor
    /// resizes) `frame` into a new owned `Frame` in the target format and
    /// resolution. Returns the input unchanged (cloned) when no conversion
    /// is needed.
    pub fn convert(&mut self, frame: &Frame) -> Frame {
        let needs_format_swap = frame.pixel_format != self.target_format;
        let needs_resize = frame.width != self.target_width || frame.height != self.target_height;

        if !needs_format_swap && !needs_resize {
            return Frame::new(
                frame.width,
                frame.height,
                frame.stride,
                frame.pixel_format,
                frame.data().to_vec(),
                frame.metadata.clone(),
            );
        }

        let src = if needs_resize {
            self.resize_nearest(frame)
        } else {
            frame.data().to_vec()
        };

        let out_width = if needs_resize { self.target_width } else { frame.width };
        let out_height = if needs_resize { self.target_height } else { frame.height };
        let out_stride = out_width as usize * self.target_format.bytes_per_pixel();

        let converted = if needs_format_swap {
            self.swap_channels(&src)
        } else {
            src
        };

        Frame::new(
            out_width,
            out_height,
            out_stride,
            self.target_format,
            converted,
            FrameMetadata::full_screen(out_width, out_height, frame.metadata.is_key_frame),
        )
    }

    fn swap_channels(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for px in data.chunks_exact(4) {
            out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
        out
    }

    fn resize_nearest(&mut self, frame: &Frame) -> Vec<u8> {
        let bpp = frame.pixel_format.bytes_per_pixel();
        let src = frame.data();
        self.scratch.clear();
        self.scratch
            .resize(self.target_width as usize * self.target_height as usize * bpp, 0);

        for y in 0..self.target_height {
            let src_y = (y as u64 * frame.height as u64 / self.target_height.max(1) as u64) as u32;
            for x in 0..self.target_width {
                let src_x = (x as u64 * frame.width as u64 / self.target_width.max(1) as u64) as u32;
                let src_offset = src_y as usize * frame.stride + src_x as usize * bpp;
                let dst_offset = (y as usize * self.target_width as usize + x as usize) * bpp;
                if src_offset + bpp <= src.len() {
                    self.scratch[dst_offset..dst_offset + bpp].copy_from_slice(&src[src_offset..src_offset + bpp]);
                }
            }
        }
        self.scratch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameMetadata;

    fn solid_frame(width: u32, height: u32, format: PixelFormat, px: [u8; 4]) -> Frame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&px);
        }
        Frame::new(width, height, (width * 4) as usize, format, data, FrameMetadata::full_screen(width, height, true))
    }

    #[test]
    fn no_op_when_format_and_resolution_match() {
        let mut conv = ColorConverter::new(PixelFormat::Bgra32, 4, 4);
        let frame = solid_frame(4, 4, PixelFormat::Bgra32, [1, 2, 3, 4]);
        let out = conv.convert(&frame);
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn swaps_bgra_to_rgba_channel_order() {
        let mut conv = ColorConverter::new(PixelFormat::Rgba32, 2, 2);
        let frame = solid_frame(2, 2, PixelFormat::Bgra32, [10, 20, 30, 255]);
        let out = conv.convert(&frame);
        assert_eq!(&out.data()[0..4], &[30, 20, 10, 255]);
    }

    #[test]
    fn resizes_to_target_resolution() {
        let mut conv = ColorConverter::new(PixelFormat::Bgra32, 2, 2);
        let frame = solid_frame(4, 4, PixelFormat::Bgra32, [5, 6, 7, 8]);
        let out = conv.convert(&frame);
        assert_eq!(out.width, 2);
        assert_eq!(out.height, 2);
        assert_eq!(out.data().len(), 2 * 2 * 4);
    }
}
