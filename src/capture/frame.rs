//! Capture output: a borrowed-memory frame plus dirty/move-rect metadata.
//!
//! Mirrors the reference implementation's `Frame` struct: the pixel pointer
//! is only valid between `ScreenCapturer::capture_frame` and the matching
//! `release_frame`. Rather than leave "call release before the next
//! capture" as a convention, the guard here owns the release call in its
//! `Drop` impl, so the invariant is enforced by the type system.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgra32,
    Rgba32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// A screen region that changed since the previous captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DirtyRect {
    pub fn full_screen(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A region that moved from `src` to `dst` between two frames (e.g. a
/// dragged window), letting the encoder skip re-encoding pixels it can
/// instead blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveRect {
    pub src: DirtyRect,
    pub dst: DirtyRect,
}

/// Per-frame change metadata. Dirty rects are deduplicated against the
/// full-screen rectangle when the capture back-end has no finer-grained
/// information (e.g. first frame after start, or after an access-loss
/// re-acquire).
#[derive(Debug, Clone, Default)]
pub struct FrameMetadata {
    pub dirty_rects: Vec<DirtyRect>,
    pub move_rects: Vec<MoveRect>,
    pub is_key_frame: bool,
    pub skipped_frames: u32,
    pub dirty_ratio: f32,
}

impl FrameMetadata {
    pub fn full_screen(width: u32, height: u32, is_key_frame: bool) -> Self {
        Self {
            dirty_rects: vec![DirtyRect::full_screen(width, height)],
            move_rects: Vec::new(),
            is_key_frame,
            skipped_frames: 0,
            dirty_ratio: 1.0,
        }
    }

    /// Folds `rects` into this metadata's dirty-rect list, dropping any
    /// rect already covered by the full-screen rectangle so a capturer
    /// that has no per-rect change information doesn't double-count.
    pub fn merge_dirty_rects(&mut self, rects: &[DirtyRect], screen_width: u32, screen_height: u32) {
        let full = DirtyRect::full_screen(screen_width, screen_height);
        if self.dirty_rects.contains(&full) {
            return;
        }
        for r in rects {
            if *r != full && !self.dirty_rects.contains(r) {
                self.dirty_rects.push(*r);
            }
        }
    }
}

/// Backing storage for a captured frame's pixels. Capture back-ends that
/// own GPU-visible memory (e.g. an XShm segment) hand out a borrow scoped
/// to the guard's lifetime; back-ends with no natural lease (e.g. a plain
/// `XGetImage` copy) own a private buffer instead.
pub(crate) enum PixelSource {
    Owned(Vec<u8>),
}

/// A captured frame. `data()` is only valid for the lifetime of this guard;
/// dropping it (or calling `release()` explicitly) returns the frame to the
/// capturer so it may reuse the backing memory for the next capture.
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub pixel_format: PixelFormat,
    pub metadata: FrameMetadata,
    pub(crate) source: PixelSource,
    pub(crate) release: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        stride: usize,
        pixel_format: PixelFormat,
        data: Vec<u8>,
        metadata: FrameMetadata,
    ) -> Self {
        Self {
            width,
            height,
            stride,
            pixel_format,
            metadata,
            source: PixelSource::Owned(data),
            release: None,
        }
    }

    /// Borrowed pixel memory. Valid until this `Frame` is dropped.
    pub fn data(&self) -> &[u8] {
        match &self.source {
            PixelSource::Owned(v) => v,
        }
    }

    /// Explicitly release the frame's backing memory before the guard would
    /// otherwise drop, matching the reference API's `release_frame()` call
    /// site. Idempotent.
    pub fn release(&mut self) {
        if let Some(cb) = self.release.take() {
            cb();
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("pixel_format", &self.pixel_format)
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameStats {
    pub total_frames: u64,
    pub total_bytes: u64,
    pub total_capture_time_us: u64,
    pub last_capture_time_us: u64,
}

impl FrameStats {
    pub fn record_capture(&mut self, bytes: usize, time_us: u64) {
        self.total_frames += 1;
        self.total_bytes += bytes as u64;
        self.last_capture_time_us = time_us;
        self.total_capture_time_us += time_us;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn dropping_frame_invokes_release() {
        let released = Arc::new(AtomicBool::new(false));
        let released2 = released.clone();
        let mut frame = Frame::new(
            4,
            4,
            16,
            PixelFormat::Bgra32,
            vec![0u8; 64],
            FrameMetadata::full_screen(4, 4, true),
        );
        frame.release = Some(Arc::new(move || {
            released2.store(true, Ordering::SeqCst);
        }));
        drop(frame);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn merge_dedups_against_full_screen() {
        let mut meta = FrameMetadata::full_screen(1920, 1080, true);
        meta.merge_dirty_rects(
            &[DirtyRect {
                x: 0,
                y: 0,
                width: 100,
                height: 100,
            }],
            1920,
            1080,
        );
        assert_eq!(meta.dirty_rects.len(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = calls.clone();
        let mut frame = Frame::new(
            1,
            1,
            4,
            PixelFormat::Rgba32,
            vec![0u8; 4],
            FrameMetadata::default(),
        );
        frame.release = Some(Arc::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        frame.release();
        frame.release();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
