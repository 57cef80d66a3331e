//! Screen capture: the `ScreenCapturer` contract plus an X11/XShm backend.

pub mod frame;
pub mod xshm;

pub use frame::{DirtyRect, Frame, FrameMetadata, FrameStats, MoveRect, PixelFormat};
pub use xshm::X11Capturer;

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    pub output_index: u32,
    pub target_fps: u32,
    pub enable_dirty_rect: bool,
    pub enable_move_rect: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_index: 0,
            target_fps: 30,
            enable_dirty_rect: true,
            enable_move_rect: false,
        }
    }
}

/// Produces a lazy sequence of frames from the primary display.
///
/// `capture_frame` is non-blocking: it returns `None` when no new frame is
/// ready rather than waiting for one. The caller must consume or drop the
/// returned `Frame` (which releases its borrowed memory on `Drop`) before
/// requesting the next one — a capturer is free to reuse the same backing
/// buffer across calls.
pub trait ScreenCapturer: Send {
    fn initialize(&mut self, config: CaptureConfig) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;

    /// Returns the next frame if one is ready. The first frame produced
    /// after `start()` (and the first frame after any access-loss
    /// re-acquire) is always a key frame.
    fn capture_frame(&mut self) -> Option<Frame>;

    /// Forces the next captured frame to carry `is_key_frame = true`, a
    /// full dirty rect, and a cleared skipped-frame counter.
    fn force_key_frame(&mut self);

    fn resolution(&self) -> (u32, u32);
    fn pixel_format(&self) -> PixelFormat;
    fn current_fps(&self) -> f32;
    fn is_initialized(&self) -> bool;
    fn stats(&self) -> FrameStats;
}
