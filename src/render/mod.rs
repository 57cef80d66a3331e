//! The `VideoRenderer` contract plus a portable SDL2 back-end and a
//! Windows-only zero-copy Direct3D 11 back-end.

#[cfg(feature = "software-renderer")]
pub mod software;

#[cfg(windows)]
pub mod d3d11;

#[cfg(feature = "software-renderer")]
pub use software::SoftwareRenderer;

#[cfg(windows)]
pub use d3d11::D3d11Renderer;

use crate::capture::{Frame, PixelFormat};
use crate::codec::HwContext;
use crate::error::Result;

/// A native window handle, opaque to this crate. On Windows this wraps an
/// `HWND`; elsewhere whatever handle the windowing toolkit hands back
/// (e.g. an SDL2 window pointer).
pub struct WindowHandle(pub *mut std::ffi::c_void);

// SAFETY: the handle is an opaque identifier handed to the platform
// windowing/graphics API, never dereferenced by this crate directly.
unsafe impl Send for WindowHandle {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererType {
    Software,
    D3d11,
}

pub struct RendererConfig<'a> {
    pub window: WindowHandle,
    pub width: u32,
    pub height: u32,
    pub input_format: PixelFormat,
    pub vsync: bool,
    /// Supplies the hardware decoder's device/context for a zero-copy path.
    /// Ignored by back-ends that cannot use it.
    pub hw_context: Option<&'a dyn HwContext>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RenderStats {
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    pub avg_render_time_us: u64,
    pub fps: f32,
}

/// Consumes a frame and presents it on a window. Two concrete back-ends:
/// [`SoftwareRenderer`] (portable, texture-update, never zero-copy) and
/// (on Windows) [`D3d11Renderer`] (zero-copy from a shared D3D11 device).
pub trait VideoRenderer: Send {
    fn initialize(&mut self, config: RendererConfig) -> Result<()>;
    fn shutdown(&mut self);

    fn render(&mut self, frame: &Frame) -> Result<()>;
    fn clear(&mut self);
    fn on_resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn stats(&self) -> RenderStats;
    fn supports_zero_copy(&self) -> bool;
    fn renderer_type(&self) -> RendererType;
    fn is_initialized(&self) -> bool;
}
