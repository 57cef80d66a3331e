//! Portable software renderer: an SDL2 window with a streaming texture
//! updated from CPU pixel data every frame. Supports BGRA32/RGBA32 directly
//! and accepts any input format the capture/decode side hands it, at the
//! cost of a full CPU upload per frame (never zero-copy).

use std::time::Instant;

use log::{debug, info, warn};
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};

use crate::capture::{Frame, PixelFormat};
use crate::error::{ErrorKind, Result};

use super::{RenderStats, RendererConfig, RendererType, VideoRenderer};

fn sdl_format(format: PixelFormat) -> PixelFormatEnum {
    match format {
        PixelFormat::Bgra32 => PixelFormatEnum::BGRA32,
        PixelFormat::Rgba32 => PixelFormatEnum::RGBA32,
    }
}

pub struct SoftwareRenderer {
    sdl: Option<sdl2::Sdl>,
    canvas: Option<Canvas<Window>>,
    texture_creator: Option<TextureCreator<WindowContext>>,
    texture: Option<Texture<'static>>,
    width: u32,
    height: u32,
    input_format: PixelFormat,
    initialized: bool,
    stats: RenderStats,
    last_frame_at: Option<Instant>,
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self {
            sdl: None,
            canvas: None,
            texture_creator: None,
            texture: None,
            width: 0,
            height: 0,
            input_format: PixelFormat::Bgra32,
            initialized: false,
            stats: RenderStats::default(),
            last_frame_at: None,
        }
    }
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoRenderer for SoftwareRenderer {
    fn initialize(&mut self, config: RendererConfig) -> Result<()> {
        let sdl = match sdl2::init() {
            Ok(s) => s,
            Err(e) => return Result::err(ErrorKind::RenderError, format!("sdl2 init failed: {e}")),
        };
        let video = match sdl.video() {
            Ok(v) => v,
            Err(e) => return Result::err(ErrorKind::RenderError, format!("sdl2 video subsystem failed: {e}")),
        };

        let mut builder = video.window("meridian", config.width, config.height);
        builder.position_centered();
        let window = match builder.build() {
            Ok(w) => w,
            Err(e) => return Result::err(ErrorKind::RenderError, format!("sdl2 window creation failed: {e}")),
        };

        let mut canvas_builder = window.into_canvas();
        if config.vsync {
            canvas_builder = canvas_builder.present_vsync();
        }
        let canvas = match canvas_builder.build() {
            Ok(c) => c,
            Err(e) => return Result::err(ErrorKind::RenderError, format!("sdl2 canvas creation failed: {e}")),
        };

        let texture_creator = canvas.texture_creator();
        // SAFETY: the texture never outlives `self`, which also owns
        // `texture_creator`; the 'static lifetime is erased here and
        // restored by always dropping `texture` before `texture_creator`.
        let texture_creator_static: &'static TextureCreator<WindowContext> =
            unsafe { std::mem::transmute(&texture_creator) };
        let texture = match texture_creator_static.create_texture_streaming(
            sdl_format(config.input_format),
            config.width,
            config.height,
        ) {
            Ok(t) => t,
            Err(e) => return Result::err(ErrorKind::RenderError, format!("sdl2 texture creation failed: {e}")),
        };

        info!("software renderer initialized: {}x{}", config.width, config.height);
        self.sdl = Some(sdl);
        self.canvas = Some(canvas);
        self.width = config.width;
        self.height = config.height;
        self.input_format = config.input_format;
        self.texture_creator = Some(texture_creator);
        self.texture = Some(texture);
        self.initialized = true;
        Result::ok(())
    }

    fn shutdown(&mut self) {
        self.texture = None;
        self.texture_creator = None;
        self.canvas = None;
        self.sdl = None;
        self.initialized = false;
    }

    fn render(&mut self, frame: &Frame) -> Result<()> {
        if !self.initialized {
            return Result::err(ErrorKind::NotInitialized, "renderer not initialized");
        }
        if frame.pixel_format != self.input_format {
            return Result::err(ErrorKind::UnsupportedPixelFormat, "frame format does not match renderer configuration");
        }

        let start = Instant::now();
        let Some(texture) = self.texture.as_mut() else {
            return Result::err(ErrorKind::NotInitialized, "renderer texture missing");
        };
        if let Err(e) = texture.update(None, frame.data(), frame.stride) {
            self.stats.frames_dropped += 1;
            return Result::err(ErrorKind::RenderError, format!("texture upload failed: {e}"));
        }

        let Some(canvas) = self.canvas.as_mut() else {
            return Result::err(ErrorKind::NotInitialized, "renderer canvas missing");
        };
        canvas.clear();
        if let Err(e) = canvas.copy(texture, None, None) {
            return Result::err(ErrorKind::RenderError, format!("texture blit failed: {e}"));
        }
        canvas.present();

        let elapsed_us = start.elapsed().as_micros() as u64;
        self.stats.frames_rendered += 1;
        self.stats.avg_render_time_us = (self.stats.avg_render_time_us * (self.stats.frames_rendered - 1) + elapsed_us)
            / self.stats.frames_rendered;
        if let Some(last) = self.last_frame_at {
            let delta = last.elapsed().as_secs_f32();
            if delta > 0.0 {
                self.stats.fps = 1.0 / delta;
            }
        }
        self.last_frame_at = Some(Instant::now());
        Result::ok(())
    }

    fn clear(&mut self) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.clear();
            canvas.present();
        }
    }

    fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(texture_creator) = &self.texture_creator else {
            return Result::err(ErrorKind::NotInitialized, "renderer not initialized");
        };
        let texture_creator_static: &'static TextureCreator<WindowContext> =
            unsafe { std::mem::transmute(texture_creator) };
        match texture_creator_static.create_texture_streaming(sdl_format(self.input_format), width, height) {
            Ok(t) => {
                self.texture = Some(t);
                self.width = width;
                self.height = height;
                debug!("software renderer resized to {width}x{height}");
                Result::ok(())
            }
            Err(e) => Result::err(ErrorKind::RenderError, format!("resize texture creation failed: {e}")),
        }
    }

    fn stats(&self) -> RenderStats {
        self.stats
    }

    fn supports_zero_copy(&self) -> bool {
        false
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::Software
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Drop for SoftwareRenderer {
    fn drop(&mut self) {
        if self.initialized {
            warn!("software renderer dropped without an explicit shutdown()");
        }
    }
}
