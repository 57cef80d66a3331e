//! X11/XShm screen capture back-end.
//!
//! Captures via the XShm extension when the server supports it, falling back
//! to a plain `GetImage` round trip otherwise. Dirty/move-rect detection is
//! not available from either X11 path, so every captured frame reports a
//! full-screen dirty rect; the first frame after `start()` and the first
//! frame after an access-loss re-acquire are marked as key frames per
//! `ScreenCapturer::capture_frame`'s contract.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, warn};
use x11rb::connection::Connection as XConnection;
use x11rb::protocol::shm;
use x11rb::protocol::xproto::*;
use x11rb::xcb_ffi::XCBConnection;

use crate::capture::frame::{DirtyRect, Frame, FrameMetadata, FrameStats, PixelFormat};
use crate::capture::{CaptureConfig, ScreenCapturer};
use crate::error::{ErrorKind, Result};

const BYTE_ORDER_LSB_FIRST: u8 = 0;

/// `ScreenCapturer` implementation backed by X11's core protocol and the
/// XShm extension.
pub struct X11Capturer {
    conn: Arc<XCBConnection>,
    root: Window,
    width: u32,
    height: u32,
    depth: u8,
    byte_order: u8,
    bytes_per_pixel: usize,
    bytes_per_line: usize,

    use_shm: bool,
    shmseg: u32,
    shmid: i32,
    shmaddr: *mut u8,
    shm_size: usize,

    config: CaptureConfig,
    initialized: bool,
    running: bool,
    force_key_frame: bool,
    needs_reacquire: bool,

    sequence: AtomicU64,
    stats: Mutex<FrameStats>,
    started_at: Mutex<Option<Instant>>,
    frame_count: AtomicU64,
    fps: Mutex<f32>,
}

// SAFETY: `shmaddr` is only dereferenced from the thread that owns this
// capturer, and the capturer is only ever accessed from one thread at a
// time by contract with `ScreenCapturer: Send`.
unsafe impl Send for X11Capturer {}

impl X11Capturer {
    pub fn new(conn: Arc<XCBConnection>, screen_num: i32) -> Self {
        let screen = &conn.setup().roots[screen_num as usize];
        let root = screen.root;
        let width = screen.width_in_pixels as u32;
        let height = screen.height_in_pixels as u32;
        let depth = screen.root_depth;
        let byte_order = u8::from(conn.setup().image_byte_order);
        let (bytes_per_pixel, bytes_per_line) = compute_format(conn.as_ref(), width, depth);

        let mut capturer = Self {
            conn,
            root,
            width,
            height,
            depth,
            byte_order,
            bytes_per_pixel,
            bytes_per_line,
            use_shm: false,
            shmseg: 0,
            shmid: -1,
            shmaddr: std::ptr::null_mut(),
            shm_size: 0,
            config: CaptureConfig::default(),
            initialized: false,
            running: false,
            force_key_frame: false,
            needs_reacquire: false,
            sequence: AtomicU64::new(0),
            stats: Mutex::new(FrameStats::default()),
            started_at: Mutex::new(None),
            frame_count: AtomicU64::new(0),
            fps: Mutex::new(0.0),
        };

        capturer.try_init_shm();
        capturer
    }

    fn try_init_shm(&mut self) {
        let shm_query = shm::query_version(self.conn.as_ref());
        if shm_query.is_err() || shm_query.unwrap().reply().is_err() {
            debug!("XShm not available, falling back to GetImage");
            return;
        }

        let shmseg = match self.conn.generate_id() {
            Ok(id) => id,
            Err(_) => return,
        };

        let size = self.bytes_per_line * self.height as usize;
        let shmid = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | 0o600) };
        if shmid < 0 {
            return;
        }

        let shmaddr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
        if shmaddr as isize == -1 {
            unsafe {
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return;
        }

        if shm::attach(self.conn.as_ref(), shmseg, shmid as u32, false).is_err() {
            unsafe {
                libc::shmdt(shmaddr);
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return;
        }
        let _ = self.conn.flush();

        self.use_shm = true;
        self.shmseg = shmseg;
        self.shmid = shmid;
        self.shmaddr = shmaddr as *mut u8;
        self.shm_size = size;
        debug!("using XShm capture path");
    }

    fn effective_height(&self, data_len: usize) -> u32 {
        let max_rows = data_len / self.bytes_per_line.max(1);
        let height = max_rows.min(self.height as usize) as u32;
        if height != self.height {
            debug!("truncated frame: expected {} rows, got {height} rows", self.height);
        }
        height
    }

    /// Converts the server's native pixel layout into tightly packed BGRA32,
    /// padding absent channels (no alpha on a depth-24 root, mid bits on a
    /// 16-bit server) so downstream consumers see one uniform format.
    fn convert_to_bgra32(&self, src: &[u8], height: u32) -> Vec<u8> {
        let mut dst = vec![0u8; (self.width * height * 4) as usize];

        match self.depth {
            24 | 32 => {
                for y in 0..height {
                    for x in 0..self.width {
                        let soff = y as usize * self.bytes_per_line + x as usize * self.bytes_per_pixel;
                        let doff = (y as usize * self.width as usize + x as usize) * 4;
                        if soff + 3 >= src.len() {
                            continue;
                        }
                        let (b, g, r) = if self.byte_order == BYTE_ORDER_LSB_FIRST {
                            (src[soff], src[soff + 1], src[soff + 2])
                        } else {
                            (src[soff + 2], src[soff + 1], src[soff])
                        };
                        dst[doff] = b;
                        dst[doff + 1] = g;
                        dst[doff + 2] = r;
                        dst[doff + 3] = 0xFF;
                    }
                }
            }
            16 => {
                for y in 0..height {
                    for x in 0..self.width {
                        let soff = y as usize * self.bytes_per_line + x as usize * self.bytes_per_pixel;
                        let doff = (y as usize * self.width as usize + x as usize) * 4;
                        if soff + 1 >= src.len() {
                            continue;
                        }
                        let pixel = u16::from_le_bytes([src[soff], src[soff + 1]]);
                        let r = ((pixel >> 11) & 0x1F) << 3;
                        let g = ((pixel >> 5) & 0x3F) << 2;
                        let b = (pixel & 0x1F) << 3;
                        dst[doff] = b as u8;
                        dst[doff + 1] = g as u8;
                        dst[doff + 2] = r as u8;
                        dst[doff + 3] = 0xFF;
                    }
                }
            }
            other => {
                warn!("unsupported root depth {other}, emitting black frame");
            }
        }

        dst
    }

    fn grab_raw(&mut self) -> Result<(Vec<u8>, u32)> {
        if self.use_shm {
            let format = u8::from(ImageFormat::Z_PIXMAP);
            let cookie = match shm::get_image(
                self.conn.as_ref(),
                self.root,
                0,
                0,
                self.width as u16,
                self.height as u16,
                u32::MAX,
                format,
                self.shmseg,
                0,
            ) {
                Ok(c) => c,
                Err(e) => {
                    return Result::err(ErrorKind::IoError, format!("shm get_image request failed: {e}"))
                }
            };
            if let Err(e) = cookie.reply() {
                return Result::err(ErrorKind::IoError, format!("shm get_image reply failed: {e}"));
            }
            let src = unsafe { std::slice::from_raw_parts(self.shmaddr as *const u8, self.shm_size) };
            let height = self.effective_height(src.len());
            Result::ok((self.convert_to_bgra32(src, height), height))
        } else {
            let reply = self
                .conn
                .get_image(ImageFormat::Z_PIXMAP, self.root, 0, 0, self.width as u16, self.height as u16, u32::MAX);
            let cookie = match reply {
                Ok(c) => c,
                Err(e) => return Result::err(ErrorKind::IoError, format!("get_image request failed: {e}")),
            };
            let image = match cookie.reply() {
                Ok(i) => i,
                Err(e) => return Result::err(ErrorKind::IoError, format!("get_image reply failed: {e}")),
            };
            let height = self.effective_height(image.data.len());
            Result::ok((self.convert_to_bgra32(&image.data, height), height))
        }
    }
}

impl ScreenCapturer for X11Capturer {
    fn initialize(&mut self, config: CaptureConfig) -> Result<()> {
        self.config = config;
        self.initialized = true;
        Result::ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Result::err(ErrorKind::InvalidState, "capturer not initialized");
        }
        self.running = true;
        self.force_key_frame = true;
        self.needs_reacquire = false;
        *self.started_at.lock().unwrap() = Some(Instant::now());
        self.frame_count.store(0, Ordering::SeqCst);
        Result::ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        *self.started_at.lock().unwrap() = None;
        Result::ok(())
    }

    fn capture_frame(&mut self) -> Option<Frame> {
        if !self.running {
            return None;
        }

        let start = Instant::now();
        let (data, height) = match self.grab_raw() {
            Result::Ok(r) => {
                self.needs_reacquire = false;
                r
            }
            Result::Err(e) => {
                warn!("capture failed, will re-acquire on next attempt: {e}");
                self.needs_reacquire = true;
                return None;
            }
        };

        let is_key_frame = self.force_key_frame || self.needs_reacquire;
        self.force_key_frame = false;

        let stride = self.width as usize * 4;
        let mut metadata = FrameMetadata::full_screen(self.width, height, is_key_frame);
        if !self.config.enable_dirty_rect {
            metadata.dirty_rects = vec![DirtyRect::full_screen(self.width, height)];
        }

        let capture_time_us = start.elapsed().as_micros() as u64;
        self.stats.lock().unwrap().record_capture(data.len(), capture_time_us);
        self.sequence.fetch_add(1, Ordering::SeqCst);

        let count = self.frame_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(started) = *self.started_at.lock().unwrap() {
            let elapsed = started.elapsed().as_secs_f32();
            if elapsed > 0.0 {
                *self.fps.lock().unwrap() = count as f32 / elapsed;
            }
        }

        Some(Frame::new(self.width, height, stride, PixelFormat::Bgra32, data, metadata))
    }

    fn force_key_frame(&mut self) {
        self.force_key_frame = true;
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Bgra32
    }

    fn current_fps(&self) -> f32 {
        *self.fps.lock().unwrap()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn stats(&self) -> FrameStats {
        *self.stats.lock().unwrap()
    }
}

impl Drop for X11Capturer {
    fn drop(&mut self) {
        if self.use_shm && !self.shmaddr.is_null() {
            unsafe {
                let _ = shm::detach(self.conn.as_ref(), self.shmseg);
                libc::shmdt(self.shmaddr as *mut _);
                libc::shmctl(self.shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
        }
    }
}

fn compute_format(conn: &XCBConnection, width: u32, depth: u8) -> (usize, usize) {
    let mut bytes_per_pixel = 4usize;
    let mut bytes_per_line = width as usize * bytes_per_pixel;
    for format in &conn.setup().pixmap_formats {
        if format.depth == depth {
            let bpp = format.bits_per_pixel as usize;
            let pad = format.scanline_pad as usize;
            bytes_per_pixel = (bpp / 8).max(1);
            let bits_per_line = width as usize * bpp;
            let padded_bits = (bits_per_line + pad - 1) / pad * pad;
            bytes_per_line = padded_bits / 8;
            return (bytes_per_pixel, bytes_per_line);
        }
    }
    (bytes_per_pixel, bytes_per_line)
}

#[cfg(test)]
mod tests {
    #[test]
    fn scanline_padding_rounds_up_to_pad_boundary() {
        // compute_format's padding arithmetic, exercised without a live
        // X server connection.
        let width = 1920usize;
        let bpp = 32usize;
        let pad = 32usize;
        let bits_per_line = width * bpp;
        let padded_bits = (bits_per_line + pad - 1) / pad * pad;
        assert_eq!(padded_bits / 8, width * 4);
    }
}
