// Presentation capability.
//
// The engine never draws to a screen itself: `render()` snapshots the
// window list under the engine lock and hands it to a Renderer.  A
// headless engine uses `NullRenderer`.

use crate::gfx::Rgb;

/// Font request for text measurement and rasterization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontSpec {
    pub size: i64,
    pub name: String,
    pub charset: i64,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            size: 16,
            name: String::new(),
            charset: 0,
        }
    }
}

/// A rasterized string returned by `Renderer::draw_text`.
/// Alpha carries the glyph coverage; RGB is already the text color.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// One window of the frame, in z-order.  Pixels borrow the engine's
/// picture buffer for the duration of the render call.
pub struct WindowView<'a> {
    pub id: i64,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    /// Offset into the bound picture at which the window content starts.
    pub pic_x: i64,
    pub pic_y: i64,
    pub pic_width: u32,
    pub pic_height: u32,
    pub pixels: &'a [u8],
    pub caption: &'a str,
    pub bg_color: Rgb,
}

/// A frame description: the virtual desktop plus all visible windows,
/// back-to-front.
pub struct FrameSnapshot<'a> {
    pub desktop_width: u32,
    pub desktop_height: u32,
    pub windows: Vec<WindowView<'a>>,
}

pub trait Renderer: Send {
    fn render_frame(&mut self, frame: &FrameSnapshot<'_>);

    /// Pixel size of `text` in `font`, if the backend can measure it.
    fn measure_text(&self, _text: &str, _font: &FontSpec) -> Option<(u32, u32)> {
        None
    }

    /// Rasterize `text` in `font` and `color`.  `None` means the backend
    /// cannot draw text; `text_write` then becomes a no-op.
    fn draw_text(&self, _text: &str, _font: &FontSpec, _color: Rgb) -> Option<RasterImage> {
        None
    }
}

/// Renderer that discards every frame.  Used in headless mode.
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render_frame(&mut self, _frame: &FrameSnapshot<'_>) {}
}

// ── Software renderer ──────────────────────────────────────────

use std::sync::{Arc, Mutex};

use crate::gfx::{compositor, TITLE_BAR_HEIGHT};

/// The composited desktop a [`SoftwareRenderer`] produces.
pub struct DesktopFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 of the whole virtual desktop.
    pub rgba: Vec<u8>,
}

impl DesktopFrame {
    pub fn pixel(&self, x: i64, y: i64) -> Option<Rgb> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        let i = ((y as u32 * self.width + x as u32) * 4) as usize;
        Some(Rgb {
            r: self.rgba[i],
            g: self.rgba[i + 1],
            b: self.rgba[i + 2],
        })
    }
}

const CAPTION_FILL: Rgb = Rgb {
    r: 64,
    g: 64,
    b: 128,
};
const DESKTOP_FILL: Rgb = Rgb {
    r: 0,
    g: 96,
    b: 96,
};

/// Software compositor: draws every visible window (caption bar,
/// background, bound picture region) onto a desktop buffer shared with
/// the host.  The host keeps the returned handle and reads the latest
/// frame whenever it likes.
pub struct SoftwareRenderer {
    frame: Arc<Mutex<DesktopFrame>>,
}

impl SoftwareRenderer {
    pub fn new() -> (Self, Arc<Mutex<DesktopFrame>>) {
        let frame = Arc::new(Mutex::new(DesktopFrame {
            width: 0,
            height: 0,
            rgba: Vec::new(),
        }));
        (
            Self {
                frame: frame.clone(),
            },
            frame,
        )
    }
}

impl Renderer for SoftwareRenderer {
    fn render_frame(&mut self, frame: &FrameSnapshot<'_>) {
        let (dw, dh) = (frame.desktop_width, frame.desktop_height);
        let mut out = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        if out.width != dw || out.height != dh {
            out.width = dw;
            out.height = dh;
            out.rgba = vec![0u8; (dw * dh * 4) as usize];
        }
        compositor::fill_rect(&mut out.rgba, dw, dh, 0, 0, dw as i64, dh as i64, DESKTOP_FILL);

        for w in &frame.windows {
            // Caption bar, then window background, then the picture
            // region shifted by the picture offset.
            compositor::fill_rect(
                &mut out.rgba,
                dw,
                dh,
                w.x,
                w.y,
                w.width,
                TITLE_BAR_HEIGHT,
                CAPTION_FILL,
            );
            compositor::fill_rect(
                &mut out.rgba,
                dw,
                dh,
                w.x,
                w.y + TITLE_BAR_HEIGHT,
                w.width,
                w.height,
                w.bg_color,
            );
            compositor::blit(
                &mut out.rgba,
                dw,
                dh,
                w.pixels,
                w.pic_width,
                w.pic_height,
                w.pic_x,
                w.pic_y,
                w.width,
                w.height,
                w.x,
                w.y + TITLE_BAR_HEIGHT,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_frame_pixel_bounds() {
        let f = DesktopFrame {
            width: 2,
            height: 2,
            rgba: vec![255; 16],
        };
        assert_eq!(f.pixel(0, 0), Some(Rgb::WHITE));
        assert_eq!(f.pixel(2, 0), None);
        assert_eq!(f.pixel(0, -1), None);
    }

    #[test]
    fn software_renderer_composites_windows() {
        let (mut r, frame) = SoftwareRenderer::new();
        let pixels = vec![255, 0, 0, 255]; // one red pixel
        let snapshot = FrameSnapshot {
            desktop_width: 64,
            desktop_height: 64,
            windows: vec![WindowView {
                id: 0,
                x: 10,
                y: 10,
                width: 1,
                height: 1,
                pic_x: 0,
                pic_y: 0,
                pic_width: 1,
                pic_height: 1,
                pixels: &pixels,
                caption: "demo",
                bg_color: Rgb::WHITE,
            }],
        };
        r.render_frame(&snapshot);

        let f = frame.lock().unwrap();
        // Desktop backdrop outside the window.
        assert_eq!(f.pixel(0, 0), Some(DESKTOP_FILL));
        // Caption bar pixel.
        assert_eq!(f.pixel(10, 10), Some(CAPTION_FILL));
        // Picture content below the caption bar.
        assert_eq!(f.pixel(10, 10 + TITLE_BAR_HEIGHT), Some(Rgb { r: 255, g: 0, b: 0 }));
    }
}
