//! Text state and glyph compositing.
//!
//! Glyph rasterization belongs to the Renderer; the engine only keeps
//! the font/color/background state and composites whatever raster the
//! backend returns.  With a backend that cannot draw text (headless),
//! `text_write` is a no-op.

use super::{GfxState, Rgb};
use crate::error::EngineError;
use crate::renderer::RasterImage;

#[derive(Debug, Clone)]
pub struct TextState {
    pub color: Rgb,
    pub bg: Rgb,
    /// 0 = transparent background, 1 = opaque fill behind the text.
    pub back_mode: i64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            color: Rgb::BLACK,
            bg: Rgb::WHITE,
            back_mode: 0,
        }
    }
}

impl GfxState {
    /// Composite a rasterized string at `(x, y)` on `pic`, honoring the
    /// current background mode.
    pub fn composite_text(
        &mut self,
        pic: i64,
        x: i64,
        y: i64,
        img: &RasterImage,
    ) -> Result<(), EngineError> {
        let text = self.text.clone();
        let p = self.picture_mut(pic)?;
        p.paint(|buf, w, h| {
            if text.back_mode == 1 {
                super::compositor::fill_rect(
                    buf,
                    w,
                    h,
                    x,
                    y,
                    img.width as i64,
                    img.height as i64,
                    text.bg,
                );
            }
            super::compositor::blit_alpha(
                buf,
                w,
                h,
                &img.rgba,
                img.width,
                img.height,
                0,
                0,
                img.width as i64,
                img.height as i64,
                x,
                y,
            );
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    /// A 2x1 raster: left pixel opaque red, right pixel transparent.
    fn glyph() -> RasterImage {
        RasterImage {
            width: 2,
            height: 1,
            rgba: vec![255, 0, 0, 255, 0, 0, 0, 0],
        }
    }

    #[test]
    fn transparent_mode_leaves_the_background() {
        let mut gfx = GfxState::new();
        let pic = gfx.create_picture(8, 8);
        gfx.composite_text(pic, 1, 1, &glyph()).unwrap();
        assert_eq!(gfx.color_at(pic, 1, 1).unwrap(), RED.packed());
        assert_eq!(gfx.color_at(pic, 2, 1).unwrap(), Rgb::WHITE.packed());
    }

    #[test]
    fn opaque_mode_fills_behind_the_text() {
        let mut gfx = GfxState::new();
        let pic = gfx.create_picture(8, 8);
        gfx.text.back_mode = 1;
        gfx.text.bg = Rgb::BLACK;
        gfx.composite_text(pic, 1, 1, &glyph()).unwrap();
        assert_eq!(gfx.color_at(pic, 1, 1).unwrap(), RED.packed());
        assert_eq!(gfx.color_at(pic, 2, 1).unwrap(), Rgb::BLACK.packed());
    }
}
