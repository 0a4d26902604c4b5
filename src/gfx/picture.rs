//! Numbered RGBA raster buffers.
//!
//! Every picture has a primary buffer and a lazily allocated back
//! buffer.  The back buffer exists only for the double-buffered cast
//! redraw: `move_cast` rebuilds the composition there and swaps.

use super::compositor;
use super::{GfxState, Rgb};
use crate::assets::DecodedImage;
use crate::error::EngineError;

pub struct Picture {
    pub id: i64,
    pub width: u32,
    pub height: u32,
    /// Primary buffer, row-major RGBA8.
    pub buf: Vec<u8>,
    /// Back buffer, same dimensions once allocated.
    pub back: Option<Vec<u8>>,
}

impl Picture {
    /// Blank canvas.  Legacy scripts assume white.
    pub fn blank(id: i64, width: u32, height: u32) -> Self {
        let mut buf = vec![255u8; (width * height * 4) as usize];
        // Already white; make the alpha explicit anyway.
        for px in buf.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            id,
            width,
            height,
            buf,
            back: None,
        }
    }

    pub fn from_decoded(id: i64, img: DecodedImage) -> Self {
        Self {
            id,
            width: img.width,
            height: img.height,
            buf: img.rgba,
            back: None,
        }
    }

    /// Grow to at least `w × h`, preserving prior content (top-left
    /// anchored, new area white).  The background copy grows with it.
    pub fn ensure_size(&mut self, w: u32, h: u32) {
        if w <= self.width && h <= self.height {
            return;
        }
        let nw = w.max(self.width);
        let nh = h.max(self.height);
        let (ow, oh) = (self.width, self.height);
        let grow = |src: &[u8]| {
            let mut grown = vec![255u8; (nw * nh * 4) as usize];
            compositor::blit(
                &mut grown,
                nw,
                nh,
                src,
                ow,
                oh,
                0,
                0,
                ow as i64,
                oh as i64,
                0,
                0,
            );
            grown
        };
        self.buf = grow(&self.buf);
        self.back = self.back.as_ref().map(|b| grow(b));
        self.width = nw;
        self.height = nh;
    }

    pub fn get_pixel(&self, x: i64, y: i64) -> Option<Rgb> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        let i = ((y as u32 * self.width + x as u32) * 4) as usize;
        Some(Rgb {
            r: self.buf[i],
            g: self.buf[i + 1],
            b: self.buf[i + 2],
        })
    }

    /// Allocate the back buffer if absent, seeded from the primary.
    pub fn ensure_back(&mut self) {
        if self.back.is_none() {
            self.back = Some(self.buf.clone());
        }
    }

    /// O(1) pointer swap of primary and back buffers.
    pub fn swap_buffers(&mut self) {
        if let Some(back) = self.back.as_mut() {
            std::mem::swap(&mut self.buf, back);
        }
    }

    /// Re-seed the background copy from the primary buffer.
    pub fn refresh_back(&mut self) {
        let Picture { buf, back, .. } = self;
        if let Some(b) = back.as_mut() {
            b.copy_from_slice(buf);
        }
    }

    /// Apply a raster op to the primary buffer and, when the cast-free
    /// background exists, to it as well — non-cast content must survive
    /// cast redraws.
    pub fn paint(&mut self, op: impl Fn(&mut [u8], u32, u32)) {
        op(&mut self.buf, self.width, self.height);
        if let Some(back) = self.back.as_mut() {
            op(back, self.width, self.height);
        }
    }
}

// ── Picture operations ─────────────────────────────────────────

impl GfxState {
    pub fn create_picture(&mut self, width: u32, height: u32) -> i64 {
        let id = self.alloc_picture_id();
        self.pictures.insert(id, Picture::blank(id, width, height));
        id
    }

    pub fn insert_decoded(&mut self, img: DecodedImage) -> i64 {
        let id = self.alloc_picture_id();
        self.pictures.insert(id, Picture::from_decoded(id, img));
        id
    }

    pub fn delete_picture(&mut self, id: i64) -> Result<(), EngineError> {
        self.pictures
            .remove(&id)
            .map(|_| ())
            .ok_or(EngineError::ResourceNotFound {
                kind: "picture",
                id,
            })
    }

    pub fn picture(&self, id: i64) -> Result<&Picture, EngineError> {
        self.pictures
            .get(&id)
            .ok_or(EngineError::ResourceNotFound {
                kind: "picture",
                id,
            })
    }

    pub fn picture_mut(&mut self, id: i64) -> Result<&mut Picture, EngineError> {
        self.pictures
            .get_mut(&id)
            .ok_or(EngineError::ResourceNotFound {
                kind: "picture",
                id,
            })
    }

    /// Blit a source rectangle onto a destination picture, growing the
    /// destination if the target rectangle exceeds it.  `mode != 0`
    /// enables transparent-on-nonzero blending (black is the implied
    /// key).  Self-blit is rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn move_picture(
        &mut self,
        src: i64,
        sx: i64,
        sy: i64,
        sw: i64,
        sh: i64,
        dst: i64,
        dx: i64,
        dy: i64,
        mode: i64,
    ) -> Result<(), EngineError> {
        if src == dst {
            return Err(EngineError::CompositorError {
                detail: format!("self-blit on picture {src}"),
            });
        }
        if sw <= 0 || sh <= 0 {
            return Err(EngineError::CompositorError {
                detail: "zero-sized region".into(),
            });
        }
        if mode > 1 {
            log::warn!("move_pic: unknown mode {mode}, copying opaquely");
        }

        // Copy the source region out first; src and dst live in the same
        // map and cannot be borrowed together.
        let (region, rw, rh) = {
            let sp = self.picture(src)?;
            compositor::extract(&sp.buf, sp.width, sp.height, sx, sy, sw, sh)
        };

        let dp = self.picture_mut(dst)?;
        dp.ensure_size((dx + rw as i64).max(0) as u32, (dy + rh as i64).max(0) as u32);
        if mode == 1 {
            dp.paint(|buf, w, h| {
                compositor::blit_keyed(
                    buf, w, h, &region, rw, rh, 0, 0, rw as i64, rh as i64, dx, dy, Rgb::BLACK,
                )
            });
        } else {
            dp.paint(|buf, w, h| {
                compositor::blit(buf, w, h, &region, rw, rh, 0, 0, rw as i64, rh as i64, dx, dy)
            });
        }
        Ok(())
    }

    /// Scaled blit with optional color key (per-channel tolerance, to
    /// absorb bilinear artifacts near key pixels).
    #[allow(clippy::too_many_arguments)]
    pub fn move_scaled_picture(
        &mut self,
        src: i64,
        sx: i64,
        sy: i64,
        sw: i64,
        sh: i64,
        dst: i64,
        dx: i64,
        dy: i64,
        dw: i64,
        dh: i64,
        key: Option<Rgb>,
    ) -> Result<(), EngineError> {
        if src == dst {
            return Err(EngineError::CompositorError {
                detail: format!("self-blit on picture {src}"),
            });
        }
        if sw <= 0 || sh <= 0 || dw <= 0 || dh <= 0 {
            return Err(EngineError::CompositorError {
                detail: "zero-sized region".into(),
            });
        }

        let (region, rw, rh) = {
            let sp = self.picture(src)?;
            compositor::extract(&sp.buf, sp.width, sp.height, sx, sy, sw, sh)
        };

        let dp = self.picture_mut(dst)?;
        dp.ensure_size((dx + dw).max(0) as u32, (dy + dh).max(0) as u32);
        dp.paint(|buf, w, h| {
            compositor::blit_scaled(buf, w, h, &region, rw, rh, dx, dy, dw, dh, key)
        });
        Ok(())
    }

    /// Horizontally mirrored blit.
    #[allow(clippy::too_many_arguments)]
    pub fn reverse_picture(
        &mut self,
        src: i64,
        sx: i64,
        sy: i64,
        sw: i64,
        sh: i64,
        dst: i64,
        dx: i64,
        dy: i64,
    ) -> Result<(), EngineError> {
        if src == dst {
            return Err(EngineError::CompositorError {
                detail: format!("self-blit on picture {src}"),
            });
        }
        if sw <= 0 || sh <= 0 {
            return Err(EngineError::CompositorError {
                detail: "zero-sized region".into(),
            });
        }

        let (region, rw, rh) = {
            let sp = self.picture(src)?;
            compositor::extract(&sp.buf, sp.width, sp.height, sx, sy, sw, sh)
        };

        let dp = self.picture_mut(dst)?;
        dp.ensure_size((dx + rw as i64).max(0) as u32, (dy + rh as i64).max(0) as u32);
        dp.paint(|buf, w, h| compositor::blit_mirrored(buf, w, h, &region, rw, rh, dx, dy));
        Ok(())
    }

    pub fn color_at(&self, id: i64, x: i64, y: i64) -> Result<i64, EngineError> {
        let p = self.picture(id)?;
        p.get_pixel(x, y)
            .map(Rgb::packed)
            .ok_or(EngineError::InvalidArgument {
                op: "get_color",
                detail: format!("({x},{y}) outside {}x{}", p.width, p.height),
            })
    }
}
