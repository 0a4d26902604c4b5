//! Sprites ("casts") and the double-buffered redraw that keeps them from
//! ghosting.
//!
//! The back buffer holds the cast-free background, captured just before
//! the first cast lands on a picture.  `put_cast` composites straight
//! onto the primary buffer; `move_cast` swaps the background in,
//! refreshes the background copy, and re-composites every visible cast
//! in creation order — so the primary always holds exactly one copy of
//! each cast on top of whatever non-cast content was drawn.

use super::compositor;
use super::{GfxState, Rgb};
use crate::error::EngineError;

pub struct Cast {
    pub id: i64,
    pub src_pic: i64,
    pub dest_pic: i64,
    pub x: i64,
    pub y: i64,
    pub src_x: i64,
    pub src_y: i64,
    pub width: i64,
    pub height: i64,
    /// −1 = opaque, else the 0xRRGGBB key.
    pub transparent: i64,
    pub visible: bool,
    /// Key-baked clip, alpha 0 on keyed pixels.  Rebaked when the clip
    /// changes; `None` while the cast is opaque.
    pub baked: Option<(Vec<u8>, u32, u32)>,
}

impl Cast {
    fn key(&self) -> Option<Rgb> {
        (self.transparent >= 0).then(|| Rgb::from_packed(self.transparent))
    }
}

impl GfxState {
    /// Create a cast and composite it immediately.  Returns the cast id.
    #[allow(clippy::too_many_arguments)]
    pub fn put_cast(
        &mut self,
        dest_pic: i64,
        src_pic: i64,
        x: i64,
        y: i64,
        src_x: i64,
        src_y: i64,
        width: i64,
        height: i64,
        transparent: i64,
    ) -> Result<i64, EngineError> {
        if width <= 0 || height <= 0 {
            return Err(EngineError::CompositorError {
                detail: "zero-sized cast".into(),
            });
        }
        self.picture(src_pic)?;

        // Capture the cast-free background before the first cast is
        // baked into the primary buffer; redraws restore from it.
        let dp = self.picture_mut(dest_pic)?;
        if dp.back.is_none() {
            dp.back = Some(dp.buf.clone());
        }

        let id = self.alloc_cast_id();
        let mut cast = Cast {
            id,
            src_pic,
            dest_pic,
            x,
            y,
            src_x,
            src_y,
            width,
            height,
            transparent,
            visible: true,
            baked: None,
        };
        self.bake(&mut cast)?;
        self.composite_cast(&cast)?;
        self.casts.insert(id, cast);
        Ok(id)
    }

    /// Move (and optionally re-clip) a cast, then rebuild the
    /// destination composition.
    pub fn move_cast(
        &mut self,
        id: i64,
        x: i64,
        y: i64,
        clip: Option<(i64, i64, i64, i64)>,
    ) -> Result<(), EngineError> {
        let cast = self
            .casts
            .get_mut(&id)
            .ok_or(EngineError::ResourceNotFound { kind: "cast", id })?;
        cast.x = x;
        cast.y = y;
        let mut rebake = false;
        if let Some((sx, sy, w, h)) = clip {
            rebake = (sx, sy, w, h) != (cast.src_x, cast.src_y, cast.width, cast.height);
            cast.src_x = sx;
            cast.src_y = sy;
            cast.width = w;
            cast.height = h;
        }
        let dest = cast.dest_pic;
        if rebake {
            let mut cast = self.casts.remove(&id).unwrap();
            let baked = self.bake(&mut cast);
            self.casts.insert(id, cast);
            baked?;
        }
        self.redraw_casts(dest)
    }

    /// Remove a cast and redraw its destination so it disappears.
    pub fn delete_cast(&mut self, id: i64) -> Result<(), EngineError> {
        let cast = self
            .casts
            .remove(&id)
            .ok_or(EngineError::ResourceNotFound { kind: "cast", id })?;
        self.redraw_casts(cast.dest_pic)
    }

    /// Double-buffered redraw: swap the background in (O(1)), refresh
    /// the background copy, then composite every visible cast bound to
    /// `dest_pic` in creation order.
    pub fn redraw_casts(&mut self, dest_pic: i64) -> Result<(), EngineError> {
        {
            let p = self.picture_mut(dest_pic)?;
            p.ensure_back();
            // Primary ← background; then re-seed the background copy.
            p.swap_buffers();
            p.refresh_back();
        }

        let ids: Vec<i64> = self
            .casts
            .values()
            .filter(|c| c.dest_pic == dest_pic && c.visible)
            .map(|c| c.id)
            .collect();

        for cid in ids {
            let cast = self.casts.remove(&cid).unwrap();
            let res = self.composite_cast(&cast);
            self.casts.insert(cid, cast);
            res?;
        }
        Ok(())
    }

    // ── Compositing helpers ────────────────────────────────────

    /// Bake the key-transparent image for a cast, if it has a key.
    fn bake(&self, cast: &mut Cast) -> Result<(), EngineError> {
        let Some(key) = cast.key() else {
            cast.baked = None;
            return Ok(());
        };
        let sp = self.picture(cast.src_pic)?;
        cast.baked = Some(compositor::bake_keyed(
            &sp.buf,
            sp.width,
            sp.height,
            cast.src_x,
            cast.src_y,
            cast.width,
            cast.height,
            key,
        ));
        Ok(())
    }

    /// Composite one cast onto its destination's primary buffer.
    fn composite_cast(&mut self, cast: &Cast) -> Result<(), EngineError> {
        if let Some((baked, bw, bh)) = cast.baked.as_ref() {
            let (bw, bh) = (*bw, *bh);
            let baked = baked.clone();
            let dp = self.picture_mut(cast.dest_pic)?;
            compositor::blit_alpha(
                &mut dp.buf,
                dp.width,
                dp.height,
                &baked,
                bw,
                bh,
                0,
                0,
                bw as i64,
                bh as i64,
                cast.x,
                cast.y,
            );
        } else {
            let (region, rw, rh) = {
                let sp = self.picture(cast.src_pic)?;
                compositor::extract(
                    &sp.buf,
                    sp.width,
                    sp.height,
                    cast.src_x,
                    cast.src_y,
                    cast.width,
                    cast.height,
                )
            };
            let dp = self.picture_mut(cast.dest_pic)?;
            compositor::blit(
                &mut dp.buf,
                dp.width,
                dp.height,
                &region,
                rw,
                rh,
                0,
                0,
                rw as i64,
                rh as i64,
                cast.x,
                cast.y,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::compositor::fill_rect;

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };

    fn solid_picture(gfx: &mut GfxState, w: u32, h: u32, c: Rgb) -> i64 {
        let id = gfx.create_picture(w, h);
        let p = gfx.picture_mut(id).unwrap();
        fill_rect(&mut p.buf, w, h, 0, 0, w as i64, h as i64, c);
        id
    }

    #[test]
    fn put_cast_composites_immediately() {
        let mut gfx = GfxState::new();
        let dest = solid_picture(&mut gfx, 50, 50, Rgb::WHITE);
        let src = solid_picture(&mut gfx, 10, 10, RED);
        let c = gfx.put_cast(dest, src, 10, 10, 0, 0, 10, 10, -1).unwrap();
        assert_eq!(c, 1); // cast ids start at 1
        assert_eq!(gfx.color_at(dest, 10, 10).unwrap(), RED.packed());
    }

    #[test]
    fn move_cast_clears_the_old_position() {
        let mut gfx = GfxState::new();
        let dest = solid_picture(&mut gfx, 50, 50, Rgb::WHITE);
        let src = solid_picture(&mut gfx, 10, 10, RED);
        let c = gfx.put_cast(dest, src, 10, 10, 0, 0, 10, 10, -1).unwrap();

        gfx.move_cast(c, 20, 20, None).unwrap();
        assert_eq!(gfx.color_at(dest, 20, 20).unwrap(), RED.packed());
        assert_ne!(gfx.color_at(dest, 10, 10).unwrap(), RED.packed());
    }

    #[test]
    fn moving_one_cast_preserves_the_others() {
        let mut gfx = GfxState::new();
        let dest = solid_picture(&mut gfx, 50, 50, Rgb::WHITE);
        let red = solid_picture(&mut gfx, 5, 5, RED);
        let blue = solid_picture(&mut gfx, 5, 5, BLUE);
        let c_red = gfx.put_cast(dest, red, 10, 10, 0, 0, 5, 5, -1).unwrap();
        let _c_blue = gfx.put_cast(dest, blue, 25, 25, 0, 0, 5, 5, -1).unwrap();

        gfx.move_cast(c_red, 15, 15, None).unwrap();
        assert_eq!(gfx.color_at(dest, 15, 15).unwrap(), RED.packed());
        assert_eq!(gfx.color_at(dest, 25, 25).unwrap(), BLUE.packed());
        assert_ne!(gfx.color_at(dest, 10, 10).unwrap(), RED.packed());
    }

    #[test]
    fn color_key_shows_destination_through() {
        let mut gfx = GfxState::new();
        let dest = solid_picture(&mut gfx, 50, 50, BLUE);
        // 20x20 white source with a red 10x10 center block.
        let src = solid_picture(&mut gfx, 20, 20, Rgb::WHITE);
        {
            let p = gfx.picture_mut(src).unwrap();
            fill_rect(&mut p.buf, 20, 20, 5, 5, 10, 10, RED);
        }
        gfx.put_cast(dest, src, 10, 10, 0, 0, 20, 20, Rgb::WHITE.packed())
            .unwrap();

        assert_eq!(gfx.color_at(dest, 15, 15).unwrap(), RED.packed());
        assert_eq!(gfx.color_at(dest, 10, 10).unwrap(), BLUE.packed());
        assert_eq!(gfx.color_at(dest, 5, 5).unwrap(), BLUE.packed());
    }

    #[test]
    fn redraw_preserves_non_cast_content() {
        let mut gfx = GfxState::new();
        let dest = solid_picture(&mut gfx, 50, 50, Rgb::WHITE);
        let src = solid_picture(&mut gfx, 5, 5, RED);
        // Background mark drawn before any cast exists.
        {
            let p = gfx.picture_mut(dest).unwrap();
            fill_rect(&mut p.buf, 50, 50, 0, 0, 3, 3, BLUE);
        }
        let c = gfx.put_cast(dest, src, 30, 30, 0, 0, 5, 5, -1).unwrap();
        gfx.move_cast(c, 40, 40, None).unwrap();
        assert_eq!(gfx.color_at(dest, 1, 1).unwrap(), BLUE.packed());
    }

    #[test]
    fn reclipping_a_keyed_cast_rebakes() {
        let mut gfx = GfxState::new();
        let dest = solid_picture(&mut gfx, 40, 40, BLUE);
        // Left half white (keyed away), right half red.
        let src = solid_picture(&mut gfx, 10, 10, Rgb::WHITE);
        {
            let p = gfx.picture_mut(src).unwrap();
            fill_rect(&mut p.buf, 10, 10, 5, 0, 5, 10, RED);
        }
        let c = gfx
            .put_cast(dest, src, 0, 0, 0, 0, 5, 10, Rgb::WHITE.packed())
            .unwrap();
        // All white clip: nothing lands.
        assert_eq!(gfx.color_at(dest, 2, 2).unwrap(), BLUE.packed());

        // Re-clip to the red half.
        gfx.move_cast(c, 0, 0, Some((5, 0, 5, 10))).unwrap();
        assert_eq!(gfx.color_at(dest, 2, 2).unwrap(), RED.packed());
    }

    #[test]
    fn delete_cast_erases_it() {
        let mut gfx = GfxState::new();
        let dest = solid_picture(&mut gfx, 20, 20, Rgb::WHITE);
        let src = solid_picture(&mut gfx, 5, 5, RED);
        let c = gfx.put_cast(dest, src, 2, 2, 0, 0, 5, 5, -1).unwrap();
        gfx.delete_cast(c).unwrap();
        assert_ne!(gfx.color_at(dest, 2, 2).unwrap(), RED.packed());
        assert!(gfx.delete_cast(c).is_err());
    }
}
