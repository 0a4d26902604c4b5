//! Virtual-desktop windows.
//!
//! A window binds a picture to a desktop region.  Z-order is creation
//! order (id order).  The drag state machine lives on the window
//! records; hit testing walks them topmost-first.

use super::{
    GfxState, Rgb, DESKTOP_HEIGHT, DESKTOP_WIDTH, DRAG_KEEP_VISIBLE, TITLE_BAR_HEIGHT,
};
use crate::error::EngineError;

pub struct Window {
    pub id: i64,
    pub pic: i64,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    /// Picture offset, stored negated for legacy compatibility.
    pub pic_x_neg: i64,
    pub pic_y_neg: i64,
    pub caption: String,
    pub bg_color: Rgb,
    pub visible: bool,
    pub dragging: bool,
    /// Mouse-to-origin offset captured at drag start.
    pub drag_dx: i64,
    pub drag_dy: i64,
}

impl Window {
    /// Does the 20 px caption bar contain the point?
    fn caption_contains(&self, mx: i64, my: i64) -> bool {
        mx >= self.x && mx < self.x + self.width && my >= self.y && my < self.y + TITLE_BAR_HEIGHT
    }
}

impl GfxState {
    /// Open a window over `pic`.  Width/height of 0 take the picture's
    /// dimensions.
    #[allow(clippy::too_many_arguments)]
    pub fn open_window(
        &mut self,
        pic: i64,
        x: i64,
        y: i64,
        w: i64,
        h: i64,
        pic_x: i64,
        pic_y: i64,
        bg_color: i64,
    ) -> Result<i64, EngineError> {
        let p = self.picture(pic)?;
        let width = if w > 0 { w } else { p.width as i64 };
        let height = if h > 0 { h } else { p.height as i64 };
        let id = self.alloc_window_id();
        self.windows.insert(
            id,
            Window {
                id,
                pic,
                x,
                y,
                width,
                height,
                pic_x_neg: -pic_x,
                pic_y_neg: -pic_y,
                caption: String::new(),
                bg_color: Rgb::from_packed(bg_color),
                visible: true,
                dragging: false,
                drag_dx: 0,
                drag_dy: 0,
            },
        );
        Ok(id)
    }

    /// Re-bind and/or re-position a window.  `pic < 0` keeps the bound
    /// picture; `w`/`h` of 0 keep the current size.
    #[allow(clippy::too_many_arguments)]
    pub fn move_window(
        &mut self,
        id: i64,
        pic: i64,
        x: i64,
        y: i64,
        w: i64,
        h: i64,
        pic_x: i64,
        pic_y: i64,
    ) -> Result<(), EngineError> {
        if pic >= 0 {
            self.picture(pic)?;
        }
        let win = self
            .windows
            .get_mut(&id)
            .ok_or(EngineError::ResourceNotFound { kind: "window", id })?;
        if pic >= 0 {
            win.pic = pic;
        }
        win.x = x;
        win.y = y;
        if w > 0 {
            win.width = w;
        }
        if h > 0 {
            win.height = h;
        }
        win.pic_x_neg = -pic_x;
        win.pic_y_neg = -pic_y;
        Ok(())
    }

    pub fn close_window(&mut self, id: i64) -> Result<(), EngineError> {
        self.windows
            .remove(&id)
            .map(|_| ())
            .ok_or(EngineError::ResourceNotFound { kind: "window", id })
    }

    pub fn close_all_windows(&mut self) {
        self.windows.clear();
    }

    pub fn set_caption(&mut self, id: i64, caption: &str) -> Result<(), EngineError> {
        let win = self
            .windows
            .get_mut(&id)
            .ok_or(EngineError::ResourceNotFound { kind: "window", id })?;
        win.caption = caption.to_string();
        Ok(())
    }

    pub fn window_picture(&self, id: i64) -> Result<i64, EngineError> {
        self.windows
            .get(&id)
            .map(|w| w.pic)
            .ok_or(EngineError::ResourceNotFound { kind: "window", id })
    }

    // ── Drag state machine ─────────────────────────────────────

    /// Begin dragging the topmost visible window whose caption bar
    /// contains the point.  Returns the window id, if any.
    pub fn start_drag(&mut self, mx: i64, my: i64) -> Option<i64> {
        let hit = self
            .windows
            .values()
            .rev() // topmost first (highest id = latest created)
            .find(|w| w.visible && w.caption_contains(mx, my))
            .map(|w| w.id)?;
        let win = self.windows.get_mut(&hit).unwrap();
        win.dragging = true;
        win.drag_dx = mx - win.x;
        win.drag_dy = my - win.y;
        Some(hit)
    }

    /// Move the dragged window, clamped so at least 50 px of title bar
    /// stays on the desktop.
    pub fn update_drag(&mut self, mx: i64, my: i64) {
        for win in self.windows.values_mut() {
            if !win.dragging {
                continue;
            }
            let x = mx - win.drag_dx;
            let y = my - win.drag_dy;
            // max-then-min instead of clamp: a window narrower than the
            // keep-visible margin would invert the bounds.
            win.x = x
                .max(DRAG_KEEP_VISIBLE - win.width)
                .min(DESKTOP_WIDTH - DRAG_KEEP_VISIBLE);
            win.y = y.max(0).min(DESKTOP_HEIGHT - TITLE_BAR_HEIGHT);
        }
    }

    pub fn stop_drag(&mut self) {
        for win in self.windows.values_mut() {
            win.dragging = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_window(x: i64, y: i64, w: i64, h: i64) -> (GfxState, i64) {
        let mut gfx = GfxState::new();
        let pic = gfx.create_picture(64, 64);
        let id = gfx.open_window(pic, x, y, w, h, 0, 0, 0xFFFFFF).unwrap();
        (gfx, id)
    }

    #[test]
    fn window_ids_start_at_zero() {
        let (_gfx, id) = state_with_window(0, 0, 100, 100);
        assert_eq!(id, 0);
    }

    #[test]
    fn size_defaults_to_the_picture() {
        let mut gfx = GfxState::new();
        let pic = gfx.create_picture(320, 200);
        let id = gfx.open_window(pic, 0, 0, 0, 0, 0, 0, 0).unwrap();
        let w = gfx.windows.get(&id).unwrap();
        assert_eq!((w.width, w.height), (320, 200));
    }

    #[test]
    fn picture_offset_is_stored_negated() {
        let mut gfx = GfxState::new();
        let pic = gfx.create_picture(64, 64);
        let id = gfx.open_window(pic, 0, 0, 32, 32, 8, 4, 0).unwrap();
        let w = gfx.windows.get(&id).unwrap();
        assert_eq!((w.pic_x_neg, w.pic_y_neg), (-8, -4));
    }

    #[test]
    fn drag_hits_the_topmost_caption() {
        let mut gfx = GfxState::new();
        let pic = gfx.create_picture(64, 64);
        let bottom = gfx.open_window(pic, 100, 100, 200, 100, 0, 0, 0).unwrap();
        let top = gfx.open_window(pic, 150, 100, 200, 100, 0, 0, 0).unwrap();

        // Overlapping caption region: the later window wins.
        assert_eq!(gfx.start_drag(160, 110), Some(top));
        gfx.stop_drag();

        // Region only the older window covers.
        assert_eq!(gfx.start_drag(105, 110), Some(bottom));

        // No caption anywhere near.
        gfx.stop_drag();
        assert_eq!(gfx.start_drag(900, 600), None);
    }

    #[test]
    fn drag_moves_with_the_anchor_offset() {
        let (mut gfx, id) = state_with_window(100, 100, 200, 100);
        gfx.start_drag(110, 105).unwrap();
        gfx.update_drag(210, 155);
        let w = gfx.windows.get(&id).unwrap();
        assert_eq!((w.x, w.y), (200, 150));
    }

    #[test]
    fn drag_clamps_to_keep_the_title_bar_reachable() {
        let (mut gfx, id) = state_with_window(100, 100, 200, 100);
        gfx.start_drag(110, 105).unwrap();
        gfx.update_drag(-5000, -5000);
        {
            let w = gfx.windows.get(&id).unwrap();
            assert_eq!(w.x, DRAG_KEEP_VISIBLE - 200);
            assert_eq!(w.y, 0);
        }
        gfx.update_drag(5000, 5000);
        let w = gfx.windows.get(&id).unwrap();
        assert_eq!(w.x, DESKTOP_WIDTH - DRAG_KEEP_VISIBLE);
        assert_eq!(w.y, DESKTOP_HEIGHT - TITLE_BAR_HEIGHT);
    }

    #[test]
    fn stop_drag_clears_the_state() {
        let (mut gfx, id) = state_with_window(100, 100, 200, 100);
        gfx.start_drag(110, 105).unwrap();
        gfx.stop_drag();
        gfx.update_drag(500, 500);
        let w = gfx.windows.get(&id).unwrap();
        assert_eq!((w.x, w.y), (100, 100));
    }
}
