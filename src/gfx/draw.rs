//! Drawing primitives rasterized straight into picture buffers.
//!
//! Pen state (line size, paint color, raster op) is engine-global, the
//! way the legacy toolkit kept it.

use super::{GfxState, Rgb};
use crate::error::EngineError;

/// Raster op: 0 = copy, 1 = XOR.  Anything else warns and copies.
pub const ROP_COPY: i64 = 0;
pub const ROP_XOR: i64 = 1;

#[derive(Debug, Clone)]
pub struct PenState {
    pub line_size: i64,
    pub color: Rgb,
    pub rop: i64,
}

impl Default for PenState {
    fn default() -> Self {
        Self {
            line_size: 1,
            color: Rgb::BLACK,
            rop: ROP_COPY,
        }
    }
}

fn plot(buf: &mut [u8], w: u32, h: u32, x: i64, y: i64, color: Rgb, rop: i64) {
    if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
        return;
    }
    let i = ((y as u32 * w + x as u32) * 4) as usize;
    match rop {
        ROP_XOR => {
            buf[i] ^= color.r;
            buf[i + 1] ^= color.g;
            buf[i + 2] ^= color.b;
        }
        _ => {
            buf[i] = color.r;
            buf[i + 1] = color.g;
            buf[i + 2] = color.b;
        }
    }
    buf[i + 3] = 255;
}

/// Square brush of `size` pixels centered on the point.
fn plot_thick(buf: &mut [u8], w: u32, h: u32, x: i64, y: i64, color: Rgb, rop: i64, size: i64) {
    if size <= 1 {
        plot(buf, w, h, x, y, color, rop);
        return;
    }
    let half = size / 2;
    for dy in -half..=(size - 1 - half) {
        for dx in -half..=(size - 1 - half) {
            plot(buf, w, h, x + dx, y + dy, color, rop);
        }
    }
}

impl GfxState {
    pub fn set_line_size(&mut self, n: i64) {
        self.pen.line_size = n.max(1);
    }

    pub fn set_paint_color(&mut self, packed: i64) {
        self.pen.color = Rgb::from_packed(packed);
    }

    pub fn set_rop(&mut self, mode: i64) {
        if mode != ROP_COPY && mode != ROP_XOR {
            log::warn!("set_rop: unknown mode {mode}, using copy");
            self.pen.rop = ROP_COPY;
        } else {
            self.pen.rop = mode;
        }
    }

    /// Bresenham line with the current pen.
    pub fn draw_line(
        &mut self,
        pic: i64,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
    ) -> Result<(), EngineError> {
        let pen = self.pen.clone();
        let p = self.picture_mut(pic)?;
        p.paint(|buf, w, h| {
            let (mut x, mut y) = (x1, y1);
            let dx = (x2 - x1).abs();
            let dy = -(y2 - y1).abs();
            let sx = if x1 < x2 { 1 } else { -1 };
            let sy = if y1 < y2 { 1 } else { -1 };
            let mut err = dx + dy;
            loop {
                plot_thick(buf, w, h, x, y, pen.color, pen.rop, pen.line_size);
                if x == x2 && y == y2 {
                    break;
                }
                let e2 = 2 * err;
                if e2 >= dy {
                    err += dy;
                    x += sx;
                }
                if e2 <= dx {
                    err += dx;
                    y += sy;
                }
            }
        });
        Ok(())
    }

    /// Rectangle over the corner span, outlined or filled.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_rect(
        &mut self,
        pic: i64,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        fill: bool,
    ) -> Result<(), EngineError> {
        let pen = self.pen.clone();
        let (x0, x1m) = (x1.min(x2), x1.max(x2));
        let (y0, y1m) = (y1.min(y2), y1.max(y2));
        let p = self.picture_mut(pic)?;
        p.paint(|buf, w, h| {
            if fill {
                for y in y0..=y1m {
                    for x in x0..=x1m {
                        plot(buf, w, h, x, y, pen.color, pen.rop);
                    }
                }
            } else {
                for x in x0..=x1m {
                    plot_thick(buf, w, h, x, y0, pen.color, pen.rop, pen.line_size);
                    plot_thick(buf, w, h, x, y1m, pen.color, pen.rop, pen.line_size);
                }
                for y in y0..=y1m {
                    plot_thick(buf, w, h, x0, y, pen.color, pen.rop, pen.line_size);
                    plot_thick(buf, w, h, x1m, y, pen.color, pen.rop, pen.line_size);
                }
            }
        });
        Ok(())
    }

    /// Midpoint ellipse inscribed in the bounding rectangle.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_circle(
        &mut self,
        pic: i64,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        fill: bool,
    ) -> Result<(), EngineError> {
        let pen = self.pen.clone();
        let cx2 = x1 + x2; // center × 2, keeps half-pixel centers exact
        let cy2 = y1 + y2;
        let a = (x2 - x1).abs();
        let b = (y2 - y1).abs();
        let p = self.picture_mut(pic)?;
        p.paint(|buf, w, h| {
            // Scan-line test against the ellipse equation; exact enough
            // for the sizes scripts use and trivially fillable.
            let (x0, x1m) = ((cx2 - a) / 2, (cx2 + a) / 2);
            let (y0, y1m) = ((cy2 - b) / 2, (cy2 + b) / 2);
            let ra = (a as f64 / 2.0).max(0.5);
            let rb = (b as f64 / 2.0).max(0.5);
            let fcx = cx2 as f64 / 2.0;
            let fcy = cy2 as f64 / 2.0;
            for y in y0..=y1m {
                for x in x0..=x1m {
                    let nx = (x as f64 - fcx) / ra;
                    let ny = (y as f64 - fcy) / rb;
                    let d = nx * nx + ny * ny;
                    let inside = d <= 1.0;
                    if fill {
                        if inside {
                            plot(buf, w, h, x, y, pen.color, pen.rop);
                        }
                    } else {
                        // Ring: inside, but a one-pixel step outward leaves.
                        let edge = inside
                            && ((nx.abs() + 1.0 / ra).powi(2) + ny * ny > 1.0
                                || nx * nx + (ny.abs() + 1.0 / rb).powi(2) > 1.0);
                        if edge {
                            plot_thick(buf, w, h, x, y, pen.color, pen.rop, pen.line_size);
                        }
                    }
                }
            }
        });
        Ok(())
    }
}
