//! Low-level raster operations: clipped blits, color-key baking, scaled
//! and mirrored copies.  All buffers are row-major RGBA8.

use super::Rgb;

/// Per-channel tolerance for color keys on scaled copies; bilinear
/// sampling smears key pixels slightly.
const SCALED_KEY_TOLERANCE: i32 = 5;

#[inline]
fn idx(w: u32, x: u32, y: u32) -> usize {
    ((y * w + x) * 4) as usize
}

/// Intersect a `w × h` rectangle at `(dx, dy)` reading from `(sx, sy)`
/// with both buffers.  Returns `(sx, sy, dx, dy, w, h)` or `None` when
/// nothing survives.
#[allow(clippy::too_many_arguments)]
fn clip(
    sw: u32,
    sh: u32,
    dw: u32,
    dh: u32,
    mut sx: i64,
    mut sy: i64,
    mut dx: i64,
    mut dy: i64,
    mut w: i64,
    mut h: i64,
) -> Option<(u32, u32, u32, u32, u32, u32)> {
    // Pull the rectangle into the source.
    if sx < 0 {
        w += sx;
        dx -= sx;
        sx = 0;
    }
    if sy < 0 {
        h += sy;
        dy -= sy;
        sy = 0;
    }
    // Pull it into the destination.
    if dx < 0 {
        w += dx;
        sx -= dx;
        dx = 0;
    }
    if dy < 0 {
        h += dy;
        sy -= dy;
        dy = 0;
    }
    w = w.min(sw as i64 - sx).min(dw as i64 - dx);
    h = h.min(sh as i64 - sy).min(dh as i64 - dy);
    if w <= 0 || h <= 0 {
        return None;
    }
    Some((sx as u32, sy as u32, dx as u32, dy as u32, w as u32, h as u32))
}

/// Opaque clipped copy.
#[allow(clippy::too_many_arguments)]
pub fn blit(
    dst: &mut [u8],
    dw: u32,
    dh: u32,
    src: &[u8],
    sw: u32,
    sh: u32,
    sx: i64,
    sy: i64,
    w: i64,
    h: i64,
    dx: i64,
    dy: i64,
) {
    let Some((sx, sy, dx, dy, w, h)) = clip(sw, sh, dw, dh, sx, sy, dx, dy, w, h) else {
        return;
    };
    for row in 0..h {
        let s = idx(sw, sx, sy + row);
        let d = idx(dw, dx, dy + row);
        dst[d..d + (w * 4) as usize].copy_from_slice(&src[s..s + (w * 4) as usize]);
    }
}

/// Copy skipping source pixels whose RGB equals `key` exactly.
#[allow(clippy::too_many_arguments)]
pub fn blit_keyed(
    dst: &mut [u8],
    dw: u32,
    dh: u32,
    src: &[u8],
    sw: u32,
    sh: u32,
    sx: i64,
    sy: i64,
    w: i64,
    h: i64,
    dx: i64,
    dy: i64,
    key: Rgb,
) {
    let Some((sx, sy, dx, dy, w, h)) = clip(sw, sh, dw, dh, sx, sy, dx, dy, w, h) else {
        return;
    };
    for row in 0..h {
        for col in 0..w {
            let s = idx(sw, sx + col, sy + row);
            if src[s] == key.r && src[s + 1] == key.g && src[s + 2] == key.b {
                continue;
            }
            let d = idx(dw, dx + col, dy + row);
            dst[d..d + 4].copy_from_slice(&src[s..s + 4]);
        }
    }
}

/// Copy honoring the source alpha channel: 0 skips, 255 copies,
/// in-between blends.  Used for baked cast images and rasterized text.
#[allow(clippy::too_many_arguments)]
pub fn blit_alpha(
    dst: &mut [u8],
    dw: u32,
    dh: u32,
    src: &[u8],
    sw: u32,
    sh: u32,
    sx: i64,
    sy: i64,
    w: i64,
    h: i64,
    dx: i64,
    dy: i64,
) {
    let Some((sx, sy, dx, dy, w, h)) = clip(sw, sh, dw, dh, sx, sy, dx, dy, w, h) else {
        return;
    };
    for row in 0..h {
        for col in 0..w {
            let s = idx(sw, sx + col, sy + row);
            let a = src[s + 3] as u32;
            if a == 0 {
                continue;
            }
            let d = idx(dw, dx + col, dy + row);
            if a == 255 {
                dst[d..d + 3].copy_from_slice(&src[s..s + 3]);
            } else {
                for c in 0..3 {
                    let sv = src[s + c] as u32;
                    let dv = dst[d + c] as u32;
                    dst[d + c] = ((sv * a + dv * (255 - a)) / 255) as u8;
                }
            }
            dst[d + 3] = 255;
        }
    }
}

/// Copy a region out of a buffer (clipped; uncovered area transparent).
/// Returns `(pixels, w, h)` with the requested dimensions clamped to
/// positive.
pub fn extract(src: &[u8], sw: u32, sh: u32, sx: i64, sy: i64, w: i64, h: i64) -> (Vec<u8>, u32, u32) {
    let w = w.max(0) as u32;
    let h = h.max(0) as u32;
    let mut out = vec![0u8; (w * h * 4) as usize];
    blit(&mut out, w, h, src, sw, sh, sx, sy, w as i64, h as i64, 0, 0);
    (out, w, h)
}

/// Bake a color-keyed clip: copy the region, writing alpha 0 wherever
/// the source RGB equals `key`.  Cached by casts so keying happens once
/// per (source, clip, key).
#[allow(clippy::too_many_arguments)]
pub fn bake_keyed(
    src: &[u8],
    sw: u32,
    sh: u32,
    sx: i64,
    sy: i64,
    w: i64,
    h: i64,
    key: Rgb,
) -> (Vec<u8>, u32, u32) {
    let (mut out, w, h) = extract(src, sw, sh, sx, sy, w, h);
    for px in out.chunks_exact_mut(4) {
        if px[0] == key.r && px[1] == key.g && px[2] == key.b {
            px[3] = 0;
        }
    }
    (out, w, h)
}

/// Bilinear-scaled copy of the whole `sw × sh` source into a `dw_r × dh_r`
/// rectangle at `(dx, dy)`.  With `key`, source samples within the
/// tolerance of the key are dropped.
#[allow(clippy::too_many_arguments)]
pub fn blit_scaled(
    dst: &mut [u8],
    dw: u32,
    dh: u32,
    src: &[u8],
    sw: u32,
    sh: u32,
    dx: i64,
    dy: i64,
    dw_r: i64,
    dh_r: i64,
    key: Option<Rgb>,
) {
    if sw == 0 || sh == 0 || dw_r <= 0 || dh_r <= 0 {
        return;
    }
    for oy in 0..dh_r {
        let ty = dy + oy;
        if ty < 0 || ty >= dh as i64 {
            continue;
        }
        for ox in 0..dw_r {
            let tx = dx + ox;
            if tx < 0 || tx >= dw as i64 {
                continue;
            }
            // Sample center in source space.
            let fx = (ox as f64 + 0.5) * sw as f64 / dw_r as f64 - 0.5;
            let fy = (oy as f64 + 0.5) * sh as f64 / dh_r as f64 - 0.5;
            let x0 = fx.floor().max(0.0) as u32;
            let y0 = fy.floor().max(0.0) as u32;
            let x1 = (x0 + 1).min(sw - 1);
            let y1 = (y0 + 1).min(sh - 1);
            let ax = (fx - x0 as f64).clamp(0.0, 1.0);
            let ay = (fy - y0 as f64).clamp(0.0, 1.0);

            let mut px = [0u8; 3];
            for c in 0..3 {
                let p00 = src[idx(sw, x0, y0) + c] as f64;
                let p10 = src[idx(sw, x1, y0) + c] as f64;
                let p01 = src[idx(sw, x0, y1) + c] as f64;
                let p11 = src[idx(sw, x1, y1) + c] as f64;
                let top = p00 * (1.0 - ax) + p10 * ax;
                let bot = p01 * (1.0 - ax) + p11 * ax;
                px[c] = (top * (1.0 - ay) + bot * ay).round().clamp(0.0, 255.0) as u8;
            }

            if let Some(k) = key {
                let near = (px[0] as i32 - k.r as i32).abs() < SCALED_KEY_TOLERANCE
                    && (px[1] as i32 - k.g as i32).abs() < SCALED_KEY_TOLERANCE
                    && (px[2] as i32 - k.b as i32).abs() < SCALED_KEY_TOLERANCE;
                if near {
                    continue;
                }
            }

            let d = idx(dw, tx as u32, ty as u32);
            dst[d..d + 3].copy_from_slice(&px);
            dst[d + 3] = 255;
        }
    }
}

/// Horizontally mirrored copy of the whole source.
#[allow(clippy::too_many_arguments)]
pub fn blit_mirrored(
    dst: &mut [u8],
    dw: u32,
    dh: u32,
    src: &[u8],
    sw: u32,
    sh: u32,
    dx: i64,
    dy: i64,
) {
    for row in 0..sh {
        let ty = dy + row as i64;
        if ty < 0 || ty >= dh as i64 {
            continue;
        }
        for col in 0..sw {
            let tx = dx + col as i64;
            if tx < 0 || tx >= dw as i64 {
                continue;
            }
            let s = idx(sw, sw - 1 - col, row);
            let d = idx(dw, tx as u32, ty as u32);
            dst[d..d + 4].copy_from_slice(&src[s..s + 4]);
        }
    }
}

/// Opaque rectangle fill, clipped.
pub fn fill_rect(dst: &mut [u8], dw: u32, dh: u32, x: i64, y: i64, w: i64, h: i64, color: Rgb) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(dw as i64);
    let y1 = (y + h).min(dh as i64);
    for py in y0..y1 {
        for px in x0..x1 {
            let d = idx(dw, px as u32, py as u32);
            dst[d] = color.r;
            dst[d + 1] = color.g;
            dst[d + 2] = color.b;
            dst[d + 3] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, c: Rgb) -> Vec<u8> {
        let mut buf = vec![0u8; (w * h * 4) as usize];
        fill_rect(&mut buf, w, h, 0, 0, w as i64, h as i64, c);
        buf
    }

    fn pixel(buf: &[u8], w: u32, x: u32, y: u32) -> Rgb {
        let i = idx(w, x, y);
        Rgb {
            r: buf[i],
            g: buf[i + 1],
            b: buf[i + 2],
        }
    }

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };

    #[test]
    fn blit_clips_at_all_edges() {
        let src = solid(4, 4, RED);
        let mut dst = solid(4, 4, BLUE);
        // Overhang on every side; only the overlap lands.
        blit(&mut dst, 4, 4, &src, 4, 4, 0, 0, 4, 4, -2, -2);
        assert_eq!(pixel(&dst, 4, 0, 0), RED);
        assert_eq!(pixel(&dst, 4, 1, 1), RED);
        assert_eq!(pixel(&dst, 4, 2, 2), BLUE);
    }

    #[test]
    fn blit_fully_outside_is_a_no_op() {
        let src = solid(2, 2, RED);
        let mut dst = solid(2, 2, BLUE);
        blit(&mut dst, 2, 2, &src, 2, 2, 0, 0, 2, 2, 5, 5);
        assert_eq!(pixel(&dst, 2, 0, 0), BLUE);
    }

    #[test]
    fn keyed_blit_skips_key_pixels() {
        let mut src = solid(2, 1, RED);
        // Second pixel is the key color.
        let k = idx(2, 1, 0);
        src[k] = 255;
        src[k + 1] = 255;
        src[k + 2] = 255;
        let mut dst = solid(2, 1, BLUE);
        blit_keyed(&mut dst, 2, 1, &src, 2, 1, 0, 0, 2, 1, 0, 0, Rgb::WHITE);
        assert_eq!(pixel(&dst, 2, 0, 0), RED);
        assert_eq!(pixel(&dst, 2, 1, 0), BLUE);
    }

    #[test]
    fn bake_writes_transparent_alpha_on_key() {
        let mut src = solid(2, 1, RED);
        let k = idx(2, 1, 0);
        src[k] = 255;
        src[k + 1] = 255;
        src[k + 2] = 255;
        let (baked, w, h) = bake_keyed(&src, 2, 1, 0, 0, 2, 1, Rgb::WHITE);
        assert_eq!((w, h), (2, 1));
        assert_eq!(baked[3], 255);
        assert_eq!(baked[7], 0);
    }

    #[test]
    fn mirrored_blit_reverses_rows() {
        let mut src = solid(2, 1, RED);
        let k = idx(2, 1, 0);
        src[k] = 0;
        src[k + 1] = 0;
        src[k + 2] = 255;
        let mut dst = solid(2, 1, Rgb::BLACK);
        blit_mirrored(&mut dst, 2, 1, &src, 2, 1, 0, 0);
        assert_eq!(pixel(&dst, 2, 0, 0), BLUE);
        assert_eq!(pixel(&dst, 2, 1, 0), RED);
    }

    #[test]
    fn scaled_blit_keys_with_tolerance() {
        // Near-white source pixel must still be dropped under a white key.
        let mut src = solid(1, 1, Rgb { r: 252, g: 253, b: 254 });
        src[3] = 255;
        let mut dst = solid(2, 2, BLUE);
        blit_scaled(&mut dst, 2, 2, &src, 1, 1, 0, 0, 2, 2, Some(Rgb::WHITE));
        assert_eq!(pixel(&dst, 2, 0, 0), BLUE);
    }
}
