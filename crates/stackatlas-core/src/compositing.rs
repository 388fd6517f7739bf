use crate::config::ResizeFilter;
use image::{RgbaImage, imageops};

/// Size of a `w x h` image scaled so its longest edge equals `target`.
///
/// The short edge is truncated and never drops below 1 pixel.
pub fn fit_dimensions(w: u32, h: u32, target: u32) -> (u32, u32) {
    let longest = w.max(h);
    if longest == 0 || longest == target {
        return (w.max(1), h.max(1));
    }
    let scale = target as f64 / longest as f64;
    let nw = ((w as f64 * scale) as u32).clamp(1, target);
    let nh = ((h as f64 * scale) as u32).clamp(1, target);
    (nw, nh)
}

/// Resizes `src` so its longest edge equals `slot_size`, preserving aspect ratio.
pub fn resize_to_slot(src: &RgbaImage, slot_size: u32, filter: ResizeFilter) -> RgbaImage {
    let (w, h) = src.dimensions();
    let (nw, nh) = fit_dimensions(w, h, slot_size);
    if (nw, nh) == (w, h) {
        return src.clone();
    }
    imageops::resize(src, nw, nh, filter.filter_type())
}

/// Copy `src` into `canvas` with its top-left at (dx, dy), clipped to a
/// `slot_size` square and to the canvas bounds. Pixels are replaced, not blended.
pub fn blit_into_slot(src: &RgbaImage, canvas: &mut RgbaImage, dx: u32, dy: u32, slot_size: u32) {
    let (cw, ch) = canvas.dimensions();
    let (sw, sh) = src.dimensions();
    let w = sw.min(slot_size);
    let h = sh.min(slot_size);

    for yy in 0..h {
        if dy + yy >= ch {
            break;
        }
        for xx in 0..w {
            if dx + xx >= cw {
                break;
            }
            canvas.put_pixel(dx + xx, dy + yy, *src.get_pixel(xx, yy));
        }
    }
}
