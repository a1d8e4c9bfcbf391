//! Resolution scaling for rendered output and preview frames.

use ndarray::Array3;

use reefshader_media_model::frame::{Frame, CHANNELS};

/// Output height for `target_width` preserving the source aspect ratio,
/// rounded to an even number (encoders reject odd chroma dimensions).
pub fn even_height_for_width(src_width: usize, src_height: usize, target_width: usize) -> usize {
    if src_width == 0 {
        return 0;
    }
    let exact = src_height as f64 * target_width as f64 / src_width as f64;
    let even = ((exact / 2.0).round() as usize) * 2;
    even.max(2)
}

/// Largest size with the frame's aspect ratio that fits inside
/// `max_width`×`max_height`. Never upscales.
pub fn fit_within(
    width: usize,
    height: usize,
    max_width: usize,
    max_height: usize,
) -> (usize, usize) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let factor = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let w = ((width as f64 * factor).round() as usize).max(1);
    let h = ((height as f64 * factor).round() as usize).max(1);
    (w, h)
}

/// Bilinear resize with pixel-center alignment.
pub fn resize(frame: &Frame, width: usize, height: usize) -> Frame {
    let (src_h, src_w, _) = frame.shape();
    if (src_h, src_w) == (height, width) || src_h == 0 || src_w == 0 {
        return frame.clone();
    }

    let src = frame.pixels();
    let scale_y = src_h as f32 / height as f32;
    let scale_x = src_w as f32 / width as f32;
    let max_y = (src_h - 1) as f32;
    let max_x = (src_w - 1) as f32;

    let pixels = Array3::from_shape_fn((height, width, CHANNELS), |(y, x, c)| {
        let fy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
        let fx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
        let (y0, x0) = (fy.floor() as usize, fx.floor() as usize);
        let (y1, x1) = ((y0 + 1).min(src_h - 1), (x0 + 1).min(src_w - 1));
        let (ty, tx) = (fy - y0 as f32, fx - x0 as f32);

        let top = src[[y0, x0, c]] * (1.0 - tx) + src[[y0, x1, c]] * tx;
        let bottom = src[[y1, x0, c]] * (1.0 - tx) + src[[y1, x1, c]] * tx;
        top * (1.0 - ty) + bottom * ty
    });
    frame.with_pixels(pixels)
}

/// Scale so the frame is `target_width` wide, keeping the aspect ratio.
pub fn scale_to_width(frame: &Frame, target_width: usize) -> Frame {
    let height = even_height_for_width(frame.width(), frame.height(), target_width);
    resize(frame, target_width, height)
}
