//! Rotation stage.

use ndarray::{s, Array3, ArrayView3};

use reefshader_media_model::frame::{Frame, Rotation};

/// Rotate the frame buffer by the frame's own rotation.
///
/// The result is upright, so it carries `Rotation::Deg0`.
pub fn rotate_upright(frame: &Frame) -> Frame {
    let rotated = rot90(frame.view(), frame.rotation().quarter_turns());
    frame.with_pixels(rotated).with_rotation(Rotation::Deg0)
}

/// Rotate an `(height, width, channels)` buffer counter-clockwise by
/// `quarter_turns` × 90 degrees.
pub fn rot90(pixels: ArrayView3<'_, f32>, quarter_turns: usize) -> Array3<f32> {
    match quarter_turns % 4 {
        0 => pixels.to_owned(),
        1 => pixels
            .permuted_axes([1, 0, 2])
            .slice_move(s![..;-1, .., ..])
            .as_standard_layout()
            .into_owned(),
        2 => pixels
            .slice_move(s![..;-1, ..;-1, ..])
            .as_standard_layout()
            .into_owned(),
        _ => pixels
            .slice_move(s![..;-1, .., ..])
            .permuted_axes([1, 0, 2])
            .as_standard_layout()
            .into_owned(),
    }
}
