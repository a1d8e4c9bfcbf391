//! Side-by-side comparison output.

use ndarray::{concatenate, Axis};

use reefshader_media_model::frame::Frame;

/// Place `processed` on the left and `reference` on the right.
///
/// Returns `None` when the two frames differ in shape, for example when
/// stabilization cropped the processed frame.
pub fn merge_side_by_side(processed: &Frame, reference: &Frame) -> Option<Frame> {
    if processed.shape() != reference.shape() {
        return None;
    }
    let merged = concatenate(Axis(1), &[processed.view(), reference.view()]).ok()?;
    Some(processed.with_pixels(merged))
}
