//! Gamma (contrast) correction stage.

use reefshader_media_model::frame::Frame;

/// Apply `pixel^gamma` to every sample. Stateless.
pub fn apply_gamma(frame: &Frame, gamma: f32) -> Frame {
    frame.with_pixels(frame.pixels().mapv(|v| v.max(0.0).powf(gamma)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use proptest::prelude::*;
    use reefshader_media_model::frame::Rotation;

    fn ramp() -> Frame {
        let pixels = Array3::from_shape_fn((4, 4, 3), |(y, x, c)| {
            ((y * 4 + x) as f32 + c as f32 * 0.25) / 17.0
        });
        Frame::new(pixels, 2.0, Rotation::Deg0).unwrap()
    }

    #[test]
    fn test_unit_gamma_is_identity() {
        let frame = ramp();
        assert_eq!(apply_gamma(&frame, 1.0), frame);
    }

    #[test]
    fn test_gamma_darkens_midtones() {
        let frame = ramp();
        let out = apply_gamma(&frame, 2.0);
        let v = frame.pixels()[[2, 2, 0]];
        assert!((out.pixels()[[2, 2, 0]] - v * v).abs() < 1e-6);
        assert_eq!(out.timestamp(), 2.0);
    }

    proptest! {
        #[test]
        fn prop_gamma_composes_multiplicatively(g1 in 0.5f32..2.0, g2 in 0.5f32..2.0) {
            let frame = ramp();
            let twice = apply_gamma(&apply_gamma(&frame, g1), g2);
            let once = apply_gamma(&frame, g1 * g2);
            for (a, b) in twice.pixels().iter().zip(once.pixels().iter()) {
                prop_assert!((a - b).abs() < 1e-5, "{a} vs {b}");
            }
        }
    }
}
