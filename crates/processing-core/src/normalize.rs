//! Per-channel colour normalization with temporal smoothing.
//!
//! Underwater footage loses red first and the loss varies as the diver moves,
//! so each frame is stretched per channel to fill `[0, 1]`. The stretch is
//! computed from a 4×4 mean-pooled copy of the frame (cheap, and robust to
//! single hot pixels) and blended with the previous frame's bounds so the
//! correction drifts slowly instead of flickering:
//!
//! ```text
//! effective = s * previous + (1 - s) * current
//! gain      = min(1 / (max - min), max_gain)
//! out       = clamp((pixel - min) * gain, 0, 1)
//! ```

use ndarray::{Array3, ArrayView3, Axis};

use reefshader_media_model::frame::{Frame, CHANNELS};

/// Mean-pooling window used before measuring bounds.
pub const DOWNSAMPLE_WINDOW: usize = 4;

/// Per-channel lower and upper bounds carried from frame to frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationBounds {
    pub mins: [f32; CHANNELS],
    pub maxs: [f32; CHANNELS],
}

/// Parameters of the normalization stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeParams {
    /// Upper bound on the per-channel gain.
    pub max_gain: f32,

    /// Weight of the previous bounds, in `[0, 1)`. `0` disables smoothing.
    pub temporal_smoothing: f32,
}

impl NormalizationBounds {
    /// Bounds that leave a `[0, 1]` frame unchanged.
    pub const IDENTITY: NormalizationBounds = NormalizationBounds {
        mins: [0.0; CHANNELS],
        maxs: [1.0; CHANNELS],
    };

    /// Blend `previous` into `self` with weight `smoothing`.
    pub fn blended_with(&self, previous: &NormalizationBounds, smoothing: f32) -> Self {
        let s = smoothing.clamp(0.0, 1.0);
        let mut out = *self;
        for c in 0..CHANNELS {
            out.mins[c] = s * previous.mins[c] + (1.0 - s) * self.mins[c];
            out.maxs[c] = s * previous.maxs[c] + (1.0 - s) * self.maxs[c];
        }
        out
    }

    /// Per-channel gain, capped at `max_gain`.
    pub fn gains(&self, max_gain: f32) -> [f32; CHANNELS] {
        let mut gains = [max_gain; CHANNELS];
        for (c, gain) in gains.iter_mut().enumerate() {
            let range = self.maxs[c] - self.mins[c];
            if range > 0.0 {
                *gain = (1.0 / range).min(max_gain);
            }
        }
        gains
    }
}

/// Measure per-channel bounds of a frame after `window`×`window` mean pooling.
///
/// Partial blocks at the right and bottom edges are ignored. Frames smaller
/// than the window are pooled with a window shrunk to the frame size.
pub fn measure_bounds(pixels: ArrayView3<'_, f32>, window: usize) -> NormalizationBounds {
    let (height, width, _) = pixels.dim();
    if height == 0 || width == 0 {
        return NormalizationBounds::IDENTITY;
    }

    let wy = window.clamp(1, height);
    let wx = window.clamp(1, width);

    let mut mins = [f32::INFINITY; CHANNELS];
    let mut maxs = [f32::NEG_INFINITY; CHANNELS];
    for block in pixels.exact_chunks((wy, wx, CHANNELS)) {
        for (c, channel) in block.axis_iter(Axis(2)).enumerate() {
            let mean = channel.mean().unwrap_or(0.0);
            mins[c] = mins[c].min(mean);
            maxs[c] = maxs[c].max(mean);
        }
    }

    NormalizationBounds { mins, maxs }
}

/// Rescale every channel of `pixels` by the given bounds.
pub fn apply_bounds(
    pixels: ArrayView3<'_, f32>,
    bounds: &NormalizationBounds,
    max_gain: f32,
) -> Array3<f32> {
    let gains = bounds.gains(max_gain);
    let mut out = pixels.to_owned();
    for (c, mut channel) in out.axis_iter_mut(Axis(2)).enumerate() {
        let (min, gain) = (bounds.mins[c], gains[c]);
        channel.mapv_inplace(|v| ((v - min) * gain).clamp(0.0, 1.0));
    }
    out
}

/// Normalize one frame.
///
/// Returns the corrected frame and the effective bounds, which the caller
/// passes back as `previous` for the next frame of the same run.
pub fn normalize(
    frame: &Frame,
    previous: Option<&NormalizationBounds>,
    params: NormalizeParams,
) -> (Frame, NormalizationBounds) {
    let current = measure_bounds(frame.view(), DOWNSAMPLE_WINDOW);
    let effective = match previous {
        Some(prev) => current.blended_with(prev, params.temporal_smoothing),
        None => current,
    };
    let pixels = apply_bounds(frame.view(), &effective, params.max_gain);
    (frame.with_pixels(pixels), effective)
}
