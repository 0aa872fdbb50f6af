//! Colour-threshold terrain segmentation of the top-down view.
//!
//! Bright ground reflects evenly across all three channels, so navigable
//! terrain is any pixel whose R, G and B all exceed a threshold.  Samples
//! (points of interest) are yellow: strong red and green with little blue.
//! Everything inside the camera's field of view that is not navigable is
//! obstacle evidence.

use rover_types::{Frame, RoverError};
use serde::{Deserialize, Serialize};

use crate::mask::Mask;

/// RGB thresholds for the two colour tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorThresholds {
    /// Every channel must be strictly above these values.
    pub navigable: [u8; 3],
    /// Red and green strictly above `[0]`/`[1]`, blue strictly below `[2]`.
    pub sample: [u8; 3],
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            navigable: [160, 160, 160],
            sample: [110, 110, 50],
        }
    }
}

/// The three per-class masks for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMasks {
    pub navigable: Mask,
    pub obstacle: Mask,
    pub sample: Mask,
}

impl TerrainMasks {
    /// Render the display overlay: channel 0 obstacle, channel 1 sample,
    /// channel 2 navigable, each 0 or 255.
    pub fn overlay(&self) -> Frame {
        let (w, h) = (self.navigable.width(), self.navigable.height());
        let mut out = Frame::filled(w, h, [0, 0, 0]);
        for y in 0..h {
            for x in 0..w {
                let on = |m: &Mask| if m.get(x, y) { 255 } else { 0 };
                out.set_pixel(x, y, [on(&self.obstacle), on(&self.sample), on(&self.navigable)]);
            }
        }
        out
    }
}

/// Pixels whose every channel strictly exceeds `rgb`.
pub fn navigable_pixels(frame: &Frame, rgb: [u8; 3]) -> Mask {
    Mask::from_fn(frame.width(), frame.height(), |x, y| {
        let p = frame.pixel(x, y);
        p[0] > rgb[0] && p[1] > rgb[1] && p[2] > rgb[2]
    })
}

/// Pixels with red and green above `rgb[0..2]` and blue below `rgb[2]`.
pub fn sample_pixels(frame: &Frame, rgb: [u8; 3]) -> Mask {
    Mask::from_fn(frame.width(), frame.height(), |x, y| {
        let p = frame.pixel(x, y);
        p[0] > rgb[0] && p[1] > rgb[1] && p[2] < rgb[2]
    })
}

/// Segment a top-down `frame` into navigable, obstacle and sample masks,
/// all restricted to `view`.
///
/// `view` is the field-of-view mask from the perspective warp, optionally
/// intersected with a range limit.  Pixels outside it are evidence of
/// nothing.
///
/// # Errors
///
/// Returns [`RoverError::MalformedFrame`] when `view` and `frame` differ in
/// extent.
pub fn classify(
    frame: &Frame,
    view: &Mask,
    thresholds: &ColorThresholds,
) -> Result<TerrainMasks, RoverError> {
    let navigable = navigable_pixels(frame, thresholds.navigable).intersect(view)?;
    let obstacle = navigable.complement_within(view)?;
    let sample = sample_pixels(frame, thresholds.sample).intersect(view)?;
    Ok(TerrainMasks {
        navigable,
        obstacle,
        sample,
    })
}
