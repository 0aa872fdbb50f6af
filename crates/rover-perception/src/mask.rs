//! Binary membership masks over a frame's pixel grid.

use rover_types::RoverError;

/// A 2-D grid of booleans with the same extent as the frame it was derived
/// from.  Row 0 is the top of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

impl Mask {
    /// An all-false mask.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width * height],
        }
    }

    /// An all-true mask.
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![true; width * height],
        }
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut bits = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Membership of pixel `(x, y)`; out-of-range pixels are never members.
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.bits[y * self.width + x]
    }

    /// Set membership of pixel `(x, y)`.  Out-of-range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        if x < self.width && y < self.height {
            self.bits[y * self.width + x] = value;
        }
    }

    /// Number of member pixels.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Iterate `(x, y)` of every member pixel in row-major order.
    pub fn iter_set(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let width = self.width;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(move |(i, _)| (i % width, i / width))
    }

    /// Pixel-wise AND.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::MalformedFrame`] when the extents differ.
    pub fn intersect(&self, other: &Mask) -> Result<Mask, RoverError> {
        self.check_extent(other)?;
        Ok(self.zip_with(other, |a, b| a && b))
    }

    /// Pixels inside `region` that are *not* in `self`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::MalformedFrame`] when the extents differ.
    pub fn complement_within(&self, region: &Mask) -> Result<Mask, RoverError> {
        self.check_extent(region)?;
        Ok(self.zip_with(region, |a, r| !a && r))
    }

    fn zip_with(&self, other: &Mask, f: impl Fn(bool, bool) -> bool) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            bits: self
                .bits
                .iter()
                .zip(&other.bits)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    fn check_extent(&self, other: &Mask) -> Result<(), RoverError> {
        if self.width != other.width || self.height != other.height {
            return Err(RoverError::MalformedFrame(format!(
                "mask extent {}x{} does not match {}x{}",
                self.width, self.height, other.width, other.height
            )));
        }
        Ok(())
    }
}
