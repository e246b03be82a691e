//! Axis coordinates for each region of interest.
//!
//! Every decoded column (row) is labelled with the first sensor column (row)
//! it was binned from. Axes are stored as `start, step, len` and only
//! expanded on request.

use crate::decoder::SpeError;
use crate::types::RegionOfInterest;

/// An arithmetic sequence of sensor-pixel labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Axis {
    start: u32,
    step: u32,
    len: usize,
}

impl Axis {
    /// Labels `start, start + step, ...` strictly below `start + extent`.
    ///
    /// Fails for zero step, extents that are not a whole number of steps, or
    /// ranges reaching past `u32::MAX`. A zero extent gives an empty axis.
    pub fn new(name: &str, start: u32, extent: u32, step: u32) -> Result<Self, SpeError> {
        if step == 0 {
            return Err(SpeError::InvalidGeometry(format!(
                "{} binning must be positive",
                name
            )));
        }
        if extent % step != 0 {
            return Err(SpeError::InvalidGeometry(format!(
                "{} extent {} is not a multiple of binning {}",
                name, extent, step
            )));
        }
        start.checked_add(extent).ok_or_else(|| {
            SpeError::InvalidGeometry(format!("{} range {}+{} overflows", name, start, extent))
        })?;

        Ok(Self {
            start,
            step,
            len: (extent / step) as usize,
        })
    }

    /// First label.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Distance between consecutive labels (the binning factor).
    pub fn step(&self) -> u32 {
        self.step
    }

    /// One past the last sensor pixel covered, `start + len * step`.
    pub fn end(&self) -> u32 {
        self.start + self.len as u32 * self.step
    }

    /// Number of labels.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Label at `index`, if in range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<u32> {
        (index < self.len).then(|| self.start + index as u32 * self.step)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).map(move |i| self.start + i as u32 * self.step)
    }

    /// Expands the axis into a vector of labels.
    pub fn to_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }
}

/// Sensor-pixel labels for the axes of one region's array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateSequences {
    /// Column labels, `x, x + x_binning, ...` below `x + width`
    pub x: Axis,
    /// Row labels, `y, y + y_binning, ...` below `y + height`
    pub y: Axis,
}

impl CoordinateSequences {
    /// Derives the coordinate sequences of a region.
    pub fn for_region(region: &RegionOfInterest) -> Result<Self, SpeError> {
        Ok(Self {
            x: Axis::new("x", region.x, region.width, region.x_binning)?,
            y: Axis::new("y", region.y, region.height, region.y_binning)?,
        })
    }

    /// Number of columns in the region's array.
    #[inline]
    pub fn xdim(&self) -> usize {
        self.x.len()
    }

    /// Number of rows in the region's array.
    #[inline]
    pub fn ydim(&self) -> usize {
        self.y.len()
    }

    /// Array shape `(rows, columns)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.ydim(), self.xdim())
    }
}

/// Builds coordinate sequences for every region, in order.
pub fn build_coordinates(regions: &[RegionOfInterest]) -> Result<Vec<CoordinateSequences>, SpeError> {
    regions.iter().map(CoordinateSequences::for_region).collect()
}
