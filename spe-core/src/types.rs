//! Core types for decoded SPE 3.0 data.
//!
//! This module defines the pixel element types, region-of-interest geometry and
//! the frame grid produced by a load.

use crate::coords::CoordinateSequences;
use crate::decoder::SpeError;
use crate::footer::FooterTree;
use crate::header::HeaderFields;
use crate::metadata::Wavelength;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array2;
use std::fmt;
use std::io::{self, Read, Write};

/// Numeric encoding of each pixel sample in the frame payload.
///
/// The discriminant is the data-type code stored in the binary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ElementType {
    /// 32-bit IEEE float (code 0)
    Float32 = 0,
    /// Signed 32-bit integer (code 1)
    Int32 = 1,
    /// Signed 16-bit integer (code 2)
    Int16 = 2,
    /// Unsigned 16-bit integer (code 3)
    UInt16 = 3,
    /// Unsigned 32-bit integer (code 8)
    UInt32 = 8,
}

impl ElementType {
    /// Maps a header data-type code to its element type.
    ///
    /// Codes outside the fixed table are rejected rather than defaulted.
    pub fn from_code(code: u16) -> Result<Self, SpeError> {
        match code {
            0 => Ok(Self::Float32),
            1 => Ok(Self::Int32),
            2 => Ok(Self::Int16),
            3 => Ok(Self::UInt16),
            8 => Ok(Self::UInt32),
            _ => Err(SpeError::UnknownDataType(code)),
        }
    }

    /// Returns the header code for this element type.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Size of one element in bytes.
    #[inline]
    pub fn size_bytes(self) -> usize {
        match self {
            Self::Int16 | Self::UInt16 => 2,
            Self::Float32 | Self::Int32 | Self::UInt32 => 4,
        }
    }

    /// Short numpy-style name (`"uint16"`, `"float32"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Int32 => "int32",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust scalar type that can appear in an SPE frame payload.
pub trait Element: Copy + Default + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The element type this scalar decodes.
    const ELEMENT_TYPE: ElementType;

    /// Fills `dst` with little-endian samples, failing if the reader runs dry.
    fn read_into<R: Read>(reader: &mut R, dst: &mut [Self]) -> io::Result<()>;

    /// Writes one sample in little-endian order.
    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $read_into:ident, $write:ident) => {
        impl Element for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            #[inline]
            fn read_into<R: Read>(reader: &mut R, dst: &mut [Self]) -> io::Result<()> {
                reader.$read_into::<LittleEndian>(dst)
            }

            #[inline]
            fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
                writer.$write::<LittleEndian>(self)
            }
        }
    };
}

impl_element!(f32, Float32, read_f32_into, write_f32);
impl_element!(i32, Int32, read_i32_into, write_i32);
impl_element!(i16, Int16, read_i16_into, write_i16);
impl_element!(u16, UInt16, read_u16_into, write_u16);
impl_element!(u32, UInt32, read_u32_into, write_u32);

/// One capture sub-window of the sensor.
///
/// All values are in sensor pixels; `width` and `height` span the unbinned
/// extent, so the decoded array has `width / x_binning` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOfInterest {
    /// First sensor column
    pub x: u32,
    /// First sensor row
    pub y: u32,
    /// Unbinned width in pixels
    pub width: u32,
    /// Unbinned height in pixels
    pub height: u32,
    /// Horizontal binning factor
    pub x_binning: u32,
    /// Vertical binning factor
    pub y_binning: u32,
}

impl RegionOfInterest {
    /// Creates an unbinned region.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            x_binning: 1,
            y_binning: 1,
        }
    }

    /// Sets the binning factors.
    pub fn with_binning(mut self, x_binning: u32, y_binning: u32) -> Self {
        self.x_binning = x_binning;
        self.y_binning = y_binning;
        self
    }
}

/// Decoded frames of one element type, indexed by `(frame, region)`.
///
/// Each cell is a `(rows, columns)` array in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGrid<T> {
    cells: Vec<Vec<Array2<T>>>,
}

impl<T: Element> FrameGrid<T> {
    pub(crate) fn from_cells(cells: Vec<Vec<Array2<T>>>) -> Self {
        Self { cells }
    }

    /// Number of frames in the grid.
    pub fn frame_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of regions per frame.
    pub fn region_count(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    /// Returns the array for one frame and region.
    pub fn get(&self, frame: usize, region: usize) -> Option<&Array2<T>> {
        self.cells.get(frame)?.get(region)
    }

    /// Returns all region arrays of one frame.
    pub fn frame(&self, frame: usize) -> Option<&[Array2<T>]> {
        self.cells.get(frame).map(Vec::as_slice)
    }

    /// Iterates over frames, each a slice of region arrays.
    pub fn frames(&self) -> impl Iterator<Item = &[Array2<T>]> {
        self.cells.iter().map(Vec::as_slice)
    }

    /// Consumes the grid, returning the nested cells.
    pub fn into_cells(self) -> Vec<Vec<Array2<T>>> {
        self.cells
    }
}

/// A frame grid tagged with its resolved element type.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    Float32(FrameGrid<f32>),
    Int32(FrameGrid<i32>),
    Int16(FrameGrid<i16>),
    UInt16(FrameGrid<u16>),
    UInt32(FrameGrid<u32>),
}

/// Runs `$body` with `$grid` bound to the typed grid inside a [`FrameData`].
#[macro_export]
macro_rules! with_frame_grid {
    ($data:expr, $grid:ident => $body:expr) => {
        match $data {
            $crate::types::FrameData::Float32($grid) => $body,
            $crate::types::FrameData::Int32($grid) => $body,
            $crate::types::FrameData::Int16($grid) => $body,
            $crate::types::FrameData::UInt16($grid) => $body,
            $crate::types::FrameData::UInt32($grid) => $body,
        }
    };
}

impl FrameData {
    /// The element type of every cell.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Float32(_) => ElementType::Float32,
            Self::Int32(_) => ElementType::Int32,
            Self::Int16(_) => ElementType::Int16,
            Self::UInt16(_) => ElementType::UInt16,
            Self::UInt32(_) => ElementType::UInt32,
        }
    }

    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        with_frame_grid!(self, grid => grid.frame_count())
    }

    /// Number of regions per frame.
    pub fn region_count(&self) -> usize {
        with_frame_grid!(self, grid => grid.region_count())
    }

    /// Shape `(rows, columns)` of one cell.
    pub fn cell_shape(&self, frame: usize, region: usize) -> Option<(usize, usize)> {
        with_frame_grid!(self, grid => grid.get(frame, region).map(|a| a.dim()))
    }

    /// Returns the grid if it holds unsigned 16-bit samples.
    pub fn as_u16(&self) -> Option<&FrameGrid<u16>> {
        match self {
            Self::UInt16(grid) => Some(grid),
            _ => None,
        }
    }

    /// Returns the grid if it holds 32-bit float samples.
    pub fn as_f32(&self) -> Option<&FrameGrid<f32>> {
        match self {
            Self::Float32(grid) => Some(grid),
            _ => None,
        }
    }
}

/// Result of loading an SPE 3.0 file.
#[derive(Debug)]
pub struct SpeFile {
    /// Scalar fields taken from the binary header
    pub header: HeaderFields,
    /// Parsed XML footer
    pub footer: FooterTree,
    /// Regions of interest in declaration order (never empty)
    pub regions: Vec<RegionOfInterest>,
    /// Axis labels per region
    pub coordinates: Vec<CoordinateSequences>,
    /// Wavelength calibration, when the instrument recorded one
    pub wavelength: Option<Wavelength>,
    /// Decoded frame payload
    pub frames: FrameData,
}

impl SpeFile {
    /// Number of frames declared in the header.
    pub fn frame_count(&self) -> usize {
        usize::from(self.header.frame_count)
    }

    /// Number of regions of interest.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Element type of the payload.
    pub fn element_type(&self) -> ElementType {
        self.header.element_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_table() {
        assert_eq!(ElementType::from_code(0).unwrap(), ElementType::Float32);
        assert_eq!(ElementType::from_code(1).unwrap(), ElementType::Int32);
        assert_eq!(ElementType::from_code(2).unwrap(), ElementType::Int16);
        assert_eq!(ElementType::from_code(3).unwrap(), ElementType::UInt16);
        assert_eq!(ElementType::from_code(8).unwrap(), ElementType::UInt32);
    }

    #[test]
    fn test_element_type_unknown_codes() {
        for code in [4, 5, 6, 7, 9, 99, u16::MAX] {
            assert!(matches!(
                ElementType::from_code(code),
                Err(SpeError::UnknownDataType(c)) if c == code
            ));
        }
    }

    #[test]
    fn test_element_type_code_roundtrip_and_size() {
        assert_eq!(ElementType::UInt32.code(), 8);
        assert_eq!(ElementType::UInt16.size_bytes(), 2);
        assert_eq!(ElementType::Float32.size_bytes(), 4);
        assert_eq!(ElementType::Int16.to_string(), "int16");
    }

    #[test]
    fn test_element_read_little_endian() {
        let bytes = [0x01u8, 0x02, 0xFF, 0xFF];
        let mut out = [0u16; 2];
        u16::read_into(&mut &bytes[..], &mut out).unwrap();
        assert_eq!(out, [0x0201, 0xFFFF]);

        let mut signed = [0i16; 2];
        i16::read_into(&mut &bytes[..], &mut signed).unwrap();
        assert_eq!(signed, [0x0201, -1]);
    }

    #[test]
    fn test_element_read_short_input_fails() {
        let bytes = [0x01u8, 0x02, 0x03];
        let mut out = [0u16; 2];
        let err = u16::read_into(&mut &bytes[..], &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_frame_grid_accessors() {
        let cells = vec![
            vec![Array2::<u16>::zeros((2, 3)), Array2::<u16>::zeros((1, 4))],
            vec![Array2::<u16>::zeros((2, 3)), Array2::<u16>::zeros((1, 4))],
        ];
        let data = FrameData::UInt16(FrameGrid::from_cells(cells));
        assert_eq!(data.frame_count(), 2);
        assert_eq!(data.region_count(), 2);
        assert_eq!(data.cell_shape(1, 1), Some((1, 4)));
        assert_eq!(data.cell_shape(2, 0), None);
        assert_eq!(data.element_type(), ElementType::UInt16);
        assert!(data.as_f32().is_none());
    }
}
