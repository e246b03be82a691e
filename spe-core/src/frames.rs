//! Bulk decoding of the frame payload.
//!
//! The payload starts right after the binary header and holds, for each
//! frame, each region's samples back to back with no padding. Every cell is
//! read in file order and reshaped to `(rows, columns)`.

use crate::coords::CoordinateSequences;
use crate::decoder::SpeError;
use crate::header::HEADER_SIZE;
use crate::types::{Element, ElementType, FrameData, FrameGrid};
use ndarray::Array2;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Everything needed to interpret the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    /// Sample encoding
    pub element_type: ElementType,
    /// Number of frames to decode
    pub frame_count: usize,
    /// `(rows, columns)` of each region, in file order
    pub region_shapes: Vec<(usize, usize)>,
    /// Absolute offset where the payload must end (the footer start)
    pub payload_end: Option<u64>,
}

impl FrameLayout {
    /// Builds a layout from per-region coordinate sequences.
    pub fn new(
        element_type: ElementType,
        frame_count: usize,
        coordinates: &[CoordinateSequences],
    ) -> Self {
        Self::from_shapes(
            element_type,
            frame_count,
            coordinates.iter().map(CoordinateSequences::shape).collect(),
        )
    }

    /// Builds a layout from explicit `(rows, columns)` shapes.
    pub fn from_shapes(
        element_type: ElementType,
        frame_count: usize,
        region_shapes: Vec<(usize, usize)>,
    ) -> Self {
        Self {
            element_type,
            frame_count,
            region_shapes,
            payload_end: None,
        }
    }

    /// Bounds the payload so reads never run into the footer.
    pub fn with_payload_end(mut self, offset: u64) -> Self {
        self.payload_end = Some(offset);
        self
    }

    /// Number of regions per frame.
    pub fn region_count(&self) -> usize {
        self.region_shapes.len()
    }

    /// Samples in one frame, across all regions; `None` on overflow.
    pub fn frame_elements(&self) -> Option<usize> {
        self.region_shapes
            .iter()
            .try_fold(0usize, |total, &(rows, cols)| total.checked_add(rows.checked_mul(cols)?))
    }

    /// Total payload size in bytes; `None` on overflow.
    pub fn payload_bytes(&self) -> Option<u64> {
        let frame_bytes = (self.frame_elements()? as u64)
            .checked_mul(self.element_type.size_bytes() as u64)?;
        frame_bytes.checked_mul(self.frame_count as u64)
    }

    /// Finds the first cell that does not fit in `available` payload bytes.
    ///
    /// Returns `(frame, region, expected_elements)` of that cell, or `None`
    /// when the whole layout fits.
    pub fn first_short_cell(&self, available: u64) -> Option<(usize, usize, usize)> {
        if self.payload_bytes().is_some_and(|needed| needed <= available) {
            return None;
        }

        let size = self.element_type.size_bytes() as u64;
        let mut consumed = 0u64;
        for frame in 0..self.frame_count {
            for (region, &(rows, cols)) in self.region_shapes.iter().enumerate() {
                let end = (rows as u64)
                    .checked_mul(cols as u64)
                    .and_then(|n| n.checked_mul(size))
                    .and_then(|bytes| consumed.checked_add(bytes));
                match end {
                    Some(end) if end <= available => consumed = end,
                    _ => return Some((frame, region, rows.saturating_mul(cols))),
                }
            }
        }
        None
    }
}

/// Reads and decodes every frame of an SPE file.
///
/// Seeks straight past the header; the header bytes are not read again. The
/// payload ends at `payload_end` when set, otherwise at end of file. A layout
/// that does not fit is rejected before any sample buffer is allocated. The
/// file is closed on return, including on error.
pub fn read_frames<P: AsRef<Path>>(path: P, layout: &FrameLayout) -> Result<FrameData, SpeError> {
    let mut file = File::open(path.as_ref())?;
    let end = match layout.payload_end {
        Some(end) => end,
        None => file.metadata()?.len(),
    };
    let available = end.saturating_sub(HEADER_SIZE as u64);

    if let Some((frame, region, expected)) = layout.first_short_cell(available) {
        return Err(SpeError::TruncatedPayload {
            frame,
            region,
            expected,
        });
    }

    log::debug!(
        "Reading {} frames x {} regions ({} of {} payload bytes as {})",
        layout.frame_count,
        layout.region_count(),
        layout.payload_bytes().unwrap_or(0),
        available,
        layout.element_type
    );

    file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
    decode_frames(BufReader::new(file.take(available)), layout)
}

/// Decodes frames from a reader positioned at the start of the payload.
pub fn decode_frames<R: Read>(mut reader: R, layout: &FrameLayout) -> Result<FrameData, SpeError> {
    Ok(match layout.element_type {
        ElementType::Float32 => FrameData::Float32(decode_grid(&mut reader, layout)?),
        ElementType::Int32 => FrameData::Int32(decode_grid(&mut reader, layout)?),
        ElementType::Int16 => FrameData::Int16(decode_grid(&mut reader, layout)?),
        ElementType::UInt16 => FrameData::UInt16(decode_grid(&mut reader, layout)?),
        ElementType::UInt32 => FrameData::UInt32(decode_grid(&mut reader, layout)?),
    })
}

fn decode_grid<T: Element, R: Read>(
    reader: &mut R,
    layout: &FrameLayout,
) -> Result<FrameGrid<T>, SpeError> {
    debug_assert_eq!(T::ELEMENT_TYPE, layout.element_type);

    let mut cells = Vec::with_capacity(layout.frame_count);

    for frame in 0..layout.frame_count {
        let mut regions = Vec::with_capacity(layout.region_count());

        for (region, &(rows, cols)) in layout.region_shapes.iter().enumerate() {
            let expected = rows.checked_mul(cols).ok_or_else(|| {
                SpeError::InvalidFormat(format!("region {} of {}x{} is too large", region, rows, cols))
            })?;
            let mut samples = vec![T::default(); expected];

            T::read_into(reader, &mut samples).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => SpeError::TruncatedPayload {
                    frame,
                    region,
                    expected,
                },
                _ => SpeError::Io(e),
            })?;

            let array = Array2::from_shape_vec((rows, cols), samples)
                .map_err(|e| SpeError::InvalidFormat(format!("cannot shape region: {}", e)))?;
            regions.push(array);
        }

        cells.push(regions);
    }

    Ok(FrameGrid::from_cells(cells))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn u16_bytes(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_row_major() {
        let layout = FrameLayout::from_shapes(ElementType::UInt16, 1, vec![(2, 3)]);
        let bytes = u16_bytes(&[1, 2, 3, 4, 5, 6]);

        let data = decode_frames(&bytes[..], &layout).unwrap();
        let grid = data.as_u16().unwrap();
        assert_eq!(grid.get(0, 0).unwrap(), &array![[1u16, 2, 3], [4, 5, 6]]);
    }

    #[test]
    fn test_decode_frames_and_regions_in_file_order() {
        // Two frames, regions of 1x2 and 2x1
        let layout = FrameLayout::from_shapes(ElementType::UInt16, 2, vec![(1, 2), (2, 1)]);
        let bytes = u16_bytes(&[10, 11, 20, 21, 30, 31, 40, 41]);

        let data = decode_frames(&bytes[..], &layout).unwrap();
        let grid = data.as_u16().unwrap();
        assert_eq!(grid.frame_count(), 2);
        assert_eq!(grid.region_count(), 2);
        assert_eq!(grid.get(0, 0).unwrap(), &array![[10u16, 11]]);
        assert_eq!(grid.get(0, 1).unwrap(), &array![[20u16], [21]]);
        assert_eq!(grid.get(1, 0).unwrap(), &array![[30u16, 31]]);
        assert_eq!(grid.get(1, 1).unwrap(), &array![[40u16], [41]]);
    }

    #[test]
    fn test_decode_float32() {
        let layout = FrameLayout::from_shapes(ElementType::Float32, 1, vec![(1, 2)]);
        let bytes: Vec<u8> = [1.5f32, -2.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();

        let data = decode_frames(&bytes[..], &layout).unwrap();
        assert_eq!(data.element_type(), ElementType::Float32);
        assert_eq!(data.as_f32().unwrap().get(0, 0).unwrap(), &array![[1.5f32, -2.25]]);
    }

    #[test]
    fn test_decode_signed_and_wide_types() {
        let layout = FrameLayout::from_shapes(ElementType::Int32, 1, vec![(1, 1)]);
        let data = decode_frames(&(-7i32).to_le_bytes()[..], &layout).unwrap();
        assert!(matches!(data, FrameData::Int32(ref g) if g.get(0, 0).unwrap()[[0, 0]] == -7));

        let layout = FrameLayout::from_shapes(ElementType::UInt32, 1, vec![(1, 1)]);
        let data = decode_frames(&70_000u32.to_le_bytes()[..], &layout).unwrap();
        assert!(matches!(data, FrameData::UInt32(ref g) if g.get(0, 0).unwrap()[[0, 0]] == 70_000));
    }

    #[test]
    fn test_truncated_payload_reports_cell() {
        let layout = FrameLayout::from_shapes(ElementType::UInt16, 2, vec![(2, 2)]);
        // One full frame plus half of the second
        let bytes = u16_bytes(&[1, 2, 3, 4, 5, 6]);

        let err = decode_frames(&bytes[..], &layout).unwrap_err();
        assert!(matches!(
            err,
            SpeError::TruncatedPayload {
                frame: 1,
                region: 0,
                expected: 4
            }
        ));
        assert!(err.is_io());
    }

    #[test]
    fn test_layout_sizes() {
        let layout = FrameLayout::from_shapes(ElementType::UInt32, 3, vec![(2, 4), (1, 10)]);
        assert_eq!(layout.region_count(), 2);
        assert_eq!(layout.frame_elements(), Some(18));
        assert_eq!(layout.payload_bytes(), Some(18 * 4 * 3));

        let huge = FrameLayout::from_shapes(ElementType::UInt16, 2, vec![(usize::MAX, 2)]);
        assert_eq!(huge.frame_elements(), None);
        assert_eq!(huge.payload_bytes(), None);
    }

    #[test]
    fn test_first_short_cell() {
        let layout = FrameLayout::from_shapes(ElementType::UInt16, 2, vec![(1, 2), (2, 2)]);
        // 12 bytes per frame
        assert_eq!(layout.first_short_cell(24), None);
        assert_eq!(layout.first_short_cell(20), Some((1, 1, 4)));
        assert_eq!(layout.first_short_cell(3), Some((0, 0, 2)));

        let huge = FrameLayout::from_shapes(
            ElementType::UInt16,
            1,
            vec![(u32::MAX as usize, u32::MAX as usize)],
        );
        assert!(matches!(huge.first_short_cell(4), Some((0, 0, _))));
    }

    #[test]
    fn test_read_frames_stops_at_payload_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.spe");
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes.extend(u16_bytes(&[1, 2, 3, 4]));
        bytes.extend_from_slice(b"<SpeFormat/>");
        std::fs::write(&path, &bytes).unwrap();

        let end = (HEADER_SIZE + 8) as u64;
        let ok = FrameLayout::from_shapes(ElementType::UInt16, 1, vec![(1, 4)]).with_payload_end(end);
        assert!(read_frames(&path, &ok).is_ok());

        // Without an explicit end the payload runs to end of file
        let unbounded = FrameLayout::from_shapes(ElementType::UInt16, 1, vec![(1, 4)]);
        assert!(read_frames(&path, &unbounded).is_ok());

        // A second frame would have to be decoded from footer bytes
        let too_many =
            FrameLayout::from_shapes(ElementType::UInt16, 2, vec![(1, 4)]).with_payload_end(end);
        assert!(matches!(
            read_frames(&path, &too_many),
            Err(SpeError::TruncatedPayload { frame: 1, .. })
        ));
    }
}
