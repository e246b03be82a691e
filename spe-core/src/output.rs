//! Output format writers for decoded SPE data.
//!
//! Supports a long-form CSV table and a packed little-endian binary dump.

use crate::coords::CoordinateSequences;
use crate::types::{Element, FrameData, FrameGrid};
use crate::with_frame_grid;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Magic bytes at the start of a binary grid dump.
pub const BINARY_MAGIC: &[u8; 8] = b"SPEGRID\0";

/// Binary dump version.
pub const BINARY_VERSION: u32 = 1;

/// Export formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `frame,region,y,x,value` rows
    Csv,
    /// Packed little-endian samples behind a small header
    Binary,
}

impl std::str::FromStr for OutputFormat {
    type Err = OutputError;

    /// Parses a file extension such as `"csv"` or `"bin"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "bin" => Ok(Self::Binary),
            other => Err(OutputError::InvalidFormat(format!(
                "Unsupported output format: .{}. Use .csv or .bin",
                other
            ))),
        }
    }
}

impl OutputFormat {
    /// Picks the format from a path's extension, defaulting to CSV.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, OutputError> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("csv")
            .parse()
    }
}

fn check_coordinates(data: &FrameData, coordinates: &[CoordinateSequences]) -> Result<(), OutputError> {
    if data.frame_count() > 0 && data.region_count() != coordinates.len() {
        return Err(OutputError::InvalidFormat(format!(
            "{} regions in data but {} coordinate sets",
            data.region_count(),
            coordinates.len()
        )));
    }
    for frame in 0..data.frame_count() {
        for (region, coords) in coordinates.iter().enumerate() {
            let shape = data.cell_shape(frame, region);
            if shape != Some(coords.shape()) {
                return Err(OutputError::InvalidFormat(format!(
                    "frame {} region {} has shape {:?} but coordinates describe {:?}",
                    frame,
                    region,
                    shape,
                    coords.shape()
                )));
            }
        }
    }
    Ok(())
}

/// CSV writer producing one row per sample, labelled with sensor coordinates.
pub struct CsvWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> CsvWriter<W> {
    /// Creates a new CSV writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes the column header.
    pub fn write_header(&mut self) -> Result<(), OutputError> {
        writeln!(self.writer, "frame,region,y,x,value")?;
        Ok(())
    }

    /// Writes every cell of a frame grid.
    pub fn write_frames(
        &mut self,
        data: &FrameData,
        coordinates: &[CoordinateSequences],
    ) -> Result<(), OutputError> {
        check_coordinates(data, coordinates)?;
        with_frame_grid!(data, grid => self.write_grid(grid, coordinates))
    }

    fn write_grid<T: Element>(
        &mut self,
        grid: &FrameGrid<T>,
        coordinates: &[CoordinateSequences],
    ) -> Result<(), OutputError> {
        for (frame, regions) in grid.frames().enumerate() {
            for (region, (array, coords)) in regions.iter().zip(coordinates).enumerate() {
                for (row, y) in coords.y.iter().enumerate() {
                    for (col, x) in coords.x.iter().enumerate() {
                        writeln!(
                            self.writer,
                            "{},{},{},{},{}",
                            frame,
                            region,
                            y,
                            x,
                            array[[row, col]]
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Binary output format for frame grids.
///
/// Layout, all little-endian:
/// - magic `SPEGRID\0` (8 bytes)
/// - version: u32
/// - element type code: u16
/// - frame count: u32
/// - region count: u32
/// - per region: columns u32, rows u32
/// - samples, frame by frame, region by region, row-major
pub struct BinaryWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> BinaryWriter<W> {
    /// Creates a new binary writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes the header describing the grid.
    pub fn write_header(
        &mut self,
        data: &FrameData,
        coordinates: &[CoordinateSequences],
    ) -> Result<(), OutputError> {
        check_coordinates(data, coordinates)?;
        self.writer.write_all(BINARY_MAGIC)?;
        self.writer.write_u32::<LittleEndian>(BINARY_VERSION)?;
        self.writer
            .write_u16::<LittleEndian>(data.element_type().code())?;
        self.writer
            .write_u32::<LittleEndian>(data.frame_count() as u32)?;
        self.writer
            .write_u32::<LittleEndian>(coordinates.len() as u32)?;
        for coords in coordinates {
            self.writer.write_u32::<LittleEndian>(coords.xdim() as u32)?;
            self.writer.write_u32::<LittleEndian>(coords.ydim() as u32)?;
        }
        Ok(())
    }

    /// Writes every sample of a frame grid.
    pub fn write_frames(&mut self, data: &FrameData) -> Result<(), OutputError> {
        with_frame_grid!(data, grid => self.write_grid(grid))
    }

    fn write_grid<T: Element>(&mut self, grid: &FrameGrid<T>) -> Result<(), OutputError> {
        for regions in grid.frames() {
            for array in regions {
                for &value in array.iter() {
                    value.write_le(&mut self.writer)?;
                }
            }
        }
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes a frame grid to a CSV file.
pub fn write_csv<P: AsRef<Path>>(
    path: P,
    data: &FrameData,
    coordinates: &[CoordinateSequences],
) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = CsvWriter::new(file);
    writer.write_header()?;
    writer.write_frames(data, coordinates)?;
    writer.flush()?;
    Ok(())
}

/// Writes a frame grid to a binary file.
pub fn write_binary<P: AsRef<Path>>(
    path: P,
    data: &FrameData,
    coordinates: &[CoordinateSequences],
) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = BinaryWriter::new(file);
    writer.write_header(data, coordinates)?;
    writer.write_frames(data)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{decode_frames, FrameLayout};
    use crate::types::{ElementType, RegionOfInterest};
    use std::str::FromStr;

    fn sample() -> (FrameData, Vec<CoordinateSequences>) {
        let region = RegionOfInterest::new(10, 20, 4, 2).with_binning(2, 1);
        let coords = vec![CoordinateSequences::for_region(&region).unwrap()];
        let layout = FrameLayout::new(ElementType::UInt16, 1, &coords);
        let bytes: Vec<u8> = [1u16, 2, 3, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        (decode_frames(&bytes[..], &layout).unwrap(), coords)
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str("csv").unwrap(), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_str(".BIN").unwrap(), OutputFormat::Binary);
        assert!(OutputFormat::from_str("tiff").is_err());
        assert_eq!(
            OutputFormat::from_path("out/frames.csv").unwrap(),
            OutputFormat::Csv
        );
        assert_eq!(OutputFormat::from_path("noext").unwrap(), OutputFormat::Csv);
    }

    #[test]
    fn test_csv_writer_labels_with_coordinates() {
        let (data, coords) = sample();
        let mut output = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut output);
            writer.write_header().unwrap();
            writer.write_frames(&data, &coords).unwrap();
            writer.flush().unwrap();
        }

        let output_str = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output_str.lines().collect();
        assert_eq!(
            lines,
            vec![
                "frame,region,y,x,value",
                "0,0,20,10,1",
                "0,0,20,12,2",
                "0,0,21,10,3",
                "0,0,21,12,4",
            ]
        );
    }

    #[test]
    fn test_csv_writer_rejects_mismatched_coordinates() {
        let (data, _) = sample();
        let mut output = Vec::new();
        let mut writer = CsvWriter::new(&mut output);
        assert!(writer.write_frames(&data, &[]).is_err());
    }

    #[test]
    fn test_writers_reject_coordinates_of_wrong_shape() {
        let (data, _) = sample();
        // Data cell is 2 rows x 2 columns; these coordinates describe 1 x 5
        let wrong = vec![
            CoordinateSequences::for_region(&RegionOfInterest::new(0, 0, 5, 1)).unwrap(),
        ];

        let mut output = Vec::new();
        let mut csv = CsvWriter::new(&mut output);
        assert!(matches!(
            csv.write_frames(&data, &wrong),
            Err(OutputError::InvalidFormat(_))
        ));

        let mut output = Vec::new();
        let mut binary = BinaryWriter::new(&mut output);
        assert!(matches!(
            binary.write_header(&data, &wrong),
            Err(OutputError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_binary_writer_layout() {
        let (data, coords) = sample();
        let mut output = Vec::new();
        {
            let mut writer = BinaryWriter::new(&mut output);
            writer.write_header(&data, &coords).unwrap();
            writer.write_frames(&data).unwrap();
            writer.flush().unwrap();
        }

        assert_eq!(&output[0..8], BINARY_MAGIC);
        assert_eq!(u32::from_le_bytes(output[8..12].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(output[12..14].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(output[14..18].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(output[18..22].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(output[22..26].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(output[26..30].try_into().unwrap()), 2);
        assert_eq!(&output[30..], &[1u8, 0, 2, 0, 3, 0, 4, 0]);
    }
}
