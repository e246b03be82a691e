//! SPE 3.0 decoder library for Princeton Instruments LightField files.
//!
//! An SPE 3.0 file is a 4100-byte binary header, the raw frame payload, and a
//! trailing XML footer describing the capture. This crate reads the header and
//! footer, resolves region-of-interest geometry and sample type, and decodes
//! the payload into one 2-D array per frame and region.
//!
//! # Example
//!
//! ```no_run
//! use spe_core::load_file;
//!
//! let spe = load_file("spectrum.spe").unwrap();
//!
//! println!("{} frames x {} regions of {}", spe.frame_count(), spe.region_count(), spe.element_type());
//! if let Some(shape) = spe.frames.cell_shape(0, 0) {
//!     println!("First region: {} rows x {} columns", shape.0, shape.1);
//! }
//! ```
//!
//! # Features
//!
//! - Single and multi-region captures, with binning
//! - All SPE sample types (float32, int32, int16, uint16, uint32)
//! - Typed XML footer tree with path lookups and an outline printer
//! - Optional wavelength calibration
//! - CSV and binary export

pub mod coords;
pub mod decoder;
pub mod footer;
pub mod frames;
pub mod header;
pub mod metadata;
pub mod output;
pub mod types;

// Re-export commonly used types
pub use coords::{build_coordinates, Axis, CoordinateSequences};
pub use decoder::{load_file, ErrorKind, SpeError};
pub use footer::{read_footer, FooterTree, XmlNode};
pub use frames::{read_frames, FrameLayout};
pub use header::{read_header, HeaderFields, RawHeader, HEADER_SIZE};
pub use metadata::{extract_metadata, FooterMetadata, Wavelength};
pub use output::{OutputError, OutputFormat};
pub use types::{Element, ElementType, FrameData, FrameGrid, RegionOfInterest, SpeFile};
