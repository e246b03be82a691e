//! Top-level SPE 3.0 file loading.
//!
//! This module ties the header, footer, metadata, coordinate and frame readers
//! together into a single load operation and defines the error type shared by
//! all of them.

use crate::coords::{build_coordinates, CoordinateSequences};
use crate::footer::read_footer;
use crate::frames::{read_frames, FrameLayout};
use crate::header::{read_header, HeaderFields};
use crate::metadata::extract_metadata;
use crate::types::SpeFile;
use std::path::Path;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors that can occur while loading an SPE 3.0 file.
#[derive(Error, Debug)]
pub enum SpeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File too short for the 4100-byte header ({len} bytes)")]
    TruncatedHeader { len: u64 },

    #[error("Frame payload ended early at frame {frame}, region {region} (expected {expected} elements)")]
    TruncatedPayload {
        frame: usize,
        region: usize,
        expected: usize,
    },

    #[error("Footer offset {offset} outside file bounds ({file_len} bytes)")]
    FooterOutOfBounds { offset: u64, file_len: u64 },

    #[error("Footer is not valid UTF-8: {0}")]
    FooterEncoding(#[from] FromUtf8Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed footer: {0}")]
    MalformedFooter(String),

    #[error("Missing required metadata node: {0}")]
    MissingNode(String),

    #[error("Unknown data type code: {0}")]
    UnknownDataType(u16),

    #[error("Invalid region geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),
}

/// Broad classification of a [`SpeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File missing, truncated, or unreadable
    Io,
    /// Content present but semantically invalid
    Format,
}

impl SpeError {
    /// Classifies the error as an I/O or a format failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::TruncatedHeader { .. } | Self::TruncatedPayload { .. } => {
                ErrorKind::Io
            }
            Self::FooterOutOfBounds { .. }
            | Self::FooterEncoding(_)
            | Self::Xml(_)
            | Self::MalformedFooter(_)
            | Self::MissingNode(_)
            | Self::UnknownDataType(_)
            | Self::InvalidGeometry(_)
            | Self::InvalidFormat(_) => ErrorKind::Format,
        }
    }

    /// True for missing, truncated or unreadable files.
    pub fn is_io(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    /// True for structurally present but invalid content.
    pub fn is_format(&self) -> bool {
        self.kind() == ErrorKind::Format
    }
}

/// Loads an SPE 3.0 file from disk.
///
/// Reads the header and footer, resolves region geometry and element type,
/// then decodes every frame. Any failure aborts the whole load; no partial
/// grid is returned.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<SpeFile, SpeError> {
    let path = path.as_ref();

    let header = read_header(path)?;
    let fields = HeaderFields::extract(&header)?;
    drop(header);

    let footer = read_footer(path)?;
    let metadata = extract_metadata(&footer)?;
    let coordinates = build_coordinates(&metadata.regions)?;

    check_legacy_dimensions(&fields, &coordinates);

    let layout = FrameLayout::new(
        fields.element_type,
        usize::from(fields.frame_count),
        &coordinates,
    )
    .with_payload_end(fields.footer_offset);
    let frames = read_frames(path, &layout)?;

    log::info!(
        "Loaded {:?}: {} frames x {} regions of {}",
        path,
        fields.frame_count,
        metadata.regions.len(),
        fields.element_type
    );

    Ok(SpeFile {
        header: fields,
        footer,
        regions: metadata.regions,
        coordinates,
        wavelength: metadata.wavelength,
        frames,
    })
}

/// Compares the informational header dimensions against single-region geometry.
///
/// Region metadata always wins; a mismatch is only reported.
fn check_legacy_dimensions(fields: &HeaderFields, coordinates: &[CoordinateSequences]) {
    if let [only] = coordinates {
        let (xdim, ydim) = (only.xdim(), only.ydim());
        if usize::try_from(fields.legacy_xdim).ok() != Some(xdim)
            || usize::try_from(fields.legacy_ydim).ok() != Some(ydim)
        {
            log::warn!(
                "Header dimensions {}x{} disagree with region geometry {}x{}; using region geometry",
                fields.legacy_xdim,
                fields.legacy_ydim,
                xdim,
                ydim
            );
        }
    }
}
