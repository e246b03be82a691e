//! Fixed-size binary header of SPE 3.0 files.
//!
//! The first 4100 bytes of every file form a legacy binary header. Only a
//! handful of fields are still meaningful in version 3.0; this module reads the
//! raw block and extracts those fields at their documented offsets.

use crate::decoder::SpeError;
use crate::types::ElementType;
use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Size of the binary header in bytes. Frame data starts right after it.
pub const HEADER_SIZE: usize = 4100;

// ============================================================================
// Field offsets (all little-endian)
// ============================================================================

/// Legacy x dimension, i16.
pub const XDIM_OFFSET: usize = 42;
/// Data-type code, u16.
pub const DATA_TYPE_OFFSET: usize = 108;
/// Legacy y dimension, i16.
pub const YDIM_OFFSET: usize = 656;
/// Absolute byte offset of the XML footer, u64.
pub const FOOTER_OFFSET_OFFSET: usize = 678;
/// Number of frames, u16.
pub const FRAME_COUNT_OFFSET: usize = 1446;

/// The raw header block.
#[derive(Clone, PartialEq, Eq)]
pub struct RawHeader {
    bytes: Box<[u8; HEADER_SIZE]>,
}

impl std::fmt::Debug for RawHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHeader")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl RawHeader {
    /// Wraps a byte slice, which must hold at least [`HEADER_SIZE`] bytes.
    ///
    /// Bytes beyond the header are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SpeError> {
        let block = bytes
            .get(..HEADER_SIZE)
            .ok_or(SpeError::TruncatedHeader {
                len: bytes.len() as u64,
            })?;
        let mut header = Box::new([0u8; HEADER_SIZE]);
        header.copy_from_slice(block);
        Ok(Self { bytes: header })
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        LittleEndian::read_u16(&self.bytes[offset..offset + 2])
    }

    #[inline]
    pub fn read_i16(&self, offset: usize) -> i16 {
        LittleEndian::read_i16(&self.bytes[offset..offset + 2])
    }

    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        LittleEndian::read_u64(&self.bytes[offset..offset + 8])
    }
}

/// Reads the binary header of an SPE file.
///
/// The file is opened, read and closed within this call.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<RawHeader, SpeError> {
    let mut file = File::open(path.as_ref())?;
    let mut bytes = Box::new([0u8; HEADER_SIZE]);

    file.read_exact(&mut bytes[..]).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            let len = file.metadata().map(|m| m.len()).unwrap_or(0);
            SpeError::TruncatedHeader { len }
        } else {
            SpeError::Io(e)
        }
    })?;

    Ok(RawHeader { bytes })
}

/// Scalar fields extracted from the binary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFields {
    /// Number of frames in the payload
    pub frame_count: u16,
    /// Raw data-type code
    pub data_type_code: u16,
    /// Element type resolved from `data_type_code`
    pub element_type: ElementType,
    /// Absolute byte offset of the XML footer
    pub footer_offset: u64,
    /// Legacy x dimension; informational only
    pub legacy_xdim: i16,
    /// Legacy y dimension; informational only
    pub legacy_ydim: i16,
}

impl HeaderFields {
    /// Extracts the documented fields from a raw header.
    ///
    /// Fails on an unrecognized data-type code.
    pub fn extract(header: &RawHeader) -> Result<Self, SpeError> {
        let data_type_code = header.read_u16(DATA_TYPE_OFFSET);
        let element_type = ElementType::from_code(data_type_code)?;

        let fields = Self {
            frame_count: header.read_u16(FRAME_COUNT_OFFSET),
            data_type_code,
            element_type,
            footer_offset: header.read_u64(FOOTER_OFFSET_OFFSET),
            legacy_xdim: header.read_i16(XDIM_OFFSET),
            legacy_ydim: header.read_i16(YDIM_OFFSET),
        };

        log::debug!(
            "Header: {} frames, type code {} ({}), footer at {}, legacy dims {}x{}",
            fields.frame_count,
            fields.data_type_code,
            fields.element_type,
            fields.footer_offset,
            fields.legacy_xdim,
            fields.legacy_ydim
        );

        Ok(fields)
    }
}
