//! Capture metadata recovered from the XML footer.
//!
//! Region-of-interest geometry is required; the wavelength calibration is
//! optional because not every instrument records one.

use crate::decoder::SpeError;
use crate::footer::{FooterTree, XmlNode};
use crate::types::RegionOfInterest;

/// Path of the active camera description.
pub const CAMERA_PATH: &str =
    "SpeFormat.DataHistories.DataHistory.Origin.Experiment.Devices.Cameras.Camera";

/// Path of the region declarations, relative to the camera node.
pub const REGIONS_PATH: &str = "ReadoutControl.RegionsOfInterest.CustomRegions.RegionOfInterest";

/// Path of the wavelength calibration.
pub const WAVELENGTH_PATH: &str = "SpeFormat.Calibrations.WavelengthMapping.Wavelength";

/// Wavelength calibration text, one value per sensor column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wavelength {
    text: String,
}

impl Wavelength {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The calibration exactly as stored in the footer.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parses the comma-separated calibration into numbers.
    pub fn values(&self) -> Result<Vec<f64>, SpeError> {
        self.text
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.parse::<f64>().map_err(|_| {
                    SpeError::InvalidFormat(format!("wavelength value {:?} is not a number", v))
                })
            })
            .collect()
    }
}

/// Metadata extracted from a footer.
#[derive(Debug, Clone, PartialEq)]
pub struct FooterMetadata {
    /// Regions in declaration order (at least one)
    pub regions: Vec<RegionOfInterest>,
    /// Wavelength calibration, `None` when not recorded
    pub wavelength: Option<Wavelength>,
}

impl FooterMetadata {
    /// Number of regions of interest.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

/// Extracts region geometry and wavelength calibration from a footer.
///
/// Missing camera or region declarations are an error; a missing wavelength
/// calibration yields `wavelength: None`.
pub fn extract_metadata(footer: &FooterTree) -> Result<FooterMetadata, SpeError> {
    let camera = footer
        .lookup(CAMERA_PATH)
        .ok_or_else(|| SpeError::MissingNode(CAMERA_PATH.to_string()))?;

    let regions = normalize_regions(camera.descend_all(REGIONS_PATH))
        .ok_or_else(|| SpeError::MissingNode(format!("{}.{}", CAMERA_PATH, REGIONS_PATH)))?
        .into_iter()
        .map(parse_region)
        .collect::<Result<Vec<_>, _>>()?;

    let wavelength = footer
        .lookup(WAVELENGTH_PATH)
        .map(|node| Wavelength::new(node.text().trim()));

    if wavelength.is_none() {
        log::debug!("No wavelength calibration in footer");
    }

    Ok(FooterMetadata {
        regions,
        wavelength,
    })
}

/// Region declarations may appear as one element or as several siblings.
///
/// Both forms become a list in document order; an empty match is `None`.
pub fn normalize_regions(nodes: Vec<&XmlNode>) -> Option<Vec<&XmlNode>> {
    if nodes.is_empty() {
        return None;
    }
    log::debug!("{} region(s) of interest declared", nodes.len());
    Some(nodes)
}

/// Parses the geometry attributes of one `RegionOfInterest` element.
pub fn parse_region(node: &XmlNode) -> Result<RegionOfInterest, SpeError> {
    Ok(RegionOfInterest {
        x: region_attr(node, "x")?,
        y: region_attr(node, "y")?,
        width: region_attr(node, "width")?,
        height: region_attr(node, "height")?,
        x_binning: region_attr(node, "xBinning")?,
        y_binning: region_attr(node, "yBinning")?,
    })
}

fn region_attr(node: &XmlNode, name: &str) -> Result<u32, SpeError> {
    let value = node.attr(name).ok_or_else(|| {
        SpeError::InvalidGeometry(format!("region is missing attribute {:?}", name))
    })?;
    value.trim().parse().map_err(|_| {
        SpeError::InvalidGeometry(format!(
            "region attribute {}={:?} is not a non-negative integer",
            name, value
        ))
    })
}
