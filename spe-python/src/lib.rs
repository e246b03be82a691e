//! Python bindings for the SPE 3.0 decoder with numpy support.
//!
//! Frames are returned as nested lists (`frames[frame][region]`) of 2-D numpy
//! arrays in the file's native sample type.

use numpy::{Element as NumpyElement, IntoPyArray, PyArray1};
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use spe_core::coords::Axis;
use spe_core::{load_file, FrameData, FrameGrid, SpeError, SpeFile};
use std::path::PathBuf;

fn to_py_err(err: SpeError) -> PyErr {
    if err.is_io() {
        PyIOError::new_err(format!("Failed to load file: {}", err))
    } else {
        PyValueError::new_err(format!("Invalid SPE file: {}", err))
    }
}

fn grid_to_list<T>(py: Python<'_>, grid: &FrameGrid<T>) -> PyObject
where
    T: spe_core::Element + NumpyElement,
{
    let frames: Vec<PyObject> = grid
        .frames()
        .map(|regions| {
            let arrays: Vec<PyObject> = regions
                .iter()
                .map(|array| array.clone().into_pyarray(py).to_object(py))
                .collect();
            PyList::new(py, arrays).to_object(py)
        })
        .collect();
    PyList::new(py, frames).to_object(py)
}

/// Expands a coordinate axis inside numpy.
fn axis_array<'py>(py: Python<'py>, axis: &Axis) -> &'py PyArray1<u32> {
    PyArray1::arange(py, axis.start(), axis.end(), axis.step())
}

/// A loaded SPE 3.0 file.
#[pyclass]
pub struct SpeData {
    inner: SpeFile,
}

#[pymethods]
impl SpeData {
    /// Returns a string representation.
    fn __repr__(&self) -> String {
        format!(
            "SpeData(frames={}, regions={}, dtype={})",
            self.inner.frame_count(),
            self.inner.region_count(),
            self.inner.element_type()
        )
    }

    /// Number of frames.
    #[getter]
    fn nframes(&self) -> usize {
        self.inner.frame_count()
    }

    /// Number of regions of interest.
    #[getter]
    fn nroi(&self) -> usize {
        self.inner.region_count()
    }

    /// Sample type as a numpy dtype name.
    #[getter]
    fn dtype(&self) -> &'static str {
        self.inner.element_type().name()
    }

    /// Decoded frames as `frames[frame][region]` 2-D numpy arrays.
    #[getter]
    fn frames(&self, py: Python<'_>) -> PyObject {
        match &self.inner.frames {
            FrameData::Float32(grid) => grid_to_list(py, grid),
            FrameData::Int32(grid) => grid_to_list(py, grid),
            FrameData::Int16(grid) => grid_to_list(py, grid),
            FrameData::UInt16(grid) => grid_to_list(py, grid),
            FrameData::UInt32(grid) => grid_to_list(py, grid),
        }
    }

    /// Column coordinates, one array per region.
    #[getter]
    fn xcoord<'py>(&self, py: Python<'py>) -> Vec<&'py PyArray1<u32>> {
        self.inner
            .coordinates
            .iter()
            .map(|c| axis_array(py, &c.x))
            .collect()
    }

    /// Row coordinates, one array per region.
    #[getter]
    fn ycoord<'py>(&self, py: Python<'py>) -> Vec<&'py PyArray1<u32>> {
        self.inner
            .coordinates
            .iter()
            .map(|c| axis_array(py, &c.y))
            .collect()
    }

    /// Region geometry as a list of dicts.
    #[getter]
    fn regions(&self, py: Python<'_>) -> PyResult<Vec<PyObject>> {
        self.inner
            .regions
            .iter()
            .map(|roi| {
                let dict = PyDict::new(py);
                dict.set_item("x", roi.x)?;
                dict.set_item("y", roi.y)?;
                dict.set_item("width", roi.width)?;
                dict.set_item("height", roi.height)?;
                dict.set_item("xBinning", roi.x_binning)?;
                dict.set_item("yBinning", roi.y_binning)?;
                Ok(dict.to_object(py))
            })
            .collect()
    }

    /// Wavelength calibration as a float64 array, or None.
    #[getter]
    fn wavelength<'py>(&self, py: Python<'py>) -> PyResult<Option<&'py PyArray1<f64>>> {
        match &self.inner.wavelength {
            Some(wl) => Ok(Some(wl.values().map_err(to_py_err)?.into_pyarray(py))),
            None => Ok(None),
        }
    }

    /// Raw wavelength calibration text, or None.
    #[getter]
    fn wavelength_text(&self) -> Option<String> {
        self.inner.wavelength.as_ref().map(|wl| wl.text().to_string())
    }

    /// Legacy header dimensions `(x, y)`; informational only.
    #[getter]
    fn header_dims(&self) -> (i16, i16) {
        (self.inner.header.legacy_xdim, self.inner.header.legacy_ydim)
    }

    /// Returns the XML footer as an indented tree.
    fn footer_tree(&self) -> String {
        self.inner.footer.to_string()
    }
}

/// Asks for a file path through Python's `input()`.
fn prompt_for_path(py: Python<'_>) -> PyResult<PathBuf> {
    let line: String = py
        .import("builtins")?
        .getattr("input")?
        .call1(("SPE file to load: ",))?
        .extract()?;
    let line = line.trim();
    if line.is_empty() {
        return Err(PyValueError::new_err("No input file given"));
    }
    Ok(PathBuf::from(line))
}

/// Loads an SPE 3.0 file.
///
/// Args:
///     path: Path to the .spe file; asked for on the terminal when omitted
///
/// Returns:
///     SpeData: frames, coordinates, regions and calibration
///
/// Raises:
///     IOError: the file is missing or truncated
///     ValueError: the file content is not a valid SPE 3.0 file
///
/// Example:
///     >>> import spe
///     >>> data = spe.load("spectrum.spe")
///     >>> img = data.frames[0][0]  # first frame, first region
///     >>> print(img.shape, data.dtype)
#[pyfunction]
#[pyo3(signature = (path=None))]
fn load(py: Python<'_>, path: Option<&str>) -> PyResult<Py<SpeData>> {
    let path = match path {
        Some(path) => PathBuf::from(path),
        None => prompt_for_path(py)?,
    };
    let inner = py.allow_threads(|| load_file(&path)).map_err(to_py_err)?;
    Py::new(py, SpeData { inner })
}

/// Returns the footer of an SPE file as an indented tree without decoding frames.
#[pyfunction]
fn footer_tree(py: Python<'_>, path: &str) -> PyResult<String> {
    let path = PathBuf::from(path);
    let footer = py
        .allow_threads(|| spe_core::read_footer(&path))
        .map_err(to_py_err)?;
    Ok(footer.to_string())
}

/// SPE 3.0 decoder module for Python.
#[pymodule]
fn _spe(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(load, m)?)?;
    m.add_function(wrap_pyfunction!(footer_tree, m)?)?;
    m.add_class::<SpeData>()?;
    Ok(())
}
