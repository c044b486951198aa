use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use ndarray::{Array1, ArrayD, Axis};
use thiserror::Error;

use super::range::Range;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArrayError {
    #[error("Array {name:?} has {found} axes but {expected} dimension names were given")]
    DimCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Coordinate {dim:?} of {name:?} has {found} values, axis has length {expected}")]
    CoordLength {
        name: String,
        dim: String,
        expected: usize,
        found: usize,
    },
    #[error("Array {name:?} has no dimension {dim:?}")]
    UnknownDim { name: String, dim: String },
    #[error("Field {name:?} has shape {found:?}, expected {expected:?}")]
    FieldShape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

/// An n-dimensional array with named dimensions and optional coordinate
/// vectors per dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledArray {
    name: String,
    dims: Vec<String>,
    data: ArrayD<f64>,
    coords: BTreeMap<String, Array1<f64>>,
}

impl LabeledArray {
    pub fn new(
        name: impl Into<String>,
        dims: Vec<String>,
        data: ArrayD<f64>,
    ) -> Result<Self, ArrayError> {
        let name = name.into();
        if dims.len() != data.ndim() {
            return Err(ArrayError::DimCount {
                name,
                expected: dims.len(),
                found: data.ndim(),
            });
        }
        Ok(Self {
            name,
            dims,
            data,
            coords: BTreeMap::new(),
        })
    }

    pub fn with_coord(
        mut self,
        dim: impl Into<String>,
        values: Array1<f64>,
    ) -> Result<Self, ArrayError> {
        let dim = dim.into();
        let Some(axis) = self.axis_of(&dim) else {
            return Err(ArrayError::UnknownDim {
                name: self.name,
                dim,
            });
        };
        let expected = self.data.len_of(axis);
        if values.len() != expected {
            return Err(ArrayError::CoordLength {
                name: self.name,
                dim,
                expected,
                found: values.len(),
            });
        }
        self.coords.insert(dim, values);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn coord(&self, dim: &str) -> Option<&Array1<f64>> {
        self.coords.get(dim)
    }

    pub fn coords(&self) -> impl Iterator<Item = (&str, &Array1<f64>)> {
        self.coords.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn axis_of(&self, dim: &str) -> Option<Axis> {
        self.dims.iter().position(|d| d == dim).map(Axis)
    }

    /// Finite value range, `None` if every value is NaN.
    pub fn value_range(&self) -> Option<Range<f64>> {
        Range::of_finite(self.data.iter())
    }
}

impl Display for LabeledArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (dim, len)) in self.dims.iter().zip(self.data.shape()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}: {len}")?;
        }
        write!(f, ")")
    }
}
