use std::path::PathBuf;

use thiserror::Error;

use crate::common::ArrayError;

/// Failure reading one snapshot file.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("File {0:?} not found")]
    NotFound(PathBuf),
    #[error("Key {key:?} not found in {path:?}")]
    MissingKey { path: PathBuf, key: String },
    #[error("Not enough memory to read {path:?} ({bytes} bytes requested)")]
    OutOfMemory {
        path: PathBuf,
        bytes: usize,
        #[source]
        source: std::collections::TryReserveError,
    },
    #[error("Dataset {key:?} in {path:?} has unexpected shape {shape:?}")]
    BadShape {
        path: PathBuf,
        key: String,
        shape: Vec<usize>,
    },
    #[error(transparent)]
    Shape(#[from] ArrayError),
    #[error("Unable to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error in {path:?}: {source}")]
    Hdf5 {
        path: PathBuf,
        #[source]
        source: hdf5::Error,
    },
}

impl ReadError {
    /// Maps an io error on `path`, keeping `NotFound` distinguishable.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Io { path, source },
        }
    }

    /// Reserves room for `len` values up front so an allocation failure
    /// becomes [`ReadError::OutOfMemory`] instead of an abort.
    pub fn reserve(path: impl Into<PathBuf>, len: usize) -> Result<Vec<f64>, Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|source| Self::OutOfMemory {
            path: path.into(),
            bytes: len.saturating_mul(std::mem::size_of::<f64>()),
            source,
        })?;
        Ok(buf)
    }
}
