//! Snapshot readers for HDF5 output files.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayD};
use tracing::{debug, instrument, trace};

use super::read_err::ReadError;
use crate::common::{FieldSet, ParticleSet};

/// Datasets holding coordinates rather than fields.
pub const COORD_KEYS: [&str; 4] = ["x", "xx", "y", "yy"];

/// An open HDF5 file that remembers its path for error reporting.
#[derive(Debug, Clone)]
pub struct H5File {
    path: PathBuf,
    file: hdf5::File,
}

impl H5File {
    pub fn open(path: &Path) -> Result<Self, ReadError> {
        if !path.exists() {
            return Err(ReadError::NotFound(path.to_path_buf()));
        }
        let file = hdf5::File::open(path).map_err(|source| ReadError::Hdf5 {
            path: path.to_path_buf(),
            source,
        })?;
        trace!(?path, "opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> Result<Vec<String>, ReadError> {
        self.file.member_names().map_err(|e| self.h5_err(e))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.file.link_exists(key)
    }

    pub fn read(&self, key: &str) -> Result<ArrayD<f64>, ReadError> {
        let ds = self.dataset(key)?;
        // Fail before HDF5 tries to allocate
        drop(ReadError::reserve(&self.path, ds.size())?);
        ds.read_dyn::<f64>().map_err(|e| self.h5_err(e))
    }

    /// Reads `key` and drops all length-1 axes, expecting `(y, x)` to remain.
    pub fn read_2d(&self, key: &str) -> Result<Array2<f64>, ReadError> {
        let data = self.read(key)?;
        let shape: Vec<usize> = data.shape().iter().copied().filter(|&n| n != 1).collect();
        let bad_shape = || ReadError::BadShape {
            path: self.path.clone(),
            key: key.to_string(),
            shape: data.shape().to_vec(),
        };
        let (h, w) = match shape[..] {
            [] => (1, 1),
            [w] => (1, w),
            [h, w] => (h, w),
            _ => return Err(bad_shape()),
        };
        let flat = data.iter().copied().collect::<Vec<_>>();
        Array2::from_shape_vec((h, w), flat).map_err(|_| bad_shape())
    }

    pub fn read_flat(&self, key: &str) -> Result<Array1<f64>, ReadError> {
        Ok(Array1::from(self.read(key)?.into_raw_vec()))
    }

    fn dataset(&self, key: &str) -> Result<hdf5::Dataset, ReadError> {
        if !self.contains(key) {
            return Err(ReadError::MissingKey {
                path: self.path.clone(),
                key: key.to_string(),
            });
        }
        self.file.dataset(key).map_err(|e| self.h5_err(e))
    }

    fn h5_err(&self, source: hdf5::Error) -> ReadError {
        ReadError::Hdf5 {
            path: self.path.clone(),
            source,
        }
    }
}

/// Lists the fields of a snapshot without reading any bulk data.
#[instrument]
pub fn field_keys(path: &Path) -> Result<Vec<String>, ReadError> {
    let file = H5File::open(path)?;
    Ok(file
        .keys()?
        .into_iter()
        .filter(|k| !COORD_KEYS.contains(&k.as_str()))
        .collect())
}

/// Reads every field of a snapshot. Coordinates come from `xx`/`x` and
/// `yy`/`y`, falling back to grid indices when the file has none.
#[instrument]
pub fn read_field_set(path: &Path) -> Result<FieldSet, ReadError> {
    let file = H5File::open(path)?;

    let mut fields = Vec::new();
    for key in file.keys()? {
        if COORD_KEYS.contains(&key.as_str()) {
            continue;
        }
        let data = file.read_2d(&key)?;
        fields.push((key, data));
    }

    let (height, width) = fields.first().map_or((0, 0), |(_, d)| d.dim());
    let x = read_coord(&file, ["xx", "x"], width)?;
    let y = read_coord(&file, ["yy", "y"], height)?;

    let mut set = FieldSet::new(x, y);
    for (key, data) in fields {
        set.insert(key, data)?;
    }
    debug!(fields = set.len(), width, height, "read fields");
    Ok(set)
}

/// Reads every dataset of a particle snapshot as a flat record array.
#[instrument]
pub fn read_particle_set(path: &Path) -> Result<ParticleSet, ReadError> {
    let file = H5File::open(path)?;
    let mut set = ParticleSet::new();
    for key in file.keys()? {
        let values = file.read_flat(&key)?;
        set.insert(key, values);
    }
    debug!(keys = set.len(), "read particles");
    Ok(set)
}

fn read_coord(file: &H5File, names: [&str; 2], len: usize) -> Result<Array1<f64>, ReadError> {
    match names.into_iter().find(|n| file.contains(n)) {
        Some(name) => {
            let mut values = file.read(name)?.into_raw_vec();
            values.sort_by(f64::total_cmp);
            values.dedup();
            Ok(Array1::from(values))
        }
        None => Ok(Array1::from_iter((0..len).map(|i| i as f64))),
    }
}
