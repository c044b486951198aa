//! A file-backed [`Backend`] that synthesizes its snapshots and counts reads.
//!
//! A snapshot file only has to exist. Its text content selects a failure:
//! `missing`, `oom` or `garbage`.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use graphet_core::{
    common::{FieldSet, ParticleSet},
    formats::ReadError,
    FnameTemplate,
};
use ndarray::{Array1, Array2};

use crate::reader::{Backend, SnapshotReader};

pub(crate) const GRID: usize = 256;

#[derive(Debug, Clone, Default)]
pub(crate) struct DummyBackend {
    pub reads: Arc<AtomicUsize>,
    pub delay: Option<Duration>,
}

impl DummyBackend {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Read attempts across every reader created by this backend.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn reader(&self, directory: &Path, template: &FnameTemplate) -> DummyReader {
        DummyReader {
            directory: directory.to_path_buf(),
            template: template.clone(),
            reads: self.reads.clone(),
            delay: self.delay,
        }
    }
}

impl Backend for DummyBackend {
    type Fields = DummyFields;
    type Particles = DummyParticles;

    fn fields(&self, directory: &Path, template: &FnameTemplate) -> DummyFields {
        DummyFields(self.reader(directory, template))
    }

    fn particles(&self, directory: &Path, template: &FnameTemplate) -> DummyParticles {
        DummyParticles(self.reader(directory, template))
    }
}

#[derive(Debug)]
pub(crate) struct DummyReader {
    directory: PathBuf,
    template: FnameTemplate,
    reads: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl DummyReader {
    fn open(&self, tstep: u32) -> Result<PathBuf, ReadError> {
        let path = self.template.path_in(&self.directory, tstep);
        let contents = std::fs::read_to_string(&path).map_err(|e| ReadError::io(&path, e))?;
        match contents.trim() {
            "missing" => Err(ReadError::MissingKey {
                path,
                key: "arr1".into(),
            }),
            "oom" => {
                ReadError::reserve(&path, usize::MAX)?;
                Ok(path)
            }
            "garbage" => Err(ReadError::Io {
                path,
                source: io::Error::new(io::ErrorKind::InvalidData, "not a snapshot file"),
            }),
            _ => Ok(path),
        }
    }

    fn read(&self, tstep: u32) -> Result<PathBuf, ReadError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let path = self.open(tstep)?;
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Ok(path)
    }
}

#[derive(Debug)]
pub(crate) struct DummyFields(DummyReader);

#[derive(Debug)]
pub(crate) struct DummyParticles(DummyReader);

/// `arr1` and `arr2` on a `GRID x GRID` mesh over `[-2, 2]`.
pub(crate) fn dummy_fields(tstep: u32) -> FieldSet {
    let axis = Array1::linspace(-2.0, 2.0, GRID);
    let t = f64::from(tstep);
    let arr1 = Array2::from_shape_fn((GRID, GRID), |(i, j)| {
        let (x, y) = (axis[j], axis[i]);
        x + 0.5 * y - (x * y * t).tanh()
    });
    let arr2 = Array2::from_shape_fn((GRID, GRID), |(i, j)| {
        let (x, y) = (axis[j], axis[i]);
        (t * x).sin() - ((12.0 - t) * y).cos()
    });

    let mut set = FieldSet::new(axis.clone(), axis);
    set.insert("arr1", arr1).expect("grid shape");
    set.insert("arr2", arr2).expect("grid shape");
    set
}

impl SnapshotReader for DummyFields {
    type Output = FieldSet;

    fn read(&self, tstep: u32) -> Result<FieldSet, ReadError> {
        self.0.read(tstep)?;
        Ok(dummy_fields(tstep))
    }

    fn keys(&self, tstep: u32) -> Result<Vec<String>, ReadError> {
        self.0.open(tstep)?;
        Ok(vec!["arr1".into(), "arr2".into()])
    }
}

impl SnapshotReader for DummyParticles {
    type Output = ParticleSet;

    fn read(&self, tstep: u32) -> Result<ParticleSet, ReadError> {
        self.0.read(tstep)?;
        let n = 10 * (tstep as usize + 1);
        Ok([
            ("u_1".to_string(), Array1::from_elem(n, 1.0)),
            ("x_1".to_string(), Array1::linspace(0.0, 1.0, n)),
        ]
        .into_iter()
        .collect())
    }

    fn keys(&self, tstep: u32) -> Result<Vec<String>, ReadError> {
        self.0.open(tstep)?;
        Ok(vec!["u_1".into(), "x_1".into()])
    }
}

/// Writes `dummy00.hdf5` .. for `tsteps` into `dir`.
pub(crate) fn write_steps(dir: &Path, tsteps: impl IntoIterator<Item = u32>) {
    for t in tsteps {
        std::fs::write(dir.join(format!("dummy{t:02}.hdf5")), "").expect("write snapshot");
    }
}

/// Marks the snapshot of `tstep` so reading it fails with `failure`.
pub(crate) fn break_step(dir: &Path, tstep: u32, failure: &str) {
    std::fs::write(dir.join(format!("dummy{tstep:02}.hdf5")), failure).expect("write snapshot");
}

pub(crate) fn template() -> FnameTemplate {
    "dummy%02d.hdf5".parse().expect("valid template")
}
