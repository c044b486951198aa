//! Reader for Tristan-v2 output directories.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use ndarray::{s, Array1, ArrayD, Ix3};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Capabilities, Plugin, PluginConfig, PluginError};
use crate::formats::{hdf5::H5File, params::read_params, Params, ReadError};

/// Particle indices are `ind * INDEX_STRIDE + proc`.
const INDEX_STRIDE: u64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Fields,
    Particles,
    Spectra,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Kind::Fields => "fields",
            Kind::Particles => "particles",
            Kind::Spectra => "spectra",
        }
    }

    /// `flds/flds.tot.%05d` and friends.
    fn file_name(self, step: u32) -> String {
        let stem = match self {
            Kind::Fields => "flds",
            Kind::Particles => "prtl",
            Kind::Spectra => "spec",
        };
        format!("{stem}/{stem}.tot.{step:05}")
    }
}

#[derive(Debug, Default)]
struct OpenFiles {
    fields: BTreeMap<u32, H5File>,
    particles: BTreeMap<u32, H5File>,
    spectra: BTreeMap<u32, H5File>,
}

impl OpenFiles {
    fn of(&mut self, kind: Kind) -> &mut BTreeMap<u32, H5File> {
        match kind {
            Kind::Fields => &mut self.fields,
            Kind::Particles => &mut self.particles,
            Kind::Spectra => &mut self.spectra,
        }
    }
}

pub struct TristanV2 {
    path: PathBuf,
    cfg: Option<PathBuf>,
    first_step: u32,
    config: PluginConfig,
    files: Mutex<OpenFiles>,
}

impl TristanV2 {
    /// `first_step` is inspected for keys, coordinates and bins.
    /// Parameters are read from `cfg` if given.
    pub fn new(
        path: impl Into<PathBuf>,
        cfg: Option<PathBuf>,
        first_step: u32,
        mut config: PluginConfig,
    ) -> Self {
        config.params = cfg.is_some();
        Self {
            path: path.into(),
            cfg,
            first_step,
            config,
            files: Mutex::new(OpenFiles::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn path_of(&self, kind: Kind, step: u32) -> PathBuf {
        self.path.join(kind.file_name(step))
    }

    fn enabled(&self, kind: Kind) -> Result<(), PluginError> {
        let selection = match kind {
            Kind::Fields => &self.config.fields,
            Kind::Particles => &self.config.particles,
            Kind::Spectra => &self.config.spectra,
        };
        if selection.is_enabled() {
            Ok(())
        } else {
            Err(PluginError::Disabled { kind: kind.name() })
        }
    }

    /// Keeps exactly the files of `steps` open. Handles of steps that are
    /// already open are reused, all others are closed.
    fn open(&self, kind: Kind, steps: &[u32]) -> Result<(), PluginError> {
        self.enabled(kind)?;
        let mut files = self.files.lock();
        let open = files.of(kind);
        let mut kept = BTreeMap::new();
        for &step in steps {
            let file = match open.get(&step) {
                Some(file) => file.clone(),
                None => {
                    let path = self.path_of(kind, step);
                    debug!(?path, kind = kind.name(), "opening");
                    H5File::open(&path)?
                }
            };
            kept.insert(step, file);
        }
        let closed = open.keys().filter(|step| !kept.contains_key(step)).count();
        trace!(kind = kind.name(), kept = kept.len(), closed, "open files");
        *open = kept;
        Ok(())
    }

    /// The open handle of `step`, or a fresh one that is not kept.
    fn file(&self, kind: Kind, step: u32) -> Result<H5File, PluginError> {
        self.enabled(kind)?;
        if let Some(file) = self.files.lock().of(kind).get(&step) {
            return Ok(file.clone());
        }
        Ok(H5File::open(&self.path_of(kind, step))?)
    }

    fn first_keys(&self, kind: Kind) -> Result<Vec<String>, PluginError> {
        Ok(self.file(kind, self.first_step)?.keys()?)
    }
}

impl Plugin for TristanV2 {
    fn config(&self) -> &PluginConfig {
        &self.config
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn name(&self) -> &str {
        "TristanV2"
    }

    fn read_params(&self) -> Result<Option<Params>, PluginError> {
        match &self.cfg {
            Some(cfg) => Ok(Some(read_params(cfg)?)),
            None => Ok(None),
        }
    }

    fn read_coords(&self) -> Result<BTreeMap<String, Array1<f64>>, PluginError> {
        if !self.config.fields.is_enabled() {
            return Ok(BTreeMap::new());
        }
        let file = self.file(Kind::Fields, self.first_step)?;
        let grid = |key: &str| -> Result<ndarray::Array3<f64>, PluginError> {
            let data = file.read(key)?;
            let shape = data.shape().to_vec();
            data.into_dimensionality::<Ix3>().map_err(|_| {
                ReadError::BadShape {
                    path: file.path().to_path_buf(),
                    key: key.to_string(),
                    shape,
                }
                .into()
            })
        };

        let mut coords = BTreeMap::new();
        coords.insert("x".to_string(), grid("xx")?.slice(s![0, 0, ..]).to_owned());
        coords.insert("y".to_string(), grid("yy")?.slice(s![0, .., 0]).to_owned());
        coords.insert("z".to_string(), grid("zz")?.slice(s![.., 0, 0]).to_owned());
        Ok(coords)
    }

    fn read_field(&self, field: &str, step: u32) -> Result<ArrayD<f64>, PluginError> {
        Ok(self.file(Kind::Fields, step)?.read(field)?)
    }

    fn read_particle_key(&self, species: u32, key: &str, step: u32) -> Result<Array1<f64>, PluginError> {
        Ok(self
            .file(Kind::Particles, step)?
            .read_flat(&format!("{key}_{species}"))?)
    }

    fn read_spectrum(&self, spec: &str, step: u32) -> Result<ArrayD<f64>, PluginError> {
        Ok(self.file(Kind::Spectra, step)?.read(spec)?)
    }

    fn field_keys(&self) -> Result<Vec<String>, PluginError> {
        if !self.config.fields.is_enabled() {
            return Ok(Vec::new());
        }
        self.first_keys(Kind::Fields)
    }

    fn spec_keys(&self) -> Result<Vec<String>, PluginError> {
        if !self.config.spectra.is_enabled() {
            return Ok(Vec::new());
        }
        Ok(self
            .first_keys(Kind::Spectra)?
            .into_iter()
            .filter(|k| k.starts_with('n'))
            .collect())
    }

    fn spec_bins(&self, spec: &str) -> Result<BTreeMap<String, Array1<f64>>, PluginError> {
        let file = self.file(Kind::Spectra, self.first_step)?;
        let (key, dataset) = if spec.starts_with("nr") {
            ("re", "rbins")
        } else {
            ("e", "ebins")
        };
        Ok([(key.to_string(), file.read_flat(dataset)?)].into())
    }

    /// Datasets are named `<key>_<species>`, keys may contain `_` themselves.
    fn prtl_keys(&self, species: Option<u32>) -> Result<Vec<String>, PluginError> {
        if !self.config.particles.is_enabled() {
            return Ok(Vec::new());
        }
        let mut keys: Vec<String> = self
            .first_keys(Kind::Particles)?
            .into_iter()
            .filter_map(|k| {
                let (attr, sp) = k.rsplit_once('_')?;
                let sp: u32 = sp.parse().ok()?;
                species
                    .map_or(true, |species| species == sp)
                    .then(|| attr.to_string())
            })
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn prtl_species(&self) -> Result<Vec<u32>, PluginError> {
        if !self.config.particles.is_enabled() {
            return Ok(Vec::new());
        }
        let mut species: Vec<u32> = self
            .first_keys(Kind::Particles)?
            .iter()
            .filter_map(|k| k.rsplit_once('_')?.1.parse().ok())
            .collect();
        species.sort_unstable();
        species.dedup();
        Ok(species)
    }

    fn prtl_index(&self, species: u32, step: u32) -> Result<Option<Array1<u64>>, PluginError> {
        let file = self.file(Kind::Particles, step)?;
        let (ind_key, proc_key) = (format!("ind_{species}"), format!("proc_{species}"));
        if !file.contains(&ind_key) || !file.contains(&proc_key) {
            return Ok(None);
        }
        let ind = file.read_flat(&ind_key)?;
        let proc = file.read_flat(&proc_key)?;
        if ind.len() != proc.len() {
            return Err(PluginError::IndexLength {
                name: ind_key,
                ids: proc.len(),
                values: ind.len(),
            });
        }
        let index = ind
            .iter()
            .zip(&proc)
            .map(|(&i, &p)| (i as u64) * INDEX_STRIDE + p as u64)
            .collect();
        Ok(Some(index))
    }

    fn open_field_files(&self, steps: &[u32]) -> Result<(), PluginError> {
        self.open(Kind::Fields, steps)
    }

    fn open_particle_files(&self, steps: &[u32]) -> Result<(), PluginError> {
        self.open(Kind::Particles, steps)
    }

    fn open_spectrum_files(&self, steps: &[u32]) -> Result<(), PluginError> {
        self.open(Kind::Spectra, steps)
    }
}
