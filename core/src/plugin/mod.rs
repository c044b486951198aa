//! Pluggable readers for simulation output and the generic stacking built on
//! top of them.

use std::{collections::BTreeMap, fmt, sync::Arc};

use enumflags2::{bitflags, BitFlags};
use ndarray::{Array1, ArrayD};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    common::{ArrayError, LabeledArray},
    formats::{Params, ParamsError, ReadError},
};

pub mod axes;
pub mod stack;
#[cfg(feature = "hdf5")]
pub mod tristan_v2;

#[cfg(test)]
pub(crate) mod test_plugin;

pub use axes::{AxisError, AxisLayout};

/// What a concrete reader implements.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Params = 1 << 0,
    Fields = 1 << 1,
    Particles = 1 << 2,
    Spectra = 1 << 3,
}

pub type Capabilities = BitFlags<Capability>;

/// Which quantities of one kind to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    Disabled,
    #[default]
    All,
    Only(Vec<String>),
}

impl Selection {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Selection::Disabled)
    }

    pub fn allows(&self, key: &str) -> bool {
        match self {
            Selection::Disabled => false,
            Selection::All => true,
            Selection::Only(keys) => keys.iter().any(|k| k == key),
        }
    }

    pub fn filter<T: ToString>(&self, keys: impl IntoIterator<Item = T>) -> Vec<T> {
        keys.into_iter().filter(|k| self.allows(&k.to_string())).collect()
    }
}

/// Maps raw coordinate (or step) values to physical ones.
pub type CoordTransform = Arc<dyn Fn(&Array1<f64>, Option<&Params>) -> Array1<f64> + Send + Sync>;

/// Axis name of the time transform.
pub const TIME_AXIS: &str = "t";

#[derive(Clone, Default)]
pub struct PluginConfig {
    pub params: bool,
    pub fields: Selection,
    pub particles: Selection,
    pub spectra: Selection,
    /// Keyed by effective axis letter or [`TIME_AXIS`].
    pub coord_transform: BTreeMap<String, CoordTransform>,
    pub axes: AxisLayout,
}

impl PluginConfig {
    /// Capabilities a reader needs for this configuration.
    pub fn required(&self) -> Capabilities {
        let mut required = Capabilities::empty();
        if self.params {
            required |= Capability::Params;
        }
        if self.fields.is_enabled() {
            required |= Capability::Fields;
        }
        if self.particles.is_enabled() {
            required |= Capability::Particles;
        }
        if self.spectra.is_enabled() {
            required |= Capability::Spectra;
        }
        required
    }

    pub fn with_transform(
        mut self,
        axis: impl Into<String>,
        f: impl Fn(&Array1<f64>, Option<&Params>) -> Array1<f64> + Send + Sync + 'static,
    ) -> Self {
        self.coord_transform.insert(axis.into(), Arc::new(f));
        self
    }
}

impl fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConfig")
            .field("params", &self.params)
            .field("fields", &self.fields)
            .field("particles", &self.particles)
            .field("spectra", &self.spectra)
            .field("coord_transform", &self.coord_transform.keys())
            .field("axes", &self.axes)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{plugin} does not implement {operation}")]
    Unsupported {
        plugin: String,
        operation: &'static str,
    },
    #[error("{kind} are disabled for this plugin")]
    Disabled { kind: &'static str },
    #[error("No steps requested for {0:?}")]
    NoSteps(String),
    #[error("Unable to stack {name:?}: {source}")]
    Stack {
        name: String,
        #[source]
        source: ndarray::ShapeError,
    },
    #[error("Index of {name:?} has {ids} entries for {values} values")]
    IndexLength {
        name: String,
        ids: usize,
        values: usize,
    },
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Axis(#[from] AxisError),
    #[error(transparent)]
    Array(#[from] ArrayError),
}

pub(crate) fn unsupported<P: Plugin + ?Sized>(plugin: &P, operation: &'static str) -> PluginError {
    PluginError::Unsupported {
        plugin: plugin.name().to_string(),
        operation,
    }
}

/// A reader for one simulation output format.
///
/// Implementors answer "what exists" and "read one quantity at one step" in
/// on-disk names and axis order. Stacking, axis relabeling and coordinate
/// transforms come from [`PluginExt`].
pub trait Plugin {
    fn config(&self) -> &PluginConfig;

    fn capabilities(&self) -> Capabilities;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// `None` when parameters are disabled.
    fn read_params(&self) -> Result<Option<Params>, PluginError> {
        Err(unsupported(self, "read_params"))
    }

    /// Coordinate vectors keyed by on-disk axis letter.
    fn read_coords(&self) -> Result<BTreeMap<String, Array1<f64>>, PluginError> {
        Err(unsupported(self, "read_coords"))
    }

    fn read_field(&self, _field: &str, _step: u32) -> Result<ArrayD<f64>, PluginError> {
        Err(unsupported(self, "read_field"))
    }

    fn read_particle_key(
        &self,
        _species: u32,
        _key: &str,
        _step: u32,
    ) -> Result<Array1<f64>, PluginError> {
        Err(unsupported(self, "read_particle_key"))
    }

    fn read_spectrum(&self, _spec: &str, _step: u32) -> Result<ArrayD<f64>, PluginError> {
        Err(unsupported(self, "read_spectrum"))
    }

    fn field_keys(&self) -> Result<Vec<String>, PluginError> {
        Err(unsupported(self, "field_keys"))
    }

    fn spec_keys(&self) -> Result<Vec<String>, PluginError> {
        Err(unsupported(self, "spec_keys"))
    }

    /// Bin coordinates of a spectrum, one entry per spectrum axis.
    fn spec_bins(&self, _spec: &str) -> Result<BTreeMap<String, Array1<f64>>, PluginError> {
        Err(unsupported(self, "spec_bins"))
    }

    /// Attribute names, of one species or of all of them.
    fn prtl_keys(&self, _species: Option<u32>) -> Result<Vec<String>, PluginError> {
        Err(unsupported(self, "prtl_keys"))
    }

    fn prtl_species(&self) -> Result<Vec<u32>, PluginError> {
        Err(unsupported(self, "prtl_species"))
    }

    /// Persistent particle ids of one species at one step, if the format has them.
    fn prtl_index(&self, _species: u32, _step: u32) -> Result<Option<Array1<u64>>, PluginError> {
        Ok(None)
    }

    /// Opens (and keeps) the field files of `steps`.
    fn open_field_files(&self, _steps: &[u32]) -> Result<(), PluginError> {
        Ok(())
    }

    fn open_particle_files(&self, _steps: &[u32]) -> Result<(), PluginError> {
        Ok(())
    }

    fn open_spectrum_files(&self, _steps: &[u32]) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Generic operations every [`Plugin`] gets.
pub trait PluginExt: Plugin {
    /// Parameters if enabled in the config.
    fn params(&self) -> Result<Option<Params>, PluginError> {
        if self.config().params {
            self.read_params()
        } else {
            Ok(None)
        }
    }

    /// Transformed coordinates keyed by effective axis letter.
    fn coords(&self) -> Result<BTreeMap<String, Array1<f64>>, PluginError> {
        let params = self.params()?;
        self.coords_with(params.as_ref())
    }

    fn coords_with(
        &self,
        params: Option<&Params>,
    ) -> Result<BTreeMap<String, Array1<f64>>, PluginError> {
        let mut raw = self.read_coords()?;
        let config = self.config();
        let mut coords = BTreeMap::new();
        for axis in config.axes.effective_axes() {
            let axis = axis.to_string();
            let Some(values) = raw.remove(&axis) else {
                continue;
            };
            let values = match config.coord_transform.get(&axis) {
                Some(transform) => transform(&values, params),
                None => values,
            };
            coords.insert(axis, values);
        }
        Ok(coords)
    }

    /// Time coordinate of `steps`, through the `t` transform if present.
    fn times(&self, steps: &[u32]) -> Result<Array1<f64>, PluginError> {
        let params = self.params()?;
        Ok(self.times_with(steps, params.as_ref()))
    }

    fn times_with(&self, steps: &[u32], params: Option<&Params>) -> Array1<f64> {
        let raw = steps.iter().map(|&s| s as f64).collect::<Array1<f64>>();
        match self.config().coord_transform.get(TIME_AXIS) {
            Some(transform) => transform(&raw, params),
            None => raw,
        }
    }

    /// Reads a field (by effective name) at every step into a `(t, axes..)` array.
    fn field(&self, name: &str, steps: &[u32]) -> Result<LabeledArray, PluginError> {
        let params = self.params()?;
        let coords = self.coords_with(params.as_ref())?;
        let times = self.times_with(steps, params.as_ref());
        self.field_with(name, steps, &coords, times)
    }

    #[instrument(skip(self, coords, times), fields(plugin = self.name()))]
    fn field_with(
        &self,
        name: &str,
        steps: &[u32],
        coords: &BTreeMap<String, Array1<f64>>,
        times: Array1<f64>,
    ) -> Result<LabeledArray, PluginError> {
        let layout = &self.config().axes;
        let disk_name = layout.to_disk(name);
        debug!(%disk_name, "reading field");

        self.open_field_files(steps)?;
        let per_step = steps
            .iter()
            .map(|&step| {
                let raw = self.read_field(&disk_name, step)?;
                Ok(layout.permute(name, raw)?)
            })
            .collect::<Result<Vec<_>, PluginError>>()?;
        let data = stack::stack_steps(name, &per_step)?;

        let mut dims = vec![TIME_AXIS.to_string()];
        if data.ndim() == layout.len() + 1 {
            dims.extend(layout.effective_axes().map(String::from));
        } else {
            return Err(AxisError::Rank {
                name: name.to_string(),
                expected: layout.len(),
                found: data.ndim() - 1,
            }
            .into());
        }

        let mut array = LabeledArray::new(name, dims, data)?.with_coord(TIME_AXIS, times)?;
        for (axis, values) in coords {
            array = array.with_coord(axis.as_str(), values.clone())?;
        }
        Ok(array)
    }

    /// Reads one particle attribute of one species at every step into a
    /// `(t, id)` array. Records are aligned by persistent id when the plugin
    /// provides one, padded with NaN otherwise.
    fn particle_key(&self, species: u32, key: &str, steps: &[u32]) -> Result<LabeledArray, PluginError> {
        let params = self.params()?;
        let times = self.times_with(steps, params.as_ref());
        self.particle_key_with(species, key, steps, times)
    }

    #[instrument(skip(self, times), fields(plugin = self.name()))]
    fn particle_key_with(
        &self,
        species: u32,
        key: &str,
        steps: &[u32],
        times: Array1<f64>,
    ) -> Result<LabeledArray, PluginError> {
        if steps.is_empty() {
            return Err(PluginError::NoSteps(key.to_string()));
        }
        self.open_particle_files(steps)?;

        let dims = vec![TIME_AXIS.to_string(), "id".to_string()];
        let name = format!("{key}_{species}");
        let array = match self.prtl_index(species, steps[0])? {
            Some(first_ids) => {
                let mut per_step = Vec::with_capacity(steps.len());
                for (i, &step) in steps.iter().enumerate() {
                    let ids = match i {
                        0 => first_ids.clone(),
                        _ => self.prtl_index(species, step)?.unwrap_or_default(),
                    };
                    per_step.push((ids, self.read_particle_key(species, key, step)?));
                }
                let (ids, data) = stack::align_by_index(&name, &per_step)?;
                LabeledArray::new(name, dims, data.into_dyn())?
                    .with_coord("id", ids.mapv(|id| id as f64))?
            }
            None => {
                let per_step = steps
                    .iter()
                    .map(|&step| self.read_particle_key(species, key, step))
                    .collect::<Result<Vec<_>, _>>()?;
                LabeledArray::new(name, dims, stack::pad_ragged(&per_step).into_dyn())?
            }
        };
        Ok(array.with_coord(TIME_AXIS, times)?)
    }

    /// Reads a spectrum at every step into a `(t, bins..)` array.
    fn spectrum(&self, name: &str, steps: &[u32]) -> Result<LabeledArray, PluginError> {
        let params = self.params()?;
        let times = self.times_with(steps, params.as_ref());
        self.spectrum_with(name, steps, times)
    }

    #[instrument(skip(self, times), fields(plugin = self.name()))]
    fn spectrum_with(
        &self,
        name: &str,
        steps: &[u32],
        times: Array1<f64>,
    ) -> Result<LabeledArray, PluginError> {
        let bins = self.spec_bins(name)?;
        self.open_spectrum_files(steps)?;
        let per_step = steps
            .iter()
            .map(|&step| Ok(stack::squeeze(self.read_spectrum(name, step)?)))
            .collect::<Result<Vec<_>, PluginError>>()?;
        let data = stack::stack_steps(name, &per_step)?;

        let dims = std::iter::once(TIME_AXIS.to_string())
            .chain(bins.keys().cloned())
            .collect();
        let mut array = LabeledArray::new(name, dims, data)?.with_coord(TIME_AXIS, times)?;
        for (bin, values) in bins {
            array = array.with_coord(bin, values)?;
        }
        Ok(array)
    }
}

impl<P: Plugin + ?Sized> PluginExt for P {}
