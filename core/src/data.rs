use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use ndarray::Array1;
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    common::{LabeledArray, Range},
    formats::Params,
    plugin::{Capabilities, Plugin, PluginError, PluginExt},
};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("{plugin} lacks {missing:?}, disable them in its config or use another plugin")]
    MissingCapability {
        plugin: String,
        missing: Capabilities,
    },
    #[error("No steps requested")]
    NoSteps,
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Every enabled quantity of a plugin, stacked over the requested steps.
///
/// Built in one go by [`Data::new`] and read-only afterwards.
pub struct Data<P> {
    plugin: P,
    steps: Vec<u32>,
    times: Array1<f64>,
    params: Option<Params>,
    fields: Option<BTreeMap<String, LabeledArray>>,
    particles: Option<BTreeMap<u32, BTreeMap<String, LabeledArray>>>,
    spectra: Option<BTreeMap<String, LabeledArray>>,
}

impl<P: Plugin> Data<P> {
    #[instrument(skip(plugin), fields(plugin = plugin.name()))]
    pub fn new(plugin: P, steps: Vec<u32>) -> Result<Self, DataError> {
        if steps.is_empty() {
            return Err(DataError::NoSteps);
        }

        let config = plugin.config();
        let missing = config.required() & !plugin.capabilities();
        if !missing.is_empty() {
            return Err(DataError::MissingCapability {
                plugin: plugin.name().to_string(),
                missing,
            });
        }

        let params = plugin.params()?;
        let times = plugin.times_with(&steps, params.as_ref());

        let fields = if config.fields.is_enabled() {
            let coords = plugin.coords_with(params.as_ref())?;
            let keys = plugin.field_keys()?;
            let names = keys
                .iter()
                .map(|k| config.axes.to_effective(k))
                .filter(|k| config.fields.allows(k));
            let mut fields = BTreeMap::new();
            for name in names {
                let array = plugin.field_with(&name, &steps, &coords, times.clone())?;
                fields.insert(name, array);
            }
            Some(fields)
        } else {
            None
        };

        let particles = if config.particles.is_enabled() {
            let mut particles = BTreeMap::new();
            for species in config.particles.filter(plugin.prtl_species()?) {
                let mut records = BTreeMap::new();
                for key in plugin.prtl_keys(Some(species))? {
                    let array = plugin.particle_key_with(species, &key, &steps, times.clone())?;
                    records.insert(key, array);
                }
                particles.insert(species, records);
            }
            Some(particles)
        } else {
            None
        };

        let spectra = if config.spectra.is_enabled() {
            let mut spectra = BTreeMap::new();
            for name in config.spectra.filter(plugin.spec_keys()?) {
                let array = plugin.spectrum_with(&name, &steps, times.clone())?;
                spectra.insert(name, array);
            }
            Some(spectra)
        } else {
            None
        };

        info!(
            steps = steps.len(),
            fields = fields.as_ref().map_or(0, BTreeMap::len),
            species = particles.as_ref().map_or(0, BTreeMap::len),
            spectra = spectra.as_ref().map_or(0, BTreeMap::len),
            "stacked"
        );

        Ok(Self {
            plugin,
            steps,
            times,
            params,
            fields,
            particles,
            spectra,
        })
    }
}

impl<P> Data<P> {
    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// `None` if fields are disabled.
    pub fn fields(&self) -> Option<&BTreeMap<String, LabeledArray>> {
        self.fields.as_ref()
    }

    pub fn field(&self, name: &str) -> Option<&LabeledArray> {
        self.fields.as_ref()?.get(name)
    }

    pub fn particles(&self) -> Option<&BTreeMap<u32, BTreeMap<String, LabeledArray>>> {
        self.particles.as_ref()
    }

    pub fn species(&self, species: u32) -> Option<&BTreeMap<String, LabeledArray>> {
        self.particles.as_ref()?.get(&species)
    }

    pub fn spectra(&self) -> Option<&BTreeMap<String, LabeledArray>> {
        self.spectra.as_ref()
    }

    pub fn spectrum(&self, name: &str) -> Option<&LabeledArray> {
        self.spectra.as_ref()?.get(name)
    }
}

impl<P: Plugin> Display for Data<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data container")?;
        writeln!(f)?;
        writeln!(f, "Plugin: {}", self.plugin.name())?;
        let Some(fields) = &self.fields else {
            return Ok(());
        };
        writeln!(f, "Fields: {:?}", fields.keys().collect::<Vec<_>>())?;

        // All fields share their coordinates
        let Some(first) = fields.values().next() else {
            return Ok(());
        };
        writeln!(f, "Coordinates:")?;
        for (name, values) in first.coords() {
            match Range::of_finite(values.iter()) {
                Some(r) => writeln!(f, "  {name}: {:.2}...{:.2} [{}]", r.min, r.max, values.len())?,
                None => writeln!(f, "  {name}: [{}]", values.len())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "data_test.rs"]
mod tests;
