//! An in-memory [`Plugin`] that counts its reads.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use ndarray::{Array1, ArrayD};
use parking_lot::Mutex;

use super::{Capabilities, Capability, Plugin, PluginConfig, PluginError};
use crate::formats::{Params, ReadError};

#[derive(Default)]
pub(crate) struct MemoryPlugin {
    pub config: PluginConfig,
    pub capabilities: Option<Capabilities>,
    pub params: Params,
    pub coords: BTreeMap<String, Array1<f64>>,
    /// Keyed by on-disk name and step.
    pub fields: BTreeMap<(String, u32), ArrayD<f64>>,
    /// Keyed by species, attribute and step.
    pub particles: BTreeMap<(u32, String, u32), Array1<f64>>,
    pub index: BTreeMap<(u32, u32), Array1<u64>>,
    pub spectra: BTreeMap<(String, u32), ArrayD<f64>>,
    pub bins: BTreeMap<String, BTreeMap<String, Array1<f64>>>,
    pub reads: AtomicUsize,
    pub opened: Mutex<Vec<u32>>,
}

impl MemoryPlugin {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn missing(key: impl Into<String>) -> PluginError {
        ReadError::MissingKey {
            path: "memory".into(),
            key: key.into(),
        }
        .into()
    }
}

impl Plugin for MemoryPlugin {
    fn config(&self) -> &PluginConfig {
        &self.config
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.unwrap_or(Capabilities::all())
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn read_params(&self) -> Result<Option<Params>, PluginError> {
        Ok(Some(self.params.clone()))
    }

    fn read_coords(&self) -> Result<BTreeMap<String, Array1<f64>>, PluginError> {
        Ok(self.coords.clone())
    }

    fn read_field(&self, field: &str, step: u32) -> Result<ArrayD<f64>, PluginError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.fields
            .get(&(field.to_string(), step))
            .cloned()
            .ok_or_else(|| Self::missing(field))
    }

    fn read_particle_key(&self, species: u32, key: &str, step: u32) -> Result<Array1<f64>, PluginError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.particles
            .get(&(species, key.to_string(), step))
            .cloned()
            .ok_or_else(|| Self::missing(format!("{key}_{species}")))
    }

    fn read_spectrum(&self, spec: &str, step: u32) -> Result<ArrayD<f64>, PluginError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.spectra
            .get(&(spec.to_string(), step))
            .cloned()
            .ok_or_else(|| Self::missing(spec))
    }

    fn field_keys(&self) -> Result<Vec<String>, PluginError> {
        let mut keys: Vec<String> = self.fields.keys().map(|(k, _)| k.clone()).collect();
        keys.dedup();
        Ok(keys)
    }

    fn spec_keys(&self) -> Result<Vec<String>, PluginError> {
        Ok(self.bins.keys().cloned().collect())
    }

    fn spec_bins(&self, spec: &str) -> Result<BTreeMap<String, Array1<f64>>, PluginError> {
        self.bins.get(spec).cloned().ok_or_else(|| Self::missing(spec))
    }

    fn prtl_keys(&self, species: Option<u32>) -> Result<Vec<String>, PluginError> {
        let mut keys: Vec<String> = self
            .particles
            .keys()
            .filter(|(sp, _, _)| species.map_or(true, |s| s == *sp))
            .map(|(_, k, _)| k.clone())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn prtl_species(&self) -> Result<Vec<u32>, PluginError> {
        let mut species: Vec<u32> = self.particles.keys().map(|(sp, _, _)| *sp).collect();
        species.dedup();
        Ok(species)
    }

    fn prtl_index(&self, species: u32, step: u32) -> Result<Option<Array1<u64>>, PluginError> {
        Ok(self.index.get(&(species, step)).cloned())
    }

    fn open_field_files(&self, steps: &[u32]) -> Result<(), PluginError> {
        self.opened.lock().extend_from_slice(steps);
        Ok(())
    }
}

/// A plugin that implements fields only.
pub(crate) fn fields_only() -> MemoryPlugin {
    MemoryPlugin {
        capabilities: Some(Capability::Fields.into()),
        ..Default::default()
    }
}
