use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
    sync::Arc,
};

use graphet_core::{discover_timesteps, formats::ReadError, DiscoveryError, FnameTemplate};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    aggregate::{Raster, RasterSet},
    container::{AggregateError, LazyContainer, LoadError},
    reader::{Backend, SnapshotReader},
    sims::SimulationIdx,
    size::{MemoryUsage, SizeWalker},
};

/// What the user submits to add a simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Generated as `SIM_<n>` if absent or blank.
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
    #[serde(default)]
    pub fields_template: Option<FnameTemplate>,
    #[serde(default)]
    pub particles_template: Option<FnameTemplate>,
    /// Skips discovery. Required for templates without a step placeholder.
    #[serde(default)]
    pub tsteps: Option<Vec<u32>>,
}

impl SimulationConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_fields(mut self, template: FnameTemplate) -> Self {
        self.fields_template = Some(template);
        self
    }

    pub fn with_particles(mut self, template: FnameTemplate) -> Self {
        self.particles_template = Some(template);
        self
    }

    pub fn with_tsteps(mut self, tsteps: impl IntoIterator<Item = u32>) -> Self {
        self.tsteps = Some(tsteps.into_iter().collect());
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Simulation {0:?} needs a fields or a particles template")]
    NoTemplates(String),
    #[error("Simulation {0:?} has an empty path")]
    EmptyPath(String),
    #[error("A simulation named {0:?} already exists")]
    DuplicateName(String),
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("No simulation {0}")]
    UnknownSimulation(SimulationIdx),
    #[error("Simulation {name:?} has no timestep {tstep}")]
    UnknownTimestep { name: String, tstep: u32 },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("Simulation {name:?} has no field {field:?}")]
    UnknownField { name: String, field: String },
    #[error("Simulation {0:?} has no fields template")]
    NoFields(String),
    #[error("Unable to list the keys of {name:?}: {source}")]
    Keys {
        name: String,
        #[source]
        source: ReadError,
    },
    #[error("Background load failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The lazily loaded data of one timestep.
pub struct Snapshot<B: Backend> {
    tstep: u32,
    fields: Option<LazyContainer<B::Fields>>,
    particles: Option<LazyContainer<B::Particles>>,
}

impl<B: Backend> Snapshot<B> {
    pub fn tstep(&self) -> u32 {
        self.tstep
    }

    pub fn fields(&self) -> Option<&LazyContainer<B::Fields>> {
        self.fields.as_ref()
    }

    pub fn particles(&self) -> Option<&LazyContainer<B::Particles>> {
        self.particles.as_ref()
    }

    pub fn load(&self) -> Result<(), LoadError> {
        if let Some(fields) = &self.fields {
            fields.load()?;
        }
        if let Some(particles) = &self.particles {
            particles.load()?;
        }
        Ok(())
    }

    pub fn unload(&self) {
        if let Some(fields) = &self.fields {
            fields.unload();
        }
        if let Some(particles) = &self.particles {
            particles.unload();
        }
    }

    pub fn unaggregate(&self) {
        if let Some(fields) = &self.fields {
            fields.unaggregate();
        }
    }

    /// Whether every configured kind is loaded.
    pub fn is_loaded(&self) -> bool {
        self.fields.as_ref().map_or(true, LazyContainer::is_loaded)
            && self.particles.as_ref().map_or(true, LazyContainer::is_loaded)
    }

    pub fn is_aggregated(&self) -> bool {
        self.fields.as_ref().map_or(false, LazyContainer::is_aggregated)
    }

    fn visit_size(&self, walker: &mut SizeWalker) {
        walker.add_bytes(std::mem::size_of::<Self>());
        if let Some(fields) = &self.fields {
            fields.visit_size(walker);
        }
        if let Some(particles) = &self.particles {
            particles.visit_size(walker);
        }
    }
}

/// One simulation directory and a snapshot per discovered timestep.
pub struct Simulation<B: Backend> {
    name: String,
    config: SimulationConfig,
    tsteps: Vec<u32>,
    snapshots: BTreeMap<u32, Snapshot<B>>,
    fields_reader: Option<Arc<B::Fields>>,
    particles_reader: Option<Arc<B::Particles>>,
    field_keys: OnceCell<Vec<String>>,
}

impl<B: Backend> Simulation<B> {
    /// Validates `config` and finds the timesteps, unless given explicitly.
    #[instrument(skip(config, backend), fields(path = ?config.path))]
    pub fn new(name: String, config: SimulationConfig, backend: &B) -> Result<Self, SimulationError> {
        let template = match (&config.fields_template, &config.particles_template) {
            (Some(t), _) | (None, Some(t)) => t,
            (None, None) => return Err(ConfigurationError::NoTemplates(name).into()),
        };
        if config.path.as_os_str().is_empty() {
            return Err(ConfigurationError::EmptyPath(name).into());
        }

        let tsteps = match &config.tsteps {
            Some(tsteps) => {
                let mut tsteps = tsteps.clone();
                tsteps.sort_unstable();
                tsteps.dedup();
                tsteps
            }
            None => discover_timesteps(&config.path, template)?,
        };

        let fields_reader = config
            .fields_template
            .as_ref()
            .map(|t| Arc::new(backend.fields(&config.path, t)));
        let particles_reader = config
            .particles_template
            .as_ref()
            .map(|t| Arc::new(backend.particles(&config.path, t)));

        let snapshots = tsteps
            .iter()
            .map(|&tstep| {
                let snapshot = Snapshot {
                    tstep,
                    fields: fields_reader
                        .as_ref()
                        .map(|r| LazyContainer::new(r.clone(), tstep)),
                    particles: particles_reader
                        .as_ref()
                        .map(|r| LazyContainer::new(r.clone(), tstep)),
                };
                (tstep, snapshot)
            })
            .collect();

        info!(tsteps = tsteps.len(), "created simulation");
        Ok(Self {
            name,
            config,
            tsteps,
            snapshots,
            fields_reader,
            particles_reader,
            field_keys: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Strictly ascending.
    pub fn tsteps(&self) -> &[u32] {
        &self.tsteps
    }

    pub fn snapshot(&self, tstep: u32) -> Result<&Snapshot<B>, SimulationError> {
        self.snapshots
            .get(&tstep)
            .ok_or_else(|| SimulationError::UnknownTimestep {
                name: self.name.clone(),
                tstep,
            })
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot<B>> {
        self.snapshots.values()
    }

    /// Field names of the first timestep, read once without bulk data.
    pub fn field_keys(&self) -> Result<&[String], SimulationError> {
        let keys = self.field_keys.get_or_try_init(|| -> Result<Vec<String>, SimulationError> {
            let reader = self
                .fields_reader
                .as_ref()
                .ok_or_else(|| SimulationError::NoFields(self.name.clone()))?;
            let Some(&first) = self.tsteps.first() else {
                return Ok(Vec::new());
            };
            let mut keys = reader.keys(first).map_err(|source| SimulationError::Keys {
                name: self.name.clone(),
                source,
            })?;
            keys.sort();
            debug!(name = %self.name, ?keys, "field keys");
            Ok(keys)
        })?;
        Ok(keys)
    }

    /// Particle record names of `tstep`.
    pub fn particle_keys(&self, tstep: u32) -> Result<Vec<String>, SimulationError> {
        self.snapshot(tstep)?;
        match &self.particles_reader {
            Some(reader) => reader.keys(tstep).map_err(|source| SimulationError::Keys {
                name: self.name.clone(),
                source,
            }),
            None => Ok(Vec::new()),
        }
    }

    pub fn load(&self, tstep: u32) -> Result<(), SimulationError> {
        Ok(self.snapshot(tstep)?.load()?)
    }

    pub fn unload(&self, tstep: u32) -> Result<(), SimulationError> {
        self.snapshot(tstep)?.unload();
        Ok(())
    }

    pub fn unaggregate(&self, tstep: u32) -> Result<(), SimulationError> {
        self.snapshot(tstep)?.unaggregate();
        Ok(())
    }

    /// Loads every timestep in order, stopping at the first failure.
    ///
    /// Timesteps loaded before the failure stay loaded.
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn load_all(&self) -> Result<(), SimulationError> {
        for snapshot in self.snapshots.values() {
            snapshot.load()?;
        }
        Ok(())
    }

    pub fn unload_all(&self) {
        for snapshot in self.snapshots.values() {
            snapshot.unload();
        }
    }

    pub fn is_loaded(&self, tstep: u32) -> Result<bool, SimulationError> {
        Ok(self.snapshot(tstep)?.is_loaded())
    }

    pub fn is_aggregated(&self, tstep: u32) -> Result<bool, SimulationError> {
        Ok(self.snapshot(tstep)?.is_aggregated())
    }

    /// Aggregates the fields of `tstep`, loading them if needed.
    pub fn aggregate(&self, tstep: u32, width: usize, height: usize) -> Result<Arc<RasterSet>, SimulationError> {
        let fields = self
            .snapshot(tstep)?
            .fields()
            .ok_or_else(|| SimulationError::NoFields(self.name.clone()))?;
        Ok(fields.aggregate(width, height, true)?)
    }

    pub fn raster(&self, tstep: u32, field: &str, width: usize, height: usize) -> Result<Raster, SimulationError> {
        self.aggregate(tstep, width, height)?
            .raster(field)
            .ok_or_else(|| SimulationError::UnknownField {
                name: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// Approximate footprint in bytes. Shared data is counted once.
    pub fn memory_bytes(&self) -> usize {
        let mut walker = SizeWalker::new();
        walker.add_bytes(std::mem::size_of::<Self>());
        walker.add_heap(&self.name);
        walker.add_heap(&self.tsteps);
        if let Some(keys) = self.field_keys.get() {
            walker.add_heap(keys);
        }
        for snapshot in self.snapshots.values() {
            snapshot.visit_size(&mut walker);
        }
        walker.total()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage(self.memory_bytes())
    }
}

fn strip<B: Backend>(snapshots: &BTreeMap<u32, Snapshot<B>>, f: impl Fn(&Snapshot<B>) -> bool) -> String {
    snapshots
        .values()
        .map(|s| if f(s) { '*' } else { '_' })
        .collect()
}

impl<B: Backend> Display for Simulation<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let template = |t: &Option<FnameTemplate>| t.as_ref().map_or("-".to_string(), ToString::to_string);

        writeln!(f, "Simulation {}", self.name)?;
        writeln!(f, "  path: {}", self.config.path.display())?;
        writeln!(f, "  fields: {}", template(&self.config.fields_template))?;
        writeln!(f, "  particles: {}", template(&self.config.particles_template))?;
        match (self.tsteps.first(), self.tsteps.last()) {
            (Some(first), Some(last)) => {
                writeln!(f, "  timesteps: {} ({first}...{last})", self.tsteps.len())?
            }
            _ => writeln!(f, "  timesteps: 0")?,
        }
        if let Some(keys) = self.field_keys.get() {
            writeln!(f, "  field keys: {keys:?}")?;
        }
        writeln!(f, "  loaded:     {}", strip(&self.snapshots, Snapshot::is_loaded))?;
        writeln!(f, "  aggregated: {}", strip(&self.snapshots, Snapshot::is_aggregated))?;
        write!(f, "  memory: {}", self.memory_usage())
    }
}

impl<B: Backend> fmt::Debug for Simulation<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("tsteps", &self.tsteps)
            .finish_non_exhaustive()
    }
}
