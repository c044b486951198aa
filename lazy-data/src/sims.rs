use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashMap;
use derive_more::Display;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    aggregate::Raster,
    reader::Backend,
    sim::{ConfigurationError, Simulation, SimulationConfig, SimulationError},
    size::MemoryUsage,
};

/// The simulations known to the dashboard.
///
/// Lookups are lock-free. `add` and `remove` are serialized so that a name is
/// never claimed twice and a removal never races a registration.
pub struct Simulations<B: Backend> {
    backend: B,
    simulations: DashMap<SimulationIdx, Arc<Simulation<B>>>,
    /// Maps a simulation name to its index.
    by_name: DashMap<String, SimulationIdx>,
    idx_cntr: AtomicUsize,
    writer: Mutex<()>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[display(fmt = "#{}", _0)]
pub struct SimulationIdx(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BySimulation<T>(pub SimulationIdx, pub T);

impl<B: Backend> Simulations<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            simulations: DashMap::new(),
            by_name: DashMap::new(),
            idx_cntr: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn get_new_idx(&self) -> SimulationIdx {
        let idx = self.idx_cntr.fetch_add(1, Ordering::SeqCst);
        SimulationIdx(idx)
    }

    /// `SIM_<len>`, counting up past names already taken.
    fn next_name(&self) -> String {
        let mut n = self.simulations.len();
        loop {
            let name = format!("SIM_{n}");
            if !self.by_name.contains_key(&name) {
                return name;
            }
            n += 1;
        }
    }

    /// Creates and registers a simulation. Nothing is registered on failure.
    #[instrument(skip(self, config), fields(path = ?config.path))]
    pub fn add(&self, config: SimulationConfig) -> Result<SimulationIdx, SimulationError> {
        let _writer = self.writer.lock();
        let name = match config.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.next_name(),
        };
        if self.by_name.contains_key(&name) {
            return Err(ConfigurationError::DuplicateName(name).into());
        }

        let sim = Simulation::new(name.clone(), config, &self.backend)?;
        let idx = self.get_new_idx();
        self.simulations.insert(idx, Arc::new(sim));
        self.by_name.insert(name.clone(), idx);
        info!(%idx, name = %name, "added simulation");
        Ok(idx)
    }

    /// Unregisters a simulation and unloads all of its timesteps.
    pub fn remove(&self, idx: SimulationIdx) -> Result<Arc<Simulation<B>>, SimulationError> {
        let _writer = self.writer.lock();
        let (_, sim) = self
            .simulations
            .remove(&idx)
            .ok_or(SimulationError::UnknownSimulation(idx))?;
        self.by_name.remove(sim.name());
        sim.unload_all();
        info!(%idx, name = sim.name(), "removed simulation");
        Ok(sim)
    }

    pub fn get(&self, idx: SimulationIdx) -> Result<Arc<Simulation<B>>, SimulationError> {
        self.simulations
            .get(&idx)
            .map(|sim| sim.value().clone())
            .ok_or(SimulationError::UnknownSimulation(idx))
    }

    pub fn by_name(&self, name: &str) -> Option<SimulationIdx> {
        self.by_name.get(name).map(|idx| *idx)
    }

    /// Every simulation, in the order they were added.
    pub fn enumerate(&self) -> Vec<BySimulation<Arc<Simulation<B>>>> {
        let mut sims: Vec<_> = self
            .simulations
            .iter()
            .map(|entry| BySimulation(*entry.key(), entry.value().clone()))
            .collect();
        sims.sort_by_key(|s| s.0);
        sims
    }

    pub fn len(&self) -> usize {
        self.simulations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.simulations.is_empty()
    }

    pub fn load(&self, idx: SimulationIdx, tstep: u32) -> Result<(), SimulationError> {
        self.get(idx)?.load(tstep)
    }

    pub fn unload(&self, idx: SimulationIdx, tstep: u32) -> Result<(), SimulationError> {
        self.get(idx)?.unload(tstep)
    }

    pub fn load_all(&self, idx: SimulationIdx) -> Result<(), SimulationError> {
        self.get(idx)?.load_all()
    }

    pub fn unload_all(&self, idx: SimulationIdx) -> Result<(), SimulationError> {
        self.get(idx)?.unload_all();
        Ok(())
    }

    pub fn field_keys(&self, idx: SimulationIdx) -> Result<Vec<String>, SimulationError> {
        Ok(self.get(idx)?.field_keys()?.to_vec())
    }

    /// One field of one timestep at display resolution, aggregating on demand.
    pub fn raster(
        &self,
        idx: SimulationIdx,
        tstep: u32,
        field: &str,
        width: usize,
        height: usize,
    ) -> Result<Raster, SimulationError> {
        self.get(idx)?.raster(tstep, field, width, height)
    }

    pub fn memory_usage(&self, idx: SimulationIdx) -> Result<MemoryUsage, SimulationError> {
        Ok(self.get(idx)?.memory_usage())
    }

    /// Loads `tstep` on the blocking pool.
    ///
    /// A request for a timestep that is already being read waits for that
    /// read instead of starting another one.
    pub async fn load_in_background(&self, idx: SimulationIdx, tstep: u32) -> Result<(), SimulationError> {
        let sim = self.get(idx)?;
        tokio::task::spawn_blocking(move || sim.load(tstep))
            .await
            .map_err(SimulationError::from)
            .and_then(|r| r)
    }

    /// Loads every timestep in ascending order on the blocking pool.
    ///
    /// Stops at the first failing timestep like [`Simulation::load_all`];
    /// later timesteps stay unloaded.
    pub async fn load_all_in_background(&self, idx: SimulationIdx) -> Result<(), SimulationError> {
        let sim = self.get(idx)?;
        tokio::task::spawn_blocking(move || sim.load_all())
            .await
            .map_err(SimulationError::from)
            .and_then(|r| r)
    }
}

impl<B: Backend + Default> Default for Simulations<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}

#[cfg(test)]
#[path = "sims_test.rs"]
mod tests;
