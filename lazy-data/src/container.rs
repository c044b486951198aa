//! Per-timestep cache cell: unloaded, loaded or aggregated.

use std::{fmt, io, sync::Arc};

use derive_more::Display;
use get_size::GetSize;
use graphet_core::{common::FieldSet, formats::ReadError};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{aggregate::RasterSet, reader::SnapshotReader, size::SizeWalker};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Out of memory loading timestep {tstep}: {source}")]
    OutOfMemory {
        tstep: u32,
        #[source]
        source: ReadError,
    },
    #[error("File for timestep {tstep} not found: {source}")]
    FileNotFound {
        tstep: u32,
        #[source]
        source: ReadError,
    },
    #[error("Missing key in timestep {tstep}: {source}")]
    MissingKey {
        tstep: u32,
        #[source]
        source: ReadError,
    },
    #[error("Unable to load timestep {tstep}: {source}")]
    Other {
        tstep: u32,
        #[source]
        source: ReadError,
    },
}

impl LoadError {
    fn classify(tstep: u32, source: ReadError) -> Self {
        match &source {
            ReadError::OutOfMemory { .. } => Self::OutOfMemory { tstep, source },
            ReadError::Io { source: io, .. } if io.kind() == io::ErrorKind::OutOfMemory => {
                Self::OutOfMemory { tstep, source }
            }
            ReadError::NotFound(_) => Self::FileNotFound { tstep, source },
            ReadError::MissingKey { .. } => Self::MissingKey { tstep, source },
            _ => Self::Other { tstep, source },
        }
    }

    pub fn tstep(&self) -> u32 {
        match self {
            Self::OutOfMemory { tstep, .. }
            | Self::FileNotFound { tstep, .. }
            | Self::MissingKey { tstep, .. }
            | Self::Other { tstep, .. } => *tstep,
        }
    }
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Timestep {tstep} is not loaded")]
    NotLoaded { tstep: u32 },
    #[error("Cannot aggregate timestep {tstep} to {width}x{height}")]
    EmptyTarget {
        tstep: u32,
        width: usize,
        height: usize,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContainerState {
    #[display(fmt = "unloaded")]
    Unloaded,
    #[display(fmt = "loaded")]
    Loaded,
    #[display(fmt = "aggregated")]
    Aggregated,
}

/// How to produce one snapshot: a reader and the timestep it is bound to.
pub struct Recipe<R> {
    reader: Arc<R>,
    tstep: u32,
}

impl<R> Clone for Recipe<R> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            tstep: self.tstep,
        }
    }
}

impl<R: SnapshotReader> Recipe<R> {
    pub fn new(reader: Arc<R>, tstep: u32) -> Self {
        Self { reader, tstep }
    }

    pub fn tstep(&self) -> u32 {
        self.tstep
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn run(&self) -> Result<R::Output, ReadError> {
        self.reader.read(self.tstep)
    }
}

/// A value that is either still a [`Recipe`] or has been read.
pub enum Deferred<R: SnapshotReader> {
    Pending(Recipe<R>),
    Resolved {
        recipe: Recipe<R>,
        value: Arc<R::Output>,
    },
}

impl<R: SnapshotReader> Deferred<R> {
    pub fn recipe(&self) -> &Recipe<R> {
        match self {
            Self::Pending(recipe) | Self::Resolved { recipe, .. } => recipe,
        }
    }

    pub fn value(&self) -> Option<&Arc<R::Output>> {
        match self {
            Self::Pending(_) => None,
            Self::Resolved { value, .. } => Some(value),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    fn resolve(&mut self, value: Arc<R::Output>) {
        let recipe = self.recipe().clone();
        *self = Self::Resolved { recipe, value };
    }

    fn reset(&mut self) {
        let recipe = self.recipe().clone();
        *self = Self::Pending(recipe);
    }
}

impl<R: SnapshotReader> fmt::Debug for Deferred<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(recipe) => write!(f, "Pending({})", recipe.tstep),
            Self::Resolved { recipe, .. } => write!(f, "Resolved({})", recipe.tstep),
        }
    }
}

struct Slots<R: SnapshotReader> {
    raw: Deferred<R>,
    /// Only ever set while `raw` is resolved.
    aggregated: Option<Arc<RasterSet>>,
}

/// Lazily loaded data of one timestep.
///
/// All operations take `&self`. Concurrent [`load`](Self::load) calls share a
/// single read: the first caller reads while the others wait on the load gate
/// and then find the cached value.
pub struct LazyContainer<R: SnapshotReader> {
    tstep: u32,
    slots: Mutex<Slots<R>>,
    load_gate: Mutex<()>,
}

impl<R: SnapshotReader> LazyContainer<R> {
    pub fn new(reader: Arc<R>, tstep: u32) -> Self {
        Self {
            tstep,
            slots: Mutex::new(Slots {
                raw: Deferred::Pending(Recipe::new(reader, tstep)),
                aggregated: None,
            }),
            load_gate: Mutex::new(()),
        }
    }

    pub fn tstep(&self) -> u32 {
        self.tstep
    }

    pub fn state(&self) -> ContainerState {
        let slots = self.slots.lock();
        match (slots.raw.is_resolved(), slots.aggregated.is_some()) {
            (_, true) => ContainerState::Aggregated,
            (true, false) => ContainerState::Loaded,
            (false, false) => ContainerState::Unloaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.slots.lock().raw.is_resolved()
    }

    pub fn is_aggregated(&self) -> bool {
        self.slots.lock().aggregated.is_some()
    }

    pub fn raw(&self) -> Option<Arc<R::Output>> {
        self.slots.lock().raw.value().cloned()
    }

    pub fn aggregated(&self) -> Option<Arc<RasterSet>> {
        self.slots.lock().aggregated.clone()
    }

    /// Reads the snapshot unless it is cached already.
    ///
    /// On failure the container stays unloaded and a later call retries.
    #[instrument(skip(self), fields(tstep = self.tstep))]
    pub fn load(&self) -> Result<Arc<R::Output>, LoadError> {
        if let Some(value) = self.raw() {
            return Ok(value);
        }

        let _gate = self.load_gate.lock();
        let recipe = {
            let slots = self.slots.lock();
            // Someone else finished the read while we waited
            if let Some(value) = slots.raw.value() {
                return Ok(value.clone());
            }
            slots.raw.recipe().clone()
        };

        debug!("reading");
        let value = recipe
            .run()
            .map(Arc::new)
            .map_err(|e| LoadError::classify(self.tstep, e))?;
        self.slots.lock().raw.resolve(value.clone());
        Ok(value)
    }

    /// Drops both the raw and the aggregated data.
    pub fn unload(&self) {
        let mut slots = self.slots.lock();
        if slots.raw.is_resolved() {
            debug!(tstep = self.tstep, "unloading");
        }
        slots.raw.reset();
        slots.aggregated = None;
    }

    pub fn unaggregate(&self) {
        self.slots.lock().aggregated = None;
    }

    /// Adds the cached data of this container to `walker`.
    pub fn visit_size(&self, walker: &mut SizeWalker)
    where
        R::Output: GetSize,
    {
        walker.add_bytes(std::mem::size_of::<Self>());
        let slots = self.slots.lock();
        if let Some(value) = slots.raw.value() {
            walker.add_shared(value);
        }
        if let Some(aggregated) = &slots.aggregated {
            walker.add_shared(aggregated);
        }
    }
}

impl<R: SnapshotReader<Output = FieldSet>> LazyContainer<R> {
    /// Resamples every field to at most `width x height`.
    ///
    /// A cached result for the same target is returned as is. Without
    /// `allow_implicit_load` an unloaded container is an error.
    #[instrument(skip(self), fields(tstep = self.tstep))]
    pub fn aggregate(
        &self,
        width: usize,
        height: usize,
        allow_implicit_load: bool,
    ) -> Result<Arc<RasterSet>, AggregateError> {
        if width == 0 || height == 0 {
            return Err(AggregateError::EmptyTarget {
                tstep: self.tstep,
                width,
                height,
            });
        }

        let raw = {
            let slots = self.slots.lock();
            if let Some(aggregated) = &slots.aggregated {
                if aggregated.target() == (width, height) {
                    return Ok(aggregated.clone());
                }
            }
            slots.raw.value().cloned()
        };
        let raw = match raw {
            Some(raw) => raw,
            None if allow_implicit_load => self.load()?,
            None => return Err(AggregateError::NotLoaded { tstep: self.tstep }),
        };

        let set = Arc::new(RasterSet::from_fields(&raw, width, height));
        let mut slots = self.slots.lock();
        // Not cached if the data was unloaded or replaced in the meantime
        if slots.raw.value().map_or(false, |v| Arc::ptr_eq(v, &raw)) {
            slots.aggregated = Some(set.clone());
        }
        Ok(set)
    }
}

impl<R: SnapshotReader> fmt::Debug for LazyContainer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyContainer")
            .field("tstep", &self.tstep)
            .field("state", &self.state())
            .finish()
    }
}
