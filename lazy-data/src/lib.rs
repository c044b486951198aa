#![warn(clippy::complexity)]
#![warn(clippy::correctness)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![warn(clippy::suspicious)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod aggregate;
pub mod container;
pub mod reader;
pub mod sim;
pub mod sims;
pub mod size;

#[cfg(test)]
pub(crate) mod test_backend;

pub use aggregate::{Raster, RasterSet};
pub use container::{AggregateError, ContainerState, LazyContainer, LoadError};
pub use reader::{Backend, SnapshotReader};
pub use sim::{ConfigurationError, SimulationConfig, Simulation, SimulationError, Snapshot};
pub use sims::{BySimulation, SimulationIdx, Simulations};
pub use size::{format_bytes, MemoryUsage};

#[cfg(feature = "hdf5")]
pub use reader::Hdf5Backend;
