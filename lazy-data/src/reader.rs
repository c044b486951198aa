use std::path::Path;

use graphet_core::{
    common::{FieldSet, ParticleSet},
    formats::ReadError,
    FnameTemplate,
};

/// Reads whole snapshots of one kind, one timestep at a time.
pub trait SnapshotReader: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn read(&self, tstep: u32) -> Result<Self::Output, ReadError>;

    /// Quantity names stored at `tstep`, without reading bulk data.
    fn keys(&self, tstep: u32) -> Result<Vec<String>, ReadError>;
}

/// Creates the readers for a simulation directory.
pub trait Backend: Send + Sync + 'static {
    type Fields: SnapshotReader<Output = FieldSet>;
    type Particles: SnapshotReader<Output = ParticleSet>;

    fn fields(&self, directory: &Path, template: &FnameTemplate) -> Self::Fields;

    fn particles(&self, directory: &Path, template: &FnameTemplate) -> Self::Particles;
}

#[cfg(feature = "hdf5")]
pub use self::hdf5::{Hdf5Backend, Hdf5Fields, Hdf5Particles};

#[cfg(feature = "hdf5")]
mod hdf5 {
    use std::path::{Path, PathBuf};

    use graphet_core::{
        common::{FieldSet, ParticleSet},
        formats::{hdf5, ReadError},
        FnameTemplate,
    };

    use super::{Backend, SnapshotReader};

    #[derive(Debug, Clone, Copy, Default)]
    pub struct Hdf5Backend;

    #[derive(Debug, Clone)]
    pub struct Hdf5Fields {
        directory: PathBuf,
        template: FnameTemplate,
    }

    #[derive(Debug, Clone)]
    pub struct Hdf5Particles {
        directory: PathBuf,
        template: FnameTemplate,
    }

    impl Backend for Hdf5Backend {
        type Fields = Hdf5Fields;
        type Particles = Hdf5Particles;

        fn fields(&self, directory: &Path, template: &FnameTemplate) -> Hdf5Fields {
            Hdf5Fields {
                directory: directory.to_path_buf(),
                template: template.clone(),
            }
        }

        fn particles(&self, directory: &Path, template: &FnameTemplate) -> Hdf5Particles {
            Hdf5Particles {
                directory: directory.to_path_buf(),
                template: template.clone(),
            }
        }
    }

    impl SnapshotReader for Hdf5Fields {
        type Output = FieldSet;

        fn read(&self, tstep: u32) -> Result<FieldSet, ReadError> {
            hdf5::read_field_set(&self.template.path_in(&self.directory, tstep))
        }

        fn keys(&self, tstep: u32) -> Result<Vec<String>, ReadError> {
            hdf5::field_keys(&self.template.path_in(&self.directory, tstep))
        }
    }

    impl SnapshotReader for Hdf5Particles {
        type Output = ParticleSet;

        fn read(&self, tstep: u32) -> Result<ParticleSet, ReadError> {
            hdf5::read_particle_set(&self.template.path_in(&self.directory, tstep))
        }

        fn keys(&self, tstep: u32) -> Result<Vec<String>, ReadError> {
            hdf5::H5File::open(&self.template.path_in(&self.directory, tstep))?.keys()
        }
    }
}
