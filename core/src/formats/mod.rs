#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod params;
pub mod read_err;

pub use params::{ParamValue, Params, ParamsError};
pub use read_err::ReadError;
