// #![warn(clippy::pedantic)]
// #![warn(clippy::nursery)]
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

pub mod common;
pub mod data;
pub mod file;
pub mod formats;
pub mod plugin;

pub use data::{Data, DataError};
pub use file::{discover_timesteps, DiscoveryError, FnameTemplate, TemplateError};
