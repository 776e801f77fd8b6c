#[cfg(test)]
#[macro_use]
extern crate assert_float_eq;

pub mod alignment;
pub mod astro_math;
pub mod camera;
pub mod config;
pub mod controller;
pub mod coords;
pub mod enums;
pub mod environment;
pub mod errors;
pub mod motor;
pub mod server;

pub use config::Config;
pub use controller::MountController;
pub use coords::{AltAz, RaDec};
pub use environment::{Clock, Environment, ObservingLocation};
pub use errors::{MountError, Result};
