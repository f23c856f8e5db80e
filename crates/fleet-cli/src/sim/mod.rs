//! Simulated drone motion.

pub mod paths;

pub use paths::{sample, FlightPath, Orbit};
