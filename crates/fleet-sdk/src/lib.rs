//! Fleet SDK - gateway integration library
//!
//! Pushes telemetry, status and video frames to the fleet operations server
//! and reads back live state.

pub mod client;
pub mod gateway;

pub use client::{DroneSummary, FleetClient, FrameAck, IngestSummary};
pub use fleet_core::models::{DroneStatus, Telemetry};
pub use gateway::GatewayConnection;
