//! Fleet CLI - simulators for the fleet operations server.
//!
//! - send_track: one drone orbiting a point, with battery drain
//! - send_video: replay an H.264 Annex-B file as frame events

pub mod pacing;
pub mod sim;
pub mod video;
