//! Server configuration from environment.

use std::env;

use fleet_core::models::Coord;
use fleet_core::validator::BOUNDARY_WARNING_M;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// GeoJSON FeatureCollection of no-fly zones.
    pub no_fly_url: Option<String>,
    /// GeoJSON FeatureCollection of permit areas.
    pub permit_url: Option<String>,
    pub geometry_refresh_secs: u64,
    /// Placeholder position for roster drones with no home and no telemetry.
    pub roster_position: Coord,
    pub boundary_warning_m: f64,
    /// Frames buffered per video viewer before a slow viewer starts skipping.
    pub video_viewer_buffer: usize,
    /// Live updates buffered per renderer before a slow renderer starts skipping.
    pub live_buffer: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_port: parse_var("FLEET_PORT").unwrap_or(3000),
            no_fly_url: non_empty_var("FLEET_NO_FLY_URL"),
            permit_url: non_empty_var("FLEET_PERMIT_URL"),
            geometry_refresh_secs: parse_var("FLEET_GEOMETRY_REFRESH_SECS")
                .unwrap_or(60)
                .max(1),
            roster_position: [
                parse_var("FLEET_ROSTER_LON").unwrap_or(0.0),
                parse_var("FLEET_ROSTER_LAT").unwrap_or(0.0),
            ],
            boundary_warning_m: parse_var("FLEET_BOUNDARY_WARN_M").unwrap_or(BOUNDARY_WARNING_M),
            video_viewer_buffer: parse_var("FLEET_VIDEO_VIEWER_BUFFER").unwrap_or(8).max(1),
            live_buffer: parse_var("FLEET_LIVE_BUFFER").unwrap_or(256).max(1),
        }
    }

    pub fn geometry_sync_enabled(&self) -> bool {
        self.no_fly_url.is_some() || self.permit_url.is_some()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
