//! Flight paths that produce telemetry samples.

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use fleet_core::models::{Coord, Telemetry};
use fleet_core::spatial::{meters_to_lat, meters_to_lon};

/// Position over time for a simulated drone.
pub trait FlightPath: Send + Sync {
    /// `[lon, lat]` and altitude in meters at `t` seconds from start.
    fn position(&self, t: f64) -> (Coord, f64);

    fn speed_mps(&self) -> f64;

    /// Heading in degrees (0 = north), estimated from a short step ahead.
    fn heading(&self, t: f64) -> f64 {
        let ([lon1, lat1], _) = self.position(t);
        let ([lon2, lat2], _) = self.position(t + 0.1);
        let (dlon, dlat) = (lon2 - lon1, lat2 - lat1);
        if dlat.abs() < 1e-12 && dlon.abs() < 1e-12 {
            return 0.0;
        }
        dlon.atan2(dlat).to_degrees().rem_euclid(360.0)
    }
}

/// Constant-speed circle around a center point.
pub struct Orbit {
    pub center: Coord,
    pub radius_m: f64,
    pub altitude_m: f64,
    pub speed_mps: f64,
    pub clockwise: bool,
}

impl Orbit {
    pub fn new(center: Coord, radius_m: f64, altitude_m: f64, speed_mps: f64) -> Self {
        Self {
            center,
            radius_m: radius_m.max(1.0),
            altitude_m,
            speed_mps: speed_mps.max(0.1),
            clockwise: false,
        }
    }

    pub fn period_secs(&self) -> f64 {
        2.0 * PI * self.radius_m / self.speed_mps
    }
}

impl FlightPath for Orbit {
    fn position(&self, t: f64) -> (Coord, f64) {
        let mut angle = 2.0 * PI * t / self.period_secs();
        if self.clockwise {
            angle = -angle;
        }
        let east = self.radius_m * angle.cos();
        let north = self.radius_m * angle.sin();
        let [lon, lat] = self.center;
        let position = [lon + meters_to_lon(east, lat), lat + meters_to_lat(north, lat)];
        (position, self.altitude_m)
    }

    fn speed_mps(&self) -> f64 {
        self.speed_mps
    }
}

/// Telemetry for `drone_id` at `t` seconds, battery draining linearly.
pub fn sample(
    path: &dyn FlightPath,
    drone_id: &str,
    t: f64,
    battery_start: f64,
    drain_per_min: f64,
    at: DateTime<Utc>,
) -> Telemetry {
    let ([lon, lat], altitude) = path.position(t);
    Telemetry {
        drone_id: drone_id.to_string(),
        lat,
        lon,
        altitude: Some(altitude),
        heading: Some(path.heading(t)),
        speed: Some(path.speed_mps()),
        battery: Some((battery_start - drain_per_min * t / 60.0).clamp(0.0, 100.0)),
        timestamp: at,
    }
}
