//! Send pacing for the simulators.

use std::time::Duration;

use anyhow::{bail, Result};

/// Interval between sends at `rate_hz`. Rates that are not positive, or
/// whose period rounds to zero or overflows, are rejected.
pub fn tick_period(rate_hz: f64) -> Result<Duration> {
    if rate_hz.is_nan() || rate_hz <= 0.0 {
        bail!("rate must be positive, got {}", rate_hz);
    }
    match Duration::try_from_secs_f64(1.0 / rate_hz) {
        Ok(period) if !period.is_zero() => Ok(period),
        Ok(_) => bail!("rate {} is too high", rate_hz),
        Err(_) => bail!("rate {} is too low", rate_hz),
    }
}
