//! CLI tool to send simulated drone telemetry to the fleet server.
//!
//! Simulates a single drone orbiting a point.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use fleet_cli::pacing::tick_period;
use fleet_cli::sim::{sample, Orbit};
use fleet_sdk::{DroneStatus, FleetClient};
use tokio::time;

/// Send drone telemetry to the fleet server (single drone, circular path)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Fleet server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Drone identifier
    #[arg(long, default_value = "DRONE001")]
    drone_id: String,

    /// Center latitude
    #[arg(long, default_value_t = 10.7769)]
    lat: f64,

    /// Center longitude
    #[arg(long, default_value_t = 106.7009)]
    lon: f64,

    /// Circle radius in meters
    #[arg(long, default_value_t = 200.0)]
    radius: f64,

    /// Altitude in meters
    #[arg(long, default_value_t = 50.0)]
    altitude: f64,

    /// Ground speed in m/s
    #[arg(long, default_value_t = 10.0)]
    speed: f64,

    /// Starting battery percentage
    #[arg(long, default_value_t = 100.0)]
    battery: f64,

    /// Battery drain in percent per minute
    #[arg(long, default_value_t = 1.5)]
    drain: f64,

    /// Duration in seconds
    #[arg(long, default_value_t = 60)]
    duration: u64,

    /// Update rate in Hz
    #[arg(long, default_value_t = 1.0)]
    rate: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let period = tick_period(args.rate).context("--rate")?;

    println!("Connecting to fleet server at {}...", args.url);
    let client = FleetClient::new(&args.url);
    client.send_status(&args.drone_id, DroneStatus::Flying).await?;

    let orbit = Orbit::new([args.lon, args.lat], args.radius, args.altitude, args.speed);

    println!("Starting circular flight simulation for {}", args.drone_id);
    println!("  Center: ({}, {})", args.lat, args.lon);
    println!("  Radius: {}m, Altitude: {}m", args.radius, args.altitude);
    println!("  Duration: {}s, Update rate: {}Hz", args.duration, args.rate);
    println!();

    let start = time::Instant::now();
    let mut update_count = 0u32;
    let mut interval = time::interval(period);

    loop {
        interval.tick().await;

        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > args.duration as f64 {
            break;
        }

        let telemetry = sample(&orbit, &args.drone_id, elapsed, args.battery, args.drain, Utc::now());
        match client.send_telemetry(&telemetry).await {
            Ok(_) => {
                update_count += 1;
                println!(
                    "[{:3}] Sent position ({:.6}, {:.6}) battery {:.1}% -> OK",
                    update_count,
                    telemetry.lat,
                    telemetry.lon,
                    telemetry.battery.unwrap_or_default()
                );
            }
            Err(e) => {
                eprintln!("Error sending telemetry: {}", e);
            }
        }
    }

    client.send_status(&args.drone_id, DroneStatus::Hovering).await?;
    println!("\nSimulation complete. Sent {} position updates.", update_count);
    Ok(())
}
