//! CLI tool to replay an H.264 Annex-B file as video frames for one drone.

use anyhow::Context;
use clap::Parser;
use fleet_cli::pacing::tick_period;
use fleet_cli::video::access_units;
use fleet_sdk::FleetClient;
use std::path::PathBuf;
use tokio::time;

/// Replay a raw H.264 file to the fleet server's video relay
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Fleet server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Drone identifier
    #[arg(long, default_value = "DRONE001")]
    drone_id: String,

    /// Annex-B elementary stream (.h264)
    #[arg(long)]
    file: PathBuf,

    /// Frames per second
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Replay the file this many times
    #[arg(long, default_value_t = 1)]
    loops: u32,

    /// Skip the start/stop calls (stream already managed elsewhere)
    #[arg(long)]
    no_control: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let period = tick_period(args.fps).context("--fps")?;

    let stream = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let frames = access_units(&stream);
    if frames.is_empty() {
        anyhow::bail!("{} contains no Annex-B start codes", args.file.display());
    }
    println!("Loaded {} frames from {}", frames.len(), args.file.display());

    let client = FleetClient::new(&args.url);
    if !args.no_control {
        client.start_video(&args.drone_id).await?;
        println!("Video stream started for {}", args.drone_id);
    }

    let mut interval = time::interval(period);
    let (mut fed, mut dropped) = (0u64, 0u64);

    for pass in 0..args.loops {
        for frame in &frames {
            interval.tick().await;
            match client.send_video_frame(&args.drone_id, frame).await {
                Ok(ack) if ack.was_fed() => fed += 1,
                Ok(ack) => {
                    dropped += 1;
                    if dropped == 1 {
                        println!("Frame dropped: {}", ack.reason.as_deref().unwrap_or("unknown"));
                    }
                }
                Err(e) => {
                    eprintln!("Error sending frame: {}", e);
                }
            }
        }
        println!("Pass {} complete: {} fed, {} dropped", pass + 1, fed, dropped);
    }

    if !args.no_control {
        client.stop_video(&args.drone_id).await?;
    }
    println!("\nReplay complete. {} frames fed, {} dropped.", fed, dropped);
    Ok(())
}
