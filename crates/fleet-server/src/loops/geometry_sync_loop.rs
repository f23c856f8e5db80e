//! Periodically pull no-fly and permit geometry from the configured sources.
//!
//! A failed fetch (transport error, non-2xx, or a body that is not a
//! FeatureCollection) keeps the previous set in place and retries with backoff.
//! A source whose features all fail to parse still replaces the set, since
//! the collaborator is authoritative about what is currently defined.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use fleet_core::geojson::{FeatureCollection, PolygonSet};

use crate::backoff::RetryDelay;
use crate::state::{AppState, GeometryKind};

const FETCH_TIMEOUT_SECS: u64 = 10;
const RETRY_BASE_MS: u64 = 1_000;

pub async fn run_geometry_sync_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let config = state.config().clone();
    let sources: Vec<(GeometryKind, String)> = [
        (GeometryKind::NoFly, config.no_fly_url.clone()),
        (GeometryKind::Permit, config.permit_url.clone()),
    ]
    .into_iter()
    .filter_map(|(kind, url)| url.map(|url| (kind, url)))
    .collect();

    if sources.is_empty() {
        return;
    }

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            tracing::error!("Geometry sync disabled, HTTP client failed to build: {}", err);
            return;
        }
    };

    let refresh = Duration::from_secs(config.geometry_refresh_secs);
    let mut retry = RetryDelay::new(Duration::from_millis(RETRY_BASE_MS), refresh);
    tracing::info!("Geometry sync started ({} sources, every {:?})", sources.len(), refresh);

    loop {
        let mut failed = false;
        for (kind, url) in &sources {
            match fetch_polygons(&client, url).await {
                Ok(polygons) => {
                    state.apply_geometry(*kind, polygons);
                }
                Err(err) => {
                    failed = true;
                    tracing::warn!("Fetching {} geometry from {} failed: {:#}", kind.as_str(), url, err);
                }
            }
        }

        let wait = if failed {
            let delay = retry.on_failure();
            tracing::debug!("Geometry sync retry #{} in {:?}", retry.failures(), delay);
            delay
        } else {
            retry.on_success();
            refresh
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.recv() => {
                tracing::info!("Geometry sync stopping");
                break;
            }
        }
    }
}

async fn fetch_polygons(client: &reqwest::Client, url: &str) -> Result<PolygonSet> {
    let body: serde_json::Value = client
        .get(url)
        .send()
        .await
        .context("request failed")?
        .error_for_status()?
        .json()
        .await
        .context("body is not JSON")?;
    anyhow::ensure!(
        body.get("type").and_then(|t| t.as_str()) == Some("FeatureCollection"),
        "body is not a FeatureCollection"
    );
    let collection: FeatureCollection =
        serde_json::from_value(body).context("malformed FeatureCollection")?;
    Ok(PolygonSet::from_feature_collection(&collection))
}
