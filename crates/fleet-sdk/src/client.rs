//! HTTP client for the fleet operations server.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use fleet_core::models::{Coord, DroneStatus, Telemetry};

/// Client for one fleet server.
#[derive(Clone)]
pub struct FleetClient {
    pub(crate) base_url: String,
    pub(crate) client: reqwest::Client,
}

/// Server's accounting for one telemetry post.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IngestSummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// How the server handled one video frame.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameAck {
    pub outcome: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl FrameAck {
    pub fn was_fed(&self) -> bool {
        self.outcome.starts_with("fed")
    }
}

/// Live drone state as served by `/v1/drones`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneSummary {
    pub drone_id: String,
    pub name: String,
    pub status: DroneStatus,
    pub telemetry: Telemetry,
    #[serde(default)]
    pub path: Vec<Coord>,
    pub has_fix: bool,
    pub active: bool,
}

impl FleetClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send one telemetry report.
    pub async fn send_telemetry(&self, telemetry: &Telemetry) -> Result<IngestSummary> {
        self.post_telemetry(telemetry).await
    }

    /// Send several reports in one request. Bad reports are rejected
    /// individually by the server.
    pub async fn send_batch(&self, batch: &[Telemetry]) -> Result<IngestSummary> {
        self.post_telemetry(batch).await
    }

    async fn post_telemetry<T: Serialize + ?Sized>(&self, body: &T) -> Result<IngestSummary> {
        let response = self
            .client
            .post(self.url("/v1/telemetry"))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let summary: IngestSummary = response.json().await?;
        if !status.is_success() {
            anyhow::bail!(
                "Telemetry rejected ({}): {} of {} reports invalid",
                status,
                summary.rejected,
                summary.accepted + summary.rejected
            );
        }
        Ok(summary)
    }

    pub async fn send_status(&self, drone_id: &str, status: DroneStatus) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/v1/drones/{}/status", drone_id)))
            .json(&json!({ "status": status }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to send status: {}", response.status());
        }
        Ok(())
    }

    /// Post one Annex-B frame as base64 text.
    pub async fn send_video_frame(&self, drone_id: &str, frame: &[u8]) -> Result<FrameAck> {
        let response = self
            .client
            .post(self.url(&format!("/v1/video/{}/frame", drone_id)))
            .json(&json!({ "payload": STANDARD.encode(frame) }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to send video frame: {}", response.status());
        }
        Ok(response.json().await?)
    }

    pub async fn start_video(&self, drone_id: &str) -> Result<()> {
        self.video_control(drone_id, "start").await
    }

    pub async fn stop_video(&self, drone_id: &str) -> Result<()> {
        self.video_control(drone_id, "stop").await
    }

    async fn video_control(&self, drone_id: &str, action: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/v1/video/{}/{}", drone_id, action)))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Video {} failed ({}): {}", action, status, body);
        }
        Ok(())
    }

    /// All known drones, ordered by id.
    pub async fn drones(&self) -> Result<Vec<DroneSummary>> {
        let drones = self
            .client
            .get(self.url("/v1/drones"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(drones)
    }

    /// One drone, or `None` if the server has never heard of it.
    pub async fn drone(&self, drone_id: &str) -> Result<Option<DroneSummary>> {
        let response = self
            .client
            .get(self.url(&format!("/v1/drones/{}", drone_id)))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = FleetClient::new("http://localhost:3000/");
        assert_eq!(client.url("/v1/drones"), "http://localhost:3000/v1/drones");
    }

    #[test]
    fn drone_summary_reads_server_shape() {
        let body = serde_json::json!({
            "droneId": "D1",
            "name": "D1",
            "status": "flying",
            "telemetry": {"droneId": "D1", "lat": 10.0, "lon": 106.0, "timestamp": "2024-01-01T00:00:00Z"},
            "path": [[106.0, 10.0]],
            "batteryHistory": [],
            "altitudeHistory": [],
            "speedHistory": [],
            "hasFix": true,
            "active": false
        });
        let summary: DroneSummary = serde_json::from_value(body).unwrap();
        assert_eq!(summary.status, DroneStatus::Flying);
        assert_eq!(summary.path, vec![[106.0, 10.0]]);
        assert!(!summary.active);
    }

    #[test]
    fn frame_ack_classifies_outcome() {
        let fed: FrameAck = serde_json::from_str(r#"{"outcome":"fed_unvalidated"}"#).unwrap();
        assert!(fed.was_fed());
        let dropped: FrameAck =
            serde_json::from_str(r#"{"outcome":"dropped","reason":"all_zero"}"#).unwrap();
        assert!(!dropped.was_fed());
        assert_eq!(dropped.reason.as_deref(), Some("all_zero"));
    }
}
