//! Gateway and renderer websockets against a server on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use fleet_core::models::{DroneStatus, StatusUpdate, Telemetry, TelemetryBatch};
use fleet_core::transport::{DroneCommand, InboundEvent, OutboundMessage};
use fleet_sdk::FleetClient;
use fleet_server::{api, config::Config, state::AppState};

fn config() -> Config {
    Config {
        server_port: 0,
        no_fly_url: None,
        permit_url: None,
        geometry_refresh_secs: 60,
        roster_position: [0.0, 0.0],
        boundary_warning_m: 50.0,
        video_viewer_buffer: 4,
        live_buffer: 64,
    }
}

async fn spawn_server() -> (String, Arc<AppState>) {
    let state = Arc::new(AppState::new(config()));
    let app = api::routes().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn test_gateway_events_reach_store_and_commands_reach_gateway() {
    let (base, state) = spawn_server().await;
    let client = FleetClient::new(&base);
    let mut gateway = client.connect_gateway().await.expect("gateway connects");
    eventually("gateway session", || state.transport.connections() == 1).await;

    gateway
        .send_event(&InboundEvent::Telemetry(TelemetryBatch::One(Telemetry::at(
            "D1", 10.0, 106.0,
        ))))
        .await
        .unwrap();
    eventually("telemetry in store", || state.drones.get("D1").is_some()).await;
    assert_eq!(state.drones.position("D1"), Some([106.0, 10.0]));

    // Malformed envelopes are logged and skipped; the socket stays usable.
    gateway.send_raw("not json at all").await.unwrap();
    gateway.send_raw(r#"{"event":"teleport","data":{}}"#).await.unwrap();
    gateway
        .send_event(&InboundEvent::Status(StatusUpdate {
            drone_id: "D1".into(),
            status: DroneStatus::Flying,
        }))
        .await
        .unwrap();
    eventually("status after malformed events", || {
        state.drones.get("D1").map(|d| d.status) == Some(DroneStatus::Flying)
    })
    .await;
    assert_eq!(state.transport.connections(), 1);

    let res = reqwest::Client::new()
        .post(format!("{}/v1/drones/D1/commands", base))
        .json(&json!({ "command": "takeoff" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);

    let received = tokio::time::timeout(Duration::from_secs(5), gateway.next_message())
        .await
        .expect("command should arrive")
        .unwrap();
    match received {
        Some(OutboundMessage::DroneCommand(payload)) => {
            assert_eq!(payload.drone_id, "D1");
            assert_eq!(payload.command, DroneCommand::Takeoff);
        }
        other => panic!("expected drone:command, got {:?}", other),
    }

    gateway.close().await.unwrap();
    eventually("gateway detach", || state.transport.connections() == 0).await;
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("renderer message should arrive")
            .expect("socket open")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_renderer_stream_sends_filtered_snapshot_then_live_updates() {
    let (base, state) = spawn_server().await;
    state.drones.ingest_one(&Telemetry::at("D1", 10.0, 106.0));
    state.drones.ingest_one(&Telemetry::at("D2", 11.0, 107.0));

    let url = format!("{}/v1/stream?drone_id=D1", base.replacen("http", "ws", 1));
    let (mut socket, _) = connect_async(url.as_str()).await.expect("renderer connects");

    let snapshot = next_json(&mut socket).await;
    assert_eq!(snapshot["type"], "drone");
    assert_eq!(snapshot["drone"]["droneId"], "D1");
    assert_eq!(snapshot["drone"]["path"].as_array().unwrap().len(), 1);

    // The renderer subscribed before its snapshot, so these are live.
    state.drones.ingest_one(&Telemetry::at("D2", 11.1, 107.0));
    state.drones.ingest_one(&Telemetry::at("D1", 10.1, 106.0));

    let update = next_json(&mut socket).await;
    assert_eq!(update["type"], "drone");
    assert_eq!(update["drone"]["droneId"], "D1", "updates for D2 are filtered out");
    assert_eq!(update["drone"]["path"].as_array().unwrap().len(), 2);

    // Fleet-wide updates pass any filter.
    let client = FleetClient::new(&base);
    let gateway = client.connect_gateway().await.unwrap();
    let connectivity = next_json(&mut socket).await;
    assert_eq!(connectivity["type"], "connectivity");
    assert_eq!(connectivity["state"], "connected");
    gateway.close().await.unwrap();
}
