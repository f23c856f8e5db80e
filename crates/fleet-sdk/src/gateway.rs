//! Gateway websocket: push named events, receive outbound commands.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use fleet_core::transport::{InboundEvent, OutboundMessage};

use crate::FleetClient;

const GATEWAY_PATH: &str = "/v1/transport/ws";

/// An attached gateway. The server reports connected while this is open.
pub struct GatewayConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FleetClient {
    pub async fn connect_gateway(&self) -> Result<GatewayConnection> {
        let url = build_ws_url(&self.base_url, GATEWAY_PATH)?;
        let (socket, _) = connect_async(url.as_str()).await?;
        tracing::info!("Gateway connected to {}", url);
        Ok(GatewayConnection { socket })
    }
}

impl GatewayConnection {
    pub async fn send_event(&mut self, event: &InboundEvent) -> Result<()> {
        let text = serde_json::to_string(event)?;
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Forward an already-encoded event envelope unchanged.
    pub async fn send_raw(&mut self, text: impl Into<String>) -> Result<()> {
        self.socket.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Read the next command for the drones behind this gateway (None on close).
    pub async fn next_message(&mut self) -> Result<Option<OutboundMessage>> {
        while let Some(msg) = self.socket.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str(&text) {
                    Ok(message) => return Ok(Some(message)),
                    Err(err) => tracing::warn!("Unrecognised server message: {}", err),
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

fn build_ws_url(base: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => other,
    }
    .to_string();

    url.set_scheme(&scheme)
        .map_err(|_| anyhow::anyhow!("Invalid base URL scheme"))?;
    url.set_path(path);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_follows_http_scheme() {
        assert_eq!(
            build_ws_url("http://localhost:3000", GATEWAY_PATH).unwrap().as_str(),
            "ws://localhost:3000/v1/transport/ws"
        );
        assert_eq!(
            build_ws_url("https://fleet.example.com", GATEWAY_PATH).unwrap().as_str(),
            "wss://fleet.example.com/v1/transport/ws"
        );
    }
}
