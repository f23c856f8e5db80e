//! Push transport between the operations core and the drone gateway.
//!
//! Gateways attach over a websocket. Outbound messages are serialised once
//! and fanned out to every attached gateway; with none attached, sends fail
//! with `NotConnected` instead of being queued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use fleet_core::transport::{CommandSink, Connectivity, OutboundMessage, TransportError};

use crate::state::{LiveMessage, LiveUpdate};

const OUTBOUND_BUFFER: usize = 64;

#[derive(Clone)]
pub struct TransportHub {
    inner: Arc<Inner>,
}

struct Inner {
    outbound: broadcast::Sender<Arc<str>>,
    connections: AtomicUsize,
    live_tx: broadcast::Sender<LiveMessage>,
}

impl TransportHub {
    pub fn new(live_tx: broadcast::Sender<LiveMessage>) -> Self {
        let (outbound, _) = broadcast::channel(OUTBOUND_BUFFER);
        Self {
            inner: Arc::new(Inner {
                outbound,
                connections: AtomicUsize::new(0),
                live_tx,
            }),
        }
    }

    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn connectivity(&self) -> Connectivity {
        if self.connections() > 0 {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        }
    }

    /// Register a gateway. Connectivity flips to connected on the first one
    /// and back to disconnected when the last session drops.
    pub fn connect(&self) -> TransportSession {
        let outbound = self.inner.outbound.subscribe();
        let previous = self.inner.connections.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Gateway attached ({} connected)", previous + 1);
        if previous == 0 {
            self.publish(Connectivity::Connected, 1);
        }
        TransportSession {
            hub: self.clone(),
            outbound,
        }
    }

    fn disconnect(&self) {
        let previous = self.inner.connections.fetch_sub(1, Ordering::SeqCst);
        tracing::info!("Gateway detached ({} connected)", previous.saturating_sub(1));
        if previous == 1 {
            self.publish(Connectivity::Disconnected, 0);
        }
    }

    /// Send a group of messages with a single connectivity check. Every
    /// message is encoded before any is sent, so an encoding failure or a
    /// missing gateway sends nothing. A gateway detaching part way through
    /// can still cut the group short.
    pub fn send_all(&self, messages: &[OutboundMessage]) -> Result<(), TransportError> {
        let payloads = messages
            .iter()
            .map(|message| serde_json::to_string(message).map(Arc::<str>::from))
            .collect::<Result<Vec<_>, _>>()?;
        if self.connections() == 0 {
            return Err(TransportError::NotConnected);
        }
        for (index, payload) in payloads.into_iter().enumerate() {
            if self.inner.outbound.send(payload).is_err() {
                tracing::warn!(
                    "Gateway detached after {} of {} messages",
                    index,
                    messages.len()
                );
                return Err(TransportError::NotConnected);
            }
        }
        Ok(())
    }

    fn publish(&self, state: Connectivity, transports: usize) {
        let update = LiveUpdate::Connectivity { state, transports };
        if let Ok(message) = LiveMessage::new(None, &update) {
            let _ = self.inner.live_tx.send(message);
        }
    }
}

impl CommandSink for TransportHub {
    fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.connections() == 0 {
            return Err(TransportError::NotConnected);
        }
        let payload = serde_json::to_string(&message)?;
        tracing::debug!("Outbound to {}: {}", message.drone_id(), payload);
        self.inner
            .outbound
            .send(payload.into())
            .map(|_| ())
            .map_err(|_| TransportError::NotConnected)
    }
}

/// One attached gateway. Dropping it detaches the gateway.
pub struct TransportSession {
    hub: TransportHub,
    outbound: broadcast::Receiver<Arc<str>>,
}

impl TransportSession {
    /// Next serialised outbound message, skipping any this gateway lagged past.
    pub async fn next_outbound(&mut self) -> Option<Arc<str>> {
        loop {
            match self.outbound.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Gateway lagged, {} outbound messages skipped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.hub.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::transport::DroneCommand;

    fn hub() -> (TransportHub, broadcast::Receiver<LiveMessage>) {
        let (tx, rx) = broadcast::channel(16);
        (TransportHub::new(tx), rx)
    }

    #[test]
    fn send_without_gateway_is_not_connected() {
        let (hub, _rx) = hub();
        let err = hub
            .send(OutboundMessage::command("D1", DroneCommand::Takeoff))
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn session_receives_outbound_and_tracks_connectivity() {
        let (hub, mut live) = hub();
        let mut session = hub.connect();
        assert_eq!(hub.connectivity(), Connectivity::Connected);

        hub.send(OutboundMessage::command("D1", DroneCommand::Land)).unwrap();
        let payload = session.next_outbound().await.unwrap();
        assert!(payload.contains("\"action\":\"drone:command\""));
        assert!(payload.contains("\"command\":\"land\""));

        drop(session);
        assert_eq!(hub.connectivity(), Connectivity::Disconnected);

        let connected = live.try_recv().unwrap();
        assert!(connected.payload.contains("\"state\":\"connected\""));
        let disconnected = live.try_recv().unwrap();
        assert!(disconnected.payload.contains("\"state\":\"disconnected\""));
    }

    #[tokio::test]
    async fn send_all_is_checked_once_and_keeps_order() {
        let (hub, _live) = hub();
        let group = [
            OutboundMessage::command("D1", DroneCommand::Takeoff),
            OutboundMessage::command("D2", DroneCommand::Takeoff),
        ];
        assert!(matches!(hub.send_all(&group), Err(TransportError::NotConnected)));

        let mut session = hub.connect();
        hub.send_all(&group).unwrap();
        assert!(session.next_outbound().await.unwrap().contains("\"droneId\":\"D1\""));
        assert!(session.next_outbound().await.unwrap().contains("\"droneId\":\"D2\""));
    }
}
