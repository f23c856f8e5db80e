//! Video relay: one `VideoStream` per drone, fanned out to websocket viewers.
//!
//! The playback surface for a stream is the set of attached viewers. It is
//! ready once at least one viewer is attached, starts paused, and is resumed
//! after the first frame is fed. Frames a slow viewer cannot take are skipped
//! for that viewer only.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use fleet_core::transport::{CommandSink, TransportError};
use fleet_core::video::{
    DropReason, FrameOutcome, FramePayload, StreamState, StreamStats, VideoDecoder, VideoError,
    VideoStream,
};

#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    Frame(Arc<[u8]>),
    Resumed,
    Released,
}

/// Decoder side of the relay: forwards Annex-B frames to viewers.
pub struct ViewerSurface {
    tx: broadcast::Sender<SurfaceEvent>,
    paused: bool,
    released: bool,
}

impl ViewerSurface {
    fn new(tx: broadcast::Sender<SurfaceEvent>) -> Self {
        Self {
            tx,
            paused: true,
            released: false,
        }
    }

    pub fn viewers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl VideoDecoder for ViewerSurface {
    fn is_ready(&self) -> bool {
        !self.released && self.viewers() > 0
    }

    fn feed(&mut self, frame: Vec<u8>) -> Result<(), VideoError> {
        self.tx
            .send(SurfaceEvent::Frame(frame.into()))
            .map(|_| ())
            .map_err(|_| VideoError::Feed("no viewer attached".into()))
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn resume(&mut self) -> Result<(), VideoError> {
        if self.released {
            return Err(VideoError::Resume("surface released".into()));
        }
        self.paused = false;
        let _ = self.tx.send(SurfaceEvent::Resumed);
        Ok(())
    }

    fn teardown(&mut self) {
        self.released = true;
        let _ = self.tx.send(SurfaceEvent::Released);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub drone_id: String,
    pub state: StreamState,
    pub viewers: usize,
    pub paused: bool,
    pub stats: StreamStats,
}

struct VideoEntry {
    stream: VideoStream<ViewerSurface>,
    frames: broadcast::Sender<SurfaceEvent>,
}

impl VideoEntry {
    fn status(&self) -> StreamStatus {
        let surface = self.stream.decoder();
        StreamStatus {
            drone_id: self.stream.drone_id().to_string(),
            state: self.stream.state(),
            viewers: self.frames.receiver_count(),
            paused: surface.map(ViewerSurface::is_paused).unwrap_or(true),
            stats: self.stream.stats().clone(),
        }
    }
}

pub struct VideoHub {
    streams: DashMap<String, VideoEntry>,
    viewer_buffer: usize,
}

impl VideoHub {
    pub fn new(viewer_buffer: usize) -> Self {
        Self {
            streams: DashMap::new(),
            viewer_buffer: viewer_buffer.max(1),
        }
    }

    /// Start streaming for a drone. Starting a running stream is a no-op.
    pub fn start(&self, drone_id: &str, sink: &dyn CommandSink) -> Result<StreamStatus, TransportError> {
        match self.streams.entry(drone_id.to_string()) {
            Entry::Occupied(existing) => Ok(existing.get().status()),
            Entry::Vacant(slot) => {
                let (frames, _) = broadcast::channel(self.viewer_buffer);
                let surface = ViewerSurface::new(frames.clone());
                let stream = VideoStream::start(drone_id, Ok(surface), sink)?;
                Ok(slot.insert(VideoEntry { stream, frames }).status())
            }
        }
    }

    /// Stop and forget a stream. Returns false when none was running.
    pub fn stop(&self, drone_id: &str, sink: &dyn CommandSink) -> bool {
        match self.streams.remove(drone_id) {
            Some((_, mut entry)) => {
                entry.stream.stop(sink);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self, sink: &dyn CommandSink) {
        let ids: Vec<String> = self.streams.iter().map(|r| r.key().clone()).collect();
        for drone_id in ids {
            self.stop(&drone_id, sink);
        }
    }

    /// Frames for drones with no running stream are dropped.
    pub fn on_frame(&self, drone_id: &str, payload: &FramePayload) -> FrameOutcome {
        match self.streams.get_mut(drone_id) {
            Some(mut entry) => entry.stream.on_frame(payload),
            None => FrameOutcome::Dropped(DropReason::Stopped),
        }
    }

    pub fn on_bytes(&self, drone_id: &str, bytes: Vec<u8>) -> FrameOutcome {
        match self.streams.get_mut(drone_id) {
            Some(mut entry) => entry.stream.on_bytes(bytes),
            None => FrameOutcome::Dropped(DropReason::Stopped),
        }
    }

    pub fn attach_viewer(&self, drone_id: &str) -> Option<broadcast::Receiver<SurfaceEvent>> {
        self.streams.get(drone_id).map(|entry| entry.frames.subscribe())
    }

    pub fn status(&self, drone_id: &str) -> Option<StreamStatus> {
        self.streams.get(drone_id).map(|entry| entry.status())
    }

    pub fn list(&self) -> Vec<StreamStatus> {
        let mut all: Vec<StreamStatus> = self.streams.iter().map(|r| r.value().status()).collect();
        all.sort_by(|a, b| a.drone_id.cmp(&b.drone_id));
        all
    }
}
