//! Per-drone H.264 video ingestion.
//!
//! Frames are decoded to Annex-B bytes, screened, and handed to a decoder in
//! arrival order. The feed is lossy: a frame that cannot be fed right now is
//! dropped, never queued.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{CommandSink, DroneCommand, OutboundMessage, TransportError};

/// Leading frames fed even without an Annex-B start code.
pub const UNFRAMED_TOLERANCE: u64 = 3;

const START_CODE_4: [u8; 4] = [0, 0, 0, 1];
const START_CODE_3: [u8; 3] = [0, 0, 1];

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoder rejected frame: {0}")]
    Feed(String),
    #[error("playback surface refused to resume: {0}")]
    Resume(String),
    #[error("decoder unavailable: {0}")]
    Unavailable(String),
}

/// Frame payload as it arrives on the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FramePayload {
    /// Base64 text, optionally as a `data:` URL.
    Text(String),
    /// Raw bytes as a JSON array.
    Bytes(Vec<u8>),
    /// Node-style `{"type":"Buffer","data":[...]}` framing.
    Buffer { data: Vec<u8> },
}

impl FramePayload {
    pub fn decode(&self) -> Result<Vec<u8>, VideoError> {
        match self {
            FramePayload::Text(text) => decode_base64(text),
            FramePayload::Bytes(bytes) | FramePayload::Buffer { data: bytes } => Ok(bytes.clone()),
        }
    }
}

fn decode_base64(text: &str) -> Result<Vec<u8>, VideoError> {
    let body = match text.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => text,
    };
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match STANDARD.decode(&compact) {
        Ok(bytes) => Ok(bytes),
        Err(_) => Ok(STANDARD_NO_PAD.decode(&compact)?),
    }
}

/// Length of the leading Annex-B start code, if any.
pub fn start_code_len(bytes: &[u8]) -> Option<usize> {
    if bytes.starts_with(&START_CODE_4) {
        Some(4)
    } else if bytes.starts_with(&START_CODE_3) {
        Some(3)
    } else {
        None
    }
}

/// Non-empty and every byte zero: a keepalive or corrupt frame.
pub fn is_all_zero(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|b| *b == 0)
}

/// NAL unit type of the first unit (7 = SPS, 8 = PPS, 5 = IDR slice).
pub fn nal_unit_type(bytes: &[u8]) -> Option<u8> {
    let offset = start_code_len(bytes)?;
    bytes.get(offset).map(|header| header & 0x1F)
}

/// Split an Annex-B byte stream into NAL units, each keeping its start code.
pub fn split_annex_b(stream: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= stream.len() {
        if stream[i..].starts_with(&START_CODE_3) {
            let begin = if i > 0 && stream[i - 1] == 0 { i - 1 } else { i };
            if starts.last() != Some(&begin) {
                starts.push(begin);
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (n, begin) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(stream.len());
        units.push(&stream[*begin..end]);
    }
    units
}

/// A decoder attached to a playback surface.
///
/// `feed` must hand the bytes off without waiting for decode completion.
pub trait VideoDecoder {
    fn is_ready(&self) -> bool;
    fn feed(&mut self, frame: Vec<u8>) -> Result<(), VideoError>;
    fn is_paused(&self) -> bool;
    fn resume(&mut self) -> Result<(), VideoError>;
    /// Release the decoder and its surface. Called at most once.
    fn teardown(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Arrived after the stream was stopped.
    Stopped,
    Undecodable,
    Empty,
    AllZero,
    MissingStartCode,
    DecoderNotReady,
    FeedFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Fed,
    /// Fed inside the start-code tolerance window without a start code.
    FedUnvalidated,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub received: u64,
    pub fed: u64,
    pub dropped_stopped: u64,
    pub dropped_undecodable: u64,
    pub dropped_empty: u64,
    pub dropped_all_zero: u64,
    pub dropped_missing_start_code: u64,
    pub dropped_not_ready: u64,
    pub dropped_feed_failed: u64,
}

impl StreamStats {
    fn count_drop(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::Stopped => &mut self.dropped_stopped,
            DropReason::Undecodable => &mut self.dropped_undecodable,
            DropReason::Empty => &mut self.dropped_empty,
            DropReason::AllZero => &mut self.dropped_all_zero,
            DropReason::MissingStartCode => &mut self.dropped_missing_start_code,
            DropReason::DecoderNotReady => &mut self.dropped_not_ready,
            DropReason::FeedFailed => &mut self.dropped_feed_failed,
        };
        *counter += 1;
    }
}

#[derive(Debug, Default)]
struct LoggedOnce {
    all_zero: bool,
    undecodable: bool,
    missing_start_code: bool,
}

/// One drone's video sub-stream, from start command to teardown.
pub struct VideoStream<D: VideoDecoder> {
    drone_id: String,
    decoder: Option<D>,
    state: StreamState,
    /// Non-empty, non-zero frames seen; drives the start-code tolerance window.
    content_frames: u64,
    stats: StreamStats,
    logged: LoggedOnce,
}

impl<D: VideoDecoder> VideoStream<D> {
    /// Ask the transport to start streaming and bind the decoder.
    ///
    /// A decoder that failed to initialise leaves the stream running with
    /// every frame dropped; `stop` is still safe.
    pub fn start(
        drone_id: impl Into<String>,
        decoder: Result<D, VideoError>,
        sink: &dyn CommandSink,
    ) -> Result<Self, TransportError> {
        let drone_id = drone_id.into();
        sink.send(OutboundMessage::command(&drone_id, DroneCommand::StartVideoStream))?;

        let decoder = match decoder {
            Ok(decoder) => Some(decoder),
            Err(err) => {
                tracing::warn!("Video decoder for {} failed to initialise: {}", drone_id, err);
                None
            }
        };
        tracing::info!("Video stream started for {}", drone_id);

        Ok(Self {
            drone_id,
            decoder,
            state: StreamState::Running,
            content_frames: 0,
            stats: StreamStats::default(),
            logged: LoggedOnce::default(),
        })
    }

    pub fn drone_id(&self) -> &str {
        &self.drone_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn decoder(&self) -> Option<&D> {
        self.decoder.as_ref()
    }

    pub fn on_frame(&mut self, payload: &FramePayload) -> FrameOutcome {
        match payload.decode() {
            Ok(bytes) => self.on_bytes(bytes),
            Err(err) => {
                self.stats.received += 1;
                if !self.logged.undecodable {
                    self.logged.undecodable = true;
                    tracing::warn!("Undecodable video payload from {}: {}", self.drone_id, err);
                }
                self.drop_frame(DropReason::Undecodable)
            }
        }
    }

    pub fn on_bytes(&mut self, bytes: Vec<u8>) -> FrameOutcome {
        self.stats.received += 1;

        if self.state == StreamState::Stopped {
            return self.drop_frame(DropReason::Stopped);
        }
        if bytes.is_empty() {
            return self.drop_frame(DropReason::Empty);
        }
        if is_all_zero(&bytes) {
            if !self.logged.all_zero {
                self.logged.all_zero = true;
                tracing::warn!(
                    "Dropping all-zero video frame ({} bytes) from {}",
                    bytes.len(),
                    self.drone_id
                );
            }
            return self.drop_frame(DropReason::AllZero);
        }

        self.content_frames += 1;
        let framed = start_code_len(&bytes).is_some();
        if !framed && self.content_frames > UNFRAMED_TOLERANCE {
            if !self.logged.missing_start_code {
                self.logged.missing_start_code = true;
                tracing::warn!("Video frames from {} lack an Annex-B start code", self.drone_id);
            }
            return self.drop_frame(DropReason::MissingStartCode);
        }

        let Some(decoder) = self.decoder.as_mut().filter(|decoder| decoder.is_ready()) else {
            return self.drop_frame(DropReason::DecoderNotReady);
        };

        if let Err(err) = decoder.feed(bytes) {
            tracing::debug!("Video feed for {} failed: {}", self.drone_id, err);
            return self.drop_frame(DropReason::FeedFailed);
        }

        self.stats.fed += 1;
        if self.stats.fed == 1 && decoder.is_paused() {
            if let Err(err) = decoder.resume() {
                tracing::warn!("Could not resume playback for {}: {}", self.drone_id, err);
            }
        }

        if framed {
            FrameOutcome::Fed
        } else {
            FrameOutcome::FedUnvalidated
        }
    }

    fn drop_frame(&mut self, reason: DropReason) -> FrameOutcome {
        self.stats.count_drop(reason);
        FrameOutcome::Dropped(reason)
    }

    /// Send the stop command and release the decoder. Idempotent.
    pub fn stop(&mut self, sink: &dyn CommandSink) {
        if self.state == StreamState::Stopped {
            return;
        }
        self.state = StreamState::Stopped;
        if let Err(err) = sink.send(OutboundMessage::command(&self.drone_id, DroneCommand::StopVideoStream)) {
            tracing::warn!("Stop command for {} not delivered: {}", self.drone_id, err);
        }
        self.release();
        tracing::info!("Video stream stopped for {}", self.drone_id);
    }

    fn release(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.teardown();
        }
    }
}

impl<D: VideoDecoder> Drop for VideoStream<D> {
    fn drop(&mut self) {
        self.release();
    }
}
