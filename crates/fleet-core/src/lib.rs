//! Fleet operations core: live drone state, airspace validation of mission
//! areas, mission progress, and video frame ingestion.

pub mod geojson;
pub mod geometry;
pub mod models;
pub mod progress;
pub mod ring_buffer;
pub mod spatial;
pub mod transport;
pub mod validator;
pub mod video;

pub use geojson::{FeatureCollection, Geometry, GeometryError, Polygon, PolygonSet, Shape};
pub use geometry::{close_ring, point_in_polygon, point_near_boundary, polygons_intersect};
pub use models::{
    Coord, DroneLiveState, DroneStatus, DroneView, Mission, MissionStatus, RosterEntry,
    StatusUpdate, Telemetry, TelemetryBatch, TimeValue, Waypoint,
};
pub use progress::{estimate_progress, ProgressEstimate};
pub use ring_buffer::RingBuffer;
pub use transport::{
    CommandSink, Connectivity, DroneCommand, InboundEvent, OutboundMessage, TransportError,
    VideoFrameEvent,
};
pub use validator::{check_commit, validate_draft, ConflictReason, DraftReport, MissionAreaDraft, ValidationError};
pub use video::{FrameOutcome, FramePayload, StreamState, StreamStats, VideoDecoder, VideoError, VideoStream};
