//! Error taxonomy for the NexGuard core.
//!
//! Hot loops (capture, inference) never propagate these upward: they log
//! and continue. HTTP handlers translate the relevant variants into status
//! codes. This enum exists for the cases callers genuinely need to branch
//! on (e.g. `LoadModel` callers, the media endpoint) — everything else is
//! logged at the point of occurrence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NexGuardError {
    #[error("camera {camera_id} already registered")]
    AlreadyExists { camera_id: i64 },

    #[error("camera {camera_id} not found")]
    CameraNotFound { camera_id: i64 },

    #[error("failed to open capture source for camera {camera_id}: {source}")]
    CaptureOpenFailed {
        camera_id: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("model not found at {path}")]
    ModelNotFound { path: String },

    #[error("failed to load model: {0}")]
    ModelLoadFailed(#[source] anyhow::Error),

    #[error("inference failed: {0}")]
    InferenceFailed(#[source] anyhow::Error),

    #[error("detection event store write failed: {0}")]
    StorePersistFailed(#[source] anyhow::Error),

    #[error("media write failed: {0}")]
    MediaWriteFailed(#[source] anyhow::Error),

    #[error("transcode failed: {0}")]
    TranscodeFailed(#[source] anyhow::Error),

    #[error("requested range is not satisfiable")]
    RangeInvalid,

    #[error("path {path} escapes storage root")]
    PathEscape { path: String },

    #[error("media record not found for detection {detection_id}")]
    MediaNotFound { detection_id: i64 },

    #[error("WebRTC peer negotiation failed: {0}")]
    PeerNegotiationFailed(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, NexGuardError>;
