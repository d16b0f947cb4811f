//! External collaborator interfaces. Concrete production implementations
//! (Postgres store, JWT authenticator, ONNX detector, FCM notification
//! backend) are out of scope for this core; callers supply their own via
//! these traits. Each worker that needs one of these opens/uses it and is
//! done; no handle is shared across worker boundaries.

use async_trait::async_trait;

use crate::model::{BoundingBoxDetection, CameraConfig, DetectionEventRecord, MediaRecord};

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_detection(
        &self,
        event: DetectionEventRecord,
    ) -> anyhow::Result<DetectionEventRecord>;

    async fn create_media(&self, media: MediaRecord) -> anyhow::Result<()>;

    async fn get_media_video_path(&self, detection_id: i64) -> anyhow::Result<Option<MediaRecord>>;

    async fn get_camera(&self, camera_id: i64) -> anyhow::Result<Option<CameraConfig>>;
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn infer(
        &self,
        pixels: &[u8],
        conf_threshold: f32,
    ) -> anyhow::Result<Vec<BoundingBoxDetection>>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_alert(
        &self,
        detection: &DetectionEventRecord,
        camera: &CameraConfig,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn probe_codec(&self, path: &std::path::Path) -> anyhow::Result<String>;

    /// Transcode `path` to a browser-friendly H.264/AAC mp4, returning the
    /// output path.
    async fn to_web_mp4(&self, path: &std::path::Path) -> anyhow::Result<std::path::PathBuf>;
}

/// Yields a principal from a bearer token or cookie. Role/session storage
/// is entirely external; the core only needs a yes/no + identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> anyhow::Result<Option<Principal>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
}
