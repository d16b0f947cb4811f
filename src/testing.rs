//! Lightweight in-memory test doubles for the external-collaborator
//! traits, so the pipeline is testable without a real database, model, or
//! push backend. Used by this crate's own integration tests and by
//! `main.rs` when no production collaborator is configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::model::{BoundingBoxDetection, CameraConfig, DetectionEventRecord, MediaRecord};
use crate::traits::{Detector, NotificationSink, Store};

/// In-memory `Store`: assigns ids sequentially, keeps everything in a
/// `Mutex`-guarded map. Each call opens no external handle, matching §5's
/// "each worker opens and closes a short-lived store handle" policy
/// vacuously (there's nothing to open).
#[derive(Default)]
pub struct InMemoryStore {
    next_detection_id: AtomicI64,
    next_media_id: AtomicI64,
    detections: Mutex<Vec<DetectionEventRecord>>,
    media: Mutex<Vec<MediaRecord>>,
    cameras: Mutex<HashMap<i64, CameraConfig>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    pub fn with_cameras(cameras: impl IntoIterator<Item = CameraConfig>) -> Self {
        let store = InMemoryStore::new();
        let mut map = store.cameras.lock();
        for camera in cameras {
            map.insert(camera.camera_id, camera);
        }
        drop(map);
        store
    }

    pub fn detections(&self) -> Vec<DetectionEventRecord> {
        self.detections.lock().clone()
    }

    pub fn media(&self) -> Vec<MediaRecord> {
        self.media.lock().clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_detection(
        &self,
        mut event: DetectionEventRecord,
    ) -> anyhow::Result<DetectionEventRecord> {
        event.id = self.next_detection_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.detections.lock().push(event.clone());
        Ok(event)
    }

    async fn create_media(&self, mut media: MediaRecord) -> anyhow::Result<()> {
        media.id = self.next_media_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.media.lock().push(media);
        Ok(())
    }

    async fn get_media_video_path(&self, detection_id: i64) -> anyhow::Result<Option<MediaRecord>> {
        Ok(self
            .media
            .lock()
            .iter()
            .find(|m| m.detection_id == detection_id && m.media_type == crate::model::MediaType::Video)
            .cloned())
    }

    async fn get_camera(&self, camera_id: i64) -> anyhow::Result<Option<CameraConfig>> {
        Ok(self.cameras.lock().get(&camera_id).cloned())
    }
}

/// Detector double returning a fixed, caller-supplied set of detections
/// regardless of input pixels. Useful for exercising the event manager's
/// recording policy without a real model.
pub struct FixedDetector {
    detections: Mutex<Vec<BoundingBoxDetection>>,
}

impl FixedDetector {
    pub fn new(detections: Vec<BoundingBoxDetection>) -> Self {
        FixedDetector {
            detections: Mutex::new(detections),
        }
    }

    pub fn set_detections(&self, detections: Vec<BoundingBoxDetection>) {
        *self.detections.lock() = detections;
    }
}

#[async_trait]
impl Detector for FixedDetector {
    async fn infer(
        &self,
        _pixels: &[u8],
        conf_threshold: f32,
    ) -> anyhow::Result<Vec<BoundingBoxDetection>> {
        Ok(self
            .detections
            .lock()
            .iter()
            .filter(|d| d.confidence >= conf_threshold)
            .cloned()
            .collect())
    }
}

/// Notification sink that records every alert it receives instead of
/// calling out to a real push backend.
#[derive(Default)]
pub struct RecordingNotificationSink {
    sent: Mutex<Vec<(DetectionEventRecord, CameraConfig)>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingNotificationSink::default())
    }

    pub fn sent(&self) -> Vec<(DetectionEventRecord, CameraConfig)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn send_alert(
        &self,
        detection: &DetectionEventRecord,
        camera: &CameraConfig,
    ) -> anyhow::Result<()> {
        self.sent.lock().push((detection.clone(), camera.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, MediaType};

    #[tokio::test]
    async fn in_memory_store_assigns_sequential_ids() {
        let store = InMemoryStore::new();
        let e1 = store
            .create_detection(DetectionEventRecord {
                id: 0,
                camera_id: 1,
                timestamp: 1.0,
                detection_type: "person".into(),
                confidence: 0.9,
                created_at: 1.0,
            })
            .await
            .unwrap();
        let e2 = store
            .create_detection(DetectionEventRecord {
                id: 0,
                camera_id: 1,
                timestamp: 2.0,
                detection_type: "person".into(),
                confidence: 0.9,
                created_at: 2.0,
            })
            .await
            .unwrap();
        assert_eq!(e1.id, 1);
        assert_eq!(e2.id, 2);
    }

    #[tokio::test]
    async fn get_media_video_path_filters_by_type() {
        let store = InMemoryStore::new();
        store
            .create_media(MediaRecord {
                id: 0,
                camera_id: 1,
                detection_id: 5,
                media_type: MediaType::Image,
                path: "images/a.jpg".into(),
                timestamp: 1.0,
                duration: None,
                size_bytes: 10,
            })
            .await
            .unwrap();
        store
            .create_media(MediaRecord {
                id: 0,
                camera_id: 1,
                detection_id: 5,
                media_type: MediaType::Video,
                path: "videos/a.mp4".into(),
                timestamp: 1.0,
                duration: Some(30.0),
                size_bytes: 1000,
            })
            .await
            .unwrap();
        let found = store.get_media_video_path(5).await.unwrap().unwrap();
        assert_eq!(found.media_type, MediaType::Video);
    }

    #[tokio::test]
    async fn fixed_detector_filters_by_threshold() {
        let detector = FixedDetector::new(vec![BoundingBoxDetection {
            class_name: "person".into(),
            class_id: 0,
            confidence: 0.4,
            box_: BoundingBox { x1: 0, y1: 0, x2: 1, y2: 1 },
        }]);
        let result = detector.infer(&[], 0.5).await.unwrap();
        assert!(result.is_empty());
        let result = detector.infer(&[], 0.3).await.unwrap();
        assert_eq!(result.len(), 1);
    }
}
