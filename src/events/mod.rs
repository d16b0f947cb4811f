//! Detection event manager: gates detections through the
//! cooldown/confidence/class policy, persists accepted events, renders
//! annotated stills, coordinates post-event recording, and fires alerts.

pub mod cooldown;
pub mod notify;
pub mod recording;
pub mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Datelike, TimeZone, Utc};
use once_cell::sync::OnceCell;
use tracing::{error, warn};

use crate::capture::CaptureManager;
use crate::model::{BoundingBoxDetection, DetectionEventRecord, Frame, MediaRecord, MediaType};
use crate::traits::{NotificationSink, Store};
use cooldown::CooldownTable;
use notify::NotificationPool;
use recording::{AnnotatedFrameSource, RecordingCoordinator};

pub struct EventManagerConfig {
    pub min_confidence: f32,
    pub recordable_classes: Vec<String>,
    pub detection_cooldown_seconds: f64,
    pub clip_leading_seconds: f64,
    pub clip_trailing_seconds: f64,
    pub storage_dir: PathBuf,
    pub storage_img_subdir: String,
    pub storage_video_subdir: String,
    pub enable_alert_notifications: bool,
}

pub struct DetectionEventManager {
    config: EventManagerConfig,
    cooldown: CooldownTable,
    recording: RecordingCoordinator,
    store: Arc<dyn Store>,
    notifications: Option<NotificationPool>,
    capture: Arc<CaptureManager>,
    frame_source: OnceCell<Arc<dyn AnnotatedFrameSource>>,
}

impl DetectionEventManager {
    pub fn new(
        config: EventManagerConfig,
        store: Arc<dyn Store>,
        notification_sink: Option<Arc<dyn NotificationSink>>,
        capture: Arc<CaptureManager>,
    ) -> Self {
        let cooldown = CooldownTable::new(config.detection_cooldown_seconds);
        let recording = RecordingCoordinator::new(config.clip_leading_seconds, config.clip_trailing_seconds);
        let notifications = if config.enable_alert_notifications {
            notification_sink.map(NotificationPool::new)
        } else {
            None
        };
        DetectionEventManager {
            config,
            cooldown,
            recording,
            store,
            notifications,
            capture,
            frame_source: OnceCell::new(),
        }
    }

    /// Wires the annotated-frame source once the inference dispatcher
    /// exists. Construction order is manager-first (it's a dependency of
    /// the dispatcher), so this is set during pipeline assembly rather
    /// than at `new`.
    pub fn set_frame_source(&self, source: Arc<dyn AnnotatedFrameSource>) {
        let _ = self.frame_source.set(source);
    }

    /// Entry point called from the inference hot loop for every raw
    /// detection. Non-blocking on the reject path; the only I/O on the
    /// accept path is store/image writes, which is fine since most
    /// detections are rejected before any I/O happens at all.
    pub async fn record(&self, camera_id: i64, frame: &Frame, detection: &BoundingBoxDetection) {
        if detection.confidence < self.config.min_confidence {
            return;
        }
        if !self
            .config
            .recordable_classes
            .iter()
            .any(|c| c == &detection.class_name)
        {
            return;
        }

        // Cooldown is measured against the frame's own capture timestamp,
        // not wall-clock call time, so the gap between two persisted
        // events tracks the camera's own clock rather than scheduling
        // jitter on the inference worker.
        if !self
            .cooldown
            .try_accept(camera_id, &detection.class_name, frame.capture_timestamp)
        {
            return;
        }
        let now = now_wall_secs();

        let camera = match self.capture.camera_config(camera_id) {
            Some(c) => c,
            None => {
                warn!(camera_id, "detection for unknown camera, dropping event");
                return;
            }
        };

        let event = DetectionEventRecord {
            id: 0,
            camera_id,
            timestamp: frame.capture_timestamp,
            detection_type: detection.class_name.clone(),
            confidence: detection.confidence,
            created_at: now,
        };

        let persisted = match self.store.create_detection(event).await {
            Ok(e) => e,
            Err(e) => {
                error!(camera_id, error = %e, "failed to persist detection event, dropping");
                return;
            }
        };

        let date_parts = date_parts(persisted.timestamp);
        let image_path = self.build_path(
            &self.config.storage_img_subdir,
            &camera.display_name,
            &date_parts,
            &format!(
                "{}_{}_{}.jpg",
                camera_id,
                persisted.timestamp as i64,
                detection.class_name
            ),
        );

        match render::render_annotated_still(
            &frame.pixels,
            frame.resolution,
            std::slice::from_ref(detection),
            &format_timestamp(persisted.timestamp),
        ) {
            Ok(jpeg) => {
                if let Err(e) = self.write_and_register_image(&image_path, jpeg, &persisted).await {
                    error!(camera_id, error = %e, "failed to write/register annotated still");
                }
            }
            Err(e) => {
                error!(camera_id, error = %e, "failed to render annotated still");
            }
        }

        if let Some(source) = self.frame_source.get() {
            let video_path = self.build_path(
                &self.config.storage_video_subdir,
                &camera.display_name,
                &date_parts,
                &format!(
                    "{}_{}_{}_clip.mp4",
                    camera_id, persisted.timestamp as i64, persisted.id
                ),
            );
            self.recording.trigger(
                camera_id,
                persisted.timestamp,
                persisted.id,
                video_path,
                Arc::clone(source),
                Arc::clone(&self.store),
                frame.resolution,
            );
        }

        if let Some(pool) = &self.notifications {
            pool.dispatch(persisted, camera);
        }
    }

    async fn write_and_register_image(
        &self,
        relative_path: &PathBuf,
        jpeg: Vec<u8>,
        event: &DetectionEventRecord,
    ) -> anyhow::Result<()> {
        let absolute = self.config.storage_dir.join(relative_path);
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let size_bytes = jpeg.len() as u64;
        tokio::fs::write(&absolute, jpeg).await?;

        let media = MediaRecord {
            id: 0,
            camera_id: event.camera_id,
            detection_id: event.id,
            media_type: MediaType::Image,
            path: relative_path.to_string_lossy().replace('\\', "/"),
            timestamp: event.timestamp,
            duration: None,
            size_bytes,
        };
        self.store.create_media(media).await
    }

    fn build_path(&self, subdir: &str, camera_name: &str, date_parts: &str, file_name: &str) -> PathBuf {
        PathBuf::from(subdir).join(camera_name).join(date_parts).join(file_name)
    }

    pub fn is_recording(&self, camera_id: i64) -> bool {
        self.recording.is_recording(camera_id)
    }
}

fn now_wall_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn date_parts(timestamp: f64) -> String {
    let dt = Utc.timestamp_opt(timestamp as i64, 0).single().unwrap_or_else(Utc::now);
    format!("{:04}/{:02}/{:02}", dt.year(), dt.month(), dt.day())
}

fn format_timestamp(timestamp: f64) -> String {
    let dt = Utc.timestamp_opt(timestamp as i64, 0).single().unwrap_or_else(Utc::now);
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_parts_formats_as_yyyy_mm_dd() {
        // 2024-01-05T00:00:00Z
        let ts = 1704412800.0;
        assert_eq!(date_parts(ts), "2024/01/05");
    }
}
