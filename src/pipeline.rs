//! `Pipeline`: the composition root (spec §9 redesign flag — replaces the
//! source's global mutable singletons with a single value owning every
//! subsystem by composition). Constructed once in `main.rs`, shared behind
//! an `Arc` with the HTTP layer, exactly as the teacher's `main.rs` builds
//! its subsystems once and hands clones of `Config`/`CropState` to each
//! spawned task.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::capture::CaptureManager;
use crate::config::NexGuardConfig;
use crate::error::Result;
use crate::events::{DetectionEventManager, EventManagerConfig};
use crate::inference::{DetectorLoader, InferenceDispatcher};
use crate::model::CameraConfig;
use crate::traits::{Detector, NotificationSink, Store};
use crate::webrtc::WebRtcSessionManager;

/// Owns every core subsystem. Passed by `Arc` into the HTTP/WS layer's
/// request state; never a singleton accessed through a global.
pub struct Pipeline {
    pub capture: Arc<CaptureManager>,
    pub inference: Arc<InferenceDispatcher>,
    pub events: Arc<DetectionEventManager>,
    pub webrtc: Arc<WebRtcSessionManager>,
}

impl Pipeline {
    /// Assembles the pipeline from configuration and the external
    /// collaborators (spec §1: store, detector, notification sink are
    /// supplied by the caller; the core only depends on their trait
    /// interfaces).
    pub fn new(
        config: &NexGuardConfig,
        store: Arc<dyn Store>,
        initial_detector: Arc<dyn Detector>,
        detector_loader: Arc<DetectorLoader>,
        notification_sink: Option<Arc<dyn NotificationSink>>,
    ) -> Self {
        let capture = Arc::new(CaptureManager::new(config.detection.default_buffer_size));

        let event_config = EventManagerConfig {
            min_confidence: config.detection.min_confidence,
            recordable_classes: config.detection.recordable_classes.clone(),
            detection_cooldown_seconds: config.detection.detection_cooldown_seconds,
            clip_leading_seconds: config.detection.clip_leading_seconds,
            clip_trailing_seconds: config.detection.clip_trailing_seconds,
            storage_dir: PathBuf::from(&config.storage.storage_dir),
            storage_img_subdir: config.storage.storage_img_subdir.clone(),
            storage_video_subdir: config.storage.storage_video_subdir.clone(),
            enable_alert_notifications: config.detection.enable_alert_notifications,
        };
        let events = Arc::new(DetectionEventManager::new(
            event_config,
            store,
            notification_sink,
            Arc::clone(&capture),
        ));

        let inference = Arc::new(InferenceDispatcher::new(
            initial_detector,
            config.detection.min_confidence,
            detector_loader,
            Arc::clone(&capture),
            Arc::clone(&events),
        ));
        events.set_frame_source(inference.clone() as Arc<dyn crate::events::recording::AnnotatedFrameSource>);

        let webrtc = Arc::new(WebRtcSessionManager::new(
            config.webrtc.ice_server_urls(),
            Arc::clone(&capture),
        ));

        Pipeline {
            capture,
            inference,
            events,
            webrtc,
        }
    }

    /// Registers every camera from configuration, matching `CaptureManager`'s
    /// `Add` contract; a duplicate `camera_id` in config is logged and
    /// skipped rather than aborting startup.
    pub fn load_cameras(&self, cameras: &[CameraConfig]) {
        for camera in cameras {
            match self.capture.add(camera.clone()) {
                Ok(()) => info!(camera_id = camera.camera_id, "camera registered"),
                Err(e) => warn!(camera_id = camera.camera_id, error = %e, "failed to register camera"),
            }
        }
    }

    /// Starts capture and inference for every enabled camera (spec §4.1/
    /// §4.2 `StartAll`), matching the teacher's "spawn every subsystem at
    /// startup" shape in `main.rs`.
    pub fn start_all(&self) -> Result<()> {
        self.capture.start_all();
        self.inference.start_processing(None);
        Ok(())
    }

    pub fn stop_all(&self) {
        self.inference.stop_processing(None);
        self.capture.stop_all();
    }
}
