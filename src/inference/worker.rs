//! Per-camera inference worker loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::CaptureManager;
use crate::events::DetectionEventManager;
use crate::inference::ModelState;
use crate::model::AnnotatedFrame;
use crate::ring::FrameRing;

const IDLE_POLL: Duration = Duration::from_millis(10);

pub struct InferenceWorkerHandle {
    pub stop: Arc<AtomicBool>,
    pub done_rx: std::sync::mpsc::Receiver<()>,
    #[allow(dead_code)]
    join: Option<JoinHandle<()>>,
}

pub fn spawn(
    camera_id: i64,
    capture: Arc<CaptureManager>,
    annotated_ring: Arc<FrameRing<AnnotatedFrame>>,
    events: Arc<DetectionEventManager>,
    model: Arc<ModelState>,
) -> InferenceWorkerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let stop_clone = Arc::clone(&stop);

    let join = tokio::spawn(async move {
        run(camera_id, capture, annotated_ring, events, model, stop_clone).await;
        let _ = done_tx.send(());
    });

    InferenceWorkerHandle {
        stop,
        done_rx,
        join: Some(join),
    }
}

async fn run(
    camera_id: i64,
    capture: Arc<CaptureManager>,
    annotated_ring: Arc<FrameRing<AnnotatedFrame>>,
    events: Arc<DetectionEventManager>,
    model: Arc<ModelState>,
    stop: Arc<AtomicBool>,
) {
    info!(camera_id, "inference worker started");
    let mut last_frame_number: u64 = 0;

    while !stop.load(Ordering::Relaxed) {
        let frame = match capture.latest_frame(camera_id) {
            Some(f) if f.frame_number != last_frame_number => f,
            _ => {
                tokio::time::sleep(IDLE_POLL).await;
                continue;
            }
        };
        last_frame_number = frame.frame_number;

        let detections = match model.infer(&frame.pixels).await {
            Ok(d) => d,
            Err(e) => {
                warn!(camera_id, error = %e, "inference failed, skipping frame");
                continue;
            }
        };

        for detection in &detections {
            events
                .record(camera_id, &frame, detection)
                .await;
        }

        let annotated = AnnotatedFrame {
            frame: frame.clone(),
            detections,
            annotated_pixels: None,
        };
        annotated_ring.push_drop_oldest(annotated);
    }

    info!(camera_id, "inference worker stopping");
}
