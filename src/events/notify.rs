//! Bounded notification worker pool: a fixed-size pool fed by a channel,
//! so a slow or wedged `NotificationSink` can't cause unbounded task
//! growth the way spawning a task per alert would.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::model::{CameraConfig, DetectionEventRecord};
use crate::traits::NotificationSink;

const QUEUE_CAPACITY: usize = 256;
const WORKER_COUNT: usize = 2;

struct AlertJob {
    detection: DetectionEventRecord,
    camera: CameraConfig,
}

pub struct NotificationPool {
    tx: mpsc::Sender<AlertJob>,
}

impl NotificationPool {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker_id in 0..WORKER_COUNT {
            let sink = Arc::clone(&sink);
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    match job {
                        Some(job) => {
                            if let Err(e) = sink.send_alert(&job.detection, &job.camera).await {
                                warn!(worker_id, error = %e, "notification sink failed");
                            }
                        }
                        None => break,
                    }
                }
            });
        }
        NotificationPool { tx }
    }

    /// Enqueues an alert; drops it (with a warning) if the queue is full
    /// rather than blocking the caller, which is always the detection
    /// event hot path.
    pub fn dispatch(&self, detection: DetectionEventRecord, camera: CameraConfig) {
        if self.tx.try_send(AlertJob { detection, camera }).is_err() {
            warn!("notification queue full, dropping alert");
        }
    }
}
