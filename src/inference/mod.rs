//! Inference dispatcher: one worker per camera consumes the newest
//! capture frame, runs the detector, and publishes an annotated frame to
//! a per-camera ring. Model swap is guarded by an RwLock held only for
//! the duration of the swap itself.

mod worker;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::info;

use crate::capture::CaptureManager;
use crate::error::{NexGuardError, Result};
use crate::events::recording::AnnotatedFrameSource;
use crate::events::DetectionEventManager;
use crate::model::AnnotatedFrame;
use crate::ring::FrameRing;
use crate::traits::Detector;
use worker::InferenceWorkerHandle;

/// Constructs a `Detector` from a resolved model path. Concrete detector
/// backends (ONNX runtime, a remote inference service, ...) are external
/// collaborators; the dispatcher only owns the swap, not the loading
/// mechanism, so this is supplied at construction.
pub type DetectorLoader = dyn Fn(&Path) -> anyhow::Result<Arc<dyn Detector>> + Send + Sync;

const ANNOTATED_RING_CAPACITY: usize = 4;

/// The swappable model state, shared (via `Arc`) between the dispatcher
/// and every running worker so `LoadModel`/`SetConfThreshold` take effect
/// without restarting workers.
pub(crate) struct ModelState {
    detector: AsyncRwLock<Arc<dyn Detector>>,
    conf_threshold_bits: AtomicU32,
}

impl ModelState {
    pub(crate) async fn infer(
        &self,
        pixels: &[u8],
    ) -> anyhow::Result<Vec<crate::model::BoundingBoxDetection>> {
        let detector = self.detector.read().await;
        let threshold = f32::from_bits(self.conf_threshold_bits.load(Ordering::SeqCst));
        detector.infer(pixels, threshold).await
    }
}

struct CameraSlot {
    ring: Arc<FrameRing<AnnotatedFrame>>,
    worker: Option<InferenceWorkerHandle>,
}

pub struct InferenceDispatcher {
    model: Arc<ModelState>,
    loader: Arc<DetectorLoader>,
    slots: RwLock<HashMap<i64, CameraSlot>>,
    capture: Arc<CaptureManager>,
    events: Arc<DetectionEventManager>,
}

impl InferenceDispatcher {
    pub fn new(
        initial_detector: Arc<dyn Detector>,
        conf_threshold: f32,
        loader: Arc<DetectorLoader>,
        capture: Arc<CaptureManager>,
        events: Arc<DetectionEventManager>,
    ) -> Self {
        InferenceDispatcher {
            model: Arc::new(ModelState {
                detector: AsyncRwLock::new(initial_detector),
                conf_threshold_bits: AtomicU32::new(conf_threshold.to_bits()),
            }),
            loader,
            slots: RwLock::new(HashMap::new()),
            capture,
            events,
        }
    }

    /// Atomically swaps the active detector for a camera.
    /// Resolves `path` first so a missing model never disturbs the
    /// currently-loaded one; the write lock is only taken once a
    /// replacement detector has been successfully constructed.
    pub async fn load_model(&self, path: &Path, conf_threshold: f32) -> Result<()> {
        if !path.exists() {
            return Err(NexGuardError::ModelNotFound {
                path: path.to_string_lossy().to_string(),
            });
        }
        let detector = (self.loader)(path).map_err(NexGuardError::ModelLoadFailed)?;
        let mut guard = self.model.detector.write().await;
        *guard = detector;
        drop(guard);
        self.model
            .conf_threshold_bits
            .store(conf_threshold.to_bits(), Ordering::SeqCst);
        Ok(())
    }

    pub fn set_conf_threshold(&self, t: f32) {
        self.model.conf_threshold_bits.store(t.to_bits(), Ordering::SeqCst);
    }

    pub fn conf_threshold(&self) -> f32 {
        f32::from_bits(self.model.conf_threshold_bits.load(Ordering::SeqCst))
    }

    /// Starts a worker for each of `camera_ids`, or every camera currently
    /// known to the capture manager if `None`. Idempotent per camera.
    pub fn start_processing(&self, camera_ids: Option<&[i64]>) {
        let ids: Vec<i64> = match camera_ids {
            Some(ids) => ids.to_vec(),
            None => self.capture.known_camera_ids(),
        };
        for camera_id in ids {
            self.start_one(camera_id);
        }
    }

    fn start_one(&self, camera_id: i64) {
        let mut slots = self.slots.write();
        let slot = slots.entry(camera_id).or_insert_with(|| CameraSlot {
            ring: Arc::new(FrameRing::new(ANNOTATED_RING_CAPACITY)),
            worker: None,
        });
        if slot.worker.is_some() {
            return;
        }
        info!(camera_id, "starting inference worker");
        let handle = worker::spawn(
            camera_id,
            Arc::clone(&self.capture),
            Arc::clone(&slot.ring),
            Arc::clone(&self.events),
            Arc::clone(&self.model),
        );
        slot.worker = Some(handle);
    }

    pub fn stop_processing(&self, camera_ids: Option<&[i64]>) {
        let ids: Vec<i64> = match camera_ids {
            Some(ids) => ids.to_vec(),
            None => self.slots.read().keys().copied().collect(),
        };
        let mut slots = self.slots.write();
        for id in ids {
            if let Some(slot) = slots.get_mut(&id) {
                if let Some(mut handle) = slot.worker.take() {
                    handle.stop.store(true, Ordering::SeqCst);
                    let _ = handle.done_rx.recv_timeout(std::time::Duration::from_secs(3));
                }
            }
        }
    }

    /// The public `LatestResults` contract (spec §4.2): drain-to-latest on
    /// the annotated ring, semantically identical to `CaptureManager::
    /// latest_frame`'s non-destructive counterpart at §4.1. Not used by the
    /// WebRTC track source or the clip recorder — those are read-only
    /// consumers per §2 and go through `peek_latest_results` instead, so
    /// the two never drain the ring out from under each other.
    pub fn latest_results(&self, camera_id: i64) -> Option<AnnotatedFrame> {
        self.slots.read().get(&camera_id)?.ring.drain_to_latest()
    }

    /// Non-destructive read of the newest annotated frame. Used by every
    /// concurrent read-only consumer of the annotated ring (the WebRTC
    /// track source, the post-event clip recorder) so neither one's poll
    /// empties the ring for the other.
    pub fn peek_latest_results(&self, camera_id: i64) -> Option<AnnotatedFrame> {
        self.slots.read().get(&camera_id)?.ring.peek_latest()
    }

    pub fn annotated_ring(&self, camera_id: i64) -> Option<Arc<FrameRing<AnnotatedFrame>>> {
        self.slots.read().get(&camera_id).map(|s| Arc::clone(&s.ring))
    }
}

impl AnnotatedFrameSource for InferenceDispatcher {
    fn peek_latest_results(&self, camera_id: i64) -> Option<AnnotatedFrame> {
        InferenceDispatcher::peek_latest_results(self, camera_id)
    }
}
