//! Capture manager: owns one worker + one frame ring per camera and
//! exposes the add/update/remove/start/stop/status contract.

mod source;
mod worker;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{NexGuardError, Result};
use crate::model::{CameraConfig, CameraStatus, Frame};
use crate::ring::FrameRing;
use worker::CaptureWorkerHandle;

const WORKER_STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

struct CameraEntry {
    config: CameraConfig,
    ring: Arc<FrameRing<Frame>>,
    worker: Option<CaptureWorkerHandle>,
}

/// Owns capture state for every configured camera. A single instance is
/// shared (behind `Arc`) across the HTTP layer and the pipeline; the
/// `RwLock` is only ever held for map lookups, never across a capture
/// I/O call — workers never block the manager.
pub struct CaptureManager {
    cameras: RwLock<HashMap<i64, CameraEntry>>,
    default_buffer_size: usize,
}

impl CaptureManager {
    pub fn new(default_buffer_size: usize) -> Self {
        CaptureManager {
            cameras: RwLock::new(HashMap::new()),
            default_buffer_size,
        }
    }

    /// Register a camera. Does not start capture; callers invoke `start`
    /// explicitly — `add` and `start` are deliberately separate.
    pub fn add(&self, config: CameraConfig) -> Result<()> {
        let mut cameras = self.cameras.write();
        if cameras.contains_key(&config.camera_id) {
            return Err(NexGuardError::AlreadyExists {
                camera_id: config.camera_id,
            });
        }
        let ring = Arc::new(FrameRing::new(config.buffer_size.max(1)));
        cameras.insert(
            config.camera_id,
            CameraEntry {
                config,
                ring,
                worker: None,
            },
        );
        Ok(())
    }

    /// Replace a camera's config. If capture is running, the worker is
    /// stopped and restarted against the new config so url/resolution/fps
    /// changes take effect immediately.
    pub fn update(&self, config: CameraConfig) -> Result<()> {
        let camera_id = config.camera_id;
        let was_running;
        {
            let mut cameras = self.cameras.write();
            let entry = cameras
                .get_mut(&camera_id)
                .ok_or(NexGuardError::CameraNotFound { camera_id })?;
            was_running = entry.worker.is_some();
            if was_running {
                stop_worker(entry);
            }
            entry.ring = Arc::new(FrameRing::new(config.buffer_size.max(1)));
            entry.config = config;
        }
        if was_running {
            self.start(camera_id)?;
        }
        Ok(())
    }

    pub fn remove(&self, camera_id: i64) -> Result<()> {
        let mut cameras = self.cameras.write();
        let mut entry = cameras
            .remove(&camera_id)
            .ok_or(NexGuardError::CameraNotFound { camera_id })?;
        stop_worker(&mut entry);
        Ok(())
    }

    pub fn start(&self, camera_id: i64) -> Result<()> {
        let mut cameras = self.cameras.write();
        let entry = cameras
            .get_mut(&camera_id)
            .ok_or(NexGuardError::CameraNotFound { camera_id })?;
        if entry.worker.is_some() {
            return Ok(());
        }
        if !entry.config.enabled {
            return Ok(());
        }
        info!(camera_id, "starting capture worker");
        let handle = worker::spawn(entry.config.clone(), Arc::clone(&entry.ring));
        entry.worker = Some(handle);
        Ok(())
    }

    pub fn stop(&self, camera_id: i64) -> Result<()> {
        let mut cameras = self.cameras.write();
        let entry = cameras
            .get_mut(&camera_id)
            .ok_or(NexGuardError::CameraNotFound { camera_id })?;
        stop_worker(entry);
        Ok(())
    }

    pub fn start_all(&self) {
        let ids: Vec<i64> = self.cameras.read().keys().copied().collect();
        for id in ids {
            if let Err(e) = self.start(id) {
                warn!(camera_id = id, error = %e, "failed to start camera");
            }
        }
    }

    pub fn stop_all(&self) {
        let ids: Vec<i64> = self.cameras.read().keys().copied().collect();
        for id in ids {
            let _ = self.stop(id);
        }
    }

    pub fn is_active(&self, camera_id: i64) -> bool {
        self.cameras
            .read()
            .get(&camera_id)
            .map(|e| e.worker.is_some())
            .unwrap_or(false)
    }

    /// Most recent captured frame for a camera, or `None` if no frame has
    /// arrived yet or the camera is unknown.
    pub fn latest_frame(&self, camera_id: i64) -> Option<Frame> {
        self.cameras.read().get(&camera_id)?.ring.peek_latest()
    }

    pub fn ring(&self, camera_id: i64) -> Option<Arc<FrameRing<Frame>>> {
        self.cameras.read().get(&camera_id).map(|e| Arc::clone(&e.ring))
    }

    /// All currently registered camera ids, used by `InferenceDispatcher`
    /// and `CaptureManager::start_all` when no explicit subset is given.
    pub fn known_camera_ids(&self) -> Vec<i64> {
        self.cameras.read().keys().copied().collect()
    }

    pub fn camera_config(&self, camera_id: i64) -> Option<CameraConfig> {
        self.cameras.read().get(&camera_id).map(|e| e.config.clone())
    }

    pub fn status(&self, camera_id: i64) -> Result<CameraStatus> {
        let cameras = self.cameras.read();
        let entry = cameras
            .get(&camera_id)
            .ok_or(NexGuardError::CameraNotFound { camera_id })?;
        let running = entry.worker.is_some();
        let frame_count = entry
            .worker
            .as_ref()
            .map(|w| w.frame_count.load(Ordering::Relaxed))
            .unwrap_or(0);
        let buffer_usage_pct = entry.ring.len() as f64 / entry.ring.capacity() as f64 * 100.0;
        Ok(CameraStatus {
            enabled: entry.config.enabled,
            running,
            fps_observed: entry.config.fps_target as f64,
            buffer_usage_pct,
            frame_count,
        })
    }

    pub fn default_buffer_size(&self) -> usize {
        self.default_buffer_size
    }
}

/// Signals the worker to stop and joins with a bounded timeout; a worker
/// wedged on a blocking read is detached rather than leaking the stop
/// call into the manager's critical section, so `stop` returns promptly
/// even if the I/O layer is unresponsive.
fn stop_worker(entry: &mut CameraEntry) {
    if let Some(mut handle) = entry.worker.take() {
        handle.stop.store(true, Ordering::SeqCst);
        let joined = handle.done_rx.recv_timeout(WORKER_STOP_JOIN_TIMEOUT).is_ok();
        if !joined {
            warn!("capture worker did not stop within timeout, detaching thread");
        }
        if let Some(join) = handle.join.take() {
            if joined {
                let _ = join.join();
            }
            // else: thread is abandoned, it will exit on its own blocking
            // call's next failure/timeout and the OS reclaims it at process
            // exit.
        }
    }
}
