//! Post-event recording: `Idle -> Recording -> Idle` state machine per
//! camera, a background task that drains annotated frames into a buffer
//! until `end_time`, then shells out to `ffmpeg` to encode the clip.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::model::{AnnotatedFrame, MediaRecord, MediaType, Resolution};
use crate::traits::Store;

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
const CLIP_FPS: u32 = 20;

/// Narrow view over the inference dispatcher the recording task needs.
/// Kept as a trait (rather than a direct dependency on
/// `crate::inference::InferenceDispatcher`) so `events` and `inference`
/// don't form a module cycle; `InferenceDispatcher` implements this.
///
/// Non-destructive by design: the recorder and the WebRTC track source
/// both poll the same per-camera annotated ring concurrently (spec §2 —
/// both are read-only consumers), so this peeks rather than drains.
pub trait AnnotatedFrameSource: Send + Sync {
    fn peek_latest_results(&self, camera_id: i64) -> Option<AnnotatedFrame>;
}

struct ActiveRecordingState {
    end_time_bits: AtomicU64,
    start_time: f64,
    detection_id: i64,
    output_path: PathBuf,
}

fn now_wall_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct RecordingCoordinator {
    active: Arc<Mutex<HashMap<i64, Arc<ActiveRecordingState>>>>,
    clip_leading_seconds: f64,
    clip_trailing_seconds: f64,
}

impl RecordingCoordinator {
    pub fn new(clip_leading_seconds: f64, clip_trailing_seconds: f64) -> Self {
        RecordingCoordinator {
            active: Arc::new(Mutex::new(HashMap::new())),
            clip_leading_seconds,
            clip_trailing_seconds,
        }
    }

    /// Starts a new recording for `camera_id`, or extends the existing
    /// one's `end_time`. At most one active recording exists per camera
    /// at any instant; a second trigger only extends the window.
    pub fn trigger(
        &self,
        camera_id: i64,
        trigger_timestamp: f64,
        detection_id: i64,
        output_path: PathBuf,
        source: Arc<dyn AnnotatedFrameSource>,
        store: Arc<dyn Store>,
        resolution: Resolution,
    ) {
        let new_end = trigger_timestamp + self.clip_trailing_seconds;
        let mut active = self.active.lock();
        if let Some(existing) = active.get(&camera_id) {
            existing.end_time_bits.store(new_end.to_bits(), Ordering::SeqCst);
            return;
        }

        let state = Arc::new(ActiveRecordingState {
            end_time_bits: AtomicU64::new(new_end.to_bits()),
            start_time: trigger_timestamp - self.clip_leading_seconds,
            detection_id,
            output_path: output_path.clone(),
        });
        active.insert(camera_id, Arc::clone(&state));
        drop(active);

        info!(camera_id, detection_id, "recording started");
        tokio::spawn(run_recording(
            camera_id,
            state,
            source,
            store,
            resolution,
            Arc::clone(&self.active),
        ));
    }

    pub fn is_recording(&self, camera_id: i64) -> bool {
        self.active.lock().contains_key(&camera_id)
    }
}

async fn run_recording(
    camera_id: i64,
    state: Arc<ActiveRecordingState>,
    source: Arc<dyn AnnotatedFrameSource>,
    store: Arc<dyn Store>,
    resolution: Resolution,
    active_map: Arc<Mutex<HashMap<i64, Arc<ActiveRecordingState>>>>,
) {
    let mut buffer: Vec<(Vec<u8>, f64)> = Vec::new();
    let mut last_frame_number: u64 = 0;

    loop {
        let end_time = f64::from_bits(state.end_time_bits.load(Ordering::SeqCst));
        if now_wall_secs() >= end_time {
            break;
        }
        if let Some(result) = source.peek_latest_results(camera_id) {
            if result.frame.frame_number != last_frame_number && result.timestamp() >= state.start_time {
                last_frame_number = result.frame.frame_number;
                buffer.push((result.pixels().to_vec(), result.timestamp()));
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    active_map.lock().remove(&camera_id);

    if buffer.is_empty() {
        warn!(camera_id, "recording window closed with no frames, discarding");
        return;
    }

    match finalize_clip(&buffer, resolution, &state.output_path) {
        Ok(frame_count) => {
            let duration = frame_count as f64 / CLIP_FPS as f64;
            let media = MediaRecord {
                id: 0,
                camera_id,
                detection_id: state.detection_id,
                media_type: MediaType::Video,
                path: state.output_path.to_string_lossy().replace('\\', "/"),
                timestamp: state.start_time,
                duration: Some(duration),
                size_bytes: std::fs::metadata(&state.output_path).map(|m| m.len()).unwrap_or(0),
            };
            if let Err(e) = store.create_media(media).await {
                error!(camera_id, error = %e, "failed to register clip media record");
            }
        }
        Err(e) => {
            error!(camera_id, error = %e, "clip encode failed, discarding");
        }
    }
}

/// Encodes buffered BGR24 frames to an H.264/yuv420p baseline mp4 with
/// `+faststart`, forcing even width/height by a one-pixel trim.
fn finalize_clip(frames: &[(Vec<u8>, f64)], resolution: Resolution, output: &Path) -> anyhow::Result<usize> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let width = resolution.width - (resolution.width % 2);
    let height = resolution.height - (resolution.height % 2);

    let mut child = Command::new("ffmpeg")
        .args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "bgr24",
            "-s",
            &format!("{}x{}", resolution.width, resolution.height),
            "-r",
            &CLIP_FPS.to_string(),
            "-i",
            "-",
            "-vf",
            &format!("crop={}:{}:0:0", width, height),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-profile:v",
            "baseline",
            "-movflags",
            "+faststart",
        ])
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    {
        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg stdin unavailable"))?;
        for (pixels, _ts) in frames {
            stdin.write_all(pixels)?;
        }
    }

    let status = child.wait()?;
    if !status.success() {
        anyhow::bail!("ffmpeg exited with {}", status);
    }
    Ok(frames.len())
}
