//! Domain types the core manipulates directly (spec §3).

use serde::{Deserialize, Serialize};

/// Identity of a single camera stream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CameraConfig {
    pub camera_id: i64,
    pub display_name: String,
    /// Either a decimal integer (local device index) or a URL understood by
    /// the capture backend.
    pub url: String,
    #[serde(default = "default_fps_target")]
    pub fps_target: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub zone_id: Option<i64>,
}

fn default_fps_target() -> u32 {
    15
}
fn default_buffer_size() -> usize {
    10
}
fn default_enabled() -> bool {
    true
}

impl CameraConfig {
    /// `url` parses as a local device index iff it is all ASCII digits.
    pub fn local_device_index(&self) -> Option<u32> {
        if !self.url.is_empty() && self.url.bytes().all(|b| b.is_ascii_digit()) {
            self.url.parse().ok()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution {
            width: 640,
            height: 480,
        }
    }
}

/// A single decoded image with metadata (spec §3). `pixels` is 8-bit BGR,
/// `height * width * 3` bytes, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: Vec<u8>,
    pub camera_id: i64,
    pub capture_timestamp: f64,
    pub frame_number: u64,
    pub resolution: Resolution,
}

impl Frame {
    pub fn byte_len(resolution: Resolution) -> usize {
        resolution.width as usize * resolution.height as usize * 3
    }
}

/// A frame enriched with detections, produced by the inference dispatcher.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub detections: Vec<BoundingBoxDetection>,
    pub annotated_pixels: Option<Vec<u8>>,
}

impl AnnotatedFrame {
    pub fn timestamp(&self) -> f64 {
        self.frame.capture_timestamp
    }

    pub fn pixels(&self) -> &[u8] {
        self.annotated_pixels
            .as_deref()
            .unwrap_or(&self.frame.pixels)
    }
}

/// A single object-detector output. Transient; never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBoxDetection {
    pub class_name: String,
    pub class_id: i32,
    pub confidence: f32,
    pub box_: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// The persisted form of an accepted detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEventRecord {
    pub id: i64,
    pub camera_id: i64,
    pub timestamp: f64,
    pub detection_type: String,
    pub confidence: f32,
    pub created_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
}

/// A stored media artifact (still image or video clip) tied to a detection.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub id: i64,
    pub camera_id: i64,
    pub detection_id: i64,
    pub media_type: MediaType,
    /// Storage-relative, forward-slash normalized. Never absolute, never
    /// contains `..` after normalization.
    pub path: String,
    pub timestamp: f64,
    pub duration: Option<f64>,
    pub size_bytes: u64,
}

/// Status snapshot returned by `CaptureManager::status`.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraStatus {
    pub enabled: bool,
    pub running: bool,
    pub fps_observed: f64,
    pub buffer_usage_pct: f64,
    pub frame_count: u64,
}
