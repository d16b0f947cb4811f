//! Per-viewer track production loop: sends frame bytes straight into a
//! `TrackLocalStaticSample`, drawing from the annotated detection ring
//! instead of a raw camera feed, with a synthetic "No Signal" fallback
//! when the camera has no recent frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{info, warn};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::events::render::draw_text;
use crate::inference::InferenceDispatcher;
use crate::model::{AnnotatedFrame, Resolution};

const STALE_RENDER_WINDOW: Duration = Duration::from_secs(2);
const DEFAULT_RESOLUTION: Resolution = Resolution {
    width: 640,
    height: 480,
};

struct LastRendered {
    rgb: Vec<u8>,
    resolution: Resolution,
    rendered_at: Instant,
}

/// Runs until `stop` is set. Produces one sample per tick at the camera's
/// target fps; ticks come from either the newest annotated frame, a
/// recently-cached render, or a synthetic "No Signal" placeholder.
pub async fn run(
    camera_id: i64,
    track: Arc<TrackLocalStaticSample>,
    inference: Arc<InferenceDispatcher>,
    fps_target: u32,
    configured_resolution: Resolution,
    stop: Arc<AtomicBool>,
) {
    info!(camera_id, "webrtc track source started");
    let interval = Duration::from_secs_f64(1.0 / fps_target.max(1) as f64);
    let mut last_rendered: Option<LastRendered> = None;
    let mut pts: u32 = 0;

    while !stop.load(Ordering::Relaxed) {
        let tick_start = Instant::now();

        let rgb_and_res = if let Some(result) = inference.peek_latest_results(camera_id) {
            let rendered = render_for_viewer(&result);
            let resolution = result.frame.resolution;
            last_rendered = Some(LastRendered {
                rgb: rendered.clone(),
                resolution,
                rendered_at: Instant::now(),
            });
            Some((rendered, resolution))
        } else if let Some(cached) = &last_rendered {
            if cached.rendered_at.elapsed() <= STALE_RENDER_WINDOW {
                Some((cached.rgb.clone(), cached.resolution))
            } else {
                None
            }
        } else {
            None
        };

        let (rgb, _resolution) = rgb_and_res.unwrap_or_else(|| {
            let resolution = if configured_resolution.width > 0 && configured_resolution.height > 0 {
                configured_resolution
            } else {
                DEFAULT_RESOLUTION
            };
            (no_signal_frame(camera_id, resolution), resolution)
        });

        pts = pts.wrapping_add(1);
        let sample = Sample {
            data: Bytes::from(rgb),
            duration: Duration::from_secs(1) / 30,
            timestamp: std::time::SystemTime::now(),
            packet_timestamp: pts,
            ..Default::default()
        };
        if let Err(e) = track.write_sample(&sample).await {
            warn!(camera_id, error = %e, "failed to write track sample, stopping");
            break;
        }

        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        }
    }

    info!(camera_id, "webrtc track source stopped");
}

/// Converts BGR -> RGB and overlays detection boxes/labels + a status
/// line.
fn render_for_viewer(result: &AnnotatedFrame) -> Vec<u8> {
    let mut img = crate::events::render::bgr_to_rgb_image(result.pixels(), result.frame.resolution);

    for d in &result.detections {
        let rect = imageproc::rect::Rect::at(d.box_.x1, d.box_.y1)
            .of_size((d.box_.x2 - d.box_.x1).max(1) as u32, (d.box_.y2 - d.box_.y1).max(1) as u32);
        imageproc::drawing::draw_hollow_rect_mut(&mut img, rect, image::Rgb([255, 0, 0]));
        draw_text(&mut img, &d.class_name, d.box_.x1.max(0), (d.box_.y1 - 16).max(0), image::Rgb([255, 255, 0]));
    }

    let has_person = result.detections.iter().any(|d| d.class_name == "person");
    let mut status = format!("Camera: {}", result.frame.camera_id);
    if has_person {
        status.push_str(" | HUMAN DETECTED");
    }
    let color = if has_person { image::Rgb([255, 0, 0]) } else { image::Rgb([255, 255, 255]) };
    draw_text(&mut img, &status, 4, 4, color);

    img.into_raw()
}

fn no_signal_frame(camera_id: i64, resolution: Resolution) -> Vec<u8> {
    let mut img = image::RgbImage::new(resolution.width, resolution.height);
    let text = format!("NO SIGNAL (CAMERA {})", camera_id);
    let cx = (resolution.width as i32 / 2 - (text.len() as i32 * 12)).max(0);
    let cy = (resolution.height as i32 / 2).max(0);
    draw_text(&mut img, &text, cx, cy, image::Rgb([255, 255, 255]));
    img.into_raw()
}
