//! Capture manager lifecycle idempotence (spec §8 property 9): starting
//! an already-running camera and stopping an already-stopped one are
//! no-ops, and `remove` leaves no observable state behind. Uses a
//! deliberately unreachable `url` (no real device/stream needed) since
//! these assertions only concern the manager's bookkeeping, not actual
//! frame delivery.

use assert_matches::assert_matches;

use nexguard_core::capture::CaptureManager;
use nexguard_core::error::NexGuardError;
use nexguard_core::model::{CameraConfig, Resolution};

fn camera(camera_id: i64) -> CameraConfig {
    CameraConfig {
        camera_id,
        display_name: format!("Cam{}", camera_id),
        url: "rtsp://127.0.0.1:1/nonexistent".to_string(),
        fps_target: 15,
        resolution: Resolution { width: 640, height: 480 },
        buffer_size: 4,
        enabled: true,
        location: None,
        zone_id: None,
    }
}

#[test]
fn add_rejects_duplicate_camera_id() {
    let manager = CaptureManager::new(10);
    manager.add(camera(1)).unwrap();
    assert_matches!(manager.add(camera(1)), Err(NexGuardError::AlreadyExists { camera_id: 1 }));
}

#[test]
fn start_on_running_camera_is_idempotent() {
    let manager = CaptureManager::new(10);
    manager.add(camera(1)).unwrap();
    manager.start(1).unwrap();
    assert!(manager.is_active(1));
    // Second start must not error and must not spawn a second worker.
    manager.start(1).unwrap();
    assert!(manager.is_active(1));
}

#[test]
fn stop_on_stopped_camera_is_idempotent() {
    let manager = CaptureManager::new(10);
    manager.add(camera(1)).unwrap();
    assert!(!manager.is_active(1));
    manager.stop(1).unwrap();
    assert!(!manager.is_active(1));
}

#[test]
fn remove_clears_all_observable_state() {
    let manager = CaptureManager::new(10);
    manager.add(camera(1)).unwrap();
    manager.start(1).unwrap();
    manager.remove(1).unwrap();

    assert!(manager.camera_config(1).is_none());
    assert!(!manager.is_active(1));
    assert!(manager.status(1).is_err());
    assert!(manager.latest_frame(1).is_none());
    assert!(!manager.known_camera_ids().contains(&1));
}

#[test]
fn operations_on_unknown_camera_return_not_found() {
    let manager = CaptureManager::new(10);
    assert_matches!(manager.start(99), Err(NexGuardError::CameraNotFound { camera_id: 99 }));
    assert_matches!(manager.stop(99), Err(NexGuardError::CameraNotFound { camera_id: 99 }));
    assert_matches!(manager.remove(99), Err(NexGuardError::CameraNotFound { camera_id: 99 }));
    assert_matches!(manager.status(99), Err(NexGuardError::CameraNotFound { camera_id: 99 }));
}
