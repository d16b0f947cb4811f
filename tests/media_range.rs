//! Range-read and path-containment scenarios from spec §8 (S4-S6),
//! driven straight through the `serve_video` handler against a tempdir
//! storage root and the in-memory `Store` double.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};

use nexguard_core::media::{serve_video, MediaState};
use nexguard_core::model::{MediaRecord, MediaType};
use nexguard_core::testing::InMemoryStore;

async fn state_with_file(storage_dir: &std::path::Path, relative_path: &str, contents: &[u8]) -> MediaState {
    let full_path = storage_dir.join(relative_path);
    tokio::fs::create_dir_all(full_path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&full_path, contents).await.unwrap();

    let store = Arc::new(InMemoryStore::new());
    store
        .create_media(MediaRecord {
            id: 0,
            camera_id: 7,
            detection_id: 42,
            media_type: MediaType::Video,
            path: relative_path.to_string(),
            timestamp: 1000.0,
            duration: Some(30.0),
            size_bytes: contents.len() as u64,
        })
        .await
        .unwrap();

    MediaState {
        store,
        transcoder: None,
        storage_dir: storage_dir.to_path_buf(),
    }
}

fn range_headers(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::RANGE, HeaderValue::from_str(value).unwrap());
    headers
}

#[tokio::test]
async fn s4_mid_file_range_returns_exact_byte_window() {
    let tmp = tempfile::tempdir().unwrap();
    let size = 10_000_000usize;
    let body: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
    let state = state_with_file(tmp.path(), "videos/cam7/clip.mp4", &body).await;

    let response = serve_video(
        State(state),
        AxumPath(42),
        range_headers("bytes=500000-1499999"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let headers = response.headers();
    assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "1000000");
    assert_eq!(
        headers.get(header::CONTENT_RANGE).unwrap(),
        "bytes 500000-1499999/10000000"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.len(), 1_000_000);
    assert_eq!(&bytes[..], &body[500_000..1_500_000]);
}

#[tokio::test]
async fn s5_open_ended_range_serves_to_end_of_file() {
    let tmp = tempfile::tempdir().unwrap();
    let size = 10_000_000usize;
    let body = vec![7u8; size];
    let state = state_with_file(tmp.path(), "videos/cam7/clip.mp4", &body).await;

    let response = serve_video(State(state), AxumPath(42), range_headers("bytes=9500000-")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::CONTENT_RANGE).unwrap(),
        "bytes 9500000-9999999/10000000"
    );
    assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "500000");
}

#[tokio::test]
async fn s6_path_escape_is_rejected_with_403() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::new());
    store
        .create_media(MediaRecord {
            id: 0,
            camera_id: 7,
            detection_id: 99,
            media_type: MediaType::Video,
            path: "../etc/passwd".to_string(),
            timestamp: 1000.0,
            duration: None,
            size_bytes: 0,
        })
        .await
        .unwrap();
    let state = MediaState {
        store,
        transcoder: None,
        storage_dir: tmp.path().to_path_buf(),
    };

    let response = serve_video(State(state), AxumPath(99), HeaderMap::new()).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_detection_id_returns_404() {
    let tmp = tempfile::tempdir().unwrap();
    let state = MediaState {
        store: Arc::new(InMemoryStore::new()),
        transcoder: None,
        storage_dir: tmp.path().to_path_buf(),
    };

    let response = serve_video(State(state), AxumPath(1), HeaderMap::new()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
