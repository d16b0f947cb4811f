//! Media range/transcode handler: serves stored clips over HTTP with
//! byte-range support, clamping requested ranges to the file's actual
//! length and rejecting any path that would escape the storage root.

pub mod transcode;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::traits::{Store, Transcoder};

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Clone)]
pub struct MediaState {
    pub store: Arc<dyn Store>,
    pub transcoder: Option<Arc<dyn Transcoder>>,
    pub storage_dir: PathBuf,
}

struct ByteRange {
    start: u64,
    end: u64,
}

/// Parses a `Range: bytes=A-B` header against a file of `size` bytes,
/// clamping the end to the last valid byte. Returns `None` for a
/// malformed or unsatisfiable range.
fn parse_range(value: &str, size: u64) -> Option<ByteRange> {
    let spec = value.strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;
    if size == 0 {
        return None;
    }
    let start: u64 = if start_str.is_empty() {
        0
    } else {
        start_str.parse().ok()?
    };
    if start > size - 1 {
        return None;
    }
    let end: u64 = if end_str.is_empty() {
        size - 1
    } else {
        end_str.parse().ok()?
    };
    let end = end.min(size - 1);
    if end < start {
        return None;
    }
    Some(ByteRange { start, end })
}

/// Rejects any resolved path that escapes `storage_dir`.
fn resolve_within_storage(storage_dir: &Path, relative: &str) -> Option<PathBuf> {
    if relative.contains("..") || Path::new(relative).is_absolute() {
        return None;
    }
    let joined = storage_dir.join(relative);
    Some(joined)
}

pub async fn serve_video(
    State(state): State<MediaState>,
    AxumPath(detection_id): AxumPath<i64>,
    headers: HeaderMap,
) -> Response {
    let media = match state.store.get_media_video_path(detection_id).await {
        Ok(Some(m)) => m,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(detection_id, error = %e, "store lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(mut path) = resolve_within_storage(&state.storage_dir, &media.path) else {
        warn!(detection_id, path = %media.path, "path escapes storage root");
        return StatusCode::FORBIDDEN.into_response();
    };
    match path.canonicalize() {
        Ok(canonical) if canonical.starts_with(&state.storage_dir.canonicalize().unwrap_or(state.storage_dir.clone())) => {
            path = canonical;
        }
        Ok(_) => {
            warn!(detection_id, "resolved path escapes storage root");
            return StatusCode::FORBIDDEN.into_response();
        }
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    }

    if let Some(transcoder) = &state.transcoder {
        path = maybe_transcode(transcoder.as_ref(), &path).await;
    }

    let file_size = match tokio::fs::metadata(&path).await {
        Ok(m) => m.len(),
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    match range_header {
        None => {
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(_) => return StatusCode::NOT_FOUND.into_response(),
            };
            let stream = ReaderStream::new(file);
            (StatusCode::OK, response_headers, Body::from_stream(stream)).into_response()
        }
        Some(raw_range) => match parse_range(raw_range, file_size) {
            None => StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
            Some(range) => {
                let mut file = match tokio::fs::File::open(&path).await {
                    Ok(f) => f,
                    Err(_) => return StatusCode::NOT_FOUND.into_response(),
                };
                if file.seek(std::io::SeekFrom::Start(range.start)).await.is_err() {
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
                let len = range.end - range.start + 1;

                response_headers.insert(
                    header::CONTENT_RANGE,
                    HeaderValue::from_str(&format!("bytes {}-{}/{}", range.start, range.end, file_size)).unwrap(),
                );
                response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
                response_headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-cache, no-store, must-revalidate"),
                );

                let limited = file.take(len);
                let stream = ReaderStream::with_capacity(limited, CHUNK_SIZE);
                (
                    StatusCode::PARTIAL_CONTENT,
                    response_headers,
                    Body::from_stream(stream),
                )
                    .into_response()
            }
        },
    }
}

/// Transcodes to a browser-friendly mp4 on first access if the stored
/// codec isn't H.264; falls back to serving the original on probe or
/// transcode failure, best-effort.
async fn maybe_transcode(transcoder: &dyn Transcoder, path: &Path) -> PathBuf {
    let codec = match transcoder.probe_codec(path).await {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "codec probe failed, serving original");
            return path.to_path_buf();
        }
    };
    if codec.eq_ignore_ascii_case("h264") || codec.eq_ignore_ascii_case("avc") || codec.eq_ignore_ascii_case("avc1") {
        return path.to_path_buf();
    }
    match transcoder.to_web_mp4(path).await {
        Ok(web_path) => web_path,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "transcode failed, serving original");
            path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parse_range_defaults_missing_bounds() {
        let r = parse_range("bytes=-", 100).unwrap();
        assert_eq!(r.start, 0);
        assert_eq!(r.end, 99);
    }

    #[test]
    fn parse_range_clamps_end_to_size_minus_one() {
        let r = parse_range("bytes=10-500", 100).unwrap();
        assert_eq!(r.start, 10);
        assert_eq!(r.end, 99);
    }

    #[test]
    fn parse_range_rejects_start_beyond_size() {
        assert!(parse_range("bytes=200-", 100).is_none());
    }

    #[test]
    fn parse_range_rejects_malformed() {
        assert!(parse_range("not-a-range", 100).is_none());
    }

    /// Table-driven range arithmetic per spec §8 property 8: for every
    /// `(requested, size)` pair, the clamped `(start, end)` must satisfy
    /// `start = clamp(A,0,size-1)` and `end = clamp(B,start,size-1)`.
    #[rstest]
    #[case("bytes=0-0", 1000, 0, 0)]
    #[case("bytes=0-999", 1000, 0, 999)]
    #[case("bytes=500-", 1000, 500, 999)]
    #[case("bytes=-100", 1000, 0, 100)]
    #[case("bytes=999-999", 1000, 999, 999)]
    #[case("bytes=0-5000", 1000, 0, 999)]
    fn parse_range_table(#[case] header: &str, #[case] size: u64, #[case] start: u64, #[case] end: u64) {
        let r = parse_range(header, size).unwrap();
        assert_eq!(r.start, start);
        assert_eq!(r.end, end);
    }

    #[rstest]
    #[case("bytes=1000-", 1000)]
    #[case("bytes=5-2", 1000)]
    #[case("bytes=abc-def", 1000)]
    #[case("bytes=0-999", 0)]
    fn parse_range_table_rejects(#[case] header: &str, #[case] size: u64) {
        assert!(parse_range(header, size).is_none());
    }

    #[test]
    fn resolve_within_storage_rejects_parent_traversal() {
        let storage = PathBuf::from("/data/storage");
        assert!(resolve_within_storage(&storage, "../../etc/passwd").is_none());
    }

    #[test]
    fn resolve_within_storage_rejects_absolute_path() {
        let storage = PathBuf::from("/data/storage");
        assert!(resolve_within_storage(&storage, "/etc/passwd").is_none());
    }

    #[test]
    fn resolve_within_storage_accepts_relative_path() {
        let storage = PathBuf::from("/data/storage");
        let resolved = resolve_within_storage(&storage, "videos/cam1/clip.mp4").unwrap();
        assert_eq!(resolved, PathBuf::from("/data/storage/videos/cam1/clip.mp4"));
    }
}
