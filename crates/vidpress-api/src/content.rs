//! Static media serving under `/content` with range support.
//!
//! Streamable extensions (`.mp4`, `.webm`, `.ts`) honor single-range
//! requests; playlists get a short cache lifetime so ladder changes
//! propagate, while segments and finished media are immutable.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::range::{content_range, parse_range, unsatisfiable_range, RangeOutcome};
use crate::state::AppState;

/// Extensions that honor Range requests.
fn is_streamable(ext: &str) -> bool {
    matches!(ext, "mp4" | "webm" | "ts")
}

fn content_type(ext: &str) -> &'static str {
    match ext {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ts" => "video/mp2t",
        "m3u8" => "application/vnd.apple.mpegurl",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Playlists refresh quickly; everything else is immutable once written.
fn cache_control(ext: &str) -> &'static str {
    if ext == "m3u8" {
        "public, max-age=10"
    } else {
        "public, max-age=31536000, immutable"
    }
}

/// `ETag` derived from size and mtime.
fn etag(size: u64, modified: SystemTime) -> String {
    let mtime = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("\"{:x}-{:x}\"", size, mtime)
}

/// Reject traversal and absolute components.
fn sanitize(relative: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for part in Path::new(relative).components() {
        match part {
            std::path::Component::Normal(p) => out.push(p),
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// GET `/content/<year>/<month>/<post>/<file...>`.
pub async fn serve_content(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let Some(relative) = sanitize(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let full = state.config.content_root.join(&relative);

    let Ok(meta) = tokio::fs::metadata(&full).await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !meta.is_file() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let ext = full
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let size = meta.len();
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&ext)),
    );
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control(&ext)),
    );
    if let Ok(value) = HeaderValue::from_str(&etag(size, modified)) {
        response_headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
        response_headers.insert(header::LAST_MODIFIED, value);
    }

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .filter(|_| is_streamable(&ext));

    let (status, start, end) = match range_header.map(|h| parse_range(h, size)) {
        Some(RangeOutcome::Partial { start, end }) => {
            if let Ok(value) = HeaderValue::from_str(&content_range(start, end, size)) {
                response_headers.insert(header::CONTENT_RANGE, value);
            }
            (StatusCode::PARTIAL_CONTENT, start, end)
        }
        Some(RangeOutcome::Unsatisfiable) => {
            if let Ok(value) = HeaderValue::from_str(&unsatisfiable_range(size)) {
                response_headers.insert(header::CONTENT_RANGE, value);
            }
            return (StatusCode::RANGE_NOT_SATISFIABLE, response_headers).into_response();
        }
        Some(RangeOutcome::Ignore) | None => {
            if size == 0 {
                response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
                return (StatusCode::OK, response_headers).into_response();
            }
            (StatusCode::OK, 0, size - 1)
        }
    };

    let length = end - start + 1;
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let mut file = match tokio::fs::File::open(&full).await {
        Ok(f) => f,
        Err(e) => {
            debug!(path = %full.display(), "Open failed: {}", e);
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    if start > 0 {
        if let Err(e) = file.seek(std::io::SeekFrom::Start(start)).await {
            debug!(path = %full.display(), "Seek failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let body = Body::from_stream(ReaderStream::new(file.take(length)));
    (status, response_headers, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streamable_extensions() {
        assert!(is_streamable("mp4"));
        assert!(is_streamable("webm"));
        assert!(is_streamable("ts"));
        assert!(!is_streamable("m3u8"));
        assert!(!is_streamable("webp"));
    }

    #[test]
    fn playlist_cache_lifetime_is_short() {
        assert_eq!(cache_control("m3u8"), "public, max-age=10");
        assert_eq!(cache_control("ts"), "public, max-age=31536000, immutable");
        assert_eq!(cache_control("mp4"), "public, max-age=31536000, immutable");
        assert_eq!(cache_control("webp"), "public, max-age=31536000, immutable");
    }

    #[test]
    fn etag_tracks_size_and_mtime() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        assert_eq!(etag(4096, t), format!("\"{:x}-{:x}\"", 4096, 1_700_000_000u64));
    }

    #[test]
    fn sanitize_rejects_traversal() {
        assert_eq!(
            sanitize("2025/01/42/compressed_480p.mp4"),
            Some(PathBuf::from("2025/01/42/compressed_480p.mp4"))
        );
        assert_eq!(sanitize("../etc/passwd"), None);
        assert_eq!(sanitize("/etc/passwd"), None);
        assert_eq!(sanitize(""), None);
        assert_eq!(sanitize("2025/../../x"), None);
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type("m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type("ts"), "video/mp2t");
        assert_eq!(content_type("bin"), "application/octet-stream");
    }
}
