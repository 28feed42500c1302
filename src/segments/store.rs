//! Segment store
//!
//! Serves manifest and segment files written by segmented-mode workers,
//! with HTTP byte-range support.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::SegmentError;
use crate::registry::SessionKey;

use super::range::parse_range_header;

/// Read size for streamed file bodies
const READ_CHUNK: usize = 64 * 1024;

/// Content type for a segment-store file name
pub fn content_type(file_name: &str) -> &'static str {
    let ext = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    match ext.to_ascii_lowercase().as_str() {
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/mp2t",
        "m4s" => "video/iso.segment",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// True for playlist files, which are rewritten while the room is live
pub fn is_manifest(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".m3u8")
}

/// File-backed store for segmented output
#[derive(Debug, Clone)]
pub struct SegmentStore {
    base: PathBuf,
}

impl SegmentStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Path of `file` inside the directory for `key`
    ///
    /// `file` must be a plain file name: no separators, no leading dot.
    pub fn resolve(&self, key: &SessionKey, file: &str) -> Result<PathBuf, SegmentError> {
        let valid = !file.is_empty()
            && !file.starts_with('.')
            && !file.contains(['/', '\\', '\0'])
            && file.len() <= 255;

        if !valid {
            return Err(SegmentError::InvalidName(file.to_string()));
        }

        Ok(self.base.join(key.as_str()).join(file))
    }

    /// True if `path` exists as a regular file
    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Build a response for `path`, honouring an optional `Range` header
    pub async fn serve(&self, path: &Path, range: Option<&str>) -> Result<Response, SegmentError> {
        let display = path.display().to_string();

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(SegmentError::NotFound(display)),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SegmentError::NotFound(display)),
            Err(source) => {
                return Err(SegmentError::Io {
                    path: display,
                    source,
                })
            }
        };

        let file_size = metadata.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = content_type(&file_name);
        let cache_control = if is_manifest(&file_name) {
            "no-cache"
        } else {
            "public, max-age=60"
        };

        let open = |source: std::io::Error| match source.kind() {
            // Swept or rotated out between stat and open
            ErrorKind::NotFound => SegmentError::NotFound(path.display().to_string()),
            _ => SegmentError::Io {
                path: path.display().to_string(),
                source,
            },
        };

        match range.and_then(parse_range_header) {
            Some(spec) => {
                let Some((start, end)) = spec.resolve(file_size) else {
                    return Ok((
                        StatusCode::RANGE_NOT_SATISFIABLE,
                        [(header::CONTENT_RANGE, format!("bytes */{file_size}"))],
                        Body::empty(),
                    )
                        .into_response());
                };

                let length = end - start + 1;

                let mut file = tokio::fs::File::open(path).await.map_err(open)?;
                file.seek(SeekFrom::Start(start))
                    .await
                    .map_err(|source| SegmentError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;

                let stream = ReaderStream::with_capacity(file.take(length), READ_CHUNK);

                Ok((
                    StatusCode::PARTIAL_CONTENT,
                    [
                        (header::CONTENT_TYPE, content_type.to_string()),
                        (
                            header::CONTENT_RANGE,
                            format!("bytes {start}-{end}/{file_size}"),
                        ),
                        (header::CONTENT_LENGTH, length.to_string()),
                        (header::ACCEPT_RANGES, "bytes".to_string()),
                        (header::CACHE_CONTROL, cache_control.to_string()),
                    ],
                    Body::from_stream(stream),
                )
                    .into_response())
            }
            None => {
                let file = tokio::fs::File::open(path).await.map_err(open)?;
                let stream = ReaderStream::with_capacity(file.take(file_size), READ_CHUNK);

                Ok((
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, content_type.to_string()),
                        (header::CONTENT_LENGTH, file_size.to_string()),
                        (header::ACCEPT_RANGES, "bytes".to_string()),
                        (header::CACHE_CONTROL, cache_control.to_string()),
                    ],
                    Body::from_stream(stream),
                )
                    .into_response())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    fn store_with_file(name: &str, data: &[u8]) -> (tempfile::TempDir, SegmentStore, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path());
        let key = SessionKey::parse("room").unwrap();
        let path = store.resolve(&key, name).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        (dir, store, path)
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type("index.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type("segment_00001.ts"), "video/mp2t");
        assert_eq!(content_type("noext"), "application/octet-stream");
        assert!(is_manifest("index.m3u8"));
        assert!(!is_manifest("segment_00001.ts"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = SegmentStore::new("/srv/relay");
        let key = SessionKey::parse("room").unwrap();

        for name in ["", "..", "../x", "a/b", "a\\b", ".hidden"] {
            assert!(
                matches!(store.resolve(&key, name), Err(SegmentError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }

        assert_eq!(
            store.resolve(&key, "index.m3u8").unwrap(),
            PathBuf::from("/srv/relay/room/index.m3u8")
        );
    }

    #[tokio::test]
    async fn test_full_response() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let (_dir, store, path) = store_with_file("segment_00000.ts", &data);

        let response = store.serve(&path, None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp2t");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");

        assert_eq!(body_bytes(response).await, data);
    }

    #[tokio::test]
    async fn test_partial_response() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let (_dir, store, path) = store_with_file("segment_00000.ts", &data);

        let response = store.serve(&path, Some("bytes=0-99")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-99/1000");

        assert_eq!(body_bytes(response).await, &data[..100]);
    }

    #[tokio::test]
    async fn test_open_ended_range() {
        let data = vec![7u8; 300];
        let (_dir, store, path) = store_with_file("segment_00000.ts", &data);

        let response = store.serve(&path, Some("bytes=250-")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 250-299/300");
        assert_eq!(body_bytes(response).await.len(), 50);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let (_dir, store, path) = store_with_file("segment_00000.ts", b"short");

        let response = store.serve(&path, Some("bytes=10-20")).await.unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */5");
    }

    #[tokio::test]
    async fn test_manifest_not_cached() {
        let (_dir, store, path) = store_with_file("index.m3u8", b"#EXTM3U\n");

        let response = store.serve(&path, None).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path());
        let key = SessionKey::parse("room").unwrap();
        let path = store.resolve(&key, "index.m3u8").unwrap();

        assert!(!store.exists(&path).await);
        assert!(matches!(
            store.serve(&path, None).await,
            Err(SegmentError::NotFound(_))
        ));
    }
}
