//! Streaming adapter: session file → ranged HTTP response.

use axum::body::Body;
use axum::http::header::{self, InvalidHeaderValue};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use peerhttp_engine::{ContentReader, EngineError, FileRef, SessionRef};
use peerhttp_playlist::{escape_segment, mime_for_name};
use sha1::{Digest, Sha1};
use std::io::SeekFrom;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Bytes inspected for content-type detection.
pub const SNIFF_LEN: usize = 512;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("file not found in session: {0}")]
    NotFound(String),

    #[error("stream io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

/// An opened file, positioned at offset 0 and ready to serve.
pub struct ContentStream {
    reader: Box<dyn ContentReader>,
    length: u64,
    name: String,
    content_type: &'static str,
    etag: String,
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream")
            .field("length", &self.length)
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("etag", &self.etag)
            .finish()
    }
}

impl ContentStream {
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }
}

/// Find the file addressed by `segments` inside `session`.
///
/// `segments` is the session name followed by the file path. A bare path
/// without the leading name is accepted too, and a single-file session also
/// matches on its name alone.
pub fn resolve_file(session: &SessionRef, segments: &[String]) -> Result<FileRef, StreamError> {
    let not_found = || StreamError::NotFound(segments.join("/"));
    let files = session.files().ok_or_else(not_found)?;
    let name = session.display_name();

    if session.is_single_file() {
        let matches = match segments {
            [only] => *only == name,
            _ => false,
        };
        return match (matches, files.first()) {
            (true, Some(file)) => Ok(file.clone()),
            _ => Err(not_found()),
        };
    }

    let relative = match segments.split_first() {
        Some((first, rest)) if *first == name && !rest.is_empty() => rest,
        _ => segments,
    };
    files
        .iter()
        .find(|file| file.path() == relative)
        .or_else(|| files.iter().find(|file| file.path() == segments))
        .cloned()
        .ok_or_else(not_found)
}

/// Open `segments` for streaming: read-ahead set to a tenth of the file,
/// responsive mode on, content type sniffed from the first bytes.
pub async fn open_stream(session: &SessionRef, segments: &[String]) -> Result<ContentStream, StreamError> {
    let file = resolve_file(session, segments)?;
    let length = file.length();

    let mut reader = file.new_reader().await?;
    reader.set_readahead(length / 10);
    reader.set_responsive();

    let name = file
        .path()
        .last()
        .cloned()
        .unwrap_or_else(|| session.display_name());

    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut reader)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;
    reader.seek(SeekFrom::Start(0)).await?;

    let content_type = infer::get(&head)
        .map(|kind| kind.mime_type())
        .or_else(|| mime_for_name(&name))
        .unwrap_or(FALLBACK_CONTENT_TYPE);

    let etag = entity_tag(session, file.path(), length);
    debug!(
        fingerprint = %session.fingerprint(),
        file = %name,
        length,
        content_type,
        "opened stream"
    );

    Ok(ContentStream {
        reader,
        length,
        name,
        content_type,
        etag,
    })
}

fn entity_tag(session: &SessionRef, path: &[String], length: u64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(session.fingerprint().as_bytes());
    for segment in path {
        hasher.update(segment.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(length.to_be_bytes());
    let digest = hasher.finalize();
    format!("\"{}\"", hex::encode(&digest[..12]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Serve everything.
    Full,
    /// Inclusive bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Interpret a `Range` header against a body of `length` bytes.
///
/// Only single `bytes=` ranges are honoured; multiple ranges and anything
/// malformed fall back to the whole body.
pub fn parse_range(header: &str, length: u64) -> ByteRange {
    let Some(ranges) = header.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if ranges.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = ranges.trim().split_once('-') else {
        return ByteRange::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix range: the last `end` bytes.
        return match end.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if length == 0 => ByteRange::Unsatisfiable,
            Ok(suffix) => ByteRange::Partial {
                start: length.saturating_sub(suffix),
                end: length - 1,
            },
            Err(_) => ByteRange::Full,
        };
    }

    let Ok(start) = start.parse::<u64>() else {
        return ByteRange::Full;
    };
    if start >= length {
        return ByteRange::Unsatisfiable;
    }
    if end.is_empty() {
        return ByteRange::Partial {
            start,
            end: length - 1,
        };
    }
    match end.parse::<u64>() {
        Ok(end) if end < start => ByteRange::Unsatisfiable,
        Ok(end) => ByteRange::Partial {
            start,
            end: end.min(length - 1),
        },
        Err(_) => ByteRange::Full,
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn etag_matches(list: &str, etag: &str) -> bool {
    list.split(',')
        .map(|tag| tag.trim().trim_start_matches("W/"))
        .any(|tag| tag == "*" || tag == etag)
}

/// Build the response for `stream` honouring `Range`, `If-Range` and
/// `If-None-Match`.
pub async fn serve(mut stream: ContentStream, headers: &HeaderMap) -> Result<Response, StreamError> {
    let etag = HeaderValue::from_str(&stream.etag)?;
    let disposition = HeaderValue::from_str(&format!(
        "filename=\"{}\"",
        escape_segment(&stream.name)
    ))?;

    if header_str(headers, header::IF_NONE_MATCH).is_some_and(|list| etag_matches(list, &stream.etag)) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        response.headers_mut().insert(header::ETAG, etag);
        return Ok(response);
    }

    let range_applies = header_str(headers, header::IF_RANGE).map_or(true, |tag| tag.trim() == stream.etag);
    let range = match header_str(headers, header::RANGE) {
        Some(value) if range_applies => parse_range(value, stream.length),
        _ => ByteRange::Full,
    };

    let mut response = match range {
        ByteRange::Unsatisfiable => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            response.headers_mut().insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes */{}", stream.length))?,
            );
            response
        }
        ByteRange::Partial { start, end } => {
            stream.reader.seek(SeekFrom::Start(start)).await?;
            let count = end - start + 1;
            let body = Body::from_stream(ReaderStream::new(stream.reader.take(count)));
            let mut response = Response::new(body);
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes {start}-{end}/{}", stream.length))?,
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(count));
            response
        }
        ByteRange::Full => {
            let length = stream.length;
            let body = Body::from_stream(ReaderStream::new(stream.reader.take(length)));
            let mut response = Response::new(body);
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            response
        }
    };

    let out = response.headers_mut();
    out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    out.insert(header::ETAG, etag);
    out.insert(header::CONTENT_DISPOSITION, disposition);
    if range != ByteRange::Unsatisfiable {
        out.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(stream.content_type),
        );
    }
    Ok(response)
}
