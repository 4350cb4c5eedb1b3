//! Typed request context, built once per request from path, query and headers.

use crate::server::ApiError;
use axum::http::{header, HeaderMap, Uri};
use peerhttp_playlist::{Blocklist, PlaylistFormat, Whitelist};
use peerhttp_types::{Fingerprint, MagnetUri};
use percent_encoding::percent_decode_str;

/// Query parameter carrying the comma separated tag blocklist.
pub const IGNORE_PARAM: &str = "ignore";

/// Everything a playlist handler needs besides the session itself.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub format: PlaylistFormat,
    pub whitelist: Whitelist,
    pub blocklist: Blocklist,
    /// Scheme and authority for absolute links.
    pub host: String,
}

impl ListRequest {
    pub fn new(format: &str, whitelist: &str, ignore: Option<&str>, headers: &HeaderMap) -> Self {
        let accept = headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok());
        Self {
            format: PlaylistFormat::negotiate(Some(format), accept),
            whitelist: Whitelist::parse(whitelist),
            blocklist: ignore.map(Blocklist::parse).unwrap_or_default(),
            host: request_host(headers),
        }
    }
}

/// `http://<Host>` for the request; falls back to `localhost`.
pub fn request_host(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("localhost");
    format!("http://{host}")
}

pub fn parse_fingerprint(raw: &str) -> Result<Fingerprint, ApiError> {
    Fingerprint::from_hex(raw).map_err(|err| ApiError::bad_request(format!("invalid hash: {err}")))
}

/// Value of `ignore` in a raw query string, if any.
pub fn ignore_param(raw_query: Option<&str>) -> Option<String> {
    raw_query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == IGNORE_PARAM)
        .map(|(_, value)| percent_decode_str(value).decode_utf8_lossy().into_owned())
}

/// Magnet URI rebuilt from the route wildcard and the raw query. An `ignore`
/// pair is split off and returned separately.
pub fn magnet_from_request(
    wildcard: &str,
    raw_query: Option<&str>,
) -> Result<(MagnetUri, Option<String>), ApiError> {
    let raw_query = raw_query.unwrap_or_default();
    let ignore = ignore_param(Some(raw_query));
    let magnet_query = raw_query
        .split('&')
        .filter(|pair| pair.split_once('=').map_or(true, |(key, _)| key != IGNORE_PARAM))
        .collect::<Vec<_>>()
        .join("&");

    let uri = MagnetUri::from_request(wildcard, &magnet_query)
        .map_err(|err| ApiError::bad_request(format!("invalid magnet uri: {err}")))?;
    Ok((uri, ignore))
}

/// A `/content/<hash>/<path...>` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub fingerprint: Fingerprint,
    /// Decoded path segments: session name first, then the file path.
    pub segments: Vec<String>,
}

impl ContentRequest {
    /// Parse from the raw request URI. Segments are split before decoding so an
    /// escaped `/` stays inside its segment.
    pub fn from_uri(uri: &Uri) -> Result<Self, ApiError> {
        let rest = uri
            .path()
            .strip_prefix("/content/")
            .ok_or_else(|| ApiError::bad_request("not a content path"))?;
        let (hash, path) = rest
            .split_once('/')
            .ok_or_else(|| ApiError::bad_request("missing file path"))?;
        let fingerprint = parse_fingerprint(hash)?;

        let segments = path
            .split('/')
            .map(|segment| {
                percent_decode_str(segment)
                    .decode_utf8()
                    .map(|decoded| decoded.into_owned())
                    .map_err(|_| ApiError::bad_request("path is not valid utf-8"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if segments.iter().any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(ApiError::bad_request("invalid file path"));
        }

        Ok(Self {
            fingerprint,
            segments,
        })
    }
}
