//! Output formats for a rendered playlist.

use crate::render::{PlaylistItem, PlaylistView};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt::Write as _;

/// Bytes left as-is in a path segment (RFC 3986 unreserved).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_M3U: &str = "application/x-mpegURL; charset=utf-8";
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaylistFormat {
    #[default]
    Json,
    M3u,
    Html,
}

impl PlaylistFormat {
    /// Format named in the request path, if recognised.
    pub fn from_path_param(param: &str) -> Option<Self> {
        match param.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "m3u" | "m3u8" => Some(Self::M3u),
            "html" => Some(Self::Html),
            _ => None,
        }
    }

    /// Best match for an `Accept` header. Media ranges are ranked by their `q`
    /// parameter; ties keep header order.
    pub fn from_accept(header: &str) -> Option<Self> {
        let mut best: Option<(f32, Self)> = None;
        for range in header.split(',') {
            let mut parts = range.split(';');
            let media = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            let quality = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if quality <= 0.0 {
                continue;
            }
            let Some(format) = Self::from_media_type(&media) else {
                continue;
            };
            if best.map_or(true, |(q, _)| quality > q) {
                best = Some((quality, format));
            }
        }
        best.map(|(_, format)| format)
    }

    fn from_media_type(media: &str) -> Option<Self> {
        match media {
            "text/html" | "application/xhtml+xml" => Some(Self::Html),
            "application/json" | "text/javascript" => Some(Self::Json),
            "application/mpegurl"
            | "application/x-mpegurl"
            | "audio/mpegurl"
            | "audio/x-mpegurl" => Some(Self::M3u),
            _ => None,
        }
    }

    /// Path parameter first, then `Accept`, then JSON.
    pub fn negotiate(param: Option<&str>, accept: Option<&str>) -> Self {
        param
            .and_then(Self::from_path_param)
            .or_else(|| accept.and_then(Self::from_accept))
            .unwrap_or_default()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => CONTENT_TYPE_JSON,
            Self::M3u => CONTENT_TYPE_M3U,
            Self::Html => CONTENT_TYPE_HTML,
        }
    }

    /// Serialize `view`. `host` is the scheme and authority prefix used for
    /// absolute links, e.g. `http://127.0.0.1:8080`.
    pub fn render(self, view: &PlaylistView, host: &str) -> serde_json::Result<RenderedPlaylist> {
        let (body, disposition) = match self {
            Self::Json => (serde_json::to_string(view)?, None),
            Self::M3u => (
                render_m3u(view, host),
                Some(disposition(&view.header.name, "m3u8")),
            ),
            Self::Html => (
                render_html(view),
                Some(disposition(&view.header.name, "html")),
            ),
        };
        Ok(RenderedPlaylist {
            content_type: self.content_type(),
            disposition,
            body,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPlaylist {
    pub content_type: &'static str,
    pub disposition: Option<String>,
    pub body: String,
}

/// Percent-escape one path segment. `/` is always escaped.
pub fn escape_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Escape each segment on its own and join with `/`.
pub fn escape_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| escape_segment(s.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

/// `/content/<hash>/<name>[/<segment>...]`, escaped.
pub fn content_path(hash: &str, name: &str, location: &[String]) -> String {
    let mut out = format!("/content/{hash}/{}", escape_segment(name));
    if !location.is_empty() {
        out.push('/');
        out.push_str(&escape_path(location));
    }
    out
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(c),
        }
    }
    out
}

fn disposition(name: &str, ext: &str) -> String {
    format!("filename=\"{}.{ext}\"", escape_segment(name))
}

fn item_link(view: &PlaylistView, item: &PlaylistItem) -> String {
    content_path(&view.header.hash, &view.header.name, &item.location)
}

fn render_m3u(view: &PlaylistView, host: &str) -> String {
    let mut out = String::from("#EXTM3U\r\n#EXTENC: UTF-8\r\n");
    for item in &view.content {
        let title = match item.path.len() {
            n if n > 1 => format!("{}/{}", item.path[n - 2], item.name),
            _ => item.name.clone(),
        };
        let _ = write!(
            out,
            "#EXTINF:-1,{title}\r\n{host}{}\r\n",
            item_link(view, item)
        );
    }
    out
}

fn render_html(view: &PlaylistView) -> String {
    let mut out = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{}</title>\n\
         <meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\" />\n\
         </head>\n\n<body>\n",
        html_escape(&view.header.name)
    );
    for item in &view.content {
        let _ = writeln!(
            out,
            "<a href=\"{}\">{}</a><br>",
            item_link(view, item),
            html_escape(&item.path.join("/"))
        );
    }
    out.push_str("</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render, Blocklist, PlaylistSource, Whitelist};
    use peerhttp_types::{FileEntry, Fingerprint};

    fn view(name: &str, files: &[FileEntry]) -> PlaylistView {
        render(
            PlaylistSource {
                fingerprint: Fingerprint::new([0x11; 20]),
                name,
                files,
            },
            &Whitelist::default(),
            &Blocklist::default(),
        )
    }

    #[test]
    fn test_path_param() {
        assert_eq!(PlaylistFormat::from_path_param("json"), Some(PlaylistFormat::Json));
        assert_eq!(PlaylistFormat::from_path_param("M3U8"), Some(PlaylistFormat::M3u));
        assert_eq!(PlaylistFormat::from_path_param("html"), Some(PlaylistFormat::Html));
        assert_eq!(PlaylistFormat::from_path_param("xml"), None);
    }

    #[test]
    fn test_accept_mapping() {
        assert_eq!(PlaylistFormat::from_accept("text/html"), Some(PlaylistFormat::Html));
        assert_eq!(
            PlaylistFormat::from_accept("audio/x-mpegurl, */*"),
            Some(PlaylistFormat::M3u)
        );
        assert_eq!(
            PlaylistFormat::from_accept("text/html;q=0.5, application/json"),
            Some(PlaylistFormat::Json)
        );
        assert_eq!(PlaylistFormat::from_accept("image/png"), None);
        assert_eq!(PlaylistFormat::from_accept("text/html;q=0"), None);
    }

    #[test]
    fn test_negotiate_order() {
        assert_eq!(
            PlaylistFormat::negotiate(Some("m3u"), Some("text/html")),
            PlaylistFormat::M3u
        );
        assert_eq!(
            PlaylistFormat::negotiate(Some("bogus"), Some("text/html")),
            PlaylistFormat::Html
        );
        assert_eq!(PlaylistFormat::negotiate(None, None), PlaylistFormat::Json);
    }

    #[test]
    fn test_escape_segment() {
        assert_eq!(escape_segment("a b&c/d"), "a%20b%26c%2Fd");
        assert_eq!(escape_segment("Track-01_v2.~mp3"), "Track-01_v2.~mp3");
        assert_eq!(escape_path(&["x/y", "z"]), "x%2Fy/z");
    }

    #[test]
    fn test_m3u_body() {
        let files = vec![
            FileEntry::new(vec!["CD 1".into(), "01 - Intro.mp3".into()], 1),
            FileEntry::new(vec!["bonus.mp3".into()], 1),
        ];
        let rendered = PlaylistFormat::M3u
            .render(&view("My Album", &files), "http://host:8080")
            .unwrap();
        let hash = "11".repeat(20);
        assert_eq!(rendered.content_type, CONTENT_TYPE_M3U);
        assert_eq!(
            rendered.disposition.as_deref(),
            Some("filename=\"My%20Album.m3u8\"")
        );
        assert_eq!(
            rendered.body,
            format!(
                "#EXTM3U\r\n#EXTENC: UTF-8\r\n\
                 #EXTINF:-1,CD 1/Intro\r\nhttp://host:8080/content/{hash}/My%20Album/CD%201/01%20-%20Intro.mp3\r\n\
                 #EXTINF:-1,bonus\r\nhttp://host:8080/content/{hash}/My%20Album/bonus.mp3\r\n"
            )
        );
    }

    #[test]
    fn test_single_file_link_has_no_location() {
        let files = vec![FileEntry::new(Vec::new(), 10)];
        let rendered = PlaylistFormat::M3u
            .render(&view("song.ogg", &files), "http://h")
            .unwrap();
        assert!(rendered
            .body
            .ends_with(&format!("http://h/content/{}/song.ogg\r\n", "11".repeat(20))));
    }

    #[test]
    fn test_html_escapes_names() {
        let files = vec![FileEntry::new(vec!["<b>.mp4".into()], 1)];
        let rendered = PlaylistFormat::Html
            .render(&view("A & B", &files), "http://h")
            .unwrap();
        assert_eq!(rendered.content_type, CONTENT_TYPE_HTML);
        assert_eq!(rendered.disposition.as_deref(), Some("filename=\"A%20%26%20B.html\""));
        assert!(rendered.body.contains("<title>A &amp; B</title>"));
        assert!(rendered.body.contains(">&lt;b&gt;.mp4</a>"));
        assert!(rendered.body.contains("/A%20%26%20B/%3Cb%3E.mp4\""));
    }

    #[test]
    fn test_json_has_no_disposition() {
        let rendered = PlaylistFormat::Json
            .render(&view("x", &[]), "http://h")
            .unwrap();
        assert_eq!(rendered.content_type, CONTENT_TYPE_JSON);
        assert!(rendered.disposition.is_none());
        assert!(rendered.body.starts_with("{\"header\""));
    }
}
