//! Builds the item list for one session.

use crate::mime::mime_for_extension;
use crate::music::clean_music_name;
use crate::tags::{extract_tags, overlap};
use peerhttp_types::{FileEntry, Fingerprint};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Whitelist value meaning "no extension filter".
pub const WHITELIST_ANY: &str = "any";

/// What the renderer needs to know about a session.
#[derive(Debug, Clone, Copy)]
pub struct PlaylistSource<'a> {
    pub fingerprint: Fingerprint,
    pub name: &'a str,
    pub files: &'a [FileEntry],
}

/// Extension whitelist. Entries are stored lower-case with a leading `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist(HashSet<String>);

impl Whitelist {
    /// Parse the comma separated path form: `any`, or `mp3,flac,.ogg`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case(WHITELIST_ANY) {
            return Self::default();
        }
        Self::from_iter(raw.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn allows(&self, ext: &str) -> bool {
        self.0.is_empty() || self.0.contains(&ext.to_lowercase())
    }
}

impl<S: AsRef<str>> FromIterator<S> for Whitelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let set = iter
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"))
            .collect();
        Self(set)
    }
}

/// Tag blocklist from the `ignore` query parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocklist(HashSet<String>);

impl Blocklist {
    pub fn parse(raw: &str) -> Self {
        Self::from_iter(raw.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_set(&self) -> &HashSet<String> {
        &self.0
    }
}

impl<S: AsRef<str>> FromIterator<S> for Blocklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|tag| tag.as_ref().trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistItem {
    pub name: String,
    pub original_name: String,
    pub ext: String,
    pub mime: String,
    pub size: u64,
    pub path: Vec<String>,
    pub tags: BTreeSet<String>,
    /// Segments after the session name in the content URL. Empty for a
    /// single-file session.
    #[serde(skip)]
    pub location: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistHeader {
    pub hash: String,
    pub name: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistView {
    pub header: PlaylistHeader,
    pub content: Vec<PlaylistItem>,
}

/// Render `source` into a playlist, dropping files outside `whitelist` and
/// files whose tags hit `blocklist`.
pub fn render(source: PlaylistSource<'_>, whitelist: &Whitelist, blocklist: &Blocklist) -> PlaylistView {
    let mut content = Vec::with_capacity(source.files.len());

    for file in source.files {
        let (path, location) = if file.path.is_empty() {
            (vec![source.name.to_string()], Vec::new())
        } else {
            (file.path.clone(), file.path.clone())
        };

        let tags = extract_tags(&path);
        if overlap(&tags, blocklist.as_set()) {
            continue;
        }

        let base = path.last().map(String::as_str).unwrap_or(source.name);
        let ext = extension(base);
        if !whitelist.allows(ext) {
            continue;
        }

        let stem = &base[..base.len() - ext.len()];
        let mime = mime_for_extension(ext).unwrap_or_default().to_string();
        let name = if mime.starts_with("audio/") {
            clean_music_name(stem)
        } else {
            stem.to_string()
        };

        content.push(PlaylistItem {
            name,
            original_name: stem.to_string(),
            ext: ext.to_string(),
            mime,
            size: file.length,
            path,
            tags,
            location,
        });
    }

    PlaylistView {
        header: PlaylistHeader {
            hash: source.fingerprint.to_hex(),
            name: source.name.to_string(),
            file_count: source.files.len(),
        },
        content,
    }
}

/// Suffix from the last `.` of the base name, dot included. Empty when there is
/// no dot.
fn extension(base: &str) -> &str {
    base.rfind('.').map_or("", |idx| &base[idx..])
}
