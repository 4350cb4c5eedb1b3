//! Playlist rendering for sessions.
//!
//! A session's file list becomes a [`PlaylistView`]: each file is tagged from
//! its path, filtered by extension whitelist and tag blocklist, and audio names
//! are cleaned for display. The view is then serialized as JSON, M3U or HTML.

pub mod format;
pub mod mime;
pub mod music;
pub mod render;
pub mod tags;

pub use format::{
    content_path, escape_path, escape_segment, html_escape, PlaylistFormat, RenderedPlaylist,
};
pub use mime::{mime_for_extension, mime_for_name};
pub use music::clean_music_name;
pub use render::{
    render, Blocklist, PlaylistHeader, PlaylistItem, PlaylistSource, PlaylistView, Whitelist,
    WHITELIST_ANY,
};
pub use tags::{extract_tags, overlap, TagScope, TAG_RULES};
