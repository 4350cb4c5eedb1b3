//! Builds descriptors for content already present in a library directory.
//!
//! Every top-level entry of the library is one session: a regular file becomes
//! a single-file session, a directory becomes a multi-file session rooted at the
//! directory name. Piece hashes are computed the usual way (SHA-1 over fixed-size
//! pieces of the concatenated file contents), so fingerprints match what any
//! other client would derive for the same content and piece size.

use peerhttp_descriptor::{SessionDescriptor, DEFAULT_PIECE_LENGTH};
use peerhttp_types::FileEntry;
use sha1::{Digest, Sha1};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

/// Describe every top-level library entry. Entries that cannot be described
/// (hidden, unreadable, empty directories) are skipped.
pub fn scan_library(root: &Path) -> Result<Vec<SessionDescriptor>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut descriptors = Vec::with_capacity(entries.len());
    for path in entries {
        match describe_entry(&path) {
            Ok(Some(descriptor)) => {
                debug!(
                    path = %path.display(),
                    fingerprint = %descriptor.fingerprint(),
                    "library entry described"
                );
                descriptors.push(descriptor);
            }
            Ok(None) => {}
            Err(err) => warn!(path = %path.display(), error = %err, "skipping library entry"),
        }
    }
    Ok(descriptors)
}

/// Describe one top-level entry, or `None` when it should not be published.
pub fn describe_entry(path: &Path) -> Result<Option<SessionDescriptor>> {
    let Some(name) = utf8_name(path) else {
        return Ok(None);
    };
    if name.starts_with('.') {
        return Ok(None);
    }

    let metadata = fs::metadata(path)?;
    let (entries, locations) = if metadata.is_file() {
        (
            vec![FileEntry::new(Vec::new(), metadata.len())],
            vec![path.to_path_buf()],
        )
    } else if metadata.is_dir() {
        let mut found = Vec::new();
        collect_files(path, &mut Vec::new(), &mut found)?;
        if found.is_empty() {
            return Ok(None);
        }
        found.into_iter().unzip()
    } else {
        return Ok(None);
    };

    let pieces = hash_pieces(&locations, DEFAULT_PIECE_LENGTH)?;
    let descriptor = SessionDescriptor::build(&name, entries, DEFAULT_PIECE_LENGTH, pieces)?;
    Ok(Some(descriptor))
}

/// Location on disk of a session file, or `None` if a segment would escape the root.
pub fn content_path(root: &Path, name: &str, path: &[String]) -> Option<PathBuf> {
    let mut location = root.to_path_buf();
    for segment in std::iter::once(name).chain(path.iter().map(String::as_str)) {
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains('/')
            || segment.contains('\\')
        {
            return None;
        }
        location.push(segment);
    }
    Some(location)
}

fn collect_files(
    dir: &Path,
    prefix: &mut Vec<String>,
    out: &mut Vec<(FileEntry, PathBuf)>,
) -> io::Result<()> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    children.sort();

    for child in children {
        let Some(name) = utf8_name(&child) else {
            warn!(path = %child.display(), "skipping non utf-8 file name");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let metadata = fs::metadata(&child)?;
        prefix.push(name);
        if metadata.is_dir() {
            collect_files(&child, prefix, out)?;
        } else if metadata.is_file() {
            out.push((FileEntry::new(prefix.clone(), metadata.len()), child.clone()));
        }
        prefix.pop();
    }
    Ok(())
}

fn hash_pieces(files: &[PathBuf], piece_length: u64) -> io::Result<Vec<u8>> {
    let piece_length = usize::try_from(piece_length)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "piece length too large"))?;
    let mut pieces = Vec::new();
    let mut hasher = Sha1::new();
    let mut filled = 0usize;
    let mut buf = vec![0u8; 64 * 1024];

    for path in files {
        let mut file = fs::File::open(path)?;
        loop {
            let want = buf.len().min(piece_length - filled);
            let n = file.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            filled += n;
            if filled == piece_length {
                pieces.extend_from_slice(&hasher.finalize_reset());
                filled = 0;
            }
        }
    }
    if filled > 0 {
        pieces.extend_from_slice(&hasher.finalize());
    }
    Ok(pieces)
}

fn utf8_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_pieces_splits_across_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, vec![1u8; 5]).unwrap();
        fs::write(&b, vec![2u8; 6]).unwrap();

        let pieces = hash_pieces(&[a, b], 4).unwrap();
        // 11 bytes in 4-byte pieces.
        assert_eq!(pieces.len(), 3 * 20);

        let mut first = Sha1::new();
        first.update([1u8; 4]);
        assert_eq!(&pieces[..20], first.finalize().as_slice());
    }

    #[test]
    fn test_content_path_rejects_escape() {
        let root = Path::new("/lib");
        assert_eq!(
            content_path(root, "Album", &["cd1".into(), "a.mp3".into()]),
            Some(PathBuf::from("/lib/Album/cd1/a.mp3"))
        );
        assert_eq!(content_path(root, "Album", &["..".into()]), None);
        assert_eq!(content_path(root, "a/b", &[]), None);
    }

    #[test]
    fn test_describe_directory_sorted_and_skips_hidden() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Album");
        fs::create_dir_all(album.join("cd2")).unwrap();
        fs::write(album.join("b.mp3"), b"bbb").unwrap();
        fs::write(album.join("a.mp3"), b"aa").unwrap();
        fs::write(album.join("cd2").join("c.flac"), b"c").unwrap();
        fs::write(album.join(".DS_Store"), b"x").unwrap();

        let descriptor = describe_entry(&album).unwrap().unwrap();
        let paths: Vec<_> = descriptor.files().iter().map(|f| f.path.join("/")).collect();
        assert_eq!(paths, vec!["a.mp3", "b.mp3", "cd2/c.flac"]);
        assert_eq!(descriptor.name(), "Album");
        assert_eq!(descriptor.total_length(), 6);
    }

    #[test]
    fn test_scan_skips_empty_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("song.mp3"), b"data").unwrap();

        let found = scan_library(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_single_file());
    }
}
