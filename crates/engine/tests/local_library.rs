use peerhttp_engine::{ContentEngine, ContentReader, FileHandle, LocalEngine, SessionHandle};
use std::fs;
use std::io::SeekFrom;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

fn library() -> TempDir {
    let dir = TempDir::new().unwrap();
    let album = dir.path().join("Live Album");
    fs::create_dir_all(album.join("disc 2")).unwrap();
    fs::write(album.join("01 - Opener.mp3"), b"opener-bytes").unwrap();
    fs::write(album.join("disc 2").join("02 - Closer.mp3"), b"closer").unwrap();
    fs::write(dir.path().join("clip.mkv"), vec![7u8; 1000]).unwrap();
    dir
}

#[tokio::test]
async fn scanned_sessions_serve_bytes() {
    let dir = library();
    let engine = LocalEngine::with_library(dir.path());
    assert_eq!(engine.scan().await.unwrap(), 2);

    let album = peerhttp_engine::library::describe_entry(&dir.path().join("Live Album"))
        .unwrap()
        .unwrap();
    let (session, is_new) = engine.add_by_fingerprint(album.fingerprint());
    assert!(is_new);
    session.metadata_ready().wait().await.unwrap();
    assert_eq!(session.display_name(), "Live Album");
    assert!(!session.is_single_file());

    let files = session.files().unwrap();
    let closer = files
        .iter()
        .find(|f| f.path() == ["disc 2".to_string(), "02 - Closer.mp3".to_string()])
        .unwrap();
    assert_eq!(closer.length(), 6);

    let mut reader = closer.new_reader().await.unwrap();
    reader.set_readahead(1);
    reader.set_responsive();
    reader.seek(SeekFrom::Start(2)).await.unwrap();
    let mut rest = String::new();
    reader.read_to_string(&mut rest).await.unwrap();
    assert_eq!(rest, "oser");
}

#[tokio::test]
async fn single_file_session_reads_whole_file() {
    let dir = library();
    let engine = LocalEngine::with_library(dir.path());
    engine.scan().await.unwrap();

    let clip = peerhttp_engine::library::describe_entry(&dir.path().join("clip.mkv"))
        .unwrap()
        .unwrap();
    let (session, _) = engine.add_by_fingerprint(clip.fingerprint());
    assert!(session.is_single_file());

    let files = session.files().unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].path().is_empty());

    let mut buf = Vec::new();
    files[0]
        .new_reader()
        .await
        .unwrap()
        .read_to_end(&mut buf)
        .await
        .unwrap();
    assert_eq!(buf, vec![7u8; 1000]);
}
