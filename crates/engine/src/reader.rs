use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// Random-access reader over one file of a session.
pub trait ContentReader: AsyncRead + AsyncSeek + Send + Unpin {
    /// Bytes the engine should prefetch past the current position.
    fn set_readahead(&mut self, bytes: u64);

    /// Serve bytes as soon as they are available instead of waiting for
    /// verified, contiguous pieces.
    fn set_responsive(&mut self);
}

/// Reader over a file that is fully present on local disk.
///
/// Local data is always complete, so the hints are only recorded.
#[derive(Debug)]
pub struct LocalReader {
    file: File,
    readahead: u64,
    responsive: bool,
}

impl LocalReader {
    pub fn new(file: File) -> Self {
        Self {
            file,
            readahead: 0,
            responsive: false,
        }
    }

    pub fn readahead(&self) -> u64 {
        self.readahead
    }

    pub fn is_responsive(&self) -> bool {
        self.responsive
    }
}

impl ContentReader for LocalReader {
    fn set_readahead(&mut self, bytes: u64) {
        self.readahead = bytes;
    }

    fn set_responsive(&mut self) {
        self.responsive = true;
    }
}

impl AsyncRead for LocalReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for LocalReader {
    fn start_seek(mut self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}
