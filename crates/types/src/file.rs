use serde::{Deserialize, Serialize};

/// One file inside a session, addressed by its path relative to the session root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: Vec<String>,
    pub length: u64,
}

impl FileEntry {
    pub fn new(path: Vec<String>, length: u64) -> Self {
        Self { path, length }
    }

    /// Last path segment, if the entry has one.
    pub fn base_name(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }
}
