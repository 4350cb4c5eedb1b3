//! Content engine contract.
//!
//! The gateway never talks to a transfer protocol directly. It adds sessions
//! through a [`ContentEngine`], waits on a session's [`ReadySignal`] for
//! metadata, and reads file bytes through a [`ContentReader`].

pub mod error;
pub mod library;
pub mod local;
pub mod reader;
pub mod session;

pub use error::{EngineError, Result};
pub use local::LocalEngine;
pub use reader::{ContentReader, LocalReader};
pub use session::{ContentEngine, FileHandle, FileRef, ReadySignal, SessionHandle, SessionRef};
