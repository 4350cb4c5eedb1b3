//! Session registry: fingerprint → session index backed by the descriptor store.

pub mod context;
pub mod errors;
pub mod registry;

pub use context::TrackContext;
pub use errors::{RegistryError, Result};
pub use registry::{LoadReport, SessionRegistry};
