//! HTTP gateway: playlists and ranged content for tracked sessions.

pub mod request;
pub mod server;
pub mod stream;


pub use request::{ContentRequest, ListRequest};
pub use server::{build_router, start_server, ApiError, AppState, GatewayConfig, SharedState};
pub use stream::{open_stream, parse_range, serve, ByteRange, ContentStream, StreamError};
