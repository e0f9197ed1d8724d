//! # Swift Gateway
//!
//! HTTP front end for Swift object storage.
//!
//! Browsers and plain HTTP clients talk to the gateway; the gateway talks to
//! the storage backend through [`swift_client`]. Uploads and downloads are
//! streamed in both directions:
//!
//! ```text
//! browser ──PUT multipart──▶ gateway ──decode──▶ PUT (chunked) ──▶ Swift
//! browser ◀──────stream───── gateway ◀──sink──── GET ◀──────────── Swift
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::GatewayConfig;
pub use error::{ApiError, ErrorCode};
pub use server::{run_server, run_server_with_shutdown};
pub use state::AppState;
