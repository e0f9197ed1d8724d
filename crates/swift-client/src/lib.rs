//! # Swift Client SDK
//!
//! An async client for OpenStack Swift compatible object storage.
//!
//! ## Features
//!
//! - **Streaming uploads**: inbound bodies are forwarded to storage as they
//!   arrive, with `multipart/form-data` decoded on the fly
//! - **Streaming downloads**: objects are written chunk by chunk into a
//!   [`ResponseSink`]
//! - **Composite operations**: move (copy then delete) and recursive
//!   container deletion
//!
//! ## Example
//!
//! ```rust,ignore
//! use swift_client::{Config, Credentials, SwiftClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new(Credentials::new("test:tester", "testing", "localhost", 8080))
//!         .with_scheme("http");
//!     let client = SwiftClient::connect(config).await?;
//!
//!     client.create_container("photos").await?;
//!     for container in client.list_containers().await? {
//!         println!("{} ({} objects)", container.name, container.count);
//!     }
//!
//!     let object = client.retrieve_object("photos", "cat.jpg").await?;
//!     println!("{} bytes", object.body.len());
//!
//!     Ok(())
//! }
//! ```

mod auth;
mod client;
mod composite;
mod config;
pub mod dispatcher;
mod error;
pub mod multipart;
mod proxy;
pub mod sink;
mod types;

pub use auth::AuthSession;
pub use client::SwiftClient;
pub use composite::{DeleteFanIn, FanInState};
pub use config::{Config, Credentials};
pub use dispatcher::{RequestBody, RequestSpec};
pub use error::{ClientError, PartialFailure, Result};
pub use multipart::{FormDataDecoder, FormEvent, PartMetadata};
pub use proxy::{ByteStream, DataSource, InboundUpload, ProgressCallback, RawUpload, UploadProgress};
pub use sink::{channel_sink, ChannelReceiver, ChannelSink, ResponseSink};
pub use types::*;
