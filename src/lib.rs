//! topiclink
//!
//! A client runtime that multiplexes reactive topic subscriptions and
//! request/response calls over one self-healing WebSocket connection.
//!
//! # Features
//!
//! - **Lazy single socket**: opened on first use, reopened with capped
//!   exponential backoff, resubscribed automatically
//! - **Reference-counted topics**: one wire subscribe per topic no matter how
//!   many observers hold it
//! - **Incremental state**: `full`/`add`/`set`/`del` operations applied in place
//!   to each topic's `serde_json::Value`
//! - **Scroll topics**: high-frequency streams batched per frame and capped
//! - **Correlated RPC**: calls and replies matched by id on the same socket,
//!   with an optional replay-after-reconnect variant
//!
//! # Modules
//!
//! - `protocol`: envelope codec
//! - `connection`: socket lifecycle core, reconnect scheduler, socket task
//! - `store`: topic state, diff application, scroll buffers
//! - `rpc`: correlation table and call handles
//! - `subscription`: reference counting and the `Subscription` guard
//! - `link`: the async `Link` handle
//! - `context`: optional process-wide link slot
//! - `i18n`: message catalog lookup
//!
//! # Example
//!
//! ```no_run
//! use topiclink::{Link, LinkConfig};
//!
//! #[tokio::main]
//! async fn main() -> topiclink::LinkResult<()> {
//!     let link = Link::new(LinkConfig::new("http://localhost:8080"))?;
//!     let mut jobs = link.subscribe("jobs");
//!     let snapshot = jobs.ready().await?;
//!     println!("{}", snapshot.value);
//!
//!     let mut call = link.call("jobs.start", serde_json::json!({"id": 7}));
//!     if let Some(Err(error)) = call.outcome().await {
//!         eprintln!("start failed: {}", error);
//!     }
//!     link.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod context;
pub mod i18n;
pub mod link;
pub mod protocol;
pub mod rpc;
pub mod store;
pub mod subscription;
pub mod types;

// Re-export commonly used items at crate root
pub use config::LinkConfig;
pub use context::{init_link, link};
pub use i18n::Catalog;
pub use link::Link;
pub use rpc::{CallState, RpcHandle};
pub use store::TopicSnapshot;
pub use subscription::Subscription;
pub use types::{ConnectionState, LinkError, LinkEvent, LinkResult, LinkStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
