//! # TokenRouter
//!
//! Client SDK for the TokenRouter LLM routing API.
//!
//! ## Features
//!
//! - **Four endpoint families**: native `/route` with routing metadata,
//!   OpenAI-compatible chat and legacy completions, and the Responses API
//! - **One parameter set**: [`RequestParams`] is translated per family;
//!   options a family does not understand are rejected before any request
//! - **Streaming**: typed, one-shot event streams for every family, async or
//!   blocking, with prompt cancellation
//! - **Provider keys**: locally held provider keys are encrypted against the
//!   service's public key and sent in a dedicated header
//! - **Typed errors**: HTTP failures map onto [`Error`] with retry metadata;
//!   retryable failures are retried with exponential backoff
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tokenrouter::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::from_env()?;
//!
//!     let params = RequestParams::new(vec![
//!         Message::developer("You are a concise assistant."),
//!         Message::user("What is Rust?"),
//!     ])
//!     .with_mode(RoutingMode::Cost);
//!
//!     let completion = client.route(&params).await?;
//!     println!("{}", completion.content().unwrap_or_default());
//!     println!("served by {:?}", completion.routed_model());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blocking;
pub mod client;
pub mod config;
pub mod crypto;
pub mod endpoint;
pub mod error;
pub mod error_map;
pub mod models;
pub mod params;
pub mod provider_keys;
pub mod responses;
pub mod retry;
pub mod stream;
pub mod types;

// Re-exports for convenience
pub use client::Client;
pub use config::ClientConfig;
pub use endpoint::{ChatCompletions, EndpointFamily, LegacyCompletions, NativeRoute, ResponsesApi};
pub use error::{Error, ErrorKind, Result};
pub use models::{
    ChatCompletion, ChatCompletionChunk, HealthStatus, Model, ModelCosts, RouteChunk,
    RouteCompletion, RoutingMetadata, TextCompletion, TextCompletionChunk,
};
pub use params::{InputItem, Prompt, RequestParams, ResponseInput};
pub use provider_keys::ProviderKeys;
pub use responses::{InputItemsList, InputItemsQuery, Response, ResponseDeleted, ResponseStreamEvent};
pub use retry::RetryPolicy;
pub use stream::EventStream;
pub use types::{KeyMode, Message, Role, RoutingMode, Tool, ToolChoice, Usage};

/// Re-export so callers can cancel streams without a direct dependency
pub use tokio_util::sync::CancellationToken;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::ClientConfig;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::params::RequestParams;
    pub use crate::provider_keys::ProviderKeys;
    pub use crate::types::{KeyMode, Message, Role, RoutingMode};
    pub use futures::StreamExt;
}
