//! # procountor-rs
//!
//! A Rust client library for the Procountor accounting API.
//!
//! The [`Client`] authenticates once when it is built, attaches the bearer token to every
//! request and, when the server answers `401 Unauthorized`, renews the token and retries the
//! request exactly once. Resource calls return an [`ApiResponse`] whatever the status, so
//! failures reported by the server are inspected through `status` and `message`:
//!
//! ```no_run
//! use procountor::{Client, ClientCredentials, Config, KeyPair};
//! use serde_json::json;
//!
//! # async fn example() -> procountor::Result<()> {
//! let credentials = ClientCredentials::new(
//!     KeyPair::new("client-id", "client-secret"),
//!     "api-key",
//!     "https://example.com/callback",
//! )?;
//! let client = Client::new(credentials, Config::default().with_api_version("latest")?).await?;
//!
//! let invoices = client.get_invoices(&json!({"status": "PAID"})).await?;
//! if invoices.is_success() {
//!     println!("{:?}", invoices.json());
//! } else {
//!     eprintln!("{}: {:?}", invoices.status, invoices.message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Errors carry a span trace when a `tracing_error::ErrorLayer` is installed:
//!
//! ```ignore
//! use tracing_subscriber::prelude::*;
//! use tracing_error::ErrorLayer;
//!
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(ErrorLayer::default())
//!     .init();
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate tracing;

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod headers;
pub mod oauth;
pub mod resources;
pub mod response;
pub mod session;

pub use client::Client;
pub use config::{ApiVersion, Config, Environment};
pub use endpoints::{Attachment, Endpoint};
pub use error::{Error, Result};
pub use oauth::{Authenticator, ClientCredentials, Credentials, KeyPair, ResourceOwner, Token};
pub use response::{ApiResponse, Content};
pub use session::Session;

// Re-export SpanTrace for users who want to access it
pub use tracing_error::SpanTrace;
