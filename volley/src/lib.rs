//! Push notification client built around a sliding-window dispatcher.
//!
//! This crate provides:
//! - A [`Dispatcher`] that pushes a batch of notifications over a shared, connection-capped
//!   HTTP/2 context while keeping at most a fixed number of requests in flight
//! - Request construction for the push gateway ([`ApnsRequestFactory`])
//! - Provider token and client certificate authentication
//! - A scripted [`MockTransport`] for exercising the dispatch loop without a network
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use volley::{
//!     ApnsRequestFactory, Dispatcher, DispatcherConfig, Notification, NoAuth, ReqwestTransport,
//! };
//!
//! let mut dispatcher = Dispatcher::new(
//!     ReqwestTransport::new(),
//!     Arc::new(ApnsRequestFactory::new().with_default_topic("com.example.app")),
//!     Arc::new(NoAuth),
//!     DispatcherConfig::default(),
//! );
//!
//! let responses = dispatcher
//!     .push(vec![Notification::new("a1b2c3", serde_json::json!({"aps": {"alert": "hi"}}))])
//!     .await?;
//!
//! for response in responses {
//!     println!("{} -> {}", response.correlation_key, response.status);
//! }
//! ```

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod parser;
pub mod request;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use auth::{AuthProvider, CertificateAuthProvider, NoAuth, TokenAuthProvider};
pub use dispatcher::{Dispatcher, DispatcherConfig, FailurePolicy};
pub use error::{Result, VolleyError};
pub use parser::parse_response;
pub use request::{ApnsRequestFactory, RequestDescriptor, RequestFactory};
pub use transport::{ConnectionMultiplexer, MockTransport, ReqwestTransport, Transport};
pub use types::{Environment, HandleId, Notification, Priority, PushType, Response};
