//! Connection multiplexing abstraction.
//!
//! The dispatcher never talks to the network directly. It opens a
//! [`ConnectionMultiplexer`] through a [`Transport`], adds requests to it,
//! drives it, and harvests completions. This keeps the sliding-window logic
//! independent of how connections are actually shared and makes it testable
//! with the scripted [`MockTransport`].

pub mod http;
pub mod mock;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::RequestDescriptor;
use crate::types::HandleId;

pub use self::http::{ReqwestMultiplexer, ReqwestTransport};
pub use self::mock::{MockEvent, MockOutcome, MockTransport};

/// Category of a low-level transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Redirect,
    Other,
}

impl TransportErrorKind {
    /// Short code included in diagnostic events.
    pub fn code(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Decode => "decode",
            TransportErrorKind::Redirect => "redirect",
            TransportErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A connection-level failure of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

/// The outcome of one request as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub handle: HandleId,
    /// HTTP status, 0 if none was received
    pub status: u16,
    /// Header block and body separated by `\r\n\r\n`
    pub raw: String,
    pub error: Option<TransportFailure>,
}

/// Outcome of a single, non-multiplexed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleOutcome {
    pub status: u16,
    pub raw: String,
    pub error: Option<TransportFailure>,
}

/// A reusable context that carries many logical requests over a bounded
/// number of connections.
///
/// `remove` and `close` are idempotent.
#[async_trait]
pub trait ConnectionMultiplexer: Send {
    /// Submit a request under `handle`.
    ///
    /// # Errors
    /// Fails if the context is closed or the request cannot be started.
    fn add(&mut self, handle: HandleId, request: RequestDescriptor) -> Result<()>;

    /// Make as much progress as possible without blocking.
    ///
    /// Returns the number of requests still running.
    ///
    /// # Errors
    /// An error is a non-recoverable failure of the whole context.
    fn perform(&mut self) -> Result<usize>;

    /// Block until at least one request may make progress, or `timeout` elapses.
    ///
    /// Returns the number of ready events; 0 means nothing happened.
    async fn wait(&mut self, timeout: Duration) -> Result<usize>;

    /// Pop the next completed request, if any.
    fn next_completed(&mut self) -> Option<Completion>;

    /// Release the resources held for `handle`.
    fn remove(&mut self, handle: HandleId);

    /// Tear down the context and its connections.
    fn close(&mut self);
}

/// Opens multiplexers and performs one-off sends.
#[async_trait]
pub trait Transport: Send + Sync {
    type Multiplexer: ConnectionMultiplexer;

    /// Create a multiplexing context limited to `max_connections` connections
    /// to the gateway host.
    fn open(&self, max_connections: usize) -> Result<Self::Multiplexer>;

    /// Send one request over a transient connection that is released before
    /// returning.
    async fn send(&self, request: RequestDescriptor) -> SingleOutcome;
}
