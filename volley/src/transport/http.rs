//! HTTP/2 transport backed by reqwest.
//!
//! [`ReqwestMultiplexer`] keeps one `reqwest::Client` per allowed connection.
//! Clients speak HTTP/2 only (prior knowledge; the gateway never offers
//! HTTP/1.1), which makes the connection pool hold a per-host lock while the
//! first connection is being established. Concurrent requests on a client wait
//! for that connection and share it as streams, so each client opens at most
//! one connection. Requests are assigned to clients round-robin.
//!
//! In-flight requests are plain futures collected in one `FuturesUnordered`
//! that only the dispatcher polls: nothing is spawned, and I/O progresses only
//! inside [`ConnectionMultiplexer::perform`] and [`ConnectionMultiplexer::wait`].

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Version};

use super::{
    Completion, ConnectionMultiplexer, SingleOutcome, Transport, TransportErrorKind,
    TransportFailure,
};
use crate::auth::AuthProvider;
use crate::error::{Result, VolleyError};
use crate::request::RequestDescriptor;
use crate::types::HandleId;

/// Production transport making real HTTP/2 requests.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    identity_pem: Option<Vec<u8>>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport presenting whatever TLS client identity `auth` supplies.
    pub fn for_auth(auth: &dyn AuthProvider) -> Self {
        Self {
            identity_pem: auth.client_identity_pem().map(<[u8]>::to_vec),
            ..Self::default()
        }
    }

    pub fn with_identity_pem(mut self, identity_pem: Vec<u8>) -> Self {
        self.identity_pem = Some(identity_pem);
        self
    }

    /// Limit the total time of each request, from connecting to reading the body.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    fn client(&self, idle_connections: usize) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .http2_prior_knowledge()
            .pool_max_idle_per_host(idle_connections);

        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(pem) = &self.identity_pem {
            builder = builder.identity(reqwest::Identity::from_pem(pem)?);
        }

        Ok(builder.build()?)
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("client_identity", &self.identity_pem.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Multiplexer = ReqwestMultiplexer;

    fn open(&self, max_connections: usize) -> Result<ReqwestMultiplexer> {
        let clients = (0..max_connections.max(1))
            .map(|_| self.client(1))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(connections = clients.len(), "Opened multiplexer");

        Ok(ReqwestMultiplexer {
            clients,
            next_client: 0,
            running: FuturesUnordered::new(),
            completed: VecDeque::new(),
            live: HashSet::new(),
            open: true,
        })
    }

    #[tracing::instrument(skip(self, request), fields(correlation_key = %request.correlation_key, url = %request.url))]
    async fn send(&self, request: RequestDescriptor) -> SingleOutcome {
        // Dropped at the end of this call, taking its only connection with it.
        let client = match self.client(0) {
            Ok(client) => client,
            Err(e) => {
                return SingleOutcome {
                    status: 0,
                    raw: String::new(),
                    error: Some(TransportFailure {
                        kind: TransportErrorKind::Other,
                        message: e.to_string(),
                    }),
                }
            }
        };

        execute(client, request).await
    }
}

/// Multiplexing context over a fixed set of reqwest clients.
pub struct ReqwestMultiplexer {
    clients: Vec<reqwest::Client>,
    next_client: usize,
    running: FuturesUnordered<BoxFuture<'static, Completion>>,
    completed: VecDeque<Completion>,
    live: HashSet<HandleId>,
    open: bool,
}

impl ReqwestMultiplexer {
    /// Number of connections this context may open.
    pub fn connections(&self) -> usize {
        self.clients.len()
    }

    fn accept(&mut self, completion: Completion) {
        // Completions of removed handles are discarded.
        if self.live.contains(&completion.handle) {
            self.completed.push_back(completion);
        }
    }
}

#[async_trait]
impl ConnectionMultiplexer for ReqwestMultiplexer {
    fn add(&mut self, handle: HandleId, request: RequestDescriptor) -> Result<()> {
        if !self.open {
            return Err(VolleyError::MultiplexerClosed);
        }

        let client = self
            .clients
            .get(self.next_client % self.clients.len())
            .cloned()
            .ok_or(VolleyError::MultiplexerClosed)?;
        self.next_client = self.next_client.wrapping_add(1);

        tracing::trace!(%handle, correlation_key = %request.correlation_key, "Adding request");

        self.live.insert(handle);
        self.running.push(
            async move {
                let outcome = execute(client, request).await;
                Completion {
                    handle,
                    status: outcome.status,
                    raw: outcome.raw,
                    error: outcome.error,
                }
            }
            .boxed(),
        );
        Ok(())
    }

    fn perform(&mut self) -> Result<usize> {
        if !self.open {
            return Err(VolleyError::MultiplexerFailure(
                "multiplexer context is closed".to_string(),
            ));
        }

        while let Some(Some(completion)) = self.running.next().now_or_never() {
            self.accept(completion);
        }

        Ok(self.running.len())
    }

    async fn wait(&mut self, timeout: Duration) -> Result<usize> {
        if !self.open {
            return Err(VolleyError::MultiplexerFailure(
                "multiplexer context is closed".to_string(),
            ));
        }
        if !self.completed.is_empty() || self.running.is_empty() {
            return Ok(self.completed.len());
        }

        match tokio::time::timeout(timeout, self.running.next()).await {
            Ok(Some(completion)) => {
                self.accept(completion);
                Ok(1)
            }
            Ok(None) | Err(_) => Ok(0),
        }
    }

    fn next_completed(&mut self) -> Option<Completion> {
        self.completed.pop_front()
    }

    fn remove(&mut self, handle: HandleId) {
        if self.live.remove(&handle) {
            tracing::trace!(%handle, "Removed request");
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }

        // Dropping the futures cancels their requests; dropping the clients
        // closes their connections.
        self.running = FuturesUnordered::new();
        self.completed.clear();
        self.live.clear();
        self.clients.clear();
        self.open = false;

        tracing::debug!("Closed multiplexer");
    }
}

impl Drop for ReqwestMultiplexer {
    fn drop(&mut self) {
        self.close();
    }
}

async fn execute(client: reqwest::Client, request: RequestDescriptor) -> SingleOutcome {
    let RequestDescriptor {
        method,
        url,
        headers,
        body,
        ..
    } = request;

    let response = match client
        .request(method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            return SingleOutcome {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                raw: String::new(),
                error: Some(failure(&e)),
            }
        }
    };

    let status = response.status().as_u16();
    let head = render_head(response.version(), response.status(), response.headers());

    match response.text().await {
        Ok(body) => SingleOutcome {
            status,
            raw: format!("{head}\r\n\r\n{body}"),
            error: None,
        },
        Err(e) => SingleOutcome {
            status,
            raw: head,
            error: Some(failure(&e)),
        },
    }
}

fn failure(error: &reqwest::Error) -> TransportFailure {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_redirect() {
        TransportErrorKind::Redirect
    } else if error.is_body() {
        TransportErrorKind::Body
    } else if error.is_decode() {
        TransportErrorKind::Decode
    } else if error.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    };

    TransportFailure {
        kind,
        message: error.to_string(),
    }
}

/// Render a status line and headers the way they appeared on the wire.
fn render_head(version: Version, status: StatusCode, headers: &HeaderMap) -> String {
    let version = if version == Version::HTTP_2 {
        "HTTP/2"
    } else if version == Version::HTTP_11 {
        "HTTP/1.1"
    } else if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else if version == Version::HTTP_3 {
        "HTTP/3"
    } else {
        "HTTP/0.9"
    };

    let mut head = format!("{version} {}", status.as_u16());
    for (name, value) in headers {
        head.push_str("\r\n");
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(&String::from_utf8_lossy(value.as_bytes()));
    }
    head
}
