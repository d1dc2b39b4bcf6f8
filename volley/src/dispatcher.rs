//! Sliding-window dispatch of notification batches.
//!
//! ```text
//! push(batch)
//!   ├─ open multiplexer (lazily, capped at max_connections)
//!   ├─ fill window: pending ──build+auth──► multiplexer.add()   (≤ concurrency_window)
//!   └─ loop until pending and in-flight are empty:
//!        ├─ multiplexer.perform()                 // non-blocking drive
//!        ├─ harvest: next_completed()
//!        │    ├─ in-flight map: handle → correlation key
//!        │    ├─ parse_response()
//!        │    ├─ multiplexer.remove(handle)
//!        │    └─ refill the freed slot from pending
//!        └─ nothing harvested? wait(poll_timeout), else sleep(idle_backoff)
//! ```
//!
//! Everything runs on the calling task. Concurrency comes from the
//! multiplexer carrying many requests over few connections, not from
//! spawning.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::AuthProvider;
use crate::error::{Result, VolleyError};
use crate::parser::parse_response;
use crate::request::{RequestDescriptor, RequestFactory};
use crate::transport::{ConnectionMultiplexer, Transport};
use crate::types::{Environment, HandleId, Notification, Response};

/// What happens to unanswered notifications when the multiplexer fails as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop immediately; pending and in-flight notifications get no response.
    #[default]
    Truncate,
    /// Stop immediately, but answer every unanswered notification with status 0.
    Degrade,
}

/// Configuration for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Gateway the requests are addressed to
    #[serde(skip)]
    pub environment: Environment,

    /// Maximum number of requests in flight at once
    pub concurrency_window: usize,

    /// Maximum number of connections to the gateway host
    pub max_connections: usize,

    /// Close the multiplexer after every batch
    pub auto_close: bool,

    /// Upper bound on a single readiness wait
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Sleep used when a readiness wait reports nothing
    #[serde(with = "humantime_serde")]
    pub idle_backoff: Duration,

    pub on_failure: FailurePolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            concurrency_window: 20,
            max_connections: 1,
            auto_close: true,
            poll_timeout: Duration::from_secs(1),
            idle_backoff: Duration::from_micros(250),
            on_failure: FailurePolicy::Truncate,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_window == 0 {
            return Err(VolleyError::InvalidConfig(
                "concurrency_window must be at least 1".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(VolleyError::InvalidConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.poll_timeout.is_zero() {
            return Err(VolleyError::InvalidConfig(
                "poll_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-call bookkeeping for one `push`.
struct DispatchState {
    pending: VecDeque<Notification>,
    in_flight: HashMap<HandleId, String>,
    responses: Vec<Response>,
    next_handle: u64,
}

impl DispatchState {
    fn new(notifications: Vec<Notification>) -> Self {
        let capacity = notifications.len();
        Self {
            pending: notifications.into(),
            in_flight: HashMap::new(),
            responses: Vec::with_capacity(capacity),
            next_handle: 0,
        }
    }

    fn next_handle(&mut self) -> HandleId {
        self.next_handle += 1;
        HandleId::new(self.next_handle)
    }

    fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    fn pending_keys(&self) -> Vec<&str> {
        self.pending.iter().map(Notification::correlation_key).collect()
    }
}

/// Dispatches notifications through a multiplexed transport.
///
/// The multiplexer is opened on the first `push` and either closed after each
/// batch (`auto_close`) or kept for the next one. Methods that touch it take
/// `&mut self`; share a dispatcher between tasks behind a lock.
pub struct Dispatcher<T>
where
    T: Transport,
{
    transport: T,
    factory: Arc<dyn RequestFactory>,
    auth: Arc<dyn AuthProvider>,
    config: DispatcherConfig,
    multiplexer: Option<T::Multiplexer>,
}

impl<T> Dispatcher<T>
where
    T: Transport,
{
    /// Create a new dispatcher.
    pub fn new(
        transport: T,
        factory: Arc<dyn RequestFactory>,
        auth: Arc<dyn AuthProvider>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            transport,
            factory,
            auth,
            config,
            multiplexer: None,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Whether a multiplexer context is currently open.
    pub fn is_open(&self) -> bool {
        self.multiplexer.is_some()
    }

    /// Set the maximum number of in-flight requests for subsequent pushes.
    pub fn set_concurrency_window(&mut self, window: NonZeroUsize) {
        self.config.concurrency_window = window.get();
    }

    /// Set the maximum number of connections to the gateway.
    ///
    /// An open multiplexer is closed so the next push opens one with the new cap.
    pub fn set_max_connections(&mut self, max_connections: NonZeroUsize) {
        if self.config.max_connections != max_connections.get() {
            self.config.max_connections = max_connections.get();
            self.close();
        }
    }

    pub fn set_auto_close(&mut self, auto_close: bool) {
        self.config.auto_close = auto_close;
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.config.on_failure = policy;
    }

    /// Release the multiplexer, if one is open. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut multiplexer) = self.multiplexer.take() {
            multiplexer.close();
            tracing::debug!("Dispatcher closed multiplexer");
        }
    }

    fn window(&self) -> Window<'_> {
        Window {
            factory: self.factory.as_ref(),
            auth: self.auth.as_ref(),
            config: &self.config,
        }
    }

    /// Push a batch of notifications.
    ///
    /// Returns one response per notification in completion order; match them
    /// up by [`Response::correlation_key`]. Notifications that cannot be built,
    /// authenticated or submitted are answered with status 0. If the
    /// multiplexer fails as a whole, the batch stops and unanswered
    /// notifications are handled according to [`FailurePolicy`].
    ///
    /// # Errors
    /// Only if the multiplexer context cannot be opened.
    #[tracing::instrument(skip_all, fields(batch_size = notifications.len()))]
    pub async fn push(&mut self, notifications: Vec<Notification>) -> Result<Vec<Response>> {
        if notifications.is_empty() {
            return Ok(Vec::new());
        }

        let mut multiplexer = match self.multiplexer.take() {
            Some(multiplexer) => multiplexer,
            None => self.transport.open(self.config.max_connections)?,
        };

        let mut state = DispatchState::new(notifications);
        let window = self.window();
        let outcome = window.run(&mut multiplexer, &mut state).await;

        match outcome {
            Ok(()) if !self.config.auto_close => {
                self.multiplexer = Some(multiplexer);
            }
            Ok(()) => multiplexer.close(),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    pending = state.pending.len(),
                    in_flight = state.in_flight.len(),
                    answered = state.responses.len(),
                    "Multiplexer failed, aborting batch"
                );
                // A failed context is never reused.
                multiplexer.close();
                if self.config.on_failure == FailurePolicy::Degrade {
                    let unanswered = state
                        .in_flight
                        .drain()
                        .map(|(_, key)| key)
                        .chain(state.pending.drain(..).map(|n| n.device_token));
                    state
                        .responses
                        .extend(unanswered.map(Response::undetermined));
                }
            }
        }

        tracing::debug!(responses = state.responses.len(), "Batch finished");
        Ok(state.responses)
    }

    /// Push one notification over a transient, non-multiplexed connection.
    ///
    /// Always returns a response; transport errors are logged and yield
    /// whatever status the transport reported, possibly 0.
    #[tracing::instrument(skip_all, fields(correlation_key = %notification.device_token))]
    pub async fn push_one(&mut self, notification: Notification) -> Response {
        let key = notification.correlation_key().to_string();

        let request = match self.window().prepare(&notification) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(correlation_key = %key, error = %e, "Failed to build notification");
                return Response::undetermined(key);
            }
        };

        let outcome = self.transport.send(request).await;

        if let Some(failure) = &outcome.error {
            tracing::error!(
                correlation_key = %key,
                error_code = failure.kind.code(),
                error = %failure.message,
                status = outcome.status,
                payload = %notification.payload,
                "Transport error while pushing notification"
            );
        }

        parse_response(&outcome.raw, outcome.status, key)
    }
}

/// The parts of a dispatcher the sliding-window loop needs.
struct Window<'a> {
    factory: &'a dyn RequestFactory,
    auth: &'a dyn AuthProvider,
    config: &'a DispatcherConfig,
}

impl Window<'_> {
    fn prepare(&self, notification: &Notification) -> Result<RequestDescriptor> {
        let mut request = self.factory.build(notification, self.config.environment)?;
        self.auth.authenticate(&mut request)?;
        Ok(request)
    }

    async fn run<M: ConnectionMultiplexer>(
        &self,
        multiplexer: &mut M,
        state: &mut DispatchState,
    ) -> Result<()> {
        loop {
            self.fill(multiplexer, state);
            if state.is_drained() {
                return Ok(());
            }

            let running = multiplexer.perform()?;
            let harvested = self.harvest(multiplexer, state);

            tracing::trace!(
                running,
                harvested,
                in_flight = state.in_flight.len(),
                pending = state.pending.len(),
                "Drove multiplexer"
            );

            if harvested == 0 && !state.in_flight.is_empty() {
                let ready = multiplexer.wait(self.config.poll_timeout).await?;
                if ready == 0 {
                    tokio::time::sleep(self.config.idle_backoff).await;
                }
            }
        }
    }

    /// Submit pending notifications until the window is full.
    fn fill<M: ConnectionMultiplexer>(&self, multiplexer: &mut M, state: &mut DispatchState) {
        while state.in_flight.len() < self.config.concurrency_window {
            let Some(notification) = state.pending.pop_front() else {
                break;
            };
            self.submit(multiplexer, state, notification);
        }
    }

    fn submit<M: ConnectionMultiplexer>(
        &self,
        multiplexer: &mut M,
        state: &mut DispatchState,
        notification: Notification,
    ) {
        let key = notification.correlation_key().to_string();

        let submitted = self.prepare(&notification).and_then(|request| {
            let handle = state.next_handle();
            multiplexer.add(handle, request).map(|()| handle)
        });

        match submitted {
            Ok(handle) => {
                tracing::trace!(%handle, correlation_key = %key, "Submitted notification");
                state.in_flight.insert(handle, key);
            }
            Err(e) => {
                tracing::warn!(
                    correlation_key = %key,
                    error = %e,
                    "Failed to submit notification"
                );
                state.responses.push(Response::undetermined(key));
            }
        }
    }

    /// Collect every completion available now, refilling as slots free up.
    fn harvest<M: ConnectionMultiplexer>(
        &self,
        multiplexer: &mut M,
        state: &mut DispatchState,
    ) -> usize {
        let mut harvested = 0;

        while let Some(completion) = multiplexer.next_completed() {
            multiplexer.remove(completion.handle);

            let Some(key) = state.in_flight.remove(&completion.handle) else {
                tracing::warn!(handle = %completion.handle, "Completion for unknown handle");
                continue;
            };

            let response = parse_response(&completion.raw, completion.status, key);
            if response.is_undetermined() {
                tracing::warn!(
                    correlation_key = %response.correlation_key,
                    raw = %completion.raw,
                    error_code = completion.error.as_ref().map(|e| e.kind.code()),
                    error = completion.error.as_ref().map(|e| e.message.as_str()),
                    pending = ?state.pending_keys(),
                    "Response status undetermined"
                );
            } else {
                tracing::debug!(
                    correlation_key = %response.correlation_key,
                    status = response.status,
                    "Notification answered"
                );
            }

            state.responses.push(response);
            harvested += 1;

            if let Some(notification) = state.pending.pop_front() {
                self.submit(multiplexer, state, notification);
            }
        }

        harvested
    }
}

impl<T> Drop for Dispatcher<T>
where
    T: Transport,
{
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuth;
    use crate::request::ApnsRequestFactory;
    use crate::transport::{MockEvent, MockOutcome, MockTransport, TransportErrorKind};
    use serde_json::json;
    use std::collections::HashSet;
    use tracing_test::traced_test;

    fn dispatcher(transport: MockTransport, config: DispatcherConfig) -> Dispatcher<MockTransport> {
        Dispatcher::new(
            transport,
            Arc::new(ApnsRequestFactory::new().with_default_topic("com.example.app")),
            Arc::new(NoAuth),
            config,
        )
    }

    fn notifications(keys: &[&str]) -> Vec<Notification> {
        keys.iter()
            .map(|key| Notification::new(*key, json!({"aps": {"alert": *key}})))
            .collect()
    }

    fn keys(responses: &[Response]) -> HashSet<String> {
        responses.iter().map(|r| r.correlation_key.clone()).collect()
    }

    fn set(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn window(n: usize) -> DispatcherConfig {
        DispatcherConfig {
            concurrency_window: n,
            ..DispatcherConfig::default()
        }
    }

    #[tokio::test]
    async fn test_batch_within_window_answers_every_key_once() {
        let transport = MockTransport::new();
        let mut dispatcher = dispatcher(transport.clone(), window(5));

        let responses = dispatcher
            .push(notifications(&["a1", "b2", "c3", "d4"]))
            .await
            .unwrap();

        assert_eq!(responses.len(), 4);
        assert_eq!(keys(&responses), set(&["a1", "b2", "c3", "d4"]));
        assert!(responses.iter().all(|r| r.status == 200));
    }

    #[tokio::test]
    async fn test_window_refills_after_first_completion() {
        let transport = MockTransport::new();
        let config = DispatcherConfig {
            concurrency_window: 2,
            max_connections: 1,
            ..DispatcherConfig::default()
        };
        let mut dispatcher = dispatcher(transport.clone(), config);

        let responses = dispatcher
            .push(notifications(&["first", "second", "third"]))
            .await
            .unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(keys(&responses), set(&["first", "second", "third"]));

        let events = transport.events();
        assert_eq!(events[0], MockEvent::Opened { max_connections: 1 });
        assert_eq!(events[1], MockEvent::Added("first".to_string()));
        assert_eq!(events[2], MockEvent::Added("second".to_string()));

        let third_added = events
            .iter()
            .position(|e| *e == MockEvent::Added("third".to_string()))
            .unwrap();
        let first_completed = events
            .iter()
            .position(|e| matches!(e, MockEvent::Completed(_)))
            .unwrap();
        assert!(third_added > first_completed);
        assert_eq!(transport.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_window() {
        let transport = MockTransport::new();
        for (i, key) in ["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8", "k9"]
            .iter()
            .enumerate()
        {
            transport.add_outcome(key, MockOutcome::ok(200, "").after_drives(1 + i % 4));
        }
        let mut dispatcher = dispatcher(transport.clone(), window(3));

        let responses = dispatcher
            .push(notifications(&[
                "k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8", "k9",
            ]))
            .await
            .unwrap();

        assert_eq!(responses.len(), 10);
        assert_eq!(transport.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_responses_arrive_in_completion_order() {
        let transport = MockTransport::new();
        transport.add_outcome("slow", MockOutcome::ok(200, "").after_drives(3));
        transport.add_outcome("fast", MockOutcome::ok(200, "").after_drives(1));
        let mut dispatcher = dispatcher(transport, DispatcherConfig::default());

        let responses = dispatcher
            .push(notifications(&["slow", "fast"]))
            .await
            .unwrap();

        let order: Vec<_> = responses.iter().map(|r| r.correlation_key.as_str()).collect();
        assert_eq!(order, vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn test_pending_queue_is_fifo() {
        let transport = MockTransport::new();
        let mut dispatcher = dispatcher(transport.clone(), window(1));

        dispatcher
            .push(notifications(&["one", "two", "three"]))
            .await
            .unwrap();

        let added: Vec<_> = transport
            .events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Added(key) => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_undetermined_status_is_logged() {
        let transport = MockTransport::new();
        transport.add_outcome("lost", MockOutcome::undetermined("garbled"));
        let mut dispatcher = dispatcher(transport, DispatcherConfig::default());

        let responses = dispatcher
            .push(notifications(&["lost", "fine"]))
            .await
            .unwrap();

        let lost = responses
            .iter()
            .find(|r| r.correlation_key == "lost")
            .unwrap();
        assert_eq!(lost.status, 0);
        assert_eq!(lost.headers, "garbled");
        assert_eq!(lost.body, "");
        assert!(logs_contain("Response status undetermined"));
        assert!(logs_contain("garbled"));
    }

    #[tokio::test]
    async fn test_gateway_errors_are_returned_verbatim() {
        let transport = MockTransport::new();
        transport.add_outcome("gone", MockOutcome::ok(410, r#"{"reason":"Unregistered"}"#));
        let mut dispatcher = dispatcher(transport, DispatcherConfig::default());

        let responses = dispatcher.push(notifications(&["gone"])).await.unwrap();

        assert_eq!(responses[0].status, 410);
        assert_eq!(responses[0].headers, "HTTP/2 410");
        assert_eq!(responses[0].reason().as_deref(), Some("Unregistered"));
    }

    #[tokio::test]
    async fn test_hard_failure_truncates_batch() {
        let transport = MockTransport::new();
        transport.add_outcome("stuck", MockOutcome::ok(200, "").after_drives(10));
        transport.fail_on_drive(1);
        let mut dispatcher = dispatcher(transport.clone(), DispatcherConfig::default());

        let responses = dispatcher.push(notifications(&["stuck"])).await.unwrap();

        assert!(responses.is_empty());
        assert_eq!(transport.close_count(), 1);
        assert!(!dispatcher.is_open());
    }

    #[tokio::test]
    async fn test_hard_failure_with_degrade_answers_everything() {
        let transport = MockTransport::new();
        transport.add_outcome("quick", MockOutcome::ok(200, ""));
        transport.add_outcome("stuck", MockOutcome::ok(200, "").after_drives(10));
        transport.fail_on_drive(2);
        let mut dispatcher = dispatcher(transport, window(2));
        dispatcher.set_failure_policy(FailurePolicy::Degrade);

        let responses = dispatcher
            .push(notifications(&["quick", "stuck", "waiting"]))
            .await
            .unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].correlation_key, "quick");
        assert_eq!(responses[0].status, 200);
        assert_eq!(keys(&responses[1..]), set(&["stuck", "waiting"]));
        assert!(responses[1..].iter().all(Response::is_undetermined));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_invalid_notification_degrades_without_aborting() {
        let transport = MockTransport::new();
        let mut dispatcher = dispatcher(transport.clone(), DispatcherConfig::default());

        let responses = dispatcher
            .push(notifications(&["good", "not/valid"]))
            .await
            .unwrap();

        assert_eq!(responses.len(), 2);
        let invalid = responses
            .iter()
            .find(|r| r.correlation_key == "not/valid")
            .unwrap();
        assert!(invalid.is_undetermined());
        assert_eq!(transport.requests().len(), 1);
        assert!(logs_contain("Failed to submit notification"));
    }

    #[tokio::test]
    async fn test_auto_close_tears_down_after_each_batch() {
        let transport = MockTransport::new();
        let mut dispatcher = dispatcher(transport.clone(), DispatcherConfig::default());

        dispatcher.push(notifications(&["a"])).await.unwrap();
        dispatcher.push(notifications(&["b"])).await.unwrap();

        assert_eq!(transport.open_count(), 2);
        assert_eq!(transport.close_count(), 2);
        assert!(!dispatcher.is_open());
    }

    #[tokio::test]
    async fn test_multiplexer_is_reused_without_auto_close() {
        let transport = MockTransport::new();
        let mut dispatcher = dispatcher(transport.clone(), DispatcherConfig::default());
        dispatcher.set_auto_close(false);

        dispatcher.push(notifications(&["a"])).await.unwrap();
        dispatcher.push(notifications(&["b"])).await.unwrap();

        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.close_count(), 0);
        assert!(dispatcher.is_open());

        dispatcher.close();
        dispatcher.close();
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_without_context_is_noop() {
        let transport = MockTransport::new();
        let mut dispatcher = dispatcher(transport.clone(), DispatcherConfig::default());

        dispatcher.close();
        dispatcher.close();

        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn test_changing_connection_cap_reopens_context() {
        let transport = MockTransport::new();
        let mut dispatcher = dispatcher(transport.clone(), DispatcherConfig::default());
        dispatcher.set_auto_close(false);

        dispatcher.push(notifications(&["a"])).await.unwrap();
        dispatcher.set_max_connections(NonZeroUsize::new(4).unwrap());
        dispatcher.push(notifications(&["b"])).await.unwrap();

        assert_eq!(
            transport.events()[..2],
            [
                MockEvent::Opened { max_connections: 1 },
                MockEvent::Added("a".to_string()),
            ]
        );
        assert!(transport
            .events()
            .contains(&MockEvent::Opened { max_connections: 4 }));
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_opens_nothing() {
        let transport = MockTransport::new();
        let mut dispatcher = dispatcher(transport.clone(), DispatcherConfig::default());

        assert!(dispatcher.push(Vec::new()).await.unwrap().is_empty());
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_push_one_returns_parsed_response() {
        let transport = MockTransport::new();
        transport.add_outcome("solo", MockOutcome::ok(200, "{\"ok\":true}"));
        let mut dispatcher = dispatcher(transport.clone(), DispatcherConfig::default());

        let response = dispatcher.push_one(Notification::new("solo", json!({}))).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.headers, "HTTP/2 200");
        assert_eq!(response.body, "{\"ok\":true}");
        assert_eq!(transport.events(), vec![MockEvent::Sent("solo".to_string())]);
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_push_one_transport_error_is_logged() {
        let transport = MockTransport::new();
        transport.add_outcome(
            "solo",
            MockOutcome::transport_error(TransportErrorKind::Connect, "connection refused"),
        );
        let mut dispatcher = dispatcher(transport, DispatcherConfig::default());

        let response = dispatcher
            .push_one(Notification::new("solo", json!({"aps": {"badge": 3}})))
            .await;

        assert_eq!(response.status, 0);
        assert_eq!(response.correlation_key, "solo");
        assert!(logs_contain("Transport error while pushing notification"));
        assert!(logs_contain("error_code"));
        assert!(logs_contain("connect"));
        assert!(logs_contain("badge"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_push_one_body_error_keeps_status_and_headers() {
        let transport = MockTransport::new();
        transport.add_outcome(
            "partial",
            MockOutcome::body_error(
                200,
                "HTTP/2 200\r\napns-id: 7C1A2F4E",
                TransportErrorKind::Body,
                "stream reset",
            ),
        );
        let mut dispatcher = dispatcher(transport, DispatcherConfig::default());

        let response = dispatcher
            .push_one(Notification::new("partial", json!({"aps": {"badge": 1}})))
            .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.headers, "HTTP/2 200\r\napns-id: 7C1A2F4E");
        assert_eq!(response.body, "");
        assert_eq!(response.apns_id(), Some("7C1A2F4E"));
        assert!(logs_contain("Transport error while pushing notification"));
        assert!(logs_contain("error_code"));
        assert!(logs_contain("body"));
        assert!(logs_contain("stream reset"));
    }

    #[test]
    fn test_config_validation() {
        assert!(DispatcherConfig::default().validate().is_ok());
        assert!(window(0).validate().is_err());
        assert!(DispatcherConfig {
            max_connections: 0,
            ..DispatcherConfig::default()
        }
        .validate()
        .is_err());
    }
}
