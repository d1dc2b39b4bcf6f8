//! Scripted transport for testing the dispatcher without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    Completion, ConnectionMultiplexer, SingleOutcome, Transport, TransportErrorKind,
    TransportFailure,
};
use crate::error::{Result, VolleyError};
use crate::request::RequestDescriptor;
use crate::types::HandleId;

/// Predetermined outcome for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockOutcome {
    pub status: u16,
    pub raw: String,
    pub error: Option<TransportFailure>,
    /// Number of `perform` calls before the request completes
    pub drives: usize,
}

impl MockOutcome {
    /// A response with `status` and `body` and no headers.
    pub fn ok(status: u16, body: &str) -> Self {
        Self {
            status,
            raw: format!("HTTP/2 {status}\r\n\r\n{body}"),
            error: None,
            drives: 1,
        }
    }

    /// A completion for which the transport reports no status.
    pub fn undetermined(raw: &str) -> Self {
        Self {
            status: 0,
            raw: raw.to_string(),
            error: None,
            drives: 1,
        }
    }

    /// A connection-level failure.
    pub fn transport_error(kind: TransportErrorKind, message: &str) -> Self {
        Self {
            status: 0,
            raw: String::new(),
            error: Some(TransportFailure {
                kind,
                message: message.to_string(),
            }),
            drives: 1,
        }
    }

    /// A response whose status line and headers arrived but whose body could
    /// not be read; `raw` holds only the header block.
    pub fn body_error(status: u16, head: &str, kind: TransportErrorKind, message: &str) -> Self {
        Self {
            status,
            raw: head.to_string(),
            error: Some(TransportFailure {
                kind,
                message: message.to_string(),
            }),
            drives: 1,
        }
    }

    /// Complete only after `drives` calls to `perform`.
    pub fn after_drives(mut self, drives: usize) -> Self {
        self.drives = drives.max(1);
        self
    }
}

/// Something the mock observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Opened { max_connections: usize },
    Added(String),
    Completed(String),
    Sent(String),
    Closed,
}

#[derive(Default)]
struct MockState {
    outcomes: HashMap<String, VecDeque<MockOutcome>>,
    events: Vec<MockEvent>,
    requests: Vec<RequestDescriptor>,
    fail_on_drive: Option<usize>,
    drives: usize,
    max_in_flight: usize,
}

impl MockState {
    fn take_outcome(&mut self, key: &str) -> MockOutcome {
        self.outcomes
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| MockOutcome::ok(200, ""))
    }
}

/// Mock transport for testing.
///
/// Outcomes are scripted per correlation key and returned in FIFO order;
/// requests without a scripted outcome complete with status 200 on the next
/// drive.
///
/// # Example
/// ```
/// use volley::transport::{MockOutcome, MockTransport};
///
/// let transport = MockTransport::new();
/// transport.add_outcome("device1", MockOutcome::ok(410, r#"{"reason":"Unregistered"}"#));
/// transport.fail_on_drive(3);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next outcome for requests correlated by `key`.
    pub fn add_outcome(&self, key: &str, outcome: MockOutcome) {
        self.state
            .lock()
            .outcomes
            .entry(key.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Make the `drive`-th call to `perform` (counted across all contexts)
    /// report a non-recoverable failure.
    pub fn fail_on_drive(&self, drive: usize) {
        self.state.lock().fail_on_drive = Some(drive);
    }

    /// Everything observed so far, in order.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// Every request added or sent, in order.
    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.state.lock().requests.clone()
    }

    /// Highest number of requests simultaneously held by a context.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn open_count(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Opened { .. }))
    }

    pub fn close_count(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Closed))
    }

    fn count(&self, predicate: impl Fn(&MockEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Multiplexer = MockMultiplexer;

    fn open(&self, max_connections: usize) -> Result<MockMultiplexer> {
        self.state
            .lock()
            .events
            .push(MockEvent::Opened { max_connections });

        Ok(MockMultiplexer {
            state: self.state.clone(),
            running: Vec::new(),
            completed: VecDeque::new(),
            live: HashSet::new(),
            open: true,
        })
    }

    async fn send(&self, request: RequestDescriptor) -> SingleOutcome {
        let mut state = self.state.lock();
        let outcome = state.take_outcome(&request.correlation_key);
        state
            .events
            .push(MockEvent::Sent(request.correlation_key.clone()));
        state.requests.push(request);

        SingleOutcome {
            status: outcome.status,
            raw: outcome.raw,
            error: outcome.error,
        }
    }
}

/// Multiplexer returned by [`MockTransport::open`].
pub struct MockMultiplexer {
    state: Arc<Mutex<MockState>>,
    running: Vec<(HandleId, String, MockOutcome)>,
    completed: VecDeque<Completion>,
    live: HashSet<HandleId>,
    open: bool,
}

#[async_trait]
impl ConnectionMultiplexer for MockMultiplexer {
    fn add(&mut self, handle: HandleId, request: RequestDescriptor) -> Result<()> {
        if !self.open {
            return Err(VolleyError::MultiplexerClosed);
        }

        let key = request.correlation_key.clone();
        let mut state = self.state.lock();
        let outcome = state.take_outcome(&key);
        state.events.push(MockEvent::Added(key.clone()));
        state.requests.push(request);

        self.live.insert(handle);
        state.max_in_flight = state.max_in_flight.max(self.live.len());
        self.running.push((handle, key, outcome));
        Ok(())
    }

    fn perform(&mut self) -> Result<usize> {
        if !self.open {
            return Err(VolleyError::MultiplexerFailure(
                "multiplexer context is closed".to_string(),
            ));
        }

        let mut state = self.state.lock();
        state.drives += 1;
        if state.fail_on_drive.is_some_and(|n| state.drives >= n) {
            return Err(VolleyError::MultiplexerFailure(format!(
                "scripted failure on drive {}",
                state.drives
            )));
        }

        let mut still_running = Vec::with_capacity(self.running.len());
        for (handle, key, mut outcome) in self.running.drain(..) {
            outcome.drives -= 1;
            if outcome.drives > 0 {
                still_running.push((handle, key, outcome));
                continue;
            }
            state.events.push(MockEvent::Completed(key));
            self.completed.push_back(Completion {
                handle,
                status: outcome.status,
                raw: outcome.raw,
                error: outcome.error,
            });
        }
        self.running = still_running;

        Ok(self.running.len())
    }

    async fn wait(&mut self, _timeout: Duration) -> Result<usize> {
        if !self.open {
            return Err(VolleyError::MultiplexerFailure(
                "multiplexer context is closed".to_string(),
            ));
        }
        tokio::task::yield_now().await;
        Ok(self.completed.len())
    }

    fn next_completed(&mut self) -> Option<Completion> {
        self.completed.pop_front()
    }

    fn remove(&mut self, handle: HandleId) {
        self.live.remove(&handle);
        self.running.retain(|(h, _, _)| *h != handle);
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.running.clear();
        self.completed.clear();
        self.live.clear();
        self.state.lock().events.push(MockEvent::Closed);
    }
}

impl Drop for MockMultiplexer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ApnsRequestFactory, RequestFactory};
    use crate::types::{Environment, Notification};

    fn request(token: &str) -> RequestDescriptor {
        ApnsRequestFactory::new()
            .build(
                &Notification::new(token, serde_json::json!({})),
                Environment::Sandbox,
            )
            .unwrap()
    }

    #[test]
    fn test_scripted_outcomes_complete_after_drives() {
        let transport = MockTransport::new();
        transport.add_outcome("slow", MockOutcome::ok(200, "{}").after_drives(2));

        let mut mux = transport.open(1).unwrap();
        mux.add(HandleId::new(1), request("slow")).unwrap();
        mux.add(HandleId::new(2), request("fast")).unwrap();

        assert_eq!(mux.perform().unwrap(), 1);
        let first = mux.next_completed().unwrap();
        assert_eq!(first.handle, HandleId::new(2));
        assert!(mux.next_completed().is_none());

        assert_eq!(mux.perform().unwrap(), 0);
        let second = mux.next_completed().unwrap();
        assert_eq!(second.handle, HandleId::new(1));
        assert_eq!(second.raw, "HTTP/2 200\r\n\r\n{}");

        assert_eq!(transport.max_in_flight(), 2);
    }

    #[test]
    fn test_scripted_failure() {
        let transport = MockTransport::new();
        transport.fail_on_drive(2);

        let mut mux = transport.open(1).unwrap();
        assert!(mux.perform().is_ok());
        assert!(matches!(
            mux.perform(),
            Err(VolleyError::MultiplexerFailure(_))
        ));
    }

    #[test]
    fn test_close_is_recorded_once() {
        let transport = MockTransport::new();
        let mut mux = transport.open(2).unwrap();

        mux.close();
        mux.close();
        drop(mux);

        assert_eq!(
            transport.events(),
            vec![MockEvent::Opened { max_connections: 2 }, MockEvent::Closed]
        );
    }

    #[tokio::test]
    async fn test_send_uses_scripted_outcome() {
        let transport = MockTransport::new();
        transport.add_outcome(
            "abc",
            MockOutcome::transport_error(TransportErrorKind::Timeout, "timed out"),
        );

        let outcome = transport.send(request("abc")).await;

        assert_eq!(outcome.status, 0);
        assert_eq!(
            outcome.error.map(|e| e.kind),
            Some(TransportErrorKind::Timeout)
        );
        assert_eq!(transport.events(), vec![MockEvent::Sent("abc".to_string())]);
    }
}
