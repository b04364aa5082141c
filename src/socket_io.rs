//! Protocol engine: keepalive, frame demultiplexing, request/response
//! correlation.
//!
//! [`SocketIo`] owns the live transport after the bootstrap handshake and
//! runs two background tasks for the connection's lifetime:
//!
//! ```text
//!   emit()/recv() callers          keepalive task        receive task
//!         │                             │                     │
//!         │ register pending record     │ "2" every interval  │ demux frames
//!         │ write "42[...]"             │ await pong signal   │ fulfil records
//!         │ await completion            │                     │ enqueue events
//!         ▼                             ▼                     ▼
//!               shared state: terminal error slot, registry,
//!               inbound event queue, pong signal
//! ```
//!
//! # Protocol
//!
//! Frame prefixes on the duplex text channel: `0` open info (ignored),
//! `1` close control (fatal), `2` ping (reply `3` + echoed suffix), `3`
//! pong (satisfies the keepalive wait), `4` event data (`40` connect ack,
//! `41` disconnect notice, `42` + JSON array `[name, payload...]`).
//!
//! The protocol has no correlation IDs. Response-seeking emits register a
//! predicate-matched pending record; inbound events are matched against
//! outstanding records in registration order (at most one record claims an
//! event) and are always also delivered through the inbound queue.
//!
//! The first failure — transport closure, ping timeout, or explicit close —
//! is written once into the terminal error slot and surfaces uniformly to
//! every blocked `recv`/`emit`.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SocketIoError;
use crate::handshake::{self, SocketConfig};
use crate::ws::Transport;

/// Inbound queue entry; `None` is the shutdown sentinel enqueued exactly
/// once when the terminal error is first set.
type QueueEntry = Option<(String, Value)>;

/// Outstanding response-seeking request.
struct PendingResponse {
    id: u64,
    matches: Box<dyn Fn(&str, &Value) -> bool + Send>,
    tx: oneshot::Sender<Result<Value, SocketIoError>>,
}

/// Registry of outstanding requests, matched FIFO per inbound event.
#[derive(Default)]
struct Registry {
    next_id: u64,
    pending: Vec<PendingResponse>,
}

impl Registry {
    fn remove(&mut self, id: u64) {
        self.pending.retain(|r| r.id != id);
    }
}

/// State shared between the engine handle and its background tasks.
struct Shared {
    /// Terminal error slot: single-assignment, never cleared once set.
    error: StdMutex<Option<SocketIoError>>,
    registry: StdMutex<Registry>,
    events_tx: mpsc::UnboundedSender<QueueEntry>,
    /// Signalled by the receive task when a pong frame arrives.
    pong: Notify,
}

impl Shared {
    /// First-writer-wins terminal error assignment.
    ///
    /// The first transition also enqueues the queue sentinel (best-effort).
    fn set_error(&self, err: SocketIoError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            log::debug!("[SocketIo] Error already set, ignoring: {err}");
            return;
        }
        log::info!("[SocketIo] Set error: {err}");
        *slot = Some(err);
        drop(slot);
        let _ = self.events_tx.send(None);
    }

    fn error(&self) -> Option<SocketIoError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Live connection: transport + keepalive + receive/demux.
///
/// Created by [`SocketIo::connect`] (or [`SocketIo::new`] over an existing
/// transport, which tests use). All methods take `&self`; the engine is
/// shared behind an [`Arc`].
pub struct SocketIo {
    transport: Arc<dyn Transport>,
    config: SocketConfig,
    shared: Arc<Shared>,
    events_rx: Mutex<mpsc::UnboundedReceiver<QueueEntry>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    closing: AtomicBool,
    closed: AtomicBool,
    closed_notify: Notify,
}

impl std::fmt::Debug for SocketIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIo")
            .field("sid", &self.config.sid)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SocketIo {
    /// Build an engine over an already-upgraded transport and spawn the
    /// keepalive and receive tasks.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: SocketConfig) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            error: StdMutex::new(None),
            registry: StdMutex::new(Registry::default()),
            events_tx,
            pong: Notify::new(),
        });
        let cancel = CancellationToken::new();

        let ping_task = tokio::spawn(ping_loop(
            Arc::clone(&transport),
            Arc::clone(&shared),
            config.ping_interval,
            config.ping_timeout,
            cancel.child_token(),
        ));
        let recv_task = tokio::spawn(recv_loop(
            Arc::clone(&transport),
            Arc::clone(&shared),
            cancel.child_token(),
        ));

        Arc::new(Self {
            transport,
            config,
            shared,
            events_rx: Mutex::new(events_rx),
            tasks: Mutex::new(vec![ping_task, recv_task]),
            cancel,
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
        })
    }

    /// Bootstrap handshake (with retries) followed by engine construction.
    pub async fn connect(
        client: &reqwest::Client,
        url: &str,
        retry: u32,
        retry_delay: Duration,
    ) -> Result<Arc<Self>, SocketIoError> {
        let (transport, config) = handshake::connect(client, url, retry, retry_delay).await?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Keepalive configuration negotiated during the handshake.
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// The terminal error, if the connection has failed.
    #[must_use]
    pub fn error(&self) -> Option<SocketIoError> {
        self.shared.error()
    }

    /// Send an event without awaiting any response.
    pub async fn emit(&self, event: &str, data: Value) -> Result<(), SocketIoError> {
        if let Some(err) = self.shared.error() {
            return Err(err);
        }
        self.send_event(event, data).await
    }

    /// Send an event and await the first inbound event matching `matches`.
    ///
    /// The pending record is registered before the write so a fast response
    /// cannot slip past. `Ok(None)` means the timeout elapsed with no match —
    /// distinct from failure, and the record is removed so a later matching
    /// event cannot spuriously fulfil it. With no timeout the wait is
    /// unbounded (until matched or the connection dies).
    pub async fn emit_with_response<F>(
        &self,
        event: &str,
        data: Value,
        matches: F,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, SocketIoError>
    where
        F: Fn(&str, &Value) -> bool + Send + 'static,
    {
        if let Some(err) = self.shared.error() {
            return Err(err);
        }

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut registry = self
                .shared
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let id = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            registry.pending.push(PendingResponse {
                id,
                matches: Box::new(matches),
                tx,
            });
            id
        };

        if let Err(e) = self.send_event(event, data).await {
            self.remove_pending(id);
            return Err(e);
        }

        let completed = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(completed) => completed,
                Err(_) => {
                    log::debug!("[SocketIo] Response timeout for \"{event}\"");
                    self.remove_pending(id);
                    return Ok(None);
                }
            },
            None => rx.await,
        };

        match completed {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(err)) => Err(err),
            // Sender dropped without completing -- the engine is gone.
            Err(_) => Err(self.shared.error().unwrap_or(SocketIoError::Closed)),
        }
    }

    /// Receive the next inbound event.
    ///
    /// Fails with the terminal error once it is set, or when the shutdown
    /// sentinel is dequeued.
    pub async fn recv(&self) -> Result<(String, Value), SocketIoError> {
        if let Some(err) = self.shared.error() {
            return Err(err);
        }
        let mut rx = self.events_rx.lock().await;
        match rx.recv().await {
            Some(Some(event)) => Ok(event),
            Some(None) | None => Err(self
                .shared
                .error()
                .unwrap_or(SocketIoError::ConnectionClosed(None))),
        }
    }

    /// Close the connection.
    ///
    /// Idempotent; concurrent callers collapse into one execution — one
    /// caller tears down, the rest await the closed signal. Sets the
    /// terminal error to explicit-close if unset, cancels and joins both
    /// tasks, closes the transport, drains the queue, and fails all
    /// outstanding pending records with the terminal error.
    pub async fn close(&self) {
        if self.closed.load(Ordering::SeqCst) {
            log::debug!("[SocketIo] Already closed");
            return;
        }
        if self.closing.swap(true, Ordering::SeqCst) {
            log::debug!("[SocketIo] Already closing, waiting");
            let notified = self.closed_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
            return;
        }

        log::info!("[SocketIo] Close");
        self.shared.set_error(SocketIoError::Closed);

        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            let _ = task.await;
        }

        self.transport.close().await;

        {
            let mut rx = self.events_rx.lock().await;
            while rx.try_recv().is_ok() {}
        }

        let err = self.shared.error().unwrap_or(SocketIoError::Closed);
        let pending = {
            let mut registry = self
                .shared
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut registry.pending)
        };
        for record in pending {
            let _ = record.tx.send(Err(err.clone()));
        }

        self.closed.store(true, Ordering::SeqCst);
        self.closed_notify.notify_waiters();
    }

    /// Frame and write `42[event, data]`.
    async fn send_event(&self, event: &str, data: Value) -> Result<(), SocketIoError> {
        let payload = serde_json::to_string(&serde_json::json!([event, data]))
            .map_err(|e| SocketIoError::Protocol(format!("encode failed: {e}")))?;
        let frame = format!("42{payload}");
        log::debug!("[SocketIo] Emit {frame}");
        self.transport
            .send(&frame)
            .await
            .map_err(|e| SocketIoError::Protocol(e.0))
    }

    fn remove_pending(&self, id: u64) {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

/// Keepalive task.
///
/// Sleeps `ping_interval` minus the last measured round trip, sends `2`,
/// and waits up to `ping_timeout` for the receive task's pong signal.
/// A missed pong sets the ping-timeout error; a write failure sets
/// connection-closed; cancellation exits silently.
async fn ping_loop(
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    ping_interval: Duration,
    ping_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut last_round_trip = Duration::ZERO;
    loop {
        if shared.error().is_some() {
            return;
        }

        let delay = ping_interval.saturating_sub(last_round_trip);
        tokio::select! {
            () = cancel.cancelled() => {
                log::debug!("[SocketIo] Ping cancelled");
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }

        // Register pong interest before the write so a fast reply cannot
        // race the wait.
        let pong = shared.pong.notified();
        tokio::pin!(pong);
        pong.as_mut().enable();

        log::debug!("[SocketIo] Ping");
        let started = tokio::time::Instant::now();
        if let Err(e) = transport.send("2").await {
            log::error!("[SocketIo] Ping send error: {e}");
            shared.set_error(SocketIoError::ConnectionClosed(Some(e.0)));
            return;
        }

        tokio::select! {
            () = cancel.cancelled() => {
                log::debug!("[SocketIo] Ping cancelled");
                return;
            }
            result = tokio::time::timeout(ping_timeout, pong) => {
                match result {
                    Ok(()) => last_round_trip = started.elapsed(),
                    Err(_) => {
                        log::error!("[SocketIo] Ping timeout");
                        shared.set_error(SocketIoError::PingTimeout);
                        return;
                    }
                }
            }
        }
    }
}

/// Receive/demux task.
///
/// Reads frames until the terminal error is set, replying to pings,
/// signalling pongs, and turning event-data frames into queue entries.
/// Transport failure and cancellation both set connection-closed.
async fn recv_loop(transport: Arc<dyn Transport>, shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        if shared.error().is_some() {
            return;
        }

        let frame = tokio::select! {
            () = cancel.cancelled() => {
                log::debug!("[SocketIo] Recv cancelled");
                shared.set_error(SocketIoError::ConnectionClosed(None));
                return;
            }
            frame = transport.recv() => frame,
        };

        match frame {
            Ok(Some(data)) => {
                if handle_frame(&transport, &shared, &data).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                log::info!("[SocketIo] Transport closed");
                shared.set_error(SocketIoError::ConnectionClosed(None));
                return;
            }
            Err(e) => {
                log::error!("[SocketIo] Recv error: {e}");
                shared.set_error(SocketIoError::ConnectionClosed(Some(e.0)));
                return;
            }
        }
    }
}

/// Classify and process one inbound frame. `Err(())` stops the receive loop
/// (the terminal error has been set).
async fn handle_frame(
    transport: &Arc<dyn Transport>,
    shared: &Arc<Shared>,
    data: &str,
) -> Result<(), ()> {
    log::trace!("[SocketIo] Recv {data}");
    if let Some(suffix) = data.strip_prefix('0') {
        // Open info -- probing happened before the upgrade completed.
        log::debug!("[SocketIo] Open info: {suffix}");
    } else if data.starts_with('1') {
        log::info!("[SocketIo] Close control frame");
        shared.set_error(SocketIoError::ConnectionClosed(Some("close frame".into())));
        return Err(());
    } else if let Some(suffix) = data.strip_prefix('2') {
        log::debug!("[SocketIo] Ping {suffix}");
        if let Err(e) = transport.send(&format!("3{suffix}")).await {
            log::error!("[SocketIo] Pong send error: {e}");
            shared.set_error(SocketIoError::ConnectionClosed(Some(e.0)));
            return Err(());
        }
    } else if let Some(suffix) = data.strip_prefix('3') {
        log::debug!("[SocketIo] Pong {suffix}");
        shared.pong.notify_waiters();
    } else if let Some(rest) = data.strip_prefix('4') {
        handle_event_data(shared, rest);
    } else {
        log::warn!("[SocketIo] Unknown frame: \"{data}\"");
    }
    Ok(())
}

/// Process the suffix of an event-data (`4`) frame.
fn handle_event_data(shared: &Arc<Shared>, rest: &str) {
    if rest.starts_with('0') {
        // Connect ack carries no event.
        log::debug!("[SocketIo] Connect ack");
    } else if rest.starts_with('1') {
        log::info!("[SocketIo] Disconnect notice");
        deliver_event(shared, "disconnect".to_string(), Value::Null);
    } else if let Some(payload) = rest.strip_prefix('2') {
        match parse_event(payload) {
            Ok((event, data)) => deliver_event(shared, event, data),
            Err(e) => log::error!("[SocketIo] Invalid event {payload}: {e}"),
        }
    } else {
        log::warn!("[SocketIo] Unknown event frame: \"4{rest}\"");
    }
}

/// Decode a `42` payload: non-empty JSON array, shape rule on length.
fn parse_event(payload: &str) -> Result<(String, Value), String> {
    let value: Value = serde_json::from_str(payload).map_err(|e| e.to_string())?;
    let Value::Array(mut items) = value else {
        return Err("not an array".into());
    };
    if items.is_empty() {
        return Err("empty array".into());
    }
    let name = match items.remove(0) {
        Value::String(name) => name,
        other => return Err(format!("event name is not a string: {other}")),
    };
    let data = match items.len() {
        0 => Value::Null,
        1 => items.remove(0),
        _ => Value::Array(items),
    };
    Ok((name, data))
}

/// Match an event against outstanding records (earliest registration wins,
/// at most one record claims it), then always enqueue it for `recv()`.
fn deliver_event(shared: &Arc<Shared>, event: String, data: Value) {
    log::debug!("[SocketIo] Event {event}");
    {
        let mut registry = shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = registry
            .pending
            .iter()
            .position(|r| (r.matches)(&event, &data))
        {
            let record = registry.pending.remove(index);
            log::debug!("[SocketIo] Response {event} (record {})", record.id);
            let _ = record.tx.send(Ok(data.clone()));
        }
    }
    let _ = shared.events_tx.send(Some((event, data)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_single_element() {
        let (event, data) = parse_event("[\"usercount\"]").expect("valid");
        assert_eq!(event, "usercount");
        assert_eq!(data, Value::Null);
    }

    #[test]
    fn test_parse_event_two_elements() {
        let (event, data) = parse_event("[\"chatMsg\",{\"msg\":\"hi\"}]").expect("valid");
        assert_eq!(event, "chatMsg");
        assert_eq!(data["msg"], "hi");
    }

    #[test]
    fn test_parse_event_extra_elements_collect_into_array() {
        let (event, data) = parse_event("[\"foo\",1,2,3]").expect("valid");
        assert_eq!(event, "foo");
        assert_eq!(data, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_parse_event_rejects_non_array() {
        assert!(parse_event("{\"a\":1}").is_err());
        assert!(parse_event("[]").is_err());
        assert!(parse_event("not json").is_err());
        assert!(parse_event("[42]").is_err());
    }
}
