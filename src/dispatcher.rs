//! Per-event handler chains for the session layer.
//!
//! Handlers register under an explicit name per event; the name is the
//! handler's identity (re-adding a name is a no-op, removing a missing name
//! logs a warning). `trigger` invokes a chain in registration order and
//! stops at the first handler returning `true`.
//!
//! Handler failures are isolated: the chain aborts, the failure is logged
//! and re-dispatched once as a secondary `error` event. Two kinds always
//! propagate instead — [`CytubeError::Kicked`] and [`CytubeError::Login`] —
//! so a forced disconnect or an authentication failure unwinds through
//! `trigger` and the session run loop.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::CytubeError;

/// Outcome of one handler: `Ok(true)` stops the chain.
pub type HandlerResult = Result<bool, CytubeError>;

/// Boxed handler future; sync handlers just return a ready future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Event handler: receives the event name and payload.
pub type Handler = Arc<dyn Fn(String, Value) -> HandlerFuture + Send + Sync>;

#[derive(Clone)]
struct NamedHandler {
    name: String,
    handler: Handler,
}

/// Ordered, named handler chains keyed by event name.
///
/// Owned by one session instance; there is no process-wide handler state.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Mutex<HashMap<String, Vec<NamedHandler>>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventDispatcher")
            .field("events", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// How a handler chain finished.
enum ChainOutcome {
    /// Ran to completion (or stopped at a truthy stop).
    Done,
    /// A propagating failure (kick, login) — unwind to the caller.
    Propagate(CytubeError),
    /// An isolated failure — caller may re-dispatch as an `error` event.
    Failed(CytubeError),
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named handler to an event's chain.
    ///
    /// Insertion order is dispatch order. Re-adding an existing name is a
    /// no-op.
    pub fn on<F>(&self, event: &str, name: &str, handler: F)
    where
        F: Fn(String, Value) -> HandlerFuture + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let chain = handlers.entry(event.to_string()).or_default();
        if chain.iter().any(|h| h.name == name) {
            log::warn!("[Dispatcher] Handler exists: {event} {name}");
            return;
        }
        log::info!("[Dispatcher] On: {event} {name}");
        chain.push(NamedHandler {
            name: name.to_string(),
            handler: Arc::new(handler),
        });
    }

    /// Remove a named handler from an event's chain.
    ///
    /// Removing a missing handler logs a warning, never fails.
    pub fn off(&self, event: &str, name: &str) {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(chain) = handlers.get_mut(event) else {
            log::warn!("[Dispatcher] Handler not found: {event} {name}");
            return;
        };
        let before = chain.len();
        chain.retain(|h| h.name != name);
        if chain.len() == before {
            log::warn!("[Dispatcher] Handler not found: {event} {name}");
        } else {
            log::info!("[Dispatcher] Off: {event} {name}");
        }
    }

    /// Invoke an event's handler chain.
    ///
    /// Chains run in registration order and short-circuit at the first
    /// `Ok(true)`. A failing handler aborts the chain; kick/login failures
    /// propagate, anything else is logged and re-dispatched once as an
    /// `error` event carrying the original event, payload, and message.
    pub async fn trigger(&self, event: &str, data: Value) -> Result<(), CytubeError> {
        log::log!(event_log_level(event), "[Dispatcher] Trigger: {event}");
        match self.run_chain(event, &data).await {
            ChainOutcome::Done => Ok(()),
            ChainOutcome::Propagate(err) => Err(err),
            ChainOutcome::Failed(err) => {
                if event == "error" {
                    return Ok(());
                }
                let payload = serde_json::json!({
                    "event": event,
                    "data": data,
                    "error": err.to_string(),
                });
                match self.run_chain("error", &payload).await {
                    ChainOutcome::Propagate(err) => Err(err),
                    _ => Ok(()),
                }
            }
        }
    }

    async fn run_chain(&self, event: &str, data: &Value) -> ChainOutcome {
        let chain: Vec<NamedHandler> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            handlers.get(event).cloned().unwrap_or_default()
        };
        for entry in chain {
            match (entry.handler)(event.to_string(), data.clone()).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(err @ (CytubeError::Kicked(_) | CytubeError::Login(_))) => {
                    return ChainOutcome::Propagate(err);
                }
                Err(err) => {
                    log::error!("[Dispatcher] Handler {} on {event}: {err}", entry.name);
                    return ChainOutcome::Failed(err);
                }
            }
        }
        ChainOutcome::Done
    }
}

/// Busy state-mirror events log at debug, everything else at info.
fn event_log_level(event: &str) -> log::Level {
    match event {
        "mediaUpdate" | "channelCSSJS" | "emoteList" => log::Level::Debug,
        _ => log::Level::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record_handler(calls: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str, stop: bool) -> impl Fn(String, Value) -> HandlerFuture {
        let calls = Arc::clone(calls);
        move |_, _| {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                calls.lock().expect("calls lock").push(tag);
                Ok(stop)
            })
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("ev", "first", record_handler(&calls, "first", false));
        dispatcher.on("ev", "second", record_handler(&calls, "second", false));
        dispatcher.on("ev", "third", record_handler(&calls, "third", false));

        dispatcher.trigger("ev", Value::Null).await.expect("trigger");
        assert_eq!(*calls.lock().expect("calls lock"), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_truthy_stop_short_circuits() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("ev", "first", record_handler(&calls, "first", true));
        dispatcher.on("ev", "second", record_handler(&calls, "second", false));

        dispatcher.trigger("ev", Value::Null).await.expect("trigger");
        assert_eq!(*calls.lock().expect("calls lock"), vec!["first"]);
    }

    #[tokio::test]
    async fn test_re_adding_existing_name_is_noop() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let count = Arc::clone(&count);
            dispatcher.on("ev", "dup", move |_, _| {
                let count = Arc::clone(&count);
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(false)
                })
            });
        }

        dispatcher.trigger("ev", Value::Null).await.expect("trigger");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_removing_missing_handler_does_not_fail() {
        let dispatcher = EventDispatcher::new();
        dispatcher.off("ev", "missing");
        dispatcher.on("ev", "present", |_, _| Box::pin(async { Ok(false) }));
        dispatcher.off("ev", "present");
        dispatcher.off("ev", "present");
    }

    #[tokio::test]
    async fn test_handler_error_redispatches_as_error_event() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("ev", "boom", |_, _| {
            Box::pin(async { Err(CytubeError::Permission("nope".into())) })
        });
        dispatcher.on("ev", "after", record_handler(&calls, "after", false));
        {
            let calls = Arc::clone(&calls);
            dispatcher.on("error", "capture", move |_, data| {
                let calls = Arc::clone(&calls);
                Box::pin(async move {
                    assert_eq!(data["event"], "ev");
                    calls.lock().expect("calls lock").push("error");
                    Ok(false)
                })
            });
        }

        dispatcher.trigger("ev", Value::Null).await.expect("isolated");
        // The failing handler aborts the chain; only the error chain ran.
        assert_eq!(*calls.lock().expect("calls lock"), vec!["error"]);
    }

    #[tokio::test]
    async fn test_error_handler_failure_is_not_redispatched() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on("ev", "boom", |_, _| {
            Box::pin(async { Err(CytubeError::Channel("first".into())) })
        });
        dispatcher.on("error", "boom-again", |_, _| {
            Box::pin(async { Err(CytubeError::Channel("second".into())) })
        });

        // No recursion, no propagation.
        dispatcher.trigger("ev", Value::Null).await.expect("isolated");
    }

    #[tokio::test]
    async fn test_kicked_propagates() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on("kick", "kicked", |_, _| {
            Box::pin(async { Err(CytubeError::Kicked("bye".into())) })
        });

        let err = dispatcher
            .trigger("kick", Value::Null)
            .await
            .expect_err("propagates");
        assert!(matches!(err, CytubeError::Kicked(_)));
    }

    #[tokio::test]
    async fn test_login_error_propagates_from_error_chain() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on("ev", "boom", |_, _| {
            Box::pin(async { Err(CytubeError::Channel("oops".into())) })
        });
        dispatcher.on("error", "fatal", |_, _| {
            Box::pin(async { Err(CytubeError::Login("bad".into())) })
        });

        let err = dispatcher
            .trigger("ev", Value::Null)
            .await
            .expect_err("propagates");
        assert!(matches!(err, CytubeError::Login(_)));
    }
}
