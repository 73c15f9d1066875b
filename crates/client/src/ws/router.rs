//! Event bus: fans parsed frames out to subscribers keyed by [`EventKind`].

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jobfair_shared::{ConnectionStatus, EventBody, EventKind, InboundFrame, ServerEvent};
use serde_json::Value;

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Synthesized by the connection manager on open, close and give-up.
    Connection(ConnectionStatus),
    /// Synthesized by the connection manager on transport failures.
    Error { reason: String },
    /// The typed payload, delivered to the bucket of its own kind.
    Server(ServerEvent),
    /// The full original frame, `type` included, for wildcard observers.
    Message(Value),
    /// Re-publication of a `can_start` or `urgent: true` payload, with the
    /// urgent marker always set.
    Urgent(EventBody),
}

impl ClientEvent {
    /// The bucket this event is delivered to.
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Connection(_) => EventKind::Connection,
            ClientEvent::Error { .. } => EventKind::Error,
            ClientEvent::Server(event) => event.kind(),
            ClientEvent::Message(_) => EventKind::Message,
            ClientEvent::Urgent(_) => EventKind::Urgent,
        }
    }

    /// The notification envelope, when this event carries one.
    pub fn body(&self) -> Option<&EventBody> {
        match self {
            ClientEvent::Server(event) => event.body(),
            ClientEvent::Urgent(body) => Some(body),
            _ => None,
        }
    }
}

/// A subscriber callback. Identity (for [`EventRouter::off`]) is the `Arc`
/// allocation, so keep the clone you registered.
pub type Handler = Arc<dyn Fn(&ClientEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&ClientEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handler registry plus dispatch. Cheap to clone; clones share the registry.
///
/// The registry lives as long as any clone does and is untouched by
/// disconnects, so subscriptions survive reconnection.
#[derive(Clone, Default)]
pub struct EventRouter {
    handlers: Arc<Mutex<HashMap<EventKind, Vec<Handler>>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Handler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` under `kind`. Registering the same handler twice
    /// makes it fire twice.
    pub fn on(&self, kind: EventKind, handler: Handler) {
        self.registry().entry(kind).or_default().push(handler);
    }

    /// Remove the first registration of exactly `handler` under `kind`.
    /// Returns whether anything was removed.
    pub fn off(&self, kind: &EventKind, handler: &Handler) -> bool {
        let mut registry = self.registry();
        let Some(list) = registry.get_mut(kind) else {
            return false;
        };
        let Some(index) = list.iter().position(|h| Arc::ptr_eq(h, handler)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            registry.remove(kind);
        }
        true
    }

    pub fn handler_count(&self, kind: &EventKind) -> usize {
        self.registry().get(kind).map(Vec::len).unwrap_or(0)
    }

    /// Parse one text frame and dispatch it. Frames that are not JSON objects
    /// with a string `type` are logged and dropped; returns the kind of the
    /// dispatched frame.
    pub fn dispatch_text(&self, text: &str) -> Option<EventKind> {
        match InboundFrame::parse(text) {
            Ok(frame) => {
                let kind = frame.kind();
                self.dispatch(frame);
                Some(kind)
            }
            Err(e) => {
                crate::log_error!("WebSocket message parse error: {}", e);
                None
            }
        }
    }

    /// Deliver a parsed frame to its own bucket, then to the wildcard
    /// bucket, then (for urgent frames) to the urgent bucket.
    pub fn dispatch(&self, frame: InboundFrame) {
        let InboundFrame {
            event,
            raw,
            urgent,
            decode_error,
        } = frame;
        if let Some(reason) = decode_error {
            crate::log_warn!("WebSocket payload decoded loosely: {}", reason);
        }
        let urgent = urgent.then(|| urgent_body(&event, &raw));

        self.emit(&ClientEvent::Server(event));
        self.emit(&ClientEvent::Message(raw));
        if let Some(body) = urgent {
            self.emit(&ClientEvent::Urgent(body));
        }
    }

    /// Invoke every handler registered for the event's bucket, in
    /// registration order. Each handler is isolated: an error or a panic is
    /// logged and the next handler still runs.
    pub fn emit(&self, event: &ClientEvent) {
        let kind = event.kind();
        // Snapshot so handlers may call on/off without touching this loop.
        let snapshot: Vec<Handler> = match self.registry().get(&kind) {
            Some(list) => list.clone(),
            None => return,
        };

        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => crate::log_error!("WebSocket listener error on '{}': {:#}", kind, e),
                Err(panic) => crate::log_error!(
                    "WebSocket listener panicked on '{}': {}",
                    kind,
                    panic_message(panic.as_ref())
                ),
            }
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry();
        let mut counts: Vec<(String, usize)> = registry
            .iter()
            .map(|(kind, list)| (kind.to_string(), list.len()))
            .collect();
        counts.sort();
        f.debug_struct("EventRouter").field("handlers", &counts).finish()
    }
}

/// Body re-published to the urgent bucket, always carrying the marker.
fn urgent_body(event: &ServerEvent, raw: &Value) -> EventBody {
    let body = match event.body() {
        Some(body) => body.clone(),
        None => {
            let mut payload = raw.as_object().cloned().unwrap_or_default();
            payload.remove("type");
            EventBody::decode(payload).0
        }
    };
    body.marked_urgent()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records `(label, event)` for every call.
    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<(&'static str, ClientEvent)>>>);

    impl Log {
        fn recorder(&self, label: &'static str) -> Handler {
            let log = self.clone();
            handler(move |event| {
                log.0.lock().unwrap().push((label, event.clone()));
                Ok(())
            })
        }

        fn labels(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().iter().map(|(l, _)| *l).collect()
        }

        fn events(&self) -> Vec<(&'static str, ClientEvent)> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn dispatches_in_registration_order() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::QueueUpdate, log.recorder("first"));
        router.on(EventKind::QueueUpdate, log.recorder("second"));
        router.on(EventKind::StatusChange, log.recorder("other"));

        router.dispatch_text(r#"{"type":"queue_update","data":{"position":3}}"#);

        let events = log.events();
        assert_eq!(log.labels(), vec!["first", "second"]);
        for (_, event) in &events {
            let body = event.body().unwrap();
            assert_eq!(body.data.position, Some(3));
        }
    }

    #[test]
    fn wildcard_gets_full_frame() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::Message, log.recorder("any"));

        router.dispatch_text(r#"{"type":"queue_update","data":{"position":3}}"#);

        let events = log.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].1,
            ClientEvent::Message(json!({"type": "queue_update", "data": {"position": 3}}))
        );
    }

    #[test]
    fn can_start_is_republished_as_urgent() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::Urgent, log.recorder("urgent"));
        router.on(EventKind::CanStart, log.recorder("can_start"));

        router.dispatch_text(r#"{"type":"can_start","data":{"message":"Go!"}}"#);

        let events = log.events();
        assert_eq!(log.labels(), vec!["can_start", "urgent"]);
        match &events[1].1 {
            ClientEvent::Urgent(body) => {
                assert!(body.urgent);
                assert_eq!(body.message(), Some("Go!"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn flagged_notification_is_urgent_too() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::Urgent, log.recorder("urgent"));
        router.on(EventKind::Notification, log.recorder("notification"));

        router.dispatch_text(r#"{"type":"notification","urgent":true,"data":{"message":"hey"}}"#);
        router.dispatch_text(r#"{"type":"notification","data":{"message":"calm"}}"#);

        assert_eq!(log.labels(), vec!["notification", "urgent", "notification"]);
    }

    #[test]
    fn urgent_frame_with_flag_fires_urgent_bucket_twice() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::Urgent, log.recorder("urgent"));

        router.dispatch_text(r#"{"type":"urgent","urgent":true,"data":{}}"#);

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].1, ClientEvent::Server(ServerEvent::Urgent(_))));
        assert!(matches!(events[1].1, ClientEvent::Urgent(_)));
    }

    #[test]
    fn unknown_urgent_frame_keeps_extra_fields() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::Urgent, log.recorder("urgent"));
        router.on(EventKind::Other("flash".into()), log.recorder("flash"));

        router.dispatch_text(r#"{"type":"flash","urgent":true,"room":"B12"}"#);

        let events = log.events();
        assert_eq!(log.labels(), vec!["flash", "urgent"]);
        let body = events[1].1.body().unwrap();
        assert_eq!(body.extra.get("room"), Some(&json!("B12")));
    }

    #[test]
    fn wildcard_sees_frames_that_do_not_fit_the_model() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::Message, log.recorder("any"));
        router.on(EventKind::QueueUpdate, log.recorder("queue"));
        router.on(EventKind::Urgent, log.recorder("urgent"));

        let frames = [
            r#"{"type":"queue_update","data":{"position":-1}}"#,
            r#"{"type":"notification","data":null}"#,
            r#"{"type":"status_change","data":{"position":"3"}}"#,
            r#"{"type":"can_start","urgent":1,"data":{"message":"Go!"}}"#,
        ];
        let kinds: Vec<_> = frames.iter().map(|f| router.dispatch_text(f)).collect();

        assert_eq!(
            kinds,
            vec![
                Some(EventKind::QueueUpdate),
                Some(EventKind::Notification),
                Some(EventKind::StatusChange),
                Some(EventKind::CanStart),
            ]
        );
        assert_eq!(
            log.labels(),
            vec!["queue", "any", "any", "any", "any", "urgent"]
        );
        let events = log.events();
        match &events[5].1 {
            ClientEvent::Urgent(body) => assert_eq!(body.message(), Some("Go!")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            events[4].1,
            ClientEvent::Message(json!({"type": "can_start", "urgent": 1, "data": {"message": "Go!"}}))
        );
    }

    #[test]
    fn flagged_pong_reaches_urgent_bucket() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::Urgent, log.recorder("urgent"));
        router.on(EventKind::Pong, log.recorder("pong"));

        router.dispatch_text(r#"{"type":"pong","urgent":true,"ts":5}"#);

        assert_eq!(log.labels(), vec!["pong", "urgent"]);
        let events = log.events();
        let body = events[1].1.body().unwrap();
        assert!(body.urgent);
        assert_eq!(body.extra.get("ts"), Some(&json!(5)));
    }

    #[test]
    fn failing_handlers_are_isolated() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(
            EventKind::StatusChange,
            handler(|_| Err(anyhow::anyhow!("refetch failed"))),
        );
        router.on(EventKind::StatusChange, handler(|_| panic!("boom")));
        router.on(EventKind::StatusChange, log.recorder("survivor"));

        router.dispatch_text(r#"{"type":"status_change","data":{}}"#);
        router.dispatch_text(r#"{"type":"status_change","data":{}}"#);

        assert_eq!(log.labels(), vec!["survivor", "survivor"]);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let router = EventRouter::new();
        let log = Log::default();
        let a = log.recorder("a");
        let b = log.recorder("b");
        router.on(EventKind::QueueUpdate, a.clone());
        router.on(EventKind::QueueUpdate, b);
        router.on(EventKind::StatusChange, a.clone());

        assert!(router.off(&EventKind::QueueUpdate, &a));
        router.dispatch_text(r#"{"type":"queue_update"}"#);
        router.dispatch_text(r#"{"type":"status_change"}"#);

        assert_eq!(log.labels(), vec!["b", "a"]);
    }

    #[test]
    fn off_is_a_noop_for_unknown_entries() {
        let router = EventRouter::new();
        let stray = handler(|_| Ok(()));
        assert!(!router.off(&EventKind::Pong, &stray));

        router.on(EventKind::Pong, handler(|_| Ok(())));
        assert!(!router.off(&EventKind::Pong, &stray));
        assert_eq!(router.handler_count(&EventKind::Pong), 1);
    }

    #[test]
    fn duplicate_registration_fires_twice_and_unregisters_once() {
        let router = EventRouter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = {
            let calls = calls.clone();
            handler(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        router.on(EventKind::Pong, counter.clone());
        router.on(EventKind::Pong, counter.clone());

        router.dispatch_text(r#"{"type":"pong"}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        router.off(&EventKind::Pong, &counter);
        router.dispatch_text(r#"{"type":"pong"}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn handler_can_unsubscribe_itself_mid_dispatch() {
        let router = EventRouter::new();
        let log = Log::default();
        let slot: Arc<Mutex<Option<Handler>>> = Arc::default();

        let once = {
            let router = router.clone();
            let slot = slot.clone();
            let log = log.clone();
            handler(move |event| {
                log.0.lock().unwrap().push(("once", event.clone()));
                if let Some(me) = slot.lock().unwrap().take() {
                    router.off(&EventKind::QueueUpdate, &me);
                }
                Ok(())
            })
        };
        *slot.lock().unwrap() = Some(once.clone());
        router.on(EventKind::QueueUpdate, once);
        router.on(EventKind::QueueUpdate, log.recorder("after"));

        router.dispatch_text(r#"{"type":"queue_update"}"#);
        router.dispatch_text(r#"{"type":"queue_update"}"#);

        assert_eq!(log.labels(), vec!["once", "after", "after"]);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let router = EventRouter::new();
        let log = Log::default();
        router.on(EventKind::Message, log.recorder("any"));

        assert_eq!(router.dispatch_text("not json"), None);
        assert_eq!(router.dispatch_text(r#"{"no_type":1}"#), None);
        assert_eq!(
            router.dispatch_text(r#"{"type":"pong"}"#),
            Some(EventKind::Pong)
        );
        assert_eq!(log.labels(), vec!["any"]);
    }
}
