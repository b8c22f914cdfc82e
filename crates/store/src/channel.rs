//! In-process event channel and handler registry.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use domain::PlacementEvent;
use thiserror::Error;

/// A handler did not acknowledge an event.
///
/// The dispatcher treats this as "not delivered" and redelivers the
/// event on a later pass, so handlers must be idempotent.
#[derive(Debug, Clone, Error)]
#[error("event handler '{handler}' failed: {message}")]
pub struct HandlerError {
    pub handler: &'static str,
    pub message: String,
}

impl HandlerError {
    pub fn new(handler: &'static str, message: impl ToString) -> Self {
        Self {
            handler,
            message: message.to_string(),
        }
    }
}

/// A consumer of placement events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable handler name, used in errors and logs.
    fn name(&self) -> &'static str;

    /// Processes one event. Returning `Err` withholds the acknowledgement
    /// and the event is delivered again later.
    async fn handle(&self, event: &PlacementEvent) -> Result<(), HandlerError>;
}

/// Fan-out delivery of one event to all registered handlers.
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn publish(&self, event: &PlacementEvent) -> Result<(), HandlerError>;
}

/// Event channel delivering to handlers in registration order.
///
/// Also keeps a log of successfully published events, which tests use
/// to assert on the emitted stream.
#[derive(Default)]
pub struct InMemoryEventChannel {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    log: Mutex<Vec<PlacementEvent>>,
}

impl InMemoryEventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Handlers run in registration order.
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().unwrap().push(handler);
    }

    /// Returns all fully published events, oldest first.
    pub fn published(&self) -> Vec<PlacementEvent> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn publish(&self, event: &PlacementEvent) -> Result<(), HandlerError> {
        let handlers: Vec<Arc<dyn EventHandler>> = self.handlers.read().unwrap().clone();

        for handler in handlers {
            if let Err(error) = handler.handle(event).await {
                tracing::warn!(
                    handler = error.handler,
                    event_type = event.event_type(),
                    message = %error.message,
                    "handler rejected event"
                );
                return Err(error);
            }
        }

        self.log.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&self, _event: &PlacementEvent) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Rejector;

    #[async_trait]
    impl EventHandler for Rejector {
        fn name(&self) -> &'static str {
            "rejector"
        }

        async fn handle(&self, _event: &PlacementEvent) -> Result<(), HandlerError> {
            Err(HandlerError::new(self.name(), "nope"))
        }
    }

    #[tokio::test]
    async fn publish_reaches_all_handlers_and_logs() {
        let channel = InMemoryEventChannel::new();
        let a = Arc::new(Recorder {
            calls: AtomicUsize::new(0),
        });
        let b = Arc::new(Recorder {
            calls: AtomicUsize::new(0),
        });
        channel.register(a.clone());
        channel.register(b.clone());

        let event = PlacementEvent::order_confirmed(OrderId::new());
        channel.publish(&event).await.unwrap();

        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(channel.published(), vec![event]);
    }

    #[tokio::test]
    async fn rejection_propagates_and_is_not_logged() {
        let channel = InMemoryEventChannel::new();
        channel.register(Arc::new(Rejector));

        let event = PlacementEvent::order_confirmed(OrderId::new());
        let error = channel.publish(&event).await.unwrap_err();
        assert_eq!(error.handler, "rejector");
        assert!(channel.published().is_empty());
    }
}
