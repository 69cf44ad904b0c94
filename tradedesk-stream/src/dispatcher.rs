//! Message dispatcher: routes inbound frames to handlers by `type`
//!
//! Each type keeps an ordered list of handlers and every one of them sees
//! each message, so independent consumers can observe the same type.
//! Types nobody registered for are dropped.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error, warn};

use tradedesk_core::{InboundMessage, StreamResult};

/// A consumer of inbound messages of one type
pub trait MessageHandler: Send {
    fn handle(&mut self, message: &InboundMessage) -> StreamResult<()>;
}

impl<F> MessageHandler for F
where
    F: FnMut(&InboundMessage) -> StreamResult<()> + Send,
{
    fn handle(&mut self, message: &InboundMessage) -> StreamResult<()> {
        self(message)
    }
}

#[derive(Default)]
pub struct MessageDispatcher {
    handlers: HashMap<String, Vec<Box<dyn MessageHandler>>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for a message type
    pub fn register<H>(&mut self, kind: impl Into<String>, handler: H)
    where
        H: MessageHandler + 'static,
    {
        self.register_boxed(kind, Box::new(handler));
    }

    pub fn register_boxed(&mut self, kind: impl Into<String>, handler: Box<dyn MessageHandler>) {
        let kind = kind.into();
        let handlers = self.handlers.entry(kind.clone()).or_default();
        handlers.push(handler);
        debug!(
            "[Dispatcher] Registered handler #{} for '{}'",
            handlers.len(),
            kind
        );
    }

    /// Route a message to every handler for its type
    ///
    /// Handler errors and panics are logged and contained, and the
    /// remaining handlers still run. Returns how many handlers ran.
    pub fn dispatch(&mut self, message: &InboundMessage) -> usize {
        let Some(handlers) = self.handlers.get_mut(&message.kind) else {
            debug!("[Dispatcher] No handler for '{}', dropping", message.kind);
            return 0;
        };

        for handler in handlers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("[Dispatcher] Handler for '{}' failed: {}", message.kind, e);
                }
                Err(panic) => {
                    error!(
                        "[Dispatcher] Handler for '{}' panicked: {}",
                        message.kind,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        handlers.len()
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers.get(kind).map(Vec::len).unwrap_or(0)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(kind, handlers)| (kind.as_str(), handlers.len()))
            .collect();
        f.debug_struct("MessageDispatcher")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tradedesk_core::StreamError;

    use super::*;

    fn message(kind: &str) -> InboundMessage {
        InboundMessage::parse(&format!(r#"{{"type":"{}"}}"#, kind)).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl MessageHandler + 'static {
        let log = Arc::clone(log);
        move |msg: &InboundMessage| -> StreamResult<()> {
            log.lock().push(format!("{}:{}", tag, msg.kind));
            Ok(())
        }
    }

    #[test]
    fn test_routes_by_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register("price", recorder(&log, "a"));
        dispatcher.register("position", recorder(&log, "b"));

        assert_eq!(dispatcher.dispatch(&message("price")), 1);
        assert_eq!(dispatcher.dispatch(&message("position")), 1);
        assert_eq!(*log.lock(), vec!["a:price", "b:position"]);
    }

    #[test]
    fn test_unknown_type_dropped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register("price", recorder(&log, "a"));

        assert_eq!(dispatcher.dispatch(&message("heartbeat")), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register("price", recorder(&log, "first"));
        dispatcher.register("price", recorder(&log, "second"));

        assert_eq!(dispatcher.handler_count("price"), 2);
        dispatcher.dispatch(&message("price"));
        assert_eq!(*log.lock(), vec!["first:price", "second:price"]);
    }

    #[test]
    fn test_failing_handler_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register("price", |msg: &InboundMessage| -> StreamResult<()> {
            Err(StreamError::payload(&msg.kind, "boom"))
        });
        dispatcher.register("price", recorder(&log, "after"));

        assert_eq!(dispatcher.dispatch(&message("price")), 2);
        assert_eq!(*log.lock(), vec!["after:price"]);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register("price", |_: &InboundMessage| -> StreamResult<()> {
            panic!("handler bug");
        });
        dispatcher.register("price", recorder(&log, "after"));

        assert_eq!(dispatcher.dispatch(&message("price")), 2);
        assert_eq!(dispatcher.dispatch(&message("price")), 2);
        assert_eq!(*log.lock(), vec!["after:price", "after:price"]);
    }
}
