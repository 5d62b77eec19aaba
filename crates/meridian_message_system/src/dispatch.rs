//! The message dispatcher: handler registration and lookup.
//!
//! Handlers are stored polymorphic over their expected message class but
//! keyed by logical type string. Registration enforces the one-class-per-type
//! invariant so lookup never has to disambiguate classes; the single
//! downcast lives in the erased bridge, not here.

use crate::handler::{DefaultHandler, DispatchError, ErasedMessageHandler, HandlerAdapter, MessageHandler};
use crate::message::Message;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Snapshot of dispatcher activity for monitoring.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Total number of registered handlers.
    pub total_handlers: usize,
    /// Messages resolved through `find_handlers` since startup.
    pub messages_dispatched: u64,
}

/// Handlers registered for one logical message type.
struct TypeBucket {
    expected_class: TypeId,
    expected_class_name: &'static str,
    handlers: Vec<Arc<dyn ErasedMessageHandler>>,
}

/// Lookup and registration service over message handlers.
///
/// Populated during initialization (single writer) and queried on every
/// packet during serving; a `parking_lot` read-write lock keeps both sides
/// synchronous, matching the non-suspending contract of registration and
/// lookup.
///
/// # Invariant
///
/// Within one dispatcher, all handlers registered for the same logical type
/// expect the same concrete message class. Violations fail at registration
/// with [`DispatchError::HandlerConflict`]; dispatch never observes them.
pub struct MessageDispatcher {
    buckets: RwLock<HashMap<String, TypeBucket>>,
    all_handlers: RwLock<Vec<Arc<dyn ErasedMessageHandler>>>,
    default_handler: Arc<dyn ErasedMessageHandler>,
    total_handlers: AtomicUsize,
    messages_dispatched: AtomicU64,
}

impl MessageDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            all_handlers: RwLock::new(Vec::new()),
            default_handler: Arc::new(DefaultHandler),
            total_handlers: AtomicUsize::new(0),
            messages_dispatched: AtomicU64::new(0),
        }
    }

    /// Registers a typed handler.
    ///
    /// Fails when the handler's logical type already has handlers expecting
    /// a different concrete message class. Registering the same
    /// `(type, class)` pair twice is allowed; both handlers run, in
    /// registration order.
    pub fn register<H: MessageHandler>(&self, handler: H) -> Result<(), DispatchError> {
        self.register_erased(Arc::new(HandlerAdapter::new(handler)))
    }

    /// Registers an already-erased handler.
    pub fn register_erased(
        &self,
        handler: Arc<dyn ErasedMessageHandler>,
    ) -> Result<(), DispatchError> {
        let message_type = handler.message_type().to_string();
        let mut buckets = self.buckets.write();

        match buckets.get_mut(&message_type) {
            Some(bucket) => {
                if bucket.expected_class != handler.expected_class() {
                    return Err(DispatchError::HandlerConflict {
                        message_type,
                        existing: bucket.expected_class_name,
                        offered: handler.expected_class_name(),
                    });
                }
                bucket.handlers.push(handler.clone());
            }
            None => {
                buckets.insert(
                    message_type.clone(),
                    TypeBucket {
                        expected_class: handler.expected_class(),
                        expected_class_name: handler.expected_class_name(),
                        handlers: vec![handler.clone()],
                    },
                );
            }
        }

        self.all_handlers.write().push(handler);
        self.total_handlers.fetch_add(1, Ordering::Relaxed);
        trace!("registered handler for message type '{}'", message_type);
        Ok(())
    }

    /// Resolves the handlers to invoke for a message.
    ///
    /// Fetches the bucket for the message's logical type and filters it with
    /// each handler's dispatcher-facing predicate. The result is never
    /// empty: when the bucket is missing or nothing matches, the built-in
    /// default handler (which warns and writes nothing) is returned alone.
    pub fn find_handlers(&self, message: &dyn Message) -> Vec<Arc<dyn ErasedMessageHandler>> {
        self.messages_dispatched.fetch_add(1, Ordering::Relaxed);

        let buckets = self.buckets.read();
        let matched: Vec<_> = buckets
            .get(message.message_type())
            .map(|bucket| {
                bucket
                    .handlers
                    .iter()
                    .filter(|handler| handler.accepts(message))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if matched.is_empty() {
            vec![self.default_handler.clone()]
        } else {
            matched
        }
    }

    /// Current dispatcher statistics.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            total_handlers: self.total_handlers.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
        }
    }

    /// Logical types with at least one registered handler.
    pub fn registered_types(&self) -> Vec<String> {
        self.buckets.read().keys().cloned().collect()
    }

    /// Every registered handler, in registration order across all types.
    pub fn all_handlers(&self) -> Vec<Arc<dyn ErasedMessageHandler>> {
        self.all_handlers.read().clone()
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
