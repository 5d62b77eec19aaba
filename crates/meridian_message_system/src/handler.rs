//! Typed message handlers and the erased bridge the dispatcher stores.

use crate::context::HandlerContext;
use crate::message::Message;
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::warn;

/// Errors raised by handler registration and execution.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Two handlers for the same logical type declared different concrete
    /// message classes. Raised at registration time, never at dispatch.
    #[error("conflicting handlers for message type '{message_type}': existing handlers expect {existing}, new handler expects {offered}")]
    HandlerConflict {
        message_type: String,
        existing: &'static str,
        offered: &'static str,
    },
    /// A handler body failed while processing a message.
    #[error("handler execution error: {0}")]
    HandlerExecution(String),
    /// Writing handler output back to the connection failed.
    #[error("send error: {0}")]
    Send(String),
}

/// A consumer bound to one `(message type, concrete message class)` pair.
///
/// The associated [`Message`](MessageHandler::Message) type is the class the
/// handler expects; the dispatcher enforces at registration time that all
/// handlers sharing a logical type string agree on it.
///
/// `should_handle` is a secondary domain predicate evaluated after the
/// dispatcher's class check and downcast; returning `false` skips the
/// handler silently. It may suspend — synchronous predicates are just the
/// degenerate case.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Concrete message class this handler expects.
    type Message: Message;

    /// Logical type string this handler is bound to.
    fn message_type(&self) -> &str;

    /// Domain-level filter running after the downcast.
    async fn should_handle(&self, _message: &Self::Message) -> bool {
        true
    }

    /// Processes one message.
    async fn handle(
        &self,
        message: &Self::Message,
        ctx: &HandlerContext,
    ) -> Result<(), DispatchError>;
}

/// Object-safe handler view stored in the dispatcher's heterogeneous table.
///
/// The unchecked cast from `dyn Message` down to a handler's concrete class
/// is centralized in [`handle_unsafe`](ErasedMessageHandler::handle_unsafe),
/// which re-verifies the class identity at runtime before the typed call.
#[async_trait]
pub trait ErasedMessageHandler: Send + Sync {
    /// Logical type string this handler is bound to.
    fn message_type(&self) -> &str;

    /// Class identity of the expected concrete message type.
    fn expected_class(&self) -> TypeId;

    /// Display name of the expected concrete message type.
    fn expected_class_name(&self) -> &'static str;

    /// Dispatcher-facing predicate: logical type matches and the message is
    /// an instance of the expected class.
    fn accepts(&self, message: &dyn Message) -> bool {
        self.message_type() == message.message_type()
            && self.expected_class() == message.as_any().type_id()
    }

    /// Downcasts and invokes the typed handler.
    async fn handle_unsafe(
        &self,
        message: &dyn Message,
        ctx: &HandlerContext,
    ) -> Result<(), DispatchError>;
}

/// Bridges a typed [`MessageHandler`] into the erased table.
pub struct HandlerAdapter<H: MessageHandler> {
    inner: H,
}

impl<H: MessageHandler> HandlerAdapter<H> {
    /// Wraps a typed handler for registration.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: MessageHandler> ErasedMessageHandler for HandlerAdapter<H> {
    fn message_type(&self) -> &str {
        self.inner.message_type()
    }

    fn expected_class(&self) -> TypeId {
        TypeId::of::<H::Message>()
    }

    fn expected_class_name(&self) -> &'static str {
        std::any::type_name::<H::Message>()
    }

    async fn handle_unsafe(
        &self,
        message: &dyn Message,
        ctx: &HandlerContext,
    ) -> Result<(), DispatchError> {
        let Some(typed) = message.as_any().downcast_ref::<H::Message>() else {
            // registration and `accepts` both guard this; reaching it means a
            // caller bypassed the dispatcher
            return Err(DispatchError::HandlerExecution(format!(
                "message of type '{}' is not a {}",
                message.message_type(),
                std::any::type_name::<H::Message>(),
            )));
        };

        if !self.inner.should_handle(typed).await {
            return Ok(());
        }
        self.inner.handle(typed, ctx).await
    }
}

/// Closure-backed handler for synchronous handling logic.
///
/// The async [`MessageHandler`] trait remains the general form; this adapter
/// covers the common case of a handler that never suspends.
///
/// # Examples
///
/// ```
/// use meridian_message_system::{DefaultMessage, FnHandler};
///
/// let handler = FnHandler::new("default_message", |msg: &DefaultMessage, _ctx| {
///     println!("fallback packet: {}", msg.rendering());
///     Ok(())
/// });
/// ```
pub struct FnHandler<M, F>
where
    M: Message,
    F: Fn(&M, &HandlerContext) -> Result<(), DispatchError> + Send + Sync + 'static,
{
    message_type: String,
    handler: F,
    _phantom: PhantomData<fn(M)>,
}

impl<M, F> FnHandler<M, F>
where
    M: Message,
    F: Fn(&M, &HandlerContext) -> Result<(), DispatchError> + Send + Sync + 'static,
{
    /// Binds a closure to a logical message type.
    pub fn new(message_type: impl Into<String>, handler: F) -> Self {
        Self {
            message_type: message_type.into(),
            handler,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<M, F> MessageHandler for FnHandler<M, F>
where
    M: Message,
    F: Fn(&M, &HandlerContext) -> Result<(), DispatchError> + Send + Sync + 'static,
{
    type Message = M;

    fn message_type(&self) -> &str {
        &self.message_type
    }

    async fn handle(
        &self,
        message: &M,
        ctx: &HandlerContext,
    ) -> Result<(), DispatchError> {
        (self.handler)(message, ctx)
    }
}

/// Fallback handler invoked when no registered handler matches a message.
///
/// Matches any message, logs a warning naming the unmatched type and writes
/// nothing. Its existence is what makes `find_handlers` total.
pub(crate) struct DefaultHandler;

#[async_trait]
impl ErasedMessageHandler for DefaultHandler {
    fn message_type(&self) -> &str {
        "*"
    }

    fn expected_class(&self) -> TypeId {
        TypeId::of::<DefaultHandler>()
    }

    fn expected_class_name(&self) -> &'static str {
        "any"
    }

    fn accepts(&self, _message: &dyn Message) -> bool {
        true
    }

    async fn handle_unsafe(
        &self,
        message: &dyn Message,
        ctx: &HandlerContext,
    ) -> Result<(), DispatchError> {
        warn!(
            message_type = message.message_type(),
            player = %ctx.player_id(),
            "no handler registered for message type"
        );
        Ok(())
    }
}
