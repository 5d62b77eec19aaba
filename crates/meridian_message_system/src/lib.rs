//! # Meridian Message System
//!
//! The typed message-processing core of the Meridian game server. This crate
//! owns the two registries every packet flows through:
//!
//! * the [`FormatRegistry`], which holds candidate wire formats and turns raw
//!   socket reads into high-level [`Message`] values, and
//! * the [`MessageDispatcher`], which routes a materialized message to the
//!   handlers registered for its logical type.
//!
//! ## Message Flow
//!
//! 1. A connection reads one chunk of bytes from its socket.
//! 2. [`FormatRegistry::identify_format`] runs every registered format's
//!    cheap `verify` predicate and collects the candidates.
//! 3. Each candidate's `try_decode` runs; successes are materialized into
//!    messages. The first success wins; further successes only produce an
//!    ambiguity warning.
//! 4. [`MessageDispatcher::find_handlers`] resolves the handler list for the
//!    chosen message and each handler runs with a fresh [`HandlerContext`].
//!
//! ## Type Safety
//!
//! Formats and handlers are written against typed traits ([`WireFormat`],
//! [`MessageHandler`]) and stored behind object-safe erased bridges. The only
//! downcast in the system lives in `ErasedMessageHandler::handle_unsafe`,
//! which re-verifies the concrete message class at runtime before invoking
//! the typed handler.
//!
//! ## Quick Start
//!
//! ```no_run
//! use meridian_message_system::{FormatRegistry, MessageDispatcher};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(FormatRegistry::new());
//! let dispatcher = Arc::new(MessageDispatcher::new());
//! // register formats and handlers during startup, then hand both to the
//! // connection server
//! ```

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{HandlerContext, RawSender};
pub use dispatch::{DispatchStats, MessageDispatcher};
pub use format::{DecodeFailure, DefaultFormat, ErasedWireFormat, WireFormat};
pub use handler::{DispatchError, ErasedMessageHandler, FnHandler, HandlerAdapter, MessageHandler};
pub use message::{DefaultMessage, Message, DEFAULT_MESSAGE_TYPE};
pub use registry::FormatRegistry;
pub use types::{PlayerId, UNDETERMINED_PLAYER_ID};
pub use utils::{ascii_safe, current_timestamp, hex_peek};

pub mod clock;
pub mod context;
pub mod dispatch;
pub mod format;
pub mod handler;
pub mod message;
pub mod registry;
pub mod types;
pub mod utils;
