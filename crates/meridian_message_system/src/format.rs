//! Wire-format extension point.
//!
//! A format is a recognizer/decoder/materializer triple for one wire
//! protocol. Formats are registered with the [`FormatRegistry`] at startup
//! and consulted in registration order for every packet.
//!
//! [`FormatRegistry`]: crate::registry::FormatRegistry

use crate::message::{DefaultMessage, Message};
use crate::utils::ascii_safe;
use std::sync::Arc;
use thiserror::Error;

/// A decode attempt that did not produce a value.
///
/// Failure is an expected outcome when probing candidate formats, so it
/// carries an optional human-readable reason and an optional source error
/// rather than demanding either.
#[derive(Debug, Default, Error)]
#[error("{}", .reason.as_deref().unwrap_or("input did not match format"))]
pub struct DecodeFailure {
    reason: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DecodeFailure {
    /// A silent failure: the bytes simply are not this format.
    pub fn mismatch() -> Self {
        Self::default()
    }

    /// A failure with a reason worth surfacing in logs.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            source: None,
        }
    }

    /// Attaches the underlying error that caused the failure.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// A registered wire format.
///
/// `verify` is a cheap pre-filter over the raw bytes: it must not fully
/// parse, and false positives are explicitly allowed — the authoritative
/// decision is `try_decode`. `try_decode` must be total over adversarial
/// input; a panic escaping it is caught and logged at the registry boundary,
/// but formats should return [`DecodeFailure`] instead of relying on that.
///
/// The intermediate [`Decoded`](WireFormat::Decoded) representation lets a
/// format separate its wire-level parse from the message surface handlers
/// see; formats without that distinction can set `Decoded` to the message
/// type itself.
pub trait WireFormat: Send + Sync + 'static {
    /// Intermediate decoded representation, distinct from the final message
    /// surface when the format wants one.
    type Decoded;

    /// Human-readable name used in logs and ambiguity warnings.
    fn name(&self) -> &str;

    /// Cheap predicate over the raw bytes.
    fn verify(&self, bytes: &[u8]) -> bool;

    /// Full decode of one packet.
    fn try_decode(&self, bytes: &[u8]) -> Result<Self::Decoded, DecodeFailure>;

    /// Lifts a decoded value into the message surface.
    fn materialize(&self, decoded: Self::Decoded) -> Arc<dyn Message>;
}

/// Object-safe view of a [`WireFormat`], as stored by the registry.
///
/// `decode` fuses `try_decode` and `materialize`; it is the single point
/// where a format's typed intermediate crosses into `dyn Message`.
pub trait ErasedWireFormat: Send + Sync {
    /// The format's display name.
    fn name(&self) -> &str;

    /// Cheap predicate over the raw bytes.
    fn verify(&self, bytes: &[u8]) -> bool;

    /// Decode and materialize one packet.
    fn decode(&self, bytes: &[u8]) -> Result<Arc<dyn Message>, DecodeFailure>;
}

impl<F: WireFormat> ErasedWireFormat for F {
    fn name(&self) -> &str {
        WireFormat::name(self)
    }

    fn verify(&self, bytes: &[u8]) -> bool {
        WireFormat::verify(self, bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Arc<dyn Message>, DecodeFailure> {
        self.try_decode(bytes).map(|decoded| self.materialize(decoded))
    }
}

/// Built-in fallback format.
///
/// Accepts every packet and materializes a [`DefaultMessage`] carrying the
/// ASCII-safe rendering of the input. The registry returns this format when
/// no registered format's `verify` accepts a packet, which keeps the
/// identify step total.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFormat;

impl WireFormat for DefaultFormat {
    type Decoded = String;

    fn name(&self) -> &str {
        "default"
    }

    fn verify(&self, _bytes: &[u8]) -> bool {
        true
    }

    fn try_decode(&self, bytes: &[u8]) -> Result<String, DecodeFailure> {
        Ok(ascii_safe(bytes))
    }

    fn materialize(&self, decoded: String) -> Arc<dyn Message> {
        // the rendering is already ascii-safe, so this round-trip is exact
        Arc::new(DefaultMessage::from_bytes(decoded.as_bytes()))
    }
}
