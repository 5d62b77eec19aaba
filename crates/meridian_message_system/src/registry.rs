//! Ordered registry of candidate wire formats.

use crate::format::{DefaultFormat, ErasedWireFormat};
use crate::utils::{ascii_safe, hex_peek};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::trace;

/// How many leading bytes the verify-panic peek shows.
const PEEK_BYTES: usize = 20;

/// Holds the candidate wire formats in registration order.
///
/// The registry is populated during server initialization (single writer)
/// and read on every packet afterwards (many readers); a `parking_lot`
/// read-write lock keeps both sides non-suspending.
///
/// Registration order is observable: when several formats decode the same
/// packet, the connection pipeline picks the first one, so tests and
/// deployments can rely on "first registered wins".
pub struct FormatRegistry {
    formats: RwLock<Vec<Arc<dyn ErasedWireFormat>>>,
    fallback: Arc<dyn ErasedWireFormat>,
}

impl FormatRegistry {
    /// Creates a registry holding only the built-in fallback format.
    pub fn new() -> Self {
        Self {
            formats: RwLock::new(Vec::new()),
            fallback: Arc::new(DefaultFormat),
        }
    }

    /// Appends a format to the candidate list.
    ///
    /// No uniqueness check is performed; registering the same format twice
    /// simply probes it twice.
    pub fn register(&self, format: Arc<dyn ErasedWireFormat>) {
        trace!("registered wire format '{}'", format.name());
        self.formats.write().push(format);
    }

    /// Number of registered formats, excluding the fallback.
    pub fn len(&self) -> usize {
        self.formats.read().len()
    }

    /// True when no format has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.formats.read().is_empty()
    }

    /// Returns every format whose cheap `verify` accepts the packet, in
    /// registration order.
    ///
    /// A panicking `verify` is treated as a rejection: the panic is caught,
    /// a trace record with a short hex/ascii peek of the packet is emitted,
    /// and probing continues with the next format. When nothing accepts the
    /// packet the built-in fallback is returned alone, so the result is
    /// never empty.
    pub fn identify_format(&self, bytes: &[u8]) -> Vec<Arc<dyn ErasedWireFormat>> {
        let formats = self.formats.read();
        let mut candidates = Vec::new();

        for format in formats.iter() {
            match catch_unwind(AssertUnwindSafe(|| format.verify(bytes))) {
                Ok(true) => candidates.push(format.clone()),
                Ok(false) => {}
                Err(_) => {
                    trace!(
                        format = format.name(),
                        peek_hex = %hex_peek(bytes, PEEK_BYTES),
                        peek_ascii = %ascii_safe(&bytes[..bytes.len().min(PEEK_BYTES)]),
                        "format verify panicked; skipping format"
                    );
                }
            }
        }

        if candidates.is_empty() {
            candidates.push(self.fallback.clone());
        }
        candidates
    }

    /// The built-in fallback format.
    pub fn fallback(&self) -> Arc<dyn ErasedWireFormat> {
        self.fallback.clone()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DecodeFailure, WireFormat};
    use crate::message::{DefaultMessage, Message};

    /// Accepts packets containing a marker byte.
    struct MarkerFormat {
        name: &'static str,
        marker: u8,
    }

    impl WireFormat for MarkerFormat {
        type Decoded = Vec<u8>;

        fn name(&self) -> &str {
            self.name
        }

        fn verify(&self, bytes: &[u8]) -> bool {
            bytes.contains(&self.marker)
        }

        fn try_decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeFailure> {
            Ok(bytes.to_vec())
        }

        fn materialize(&self, decoded: Vec<u8>) -> Arc<dyn Message> {
            Arc::new(DefaultMessage::from_bytes(&decoded))
        }
    }

    struct PanickyFormat;

    impl WireFormat for PanickyFormat {
        type Decoded = ();

        fn name(&self) -> &str {
            "panicky"
        }

        fn verify(&self, _bytes: &[u8]) -> bool {
            panic!("verify blew up");
        }

        fn try_decode(&self, _bytes: &[u8]) -> Result<(), DecodeFailure> {
            Err(DecodeFailure::mismatch())
        }

        fn materialize(&self, _decoded: ()) -> Arc<dyn Message> {
            unreachable!("never decodes")
        }
    }

    #[test]
    fn identification_preserves_registration_order() {
        let registry = FormatRegistry::new();
        registry.register(Arc::new(MarkerFormat { name: "alpha", marker: b'a' }));
        registry.register(Arc::new(MarkerFormat { name: "both", marker: b'a' }));
        registry.register(Arc::new(MarkerFormat { name: "beta", marker: b'b' }));

        let candidates = registry.identify_format(b"a-packet");
        let names: Vec<_> = candidates.iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "both"]);
    }

    #[test]
    fn falls_back_when_nothing_matches() {
        let registry = FormatRegistry::new();
        registry.register(Arc::new(MarkerFormat { name: "alpha", marker: b'a' }));

        let candidates = registry.identify_format(b"zzz");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name(), "default");
    }

    #[test]
    fn falls_back_on_empty_registry() {
        let registry = FormatRegistry::new();
        let candidates = registry.identify_format(b"anything");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name(), "default");
    }

    #[test]
    fn panicking_verify_is_skipped() {
        let registry = FormatRegistry::new();
        registry.register(Arc::new(PanickyFormat));
        registry.register(Arc::new(MarkerFormat { name: "alpha", marker: b'a' }));

        let candidates = registry.identify_format(b"abc");
        let names: Vec<_> = candidates.iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["alpha"]);

        // all formats panic or reject -> fallback
        let candidates = registry.identify_format(b"zzz");
        assert_eq!(candidates[0].name(), "default");
    }
}
