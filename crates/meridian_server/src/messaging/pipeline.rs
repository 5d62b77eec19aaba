//! The per-packet hot path.
//!
//! One socket read yields one packet; this module drives it through the
//! format registry and the message dispatcher and writes nothing itself —
//! output happens inside handlers through their context.

use crate::error::ServerError;
use meridian_message_system::{
    ascii_safe, hex_peek, FormatRegistry, HandlerContext, Message, MessageDispatcher, PlayerId,
    RawSender,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Sentinel type string reported for empty packets.
pub const EMPTY_PACKET_TYPE: &str = "[Empty data]";

/// Processes one packet end to end.
///
/// Returns the logical type of the dispatched message, the
/// [`EMPTY_PACKET_TYPE`] sentinel for empty packets, or `None` when no
/// candidate format decoded the packet (in which case nothing is dispatched
/// and the receive record already written is the only trace).
///
/// Decode behavior per candidate: a [`DecodeFailure`] is a silent skip, a
/// panic is caught and logged at error. When more than one candidate
/// decodes, the first in candidate order wins and a warning names all of
/// them. A handler error propagates to the caller and terminates only the
/// connection that saw the packet.
///
/// [`DecodeFailure`]: meridian_message_system::DecodeFailure
pub async fn process_packet(
    bytes: &[u8],
    registry: &FormatRegistry,
    dispatcher: &MessageDispatcher,
    player_id: &PlayerId,
    sender: &Arc<dyn RawSender>,
) -> Result<Option<String>, ServerError> {
    if bytes.is_empty() {
        debug!(player = %player_id, "dropping empty packet");
        return Ok(Some(EMPTY_PACKET_TYPE.to_string()));
    }

    debug!(
        size = bytes.len(),
        ascii = %ascii_safe(bytes),
        hex = %hex_peek(bytes, bytes.len()),
        player = %player_id,
        "received packet"
    );

    let candidates = registry.identify_format(bytes);

    let mut decoded: Vec<(String, Arc<dyn Message>)> = Vec::new();
    for format in &candidates {
        match catch_unwind(AssertUnwindSafe(|| format.decode(bytes))) {
            Ok(Ok(message)) => decoded.push((format.name().to_string(), message)),
            Ok(Err(failure)) => {
                trace!(format = format.name(), %failure, "candidate did not decode packet");
            }
            Err(_) => {
                error!(
                    format = format.name(),
                    peek = %hex_peek(bytes, 20),
                    "format decode panicked; skipping format"
                );
            }
        }
    }

    let Some((chosen_format, message)) = decoded.first() else {
        return Ok(None);
    };

    if decoded.len() > 1 {
        let matches: Vec<&str> = decoded.iter().map(|(name, _)| name.as_str()).collect();
        warn!(
            formats = ?matches,
            chosen = %chosen_format,
            "packet decoded by multiple formats; first registered wins"
        );
    }

    let handlers = dispatcher.find_handlers(message.as_ref());
    for handler in handlers {
        let ctx = HandlerContext::new(player_id.clone(), sender.clone());
        handler.handle_unsafe(message.as_ref(), &ctx).await?;
    }

    Ok(Some(message.message_type().to_string()))
}
