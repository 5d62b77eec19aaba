//! Packet processing: format identification, decode and handler dispatch.

pub mod pipeline;

pub use pipeline::{process_packet, EMPTY_PACKET_TYPE};
