//! Wire protocol and tempo grid shared by the relay server and its clients.
//!
//! Inbound frames are double-encoded: the WebSocket text payload is a JSON
//! string literal, and that string holds the actual JSON object. Outbound
//! broadcasts are plain JSON objects.

pub mod protocol;
pub mod tempo;

pub use protocol::{
    encode_inbound, CodeKind, CodeUpdate, DecodeError, InboundMessage, OutboundMessage,
};
pub use tempo::{TempoState, DEFAULT_CPS, MICROS_PER_SECOND};
