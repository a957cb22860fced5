//! Wire codec for the game stream protocol.
//!
//! Every packet travels inside a little-endian frame:
//!
//! ```text
//! payload_len: u32 | packet_id: u32 | payload[payload_len]
//! ```
//!
//! The router only ever emits `Disconnect` (1) and `ClientReferral` (18)
//! and only decodes `Connect` (0) from the wire; the remaining packet ids
//! are recognized for logging. Strings are length-prefixed with an
//! unsigned LEB128 varint capped at 5 bytes.

mod connect;
mod error;
mod frame;
mod packets;
mod varint;

pub use connect::{decode_connect, ConnectInfo};
pub use error::WireError;
pub use frame::{encode_frame, FrameHeader, FRAME_HEADER_LEN, MAX_PAYLOAD_LEN};
pub use packets::{
    encode_client_referral, encode_connect_accept, encode_disconnect, packet_name, HostAddress,
    PacketId,
};
pub use varint::{read_varint, read_varstring};
