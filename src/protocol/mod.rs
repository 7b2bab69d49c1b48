//! WebSocket protocol core (RFC 6455, client role).

pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use frame::{Decoded, Frame, decode, encode, encode_with_mask};
pub use handshake::{ClientHandshake, HandshakeParams, HandshakeResponse, WS_GUID, compute_accept_key};
pub use mask::{apply_mask, apply_mask_fast, random_mask};
pub use opcode::OpCode;
