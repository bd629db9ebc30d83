//! Binary wire protocol: field codec, packet catalog, envelope and framing.

pub mod codec;
pub mod envelope;
pub mod framer;
pub mod packets;

pub use codec::{Decode, Encode, PacketReader, PacketWriter, ProtoError, WireEnum};
pub use envelope::{ClientHandler, DirectionClass, Packet, ServerHandler, Side};
pub use framer::{encode_frame, Framer};
pub use packets::*;
