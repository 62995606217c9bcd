//! # yapyap-codec
//!
//! Length-prefixed framing plus a msgpack-compatible structured value codec
//! (§4.1). Leaf crate: no dependency on storage, crypto, or transport.

pub mod codec;
pub mod error;
pub mod framer;

pub use codec::{decode, decode_value, encode, encode_value};
pub use error::{CodecError, FramerError};
pub use framer::{Framer, DEFAULT_FRAME_CAP, DEFAULT_IDLE_TIMEOUT};
