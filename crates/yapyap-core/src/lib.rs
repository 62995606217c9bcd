//! # yapyap-core
//!
//! Shared types that every other crate in this workspace depends on: the
//! peer identity, the structured value model messages carry, the message
//! envelope itself, a testable clock abstraction, XOR-distance helpers for
//! relay selection, and the event types the router emits.
//!
//! Nothing in this crate talks to disk or the network; those concerns live
//! in `yapyap-storage`, `yapyap-crypto`, and `yapyap-transport`.

pub mod clock;
pub mod error;
pub mod event;
pub mod message;
pub mod peer_id;
pub mod value;
pub mod xor;

pub use clock::{Clock, SystemClock};
pub use error::CoreError;
pub use event::{EventSink, NullEventSink, RouterEvent};
pub use message::{merge_vector_clocks, Message, MessageId, MessageKind, VectorClock};
pub use peer_id::{PeerId, PEER_ID_BYTES};
pub use value::Value;
pub use xor::{cmp_distance, peer_distance, xor_distance};
