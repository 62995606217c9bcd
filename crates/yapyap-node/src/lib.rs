//! # yapyap-node
//!
//! Composition root for a Message Router node: configuration, identity
//! persistence, logging, and the wiring that ties `yapyap-storage`,
//! `yapyap-crypto`, `yapyap-session`, `yapyap-transport`, and `yapyap-router`
//! into [`YapyapNode`].
//!
//! This crate does not implement the overlay transport fabric or the HTTP/
//! WebSocket control plane — both are external collaborators (§1, §6).
//! [`YapyapNode`] is generic over [`yapyap_transport::Transport`] so a real
//! transport can be plugged in without touching this crate; the bundled
//! binary wires it against the in-process `MockTransport` until one exists.

pub mod cli;
mod config;
mod error;
mod keystore;
mod node;

pub use cli::Cli;
pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use keystore::Keystore;
pub use node::YapyapNode;
