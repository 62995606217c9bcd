//! Durable state for the message router (§4.2, §6): outbound queues, the
//! processed-message dedup table, per-sender sequence and vector-clock
//! tables, relay replica bookkeeping, and the contacts/routing cache.
//!
//! Everything here is a cache-behind-a-database, never the other way
//! around: in-memory router state is always rehydrated from this store on
//! start and treated as disposable.

pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use store::{IncomingMessage, PersistenceStore, SqliteStorage};
pub use types::{
    Contact, NodeKeys, PendingMessageSummary, PersistOutcome, ProcessedRecord, QueueEntry,
    QueueStatus, ReplicaAssignment, ReplicaRecord, ReplicaStatus, RoutingCacheEntry, SessionRow,
};
