//! Persistent, fabric-scoped scene table for Matter devices.
//!
//! This library lets a device remember named scenes (snapshots of cluster
//! attribute values on an endpoint) and replay them later. Entries are
//! encoded with a compact tagged binary format, stored per fabric in a
//! flat key/value store, bounded by static limits, and traversed through a
//! pooled iterator.
//!
//! Cluster-specific translation between live attributes and stored field
//! sets is pluggable: implement [`SceneHandler`](scene::SceneHandler) and
//! register it with the [`SceneTable`](scene::SceneTable).

pub mod error;
pub mod scene;
pub mod storage;
pub mod tlv;

pub use error::{Result, SceneError};
pub use scene::{
    CommandFieldSet, ExtensionFieldSet, ExtensionFieldSets, SceneApplyOutcome, SceneData,
    SceneEntryIterator, SceneHandler, SceneStorageId, SceneTable, SceneTableEntry,
};
pub use storage::{FileStorage, MemoryStorage, PersistentStorage};
