//! Extension field sets: the per-cluster serialized attribute payloads
//! attached to a scene.
//!
//! The container is opaque to the scene table — handlers produce and
//! consume the payload bytes, the table only stores them. It owns its own
//! tag scheme inside the scene data container.

use super::{CLUSTERS_PER_SCENE_MAX, ClusterId, FIELD_SET_BYTES_MAX};
use crate::error::{Result, SceneError};
use crate::tlv::{TlvReader, TlvWriter};

const TAG_FIELD_SET_COUNT: u8 = 1;
const TAG_FIELD_SETS_CONTAINER: u8 = 2;
const TAG_FIELD_SET_ENTRY: u8 = 3;
const TAG_CLUSTER_ID: u8 = 4;
const TAG_FIELD_SET_DATA: u8 = 5;

/// One cluster's serialized attribute payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionFieldSet {
    pub cluster_id: ClusterId,
    data: heapless::Vec<u8, FIELD_SET_BYTES_MAX>,
}

impl ExtensionFieldSet {
    /// Fails with `BufferTooSmall` if the payload exceeds
    /// [`FIELD_SET_BYTES_MAX`] bytes.
    pub fn new(cluster_id: ClusterId, bytes: &[u8]) -> Result<Self> {
        let data = heapless::Vec::from_slice(bytes).map_err(|_| SceneError::BufferTooSmall)?;
        Ok(Self { cluster_id, data })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn serialize(&self, writer: &mut TlvWriter) -> Result<()> {
        writer.write_struct(TAG_FIELD_SET_ENTRY, |w| {
            w.put_u32(TAG_CLUSTER_ID, self.cluster_id);
            w.put_bytes(TAG_FIELD_SET_DATA, &self.data)
        })
    }

    fn deserialize(reader: &mut TlvReader) -> Result<Self> {
        reader.enter_struct(TAG_FIELD_SET_ENTRY)?;
        let cluster_id = reader.read_u32(TAG_CLUSTER_ID)?;
        let bytes = reader.read_bytes(TAG_FIELD_SET_DATA)?;
        reader.exit_struct()?;
        Self::new(cluster_id, bytes)
    }
}

/// Bounded collection of per-cluster field sets, at most one per cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionFieldSets {
    sets: heapless::Vec<ExtensionFieldSet, CLUSTERS_PER_SCENE_MAX>,
}

impl ExtensionFieldSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }

    /// Insert a field set, replacing any existing one for the same cluster.
    /// Replacement never counts against capacity.
    pub fn insert(&mut self, field_set: ExtensionFieldSet) -> Result<()> {
        if let Some(existing) = self
            .sets
            .iter_mut()
            .find(|s| s.cluster_id == field_set.cluster_id)
        {
            *existing = field_set;
            return Ok(());
        }
        self.sets
            .push(field_set)
            .map_err(|_| SceneError::CapacityExceeded("extension field sets per scene"))
    }

    pub fn get(&self, cluster_id: ClusterId) -> Option<&ExtensionFieldSet> {
        self.sets.iter().find(|s| s.cluster_id == cluster_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionFieldSet> {
        self.sets.iter()
    }

    pub fn serialize(&self, writer: &mut TlvWriter) -> Result<()> {
        writer.put_u8(TAG_FIELD_SET_COUNT, self.sets.len() as u8);
        writer.write_struct(TAG_FIELD_SETS_CONTAINER, |w| {
            for field_set in &self.sets {
                field_set.serialize(w)?;
            }
            Ok(())
        })
    }

    pub fn deserialize(reader: &mut TlvReader) -> Result<Self> {
        let count = reader.read_u8(TAG_FIELD_SET_COUNT)? as usize;
        if count > CLUSTERS_PER_SCENE_MAX {
            return Err(SceneError::Decode(format!(
                "stored field set count {count} exceeds the per-scene bound"
            )));
        }
        reader.enter_struct(TAG_FIELD_SETS_CONTAINER)?;
        let mut sets = Self::new();
        for _ in 0..count {
            sets.insert(ExtensionFieldSet::deserialize(reader)?)?;
        }
        reader.exit_struct()?;
        Ok(sets)
    }
}
