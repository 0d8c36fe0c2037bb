//! Scene table core: identities, stored data, handlers and the table itself.
//!
//! A scene is a named snapshot of cluster attribute values on an endpoint,
//! stored per fabric and replayable later. Entries live in persistent
//! storage and are materialized on demand; nothing is cached in memory.

pub mod efs;
pub mod handler;
pub mod iterator;
pub mod table;

pub use efs::{ExtensionFieldSet, ExtensionFieldSets};
pub use handler::{CommandFieldSet, SceneHandler, SceneHandlerRegistry, SupportedClusters};
pub use iterator::SceneEntryIterator;
pub use table::{SceneApplyOutcome, SceneTable};

use crate::error::{Result, SceneError};
use crate::tlv::{TlvReader, TlvWriter};

pub type EndpointId = u16;
pub type GroupId = u16;
pub type SceneId = u8;
pub type FabricIndex = u8;
pub type ClusterId = u32;

/// Transition duration handed to handlers when applying a scene.
pub type TransitionTimeMs = u32;

pub const INVALID_ENDPOINT_ID: EndpointId = 0xFFFF;
/// Group sentinel meaning "applies to no specific group".
pub const GLOBAL_GROUP_ID: GroupId = 0x0000;
pub const UNDEFINED_SCENE_ID: SceneId = 0xFF;

/// Static resource bounds. Exceeding any of these is a reported error,
/// never a silent eviction.
pub const SCENES_PER_FABRIC_MAX: usize = 16;
pub const SCENE_HANDLERS_MAX: usize = 8;
pub const CLUSTERS_PER_SCENE_MAX: usize = 3;
pub const SCENE_NAME_MAX: usize = 16;
pub const FIELD_SET_BYTES_MAX: usize = 128;
pub const CONCURRENT_ITERATORS_MAX: usize = 2;

/// Context tags of the stored scene record. Stable, never reused.
pub const TAG_STORAGE_ID_CONTAINER: u8 = 1;
pub const TAG_ENDPOINT_ID: u8 = 2;
pub const TAG_GROUP_ID: u8 = 3;
pub const TAG_SCENE_ID: u8 = 4;
pub const TAG_DATA_CONTAINER: u8 = 5;
pub const TAG_SCENE_NAME: u8 = 6;
pub const TAG_TRANSITION_TIME: u8 = 7;
pub const TAG_TRANSITION_TIME_100MS: u8 = 8;

/// Identity of a scene in storage: endpoint, group and scene id.
///
/// Equality is exact field-wise equality, no normalization. The endpoint
/// and group sentinels are permitted and carry scoping meaning; the scene
/// id sentinel marks an identity that must never reach storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneStorageId {
    pub endpoint_id: EndpointId,
    pub group_id: GroupId,
    pub scene_id: SceneId,
}

impl Default for SceneStorageId {
    fn default() -> Self {
        Self {
            endpoint_id: INVALID_ENDPOINT_ID,
            group_id: GLOBAL_GROUP_ID,
            scene_id: UNDEFINED_SCENE_ID,
        }
    }
}

impl SceneStorageId {
    /// Identity scoped to the global group.
    pub fn new(endpoint_id: EndpointId, scene_id: SceneId) -> Self {
        Self {
            endpoint_id,
            group_id: GLOBAL_GROUP_ID,
            scene_id,
        }
    }

    pub fn with_group(endpoint_id: EndpointId, group_id: GroupId, scene_id: SceneId) -> Self {
        Self {
            endpoint_id,
            group_id,
            scene_id,
        }
    }

    pub fn serialize(&self, writer: &mut TlvWriter) -> Result<()> {
        writer.write_struct(TAG_STORAGE_ID_CONTAINER, |w| {
            w.put_u16(TAG_ENDPOINT_ID, self.endpoint_id);
            w.put_u16(TAG_GROUP_ID, self.group_id);
            w.put_u8(TAG_SCENE_ID, self.scene_id);
            Ok(())
        })
    }

    pub fn deserialize(reader: &mut TlvReader) -> Result<Self> {
        reader.enter_struct(TAG_STORAGE_ID_CONTAINER)?;
        let endpoint_id = reader.read_u16(TAG_ENDPOINT_ID)?;
        let group_id = reader.read_u16(TAG_GROUP_ID)?;
        let scene_id = reader.read_u8(TAG_SCENE_ID)?;
        reader.exit_struct()?;
        Ok(Self {
            endpoint_id,
            group_id,
            scene_id,
        })
    }
}

/// Data held by a scene: name, transition duration and the per-cluster
/// extension field sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneData {
    name: heapless::String<SCENE_NAME_MAX>,
    pub scene_transition_time: u16,
    pub transition_time_100ms: u8,
    pub extension_field_sets: ExtensionFieldSets,
}

impl SceneData {
    pub fn new(name: &str, scene_transition_time: u16, transition_time_100ms: u8) -> Self {
        let mut data = Self {
            scene_transition_time,
            transition_time_100ms,
            ..Self::default()
        };
        data.set_name(name);
        data
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the scene name, silently truncating to [`SCENE_NAME_MAX`] bytes
    /// (at a character boundary).
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(SCENE_NAME_MAX);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name.clear();
        self.name.push_str(&name[..end]).ok();
    }

    pub fn clear(&mut self) {
        self.name.clear();
        self.scene_transition_time = 0;
        self.transition_time_100ms = 0;
        self.extension_field_sets.clear();
    }

    pub fn serialize(&self, writer: &mut TlvWriter) -> Result<()> {
        writer.write_struct(TAG_DATA_CONTAINER, |w| {
            // An unset name is omitted entirely, not written as empty.
            if !self.name.is_empty() {
                w.put_str(TAG_SCENE_NAME, &self.name)?;
            }
            w.put_u16(TAG_TRANSITION_TIME, self.scene_transition_time);
            w.put_u8(TAG_TRANSITION_TIME_100MS, self.transition_time_100ms);
            self.extension_field_sets.serialize(w)
        })
    }

    pub fn deserialize(reader: &mut TlvReader) -> Result<Self> {
        reader.enter_struct(TAG_DATA_CONTAINER)?;
        let mut data = Self::default();

        // Only the name or the transition time may open the container.
        let (_, tag) = reader.peek()?;
        match tag {
            Some(TAG_SCENE_NAME) => {
                let name = reader.read_str(TAG_SCENE_NAME)?;
                data.set_name(name);
            }
            Some(TAG_TRANSITION_TIME) => {}
            other => {
                return Err(SceneError::Decode(format!(
                    "unexpected first field {other:?} in scene data"
                )));
            }
        }

        data.scene_transition_time = reader.read_u16(TAG_TRANSITION_TIME)?;
        data.transition_time_100ms = reader.read_u8(TAG_TRANSITION_TIME_100MS)?;
        data.extension_field_sets = ExtensionFieldSets::deserialize(reader)?;
        reader.exit_struct()?;
        Ok(data)
    }
}

/// The unit of storage: identity plus data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneTableEntry {
    pub storage_id: SceneStorageId,
    pub storage_data: SceneData,
}

impl SceneTableEntry {
    pub fn new(storage_id: SceneStorageId, storage_data: SceneData) -> Self {
        Self {
            storage_id,
            storage_data,
        }
    }

    pub fn serialize(&self, writer: &mut TlvWriter) -> Result<()> {
        self.storage_id.serialize(writer)?;
        self.storage_data.serialize(writer)
    }

    pub fn deserialize(reader: &mut TlvReader) -> Result<Self> {
        let storage_id = SceneStorageId::deserialize(reader)?;
        let storage_data = SceneData::deserialize(reader)?;
        Ok(Self {
            storage_id,
            storage_data,
        })
    }

    /// Encode to the stored wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = TlvWriter::new();
        self.serialize(&mut writer)?;
        Ok(writer.finish())
    }

    /// Decode from the stored wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(bytes);
        let entry = Self::deserialize(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(SceneError::Decode("trailing bytes after scene record".into()));
        }
        Ok(entry)
    }
}
