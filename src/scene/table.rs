//! The scene table: fabric-scoped CRUD over persistent scene entries.
//!
//! Every entry lives in the backing store and is materialized on demand.
//! The table owns key construction: one index record per fabric holding a
//! slot map of scene identities, and one record per entry keyed by its
//! slot. Slots are stable across removals, which is what gives positional
//! removal and insertion-order iteration their meaning.

use std::sync::Arc;

use log::{debug, info, warn};

use super::iterator::{IteratorPool, SceneEntryIterator};
use super::{
    ClusterId, ExtensionFieldSet, FabricIndex, SCENES_PER_FABRIC_MAX, SceneHandler,
    SceneHandlerRegistry, SceneStorageId, SceneTableEntry, TransitionTimeMs, UNDEFINED_SCENE_ID,
};
use crate::error::{Result, SceneError};
use crate::storage::PersistentStorage;
use crate::tlv::{TlvReader, TlvWriter};

// Tags of the per-fabric index record.
const TAG_SCENE_COUNT: u8 = 1;
const TAG_SLOT_MAP_CONTAINER: u8 = 2;
const TAG_SLOT_ENTRY: u8 = 3;
const TAG_SLOT_INDEX: u8 = 4;

fn fabric_key(fabric: FabricIndex) -> String {
    format!("g/scf/{fabric:02x}")
}

fn entry_key(fabric: FabricIndex, slot: u8) -> String {
    format!("g/sce/{fabric:02x}/{slot:02x}")
}

/// Slot map of one fabric's scene identities.
///
/// A removed scene leaves a hole; insertion takes the first free slot.
struct FabricSceneIndex {
    slots: [Option<SceneStorageId>; SCENES_PER_FABRIC_MAX],
}

impl Default for FabricSceneIndex {
    fn default() -> Self {
        Self {
            slots: [None; SCENES_PER_FABRIC_MAX],
        }
    }
}

impl FabricSceneIndex {
    fn count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    fn find(&self, id: &SceneStorageId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref() == Some(id))
    }

    fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.is_none())
    }

    fn occupied(&self) -> impl Iterator<Item = (usize, &SceneStorageId)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|id| (i, id)))
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = TlvWriter::new();
        writer.put_u8(TAG_SCENE_COUNT, self.count() as u8);
        writer.write_struct(TAG_SLOT_MAP_CONTAINER, |w| {
            for (slot, id) in self.occupied() {
                w.write_struct(TAG_SLOT_ENTRY, |w| {
                    w.put_u8(TAG_SLOT_INDEX, slot as u8);
                    id.serialize(w)
                })?;
            }
            Ok(())
        })?;
        Ok(writer.finish())
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(bytes);
        let count = reader.read_u8(TAG_SCENE_COUNT)? as usize;
        if count > SCENES_PER_FABRIC_MAX {
            return Err(SceneError::Decode(format!(
                "stored scene count {count} exceeds the per-fabric bound"
            )));
        }
        reader.enter_struct(TAG_SLOT_MAP_CONTAINER)?;
        let mut index = Self::default();
        for _ in 0..count {
            reader.enter_struct(TAG_SLOT_ENTRY)?;
            let slot = reader.read_u8(TAG_SLOT_INDEX)? as usize;
            let id = SceneStorageId::deserialize(&mut reader)?;
            reader.exit_struct()?;
            if slot >= SCENES_PER_FABRIC_MAX {
                return Err(SceneError::Decode(format!(
                    "stored slot index {slot} out of range"
                )));
            }
            index.slots[slot] = Some(id);
        }
        reader.exit_struct()?;
        Ok(index)
    }
}

/// Per-cluster result of applying a scene's field sets.
///
/// Application never aborts early: a cluster without a handler or a failing
/// handler is recorded here and the remaining clusters are still applied.
#[derive(Debug, Default)]
pub struct SceneApplyOutcome {
    pub applied: Vec<ClusterId>,
    pub failed: Vec<(ClusterId, SceneError)>,
}

impl SceneApplyOutcome {
    pub fn all_applied(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fabric-scoped scene store over a persistent key/value backend.
///
/// Constructed once per device, initialized with a storage handle and torn
/// down explicitly with [`SceneTable::finish`]. All calls are synchronous;
/// a single logical owner at a time is assumed.
#[derive(Default)]
pub struct SceneTable {
    storage: Option<Arc<dyn PersistentStorage>>,
    handlers: SceneHandlerRegistry,
    iterators: Option<Arc<IteratorPool>>,
}

impl SceneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the table to its backing store. Fails if already initialized.
    pub fn init(&mut self, storage: Arc<dyn PersistentStorage>) -> Result<()> {
        if self.storage.is_some() {
            return Err(SceneError::InvalidState);
        }
        self.storage = Some(storage);
        self.iterators = Some(IteratorPool::new());
        info!("Scene table initialized");
        Ok(())
    }

    /// Tear down: invalidate outstanding iterators and clear handler
    /// registrations. Idempotent.
    pub fn finish(&mut self) {
        if self.storage.take().is_none() {
            return;
        }
        if let Some(pool) = self.iterators.take() {
            pool.close();
        }
        self.handlers.unregister_all();
        info!("Scene table finished");
    }

    fn store(&self) -> Result<&Arc<dyn PersistentStorage>> {
        self.storage.as_ref().ok_or(SceneError::InvalidState)
    }

    fn load_fabric_index(
        storage: &Arc<dyn PersistentStorage>,
        fabric: FabricIndex,
    ) -> Result<FabricSceneIndex> {
        match storage.get(&fabric_key(fabric))? {
            Some(bytes) => FabricSceneIndex::deserialize(&bytes),
            None => Ok(FabricSceneIndex::default()),
        }
    }

    fn save_fabric_index(
        storage: &Arc<dyn PersistentStorage>,
        fabric: FabricIndex,
        index: &FabricSceneIndex,
    ) -> Result<()> {
        storage.put(&fabric_key(fabric), &index.serialize()?)
    }

    /// Insert or overwrite the entry under its identity. Overwriting never
    /// counts against the per-fabric capacity.
    pub fn set_entry(&mut self, fabric: FabricIndex, entry: &SceneTableEntry) -> Result<()> {
        let storage = self.store()?.clone();
        if entry.storage_id.scene_id == UNDEFINED_SCENE_ID {
            return Err(SceneError::InvalidSceneId);
        }

        let mut index = Self::load_fabric_index(&storage, fabric)?;
        let (slot, is_new) = match index.find(&entry.storage_id) {
            Some(slot) => (slot, false),
            None => match index.first_free() {
                Some(slot) => (slot, true),
                None => return Err(SceneError::CapacityExceeded("scenes per fabric")),
            },
        };

        storage.put(&entry_key(fabric, slot as u8), &entry.to_bytes()?)?;
        if is_new {
            index.slots[slot] = Some(entry.storage_id);
            Self::save_fabric_index(&storage, fabric, &index)?;
        }
        debug!(
            "Stored scene {:?} for fabric {fabric} in slot {slot}",
            entry.storage_id
        );
        Ok(())
    }

    pub fn get_entry(
        &self,
        fabric: FabricIndex,
        id: SceneStorageId,
    ) -> Result<SceneTableEntry> {
        let storage = self.store()?;
        let index = Self::load_fabric_index(storage, fabric)?;
        let slot = index.find(&id).ok_or(SceneError::NotFound)?;
        let bytes = storage
            .get(&entry_key(fabric, slot as u8))?
            .ok_or(SceneError::NotFound)?;
        SceneTableEntry::from_bytes(&bytes)
    }

    /// Remove the entry with this identity. A second call reports NotFound.
    pub fn remove_entry(&mut self, fabric: FabricIndex, id: SceneStorageId) -> Result<()> {
        let storage = self.store()?.clone();
        let mut index = Self::load_fabric_index(&storage, fabric)?;
        let slot = index.find(&id).ok_or(SceneError::NotFound)?;

        storage.delete(&entry_key(fabric, slot as u8))?;
        index.slots[slot] = None;
        Self::save_fabric_index(&storage, fabric, &index)?;
        debug!("Removed scene {id:?} for fabric {fabric} from slot {slot}");
        Ok(())
    }

    /// Remove whatever entry occupies `position` in the fabric's slot map.
    pub fn remove_entry_at_position(&mut self, fabric: FabricIndex, position: u8) -> Result<()> {
        let storage = self.store()?.clone();
        let slot = position as usize;
        if slot >= SCENES_PER_FABRIC_MAX {
            return Err(SceneError::NotFound);
        }

        let mut index = Self::load_fabric_index(&storage, fabric)?;
        if index.slots[slot].is_none() {
            return Err(SceneError::NotFound);
        }

        storage.delete(&entry_key(fabric, position))?;
        index.slots[slot] = None;
        Self::save_fabric_index(&storage, fabric, &index)
    }

    /// Delete every entry scoped to `fabric`. Other fabrics are untouched;
    /// a fabric with no entries succeeds.
    pub fn remove_fabric(&mut self, fabric: FabricIndex) -> Result<()> {
        let storage = self.store()?.clone();
        let index = Self::load_fabric_index(&storage, fabric)?;
        let removed = index.count();
        for (slot, _) in index.occupied() {
            storage.delete(&entry_key(fabric, slot as u8))?;
        }
        storage.delete(&fabric_key(fabric))?;
        info!("Removed fabric {fabric} from scene table ({removed} entries)");
        Ok(())
    }

    /// Fill the entry's field sets from live attribute state, cluster by
    /// cluster. Clusters with no registered handler are skipped.
    pub fn save_extension_field_sets(&self, entry: &mut SceneTableEntry) -> Result<()> {
        self.store()?;
        let endpoint = entry.storage_id.endpoint_id;
        for handler in self.handlers.iter() {
            for cluster in handler.supported_clusters(endpoint) {
                if !handler.supports_cluster(endpoint, cluster) {
                    continue;
                }
                let bytes = handler.serialize_save(endpoint, cluster)?;
                entry
                    .storage_data
                    .extension_field_sets
                    .insert(ExtensionFieldSet::new(cluster, &bytes)?)?;
            }
        }
        Ok(())
    }

    /// Read the stored entry and hand each field set to the handler owning
    /// its cluster, with the entry's combined transition time. Per-cluster
    /// failures are accumulated, not fatal.
    pub fn apply_extension_field_sets(
        &self,
        fabric: FabricIndex,
        id: SceneStorageId,
    ) -> Result<SceneApplyOutcome> {
        let entry = self.get_entry(fabric, id)?;
        let endpoint = entry.storage_id.endpoint_id;
        let transition_ms: TransitionTimeMs =
            u32::from(entry.storage_data.scene_transition_time) * 1000
                + u32::from(entry.storage_data.transition_time_100ms) * 100;

        let mut outcome = SceneApplyOutcome::default();
        for field_set in entry.storage_data.extension_field_sets.iter() {
            let cluster = field_set.cluster_id;
            let handler = self
                .handlers
                .iter()
                .find(|h| h.supports_cluster(endpoint, cluster));

            match handler {
                None => {
                    warn!("No scene handler for cluster {cluster:#06x} on endpoint {endpoint}");
                    outcome
                        .failed
                        .push((cluster, SceneError::UnsupportedCluster(cluster)));
                }
                Some(handler) => {
                    match handler.apply_scene(endpoint, cluster, field_set.data(), transition_ms) {
                        Ok(()) => outcome.applied.push(cluster),
                        Err(e) => {
                            warn!("Applying cluster {cluster:#06x} on endpoint {endpoint} failed: {e}");
                            outcome.failed.push((cluster, e));
                        }
                    }
                }
            }
        }
        Ok(outcome)
    }

    pub fn register_handler(&mut self, handler: Arc<dyn SceneHandler>) -> Result<()> {
        self.handlers.register(handler)
    }

    pub fn unregister_handler(&mut self, handler: &Arc<dyn SceneHandler>) {
        self.handlers.unregister(handler);
    }

    pub fn unregister_all_handlers(&mut self) {
        self.handlers.unregister_all();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.count()
    }

    pub fn handlers_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handlers_full(&self) -> bool {
        self.handlers.is_full()
    }

    /// Open a bounded iterator over one fabric's entries, in slot order.
    pub fn iterate_entries(&self, fabric: FabricIndex) -> Result<SceneEntryIterator> {
        let storage = self.store()?.clone();
        let pool = self.iterators.as_ref().ok_or(SceneError::InvalidState)?;
        let slot = pool.acquire()?;

        let index = Self::load_fabric_index(&storage, fabric)?;
        let entry_keys = index
            .occupied()
            .map(|(slot, _)| entry_key(fabric, slot as u8))
            .collect();
        Ok(SceneEntryIterator::new(slot, storage, entry_keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::handler::{CommandFieldSet, SupportedClusters};
    use crate::scene::{
        CONCURRENT_ITERATORS_MAX, EndpointId, SceneData, UNDEFINED_SCENE_ID,
    };
    use crate::storage::MemoryStorage;
    use parking_lot::Mutex;

    const ON_OFF_CLUSTER: ClusterId = 0x0006;
    const LEVEL_CLUSTER: ClusterId = 0x0008;

    /// Records every apply call and serves a fixed live value for saves.
    struct OnOffHandler {
        endpoint: EndpointId,
        live_on: bool,
        applied: Mutex<Vec<(ClusterId, Vec<u8>, TransitionTimeMs)>>,
        fail_apply: bool,
    }

    impl OnOffHandler {
        fn new(endpoint: EndpointId, live_on: bool) -> Self {
            Self {
                endpoint,
                live_on,
                applied: Mutex::new(Vec::new()),
                fail_apply: false,
            }
        }
    }

    impl SceneHandler for OnOffHandler {
        fn supported_clusters(&self, endpoint: EndpointId) -> SupportedClusters {
            let mut clusters = SupportedClusters::new();
            if endpoint == self.endpoint {
                clusters.push(ON_OFF_CLUSTER).ok();
            }
            clusters
        }

        fn supports_cluster(&self, endpoint: EndpointId, cluster: ClusterId) -> bool {
            endpoint == self.endpoint && cluster == ON_OFF_CLUSTER
        }

        fn serialize_add(
            &self,
            _endpoint: EndpointId,
            _cluster: ClusterId,
            command_fields: &CommandFieldSet,
        ) -> Result<Vec<u8>> {
            Ok(command_fields.values.clone())
        }

        fn serialize_save(&self, _endpoint: EndpointId, _cluster: ClusterId) -> Result<Vec<u8>> {
            Ok(vec![u8::from(self.live_on)])
        }

        fn deserialize(
            &self,
            _endpoint: EndpointId,
            cluster: ClusterId,
            stored: &[u8],
        ) -> Result<CommandFieldSet> {
            Ok(CommandFieldSet {
                cluster_id: cluster,
                values: stored.to_vec(),
            })
        }

        fn apply_scene(
            &self,
            _endpoint: EndpointId,
            cluster: ClusterId,
            stored: &[u8],
            transition_time_ms: TransitionTimeMs,
        ) -> Result<()> {
            if self.fail_apply {
                return Err(SceneError::Handler("simulated apply failure".into()));
            }
            self.applied
                .lock()
                .push((cluster, stored.to_vec(), transition_time_ms));
            Ok(())
        }
    }

    fn ready_table() -> SceneTable {
        let mut table = SceneTable::new();
        table.init(Arc::new(MemoryStorage::new())).unwrap();
        table
    }

    fn entry(endpoint: EndpointId, scene: u8, name: &str) -> SceneTableEntry {
        SceneTableEntry::new(
            SceneStorageId::new(endpoint, scene),
            SceneData::new(name, 1, 5),
        )
    }

    #[test]
    fn test_data_ops_require_init() {
        let mut table = SceneTable::new();
        let id = SceneStorageId::new(1, 1);

        assert!(matches!(
            table.set_entry(1, &entry(1, 1, "")),
            Err(SceneError::InvalidState)
        ));
        assert!(matches!(
            table.get_entry(1, id),
            Err(SceneError::InvalidState)
        ));
        assert!(matches!(
            table.remove_entry(1, id),
            Err(SceneError::InvalidState)
        ));
        assert!(matches!(
            table.remove_fabric(1),
            Err(SceneError::InvalidState)
        ));
        assert!(matches!(
            table.iterate_entries(1),
            Err(SceneError::InvalidState)
        ));
    }

    #[test]
    fn test_double_init_fails() {
        let mut table = ready_table();
        assert!(matches!(
            table.init(Arc::new(MemoryStorage::new())),
            Err(SceneError::InvalidState)
        ));
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let mut table = ready_table();
        let entry = entry(1, 1, "movie night");
        table.set_entry(1, &entry).unwrap();

        let read = table.get_entry(1, entry.storage_id).unwrap();
        assert_eq!(read, entry);
    }

    #[test]
    fn test_get_unknown_scene_not_found() {
        let table = ready_table();
        assert!(matches!(
            table.get_entry(1, SceneStorageId::new(1, 9)),
            Err(SceneError::NotFound)
        ));
    }

    #[test]
    fn test_undefined_scene_id_rejected() {
        let mut table = ready_table();
        let bad = entry(1, UNDEFINED_SCENE_ID, "");
        assert!(matches!(
            table.set_entry(1, &bad),
            Err(SceneError::InvalidSceneId)
        ));
    }

    #[test]
    fn test_capacity_bound_with_overwrite_allowed() {
        let mut table = ready_table();
        for scene in 0..SCENES_PER_FABRIC_MAX as u8 {
            table.set_entry(1, &entry(1, scene, "")).unwrap();
        }

        // One more distinct identity fails.
        assert!(matches!(
            table.set_entry(1, &entry(1, 0xFE, "")),
            Err(SceneError::CapacityExceeded(_))
        ));

        // Overwriting an existing identity at capacity succeeds.
        let updated = entry(1, 0, "updated");
        table.set_entry(1, &updated).unwrap();
        assert_eq!(table.get_entry(1, updated.storage_id).unwrap(), updated);
    }

    #[test]
    fn test_remove_entry_second_call_not_found() {
        let mut table = ready_table();
        let entry = entry(1, 1, "");
        table.set_entry(1, &entry).unwrap();

        table.remove_entry(1, entry.storage_id).unwrap();
        assert!(matches!(
            table.remove_entry(1, entry.storage_id),
            Err(SceneError::NotFound)
        ));
        assert!(matches!(
            table.get_entry(1, entry.storage_id),
            Err(SceneError::NotFound)
        ));
    }

    #[test]
    fn test_remove_entry_at_position() {
        let mut table = ready_table();
        let first = entry(1, 1, "");
        let second = entry(1, 2, "");
        table.set_entry(1, &first).unwrap();
        table.set_entry(1, &second).unwrap();

        table.remove_entry_at_position(1, 0).unwrap();
        assert!(matches!(
            table.get_entry(1, first.storage_id),
            Err(SceneError::NotFound)
        ));
        assert_eq!(table.get_entry(1, second.storage_id).unwrap(), second);

        // Slot 0 is already empty, and out-of-range positions are NotFound.
        assert!(matches!(
            table.remove_entry_at_position(1, 0),
            Err(SceneError::NotFound)
        ));
        assert!(matches!(
            table.remove_entry_at_position(1, SCENES_PER_FABRIC_MAX as u8),
            Err(SceneError::NotFound)
        ));
    }

    #[test]
    fn test_fabric_isolation_on_remove_fabric() {
        let mut table = ready_table();
        let shared = entry(1, 1, "shared id");
        table.set_entry(1, &shared).unwrap();
        table.set_entry(2, &shared).unwrap();

        table.remove_fabric(1).unwrap();
        assert!(matches!(
            table.get_entry(1, shared.storage_id),
            Err(SceneError::NotFound)
        ));
        assert_eq!(table.get_entry(2, shared.storage_id).unwrap(), shared);
    }

    #[test]
    fn test_remove_empty_fabric_succeeds() {
        let mut table = ready_table();
        table.remove_fabric(7).unwrap();
    }

    #[test]
    fn test_iteration_in_slot_order_with_reuse() {
        let mut table = ready_table();
        let a = entry(1, 10, "a");
        let b = entry(1, 11, "b");
        let c = entry(1, 12, "c");
        table.set_entry(1, &a).unwrap();
        table.set_entry(1, &b).unwrap();
        table.set_entry(1, &c).unwrap();

        table.remove_entry(1, b.storage_id).unwrap();
        let d = entry(1, 13, "d");
        // Takes the slot freed by b.
        table.set_entry(1, &d).unwrap();

        let scenes: Vec<u8> = table
            .iterate_entries(1)
            .unwrap()
            .map(|e| e.storage_id.scene_id)
            .collect();
        assert_eq!(scenes, vec![10, 13, 12]);
    }

    #[test]
    fn test_iterator_snapshot_misses_later_insert() {
        let mut table = ready_table();
        table.set_entry(1, &entry(1, 1, "")).unwrap();

        let iter = table.iterate_entries(1).unwrap();
        assert_eq!(iter.entry_count(), 1);

        table.set_entry(1, &entry(1, 2, "")).unwrap();
        let scenes: Vec<u8> = iter.map(|e| e.storage_id.scene_id).collect();
        assert_eq!(scenes, vec![1]);
    }

    #[test]
    fn test_iterator_pool_bound_and_release() {
        let table = ready_table();
        let mut open = Vec::new();
        for _ in 0..CONCURRENT_ITERATORS_MAX {
            open.push(table.iterate_entries(1).unwrap());
        }
        assert!(matches!(
            table.iterate_entries(1),
            Err(SceneError::CapacityExceeded(_))
        ));

        open.pop();
        let _reopened = table.iterate_entries(1).unwrap();
    }

    #[test]
    fn test_finish_invalidates_iterators_and_handlers() {
        let mut table = ready_table();
        table.set_entry(1, &entry(1, 1, "")).unwrap();
        table
            .register_handler(Arc::new(OnOffHandler::new(1, true)))
            .unwrap();

        let mut iter = table.iterate_entries(1).unwrap();
        table.finish();

        assert!(iter.next().is_none());
        assert_eq!(table.handler_count(), 0);
        assert!(matches!(
            table.get_entry(1, SceneStorageId::new(1, 1)),
            Err(SceneError::InvalidState)
        ));
    }

    #[test]
    fn test_handler_add_then_view_roundtrip() {
        let handler = OnOffHandler::new(1, false);
        let command = CommandFieldSet {
            cluster_id: ON_OFF_CLUSTER,
            values: vec![0x01],
        };

        let stored = handler
            .serialize_add(1, ON_OFF_CLUSTER, &command)
            .unwrap();
        let viewed = handler.deserialize(1, ON_OFF_CLUSTER, &stored).unwrap();
        assert_eq!(viewed, command);
    }

    #[test]
    fn test_save_and_apply_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut table = ready_table();
        let handler = Arc::new(OnOffHandler::new(1, true));
        table.register_handler(handler.clone()).unwrap();

        // Scene 1 on endpoint 1, global group, 1 s + 5 x 100 ms transition.
        let mut entry = entry(1, 1, "on");
        table.save_extension_field_sets(&mut entry).unwrap();
        assert_eq!(
            entry
                .storage_data
                .extension_field_sets
                .get(ON_OFF_CLUSTER)
                .unwrap()
                .data(),
            &[0x01]
        );

        table.set_entry(1, &entry).unwrap();
        assert_eq!(table.get_entry(1, entry.storage_id).unwrap(), entry);

        let outcome = table
            .apply_extension_field_sets(1, entry.storage_id)
            .unwrap();
        assert!(outcome.all_applied());
        assert_eq!(outcome.applied, vec![ON_OFF_CLUSTER]);

        let applied = handler.applied.lock();
        assert_eq!(applied.as_slice(), &[(ON_OFF_CLUSTER, vec![0x01], 1500)]);
    }

    #[test]
    fn test_apply_missing_handler_is_reported_not_fatal() {
        let mut table = ready_table();
        table
            .register_handler(Arc::new(OnOffHandler::new(1, true)))
            .unwrap();

        let mut entry = entry(1, 1, "");
        let efs = &mut entry.storage_data.extension_field_sets;
        efs.insert(ExtensionFieldSet::new(ON_OFF_CLUSTER, &[0x01]).unwrap())
            .unwrap();
        efs.insert(ExtensionFieldSet::new(LEVEL_CLUSTER, &[0x7F]).unwrap())
            .unwrap();
        table.set_entry(1, &entry).unwrap();

        let outcome = table
            .apply_extension_field_sets(1, entry.storage_id)
            .unwrap();
        assert_eq!(outcome.applied, vec![ON_OFF_CLUSTER]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(matches!(
            outcome.failed[0],
            (LEVEL_CLUSTER, SceneError::UnsupportedCluster(LEVEL_CLUSTER))
        ));
    }

    #[test]
    fn test_apply_handler_failure_is_accumulated() {
        let mut table = ready_table();
        let mut failing = OnOffHandler::new(1, true);
        failing.fail_apply = true;
        table.register_handler(Arc::new(failing)).unwrap();

        let mut entry = entry(1, 1, "");
        entry
            .storage_data
            .extension_field_sets
            .insert(ExtensionFieldSet::new(ON_OFF_CLUSTER, &[0x00]).unwrap())
            .unwrap();
        table.set_entry(1, &entry).unwrap();

        let outcome = table
            .apply_extension_field_sets(1, entry.storage_id)
            .unwrap();
        assert!(outcome.applied.is_empty());
        assert!(matches!(
            outcome.failed.as_slice(),
            [(ON_OFF_CLUSTER, SceneError::Handler(_))]
        ));
    }

    #[test]
    fn test_save_skips_unrelated_endpoint() {
        let mut table = ready_table();
        table
            .register_handler(Arc::new(OnOffHandler::new(2, true)))
            .unwrap();

        // Handler serves endpoint 2, entry lives on endpoint 1.
        let mut entry = entry(1, 1, "");
        table.save_extension_field_sets(&mut entry).unwrap();
        assert!(entry.storage_data.extension_field_sets.is_empty());
    }

    #[test]
    fn test_entries_survive_reinit() {
        let storage = Arc::new(MemoryStorage::new());
        let saved = entry(1, 1, "persisted");

        let mut table = SceneTable::new();
        table.init(storage.clone()).unwrap();
        table.set_entry(1, &saved).unwrap();
        table.finish();

        let mut table = SceneTable::new();
        table.init(storage).unwrap();
        assert_eq!(table.get_entry(1, saved.storage_id).unwrap(), saved);
    }
}
