//! Scene handlers: pluggable translators between live cluster attributes
//! and their stored field-set representation.

use std::sync::Arc;

use super::{CLUSTERS_PER_SCENE_MAX, ClusterId, EndpointId, SCENE_HANDLERS_MAX, TransitionTimeMs};
use crate::error::{Result, SceneError};

/// Bounded list of cluster ids a handler supports on one endpoint.
pub type SupportedClusters = heapless::Vec<ClusterId, CLUSTERS_PER_SCENE_MAX>;

/// A field set in command shape: the cluster id plus the attribute-value
/// bytes exactly as the transport delivers them in AddScene/ViewScene.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandFieldSet {
    pub cluster_id: ClusterId,
    pub values: Vec<u8>,
}

/// Capability contract for one cluster family.
///
/// Handlers are registered at runtime and consulted by the scene table
/// whenever field sets are saved, viewed or applied. Ownership stays with
/// the registrant; the table holds shared references only.
pub trait SceneHandler: Send + Sync {
    /// Clusters this handler can serve on `endpoint`.
    fn supported_clusters(&self, endpoint: EndpointId) -> SupportedClusters;

    /// Whether `cluster` on `endpoint` is served by this handler.
    fn supports_cluster(&self, endpoint: EndpointId, cluster: ClusterId) -> bool;

    /// From an AddScene command: serialize the command's field set for
    /// `cluster` into the stored representation.
    fn serialize_add(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        command_fields: &CommandFieldSet,
    ) -> Result<Vec<u8>>;

    /// From a StoreScene command: serialize the currently active attribute
    /// values of `cluster` into the stored representation.
    fn serialize_save(&self, endpoint: EndpointId, cluster: ClusterId) -> Result<Vec<u8>>;

    /// From a stored scene (e.g. ViewScene): decode the stored bytes back
    /// into command shape.
    fn deserialize(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        stored: &[u8],
    ) -> Result<CommandFieldSet>;

    /// From a stored scene (e.g. RecallScene): apply the stored values to
    /// the live attributes over `transition_time_ms`.
    fn apply_scene(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        stored: &[u8],
        transition_time_ms: TransitionTimeMs,
    ) -> Result<()>;
}

fn same_handler(a: &Arc<dyn SceneHandler>, b: &Arc<dyn SceneHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Fixed-capacity set of registered handlers.
///
/// The registry does no cluster matching of its own; the table asks each
/// handler [`SceneHandler::supports_cluster`] before delegating, and
/// conflicting handlers are not arbitrated.
#[derive(Default)]
pub struct SceneHandlerRegistry {
    handlers: heapless::Vec<Arc<dyn SceneHandler>, SCENE_HANDLERS_MAX>,
}

impl SceneHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Fails with `CapacityExceeded` when the registry
    /// is full; duplicates are the caller's concern.
    pub fn register(&mut self, handler: Arc<dyn SceneHandler>) -> Result<()> {
        self.handlers
            .push(handler)
            .map_err(|_| SceneError::CapacityExceeded("scene handler registry"))
    }

    /// Remove a handler by identity. Removing one that was never registered
    /// is a no-op.
    pub fn unregister(&mut self, handler: &Arc<dyn SceneHandler>) {
        if let Some(pos) = self.handlers.iter().position(|h| same_handler(h, handler)) {
            self.handlers.remove(pos);
        }
    }

    pub fn unregister_all(&mut self) {
        self.handlers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.handlers.len() == SCENE_HANDLERS_MAX
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SceneHandler>> {
        self.handlers.iter()
    }
}
