// Copyright 2020 Joyent, Inc.

use indexmap::IndexMap;

use crate::storage_node::StorageNode;
use crate::storage_unit::StorageUnitName;

/// The aggregated storage resource of a database.
///
/// `data_sources` holds one pooled data source slot per physical storage
/// node. The value is an `Option` so that a node can be tracked without a
/// live handle (for instance while the handle is being replaced). The
/// `storage_unit_node_map` resolves logical storage unit names to the node
/// that serves them.
///
/// Outside of a switch delta every node reachable through
/// `storage_unit_node_map` has an entry in `data_sources`.
#[derive(Clone, Debug)]
pub struct StorageResource<D> {
    pub data_sources: IndexMap<StorageNode, Option<D>>,
    pub storage_unit_node_map: IndexMap<StorageUnitName, StorageNode>,
}

impl<D> StorageResource<D> {
    pub fn new(
        data_sources: IndexMap<StorageNode, Option<D>>,
        storage_unit_node_map: IndexMap<StorageUnitName, StorageNode>,
    ) -> Self {
        StorageResource {
            data_sources,
            storage_unit_node_map,
        }
    }

    /// Return a storage resource with no nodes and no units.
    pub fn empty() -> Self {
        StorageResource::new(IndexMap::new(), IndexMap::new())
    }

    /// Build a storage resource where every node has a live data source.
    pub fn with_data_sources(
        data_sources: IndexMap<StorageNode, D>,
        storage_unit_node_map: IndexMap<StorageUnitName, StorageNode>,
    ) -> Self {
        StorageResource::new(
            data_sources.into_iter().map(|(k, v)| (k, Some(v))).collect(),
            storage_unit_node_map,
        )
    }

    /// Return the live data source for a node, if there is one.
    pub fn data_source(&self, storage_node: &StorageNode) -> Option<&D> {
        self.data_sources.get(storage_node).and_then(Option::as_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.data_sources.is_empty() && self.storage_unit_node_map.is_empty()
    }

    /// Return the storage unit names whose node has no slot in
    /// `data_sources`.
    pub fn dangling_storage_units(&self) -> Vec<&StorageUnitName> {
        self.storage_unit_node_map
            .iter()
            .filter(|(_, node)| !self.data_sources.contains_key(*node))
            .map(|(name, _)| name)
            .collect()
    }
}

impl<D> Default for StorageResource<D> {
    fn default() -> Self {
        Self::empty()
    }
}
