// Copyright 2020 Joyent, Inc.

use std::sync::Arc;

use indexmap::IndexMap;
use slog::{debug, Logger};

use crate::data_source::DataSource;
use crate::metadata::ResourceMetaData;
use crate::properties::PoolProperties;
use crate::storage_resource::StorageResource;
use crate::storage_unit::StorageUnitName;
use crate::switcher::spawn_close;

/// The configuration options for a resource switch manager.
#[derive(Clone, Debug, Default)]
pub struct ResourceSwitchOptions {
    /// An optional `slog` logger instance. If none is provided then the logging
    /// will fall back to using the [`slog-stdlog`](https://docs.rs/slog-stdlog)
    /// drain which is essentially the same as using the rust standard
    /// [`log`](https://docs.rs/log) crate.
    pub log: Option<Logger>,
}

/// The outcome of a single switch computation.
///
/// `new_storage_resource` holds the data sources and unit mappings that must
/// exist once the change is adopted, scoped to the storage units the change
/// touched. `stale_storage_resource` holds what the change retires. Neither
/// side is applied by the switch manager: the caller adopts the new side and,
/// once the cutover is safe, calls `close_stale_data_sources`.
#[derive(Debug)]
pub struct SwitchingResource<D> {
    resource_meta_data: Arc<ResourceMetaData<D>>,
    new_storage_resource: StorageResource<D>,
    stale_storage_resource: StorageResource<D>,
    merged_pool_properties: IndexMap<StorageUnitName, PoolProperties>,
    log: Logger,
}

impl<D> SwitchingResource<D>
where
    D: DataSource,
{
    pub(crate) fn new(
        resource_meta_data: Arc<ResourceMetaData<D>>,
        new_storage_resource: StorageResource<D>,
        stale_storage_resource: StorageResource<D>,
        merged_pool_properties: IndexMap<StorageUnitName, PoolProperties>,
        log: Logger,
    ) -> Self {
        SwitchingResource {
            resource_meta_data,
            new_storage_resource,
            stale_storage_resource,
            merged_pool_properties,
            log,
        }
    }

    /// The snapshot this switch was computed against.
    pub fn resource_meta_data(&self) -> &ResourceMetaData<D> {
        &self.resource_meta_data
    }

    pub fn new_storage_resource(&self) -> &StorageResource<D> {
        &self.new_storage_resource
    }

    pub fn stale_storage_resource(&self) -> &StorageResource<D> {
        &self.stale_storage_resource
    }

    /// The resulting pool properties. `create` and `create_by_drop_resource`
    /// return the full set of storage units after the change;
    /// `create_by_alter_data_source_pool_properties` returns only the altered
    /// units, which the caller merges into its authoritative map.
    pub fn merged_pool_properties(
        &self,
    ) -> &IndexMap<StorageUnitName, PoolProperties> {
        &self.merged_pool_properties
    }

    /// Close every stale data source. Each close runs on its own thread, so
    /// this returns immediately and one failing close does not hold up the
    /// others. Failures are logged and not reported back to the caller.
    pub fn close_stale_data_sources(&self) {
        for (node, m_data_source) in &self.stale_storage_resource.data_sources {
            match m_data_source {
                Some(data_source) => {
                    spawn_close(&self.log, node, data_source.clone())
                }
                None => {
                    debug!(
                        self.log,
                        "No data source to close for storage node {}", node
                    );
                }
            }
        }
    }

    /// Compute the full storage resource that results from adopting this
    /// switch: the current resource overlaid with the new side, minus the
    /// stale nodes and unit mappings the new side does not supply again.
    pub fn merge_storage_resource(&self) -> StorageResource<D> {
        let new = &self.new_storage_resource;
        let stale = &self.stale_storage_resource;

        let mut data_sources = self.resource_meta_data.data_sources().clone();
        for (node, m_data_source) in &new.data_sources {
            data_sources.insert(node.clone(), m_data_source.clone());
        }
        data_sources.retain(|node, _| {
            !stale.data_sources.contains_key(node)
                || new.data_sources.contains_key(node)
        });

        let mut storage_unit_node_map =
            self.resource_meta_data.storage_unit_node_map();
        for (name, node) in &new.storage_unit_node_map {
            storage_unit_node_map.insert(name.clone(), node.clone());
        }
        storage_unit_node_map.retain(|name, _| {
            !stale.storage_unit_node_map.contains_key(name)
                || new.storage_unit_node_map.contains_key(name)
        });

        StorageResource::new(data_sources, storage_unit_node_map)
    }
}
