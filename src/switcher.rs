// Copyright 2020 Joyent, Inc.

pub mod types;

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;

use indexmap::IndexMap;
use slog::{debug, error, info, o, trace, warn, Drain, Logger};

use crate::data_source::DataSource;
use crate::error::Error;
use crate::metadata::ResourceMetaData;
use crate::properties::PoolProperties;
use crate::storage_node::{aggregate_pool_properties, StorageNode};
use crate::storage_resource::StorageResource;
use crate::storage_unit::{create_storage_unit_node_map, StorageUnitName};
use crate::switcher::types::{ResourceSwitchOptions, SwitchingResource};

/// Computes how the pooled data sources of a database must change when its
/// storage units are added, altered or dropped.
///
/// Every operation is a function of the given `ResourceMetaData` snapshot and
/// the requested change. The snapshot is never modified; the only side effect
/// is the creation of the data sources the change needs, which is done with
/// the creation function supplied to `new`.
pub struct ResourceSwitchManager<D, F>
where
    D: DataSource,
    F: Fn(&PoolProperties) -> Result<D, D::Error> + Send + Sync + 'static,
{
    create_data_source: F,
    log: Logger,
    _data_source: PhantomData<fn() -> D>,
}

impl<D, F> ResourceSwitchManager<D, F>
where
    D: DataSource,
    F: Fn(&PoolProperties) -> Result<D, D::Error> + Send + Sync + 'static,
{
    pub fn new(options: ResourceSwitchOptions, create_data_source: F) -> Self {
        let log = options
            .log
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));

        ResourceSwitchManager {
            create_data_source,
            log,
            _data_source: PhantomData,
        }
    }

    /// Compute the switch for storage units that are added or altered.
    ///
    /// The merged pool properties cover every storage unit after the change.
    /// The new storage resource covers the touched units only: nodes whose
    /// properties are unchanged keep their current data source, modified and
    /// previously unknown nodes get a freshly created one. The stale storage
    /// resource holds the data sources being replaced, the previous mappings
    /// of units moved to a different node, and the data sources of nodes
    /// those moves left without any unit.
    pub fn create(
        &self,
        resource_meta_data: &Arc<ResourceMetaData<D>>,
        to_be_changed_props: &IndexMap<StorageUnitName, PoolProperties>,
    ) -> Result<SwitchingResource<D>, Error> {
        let mut merged_props = resource_meta_data.pool_properties_map();
        merged_props.extend(
            to_be_changed_props
                .iter()
                .map(|(name, props)| (name.clone(), props.clone())),
        );
        self.create_switching_resource(
            resource_meta_data,
            to_be_changed_props,
            merged_props,
        )
    }

    /// Compute the switch for dropping storage units.
    ///
    /// Nothing is created. A node is retired only when none of the remaining
    /// storage units still resolves to it. Names that are not storage units
    /// of the database are ignored.
    pub fn create_by_drop_resource<S>(
        &self,
        resource_meta_data: &Arc<ResourceMetaData<D>>,
        to_be_deleted_names: &[S],
    ) -> Result<SwitchingResource<D>, Error>
    where
        S: AsRef<str>,
    {
        let deleted: HashSet<&str> =
            to_be_deleted_names.iter().map(|name| name.as_ref()).collect();
        let unknown = resource_meta_data
            .not_existed_storage_unit_names(deleted.iter().copied());
        for name in unknown {
            debug!(self.log, "Ignoring drop of unknown storage unit {}", name);
        }

        let mut merged_props = resource_meta_data.pool_properties_map();
        merged_props.retain(|name, _| !deleted.contains(name.as_str()));

        let to_be_deleted_props: IndexMap<StorageUnitName, PoolProperties> =
            resource_meta_data
                .storage_units()
                .iter()
                .filter(|(name, _)| deleted.contains(name.as_str()))
                .map(|(name, unit)| (name.clone(), unit.pool_properties.clone()))
                .collect();
        let to_be_removed_node_map =
            create_storage_unit_node_map(&to_be_deleted_props);
        let stale_storage_resource = self.get_to_be_removed_stale_data_sources(
            resource_meta_data,
            &to_be_removed_node_map,
        );

        Ok(SwitchingResource::new(
            resource_meta_data.clone(),
            StorageResource::empty(),
            stale_storage_resource,
            merged_props,
            self.log.clone(),
        ))
    }

    /// Compute the switch for a pool property change of existing storage
    /// units.
    ///
    /// The new and stale storage resources are computed as for `create`. The
    /// merged pool properties, unlike `create`, only cover the altered
    /// storage units.
    pub fn create_by_alter_data_source_pool_properties(
        &self,
        resource_meta_data: &Arc<ResourceMetaData<D>>,
        to_be_changed_props: &IndexMap<StorageUnitName, PoolProperties>,
    ) -> Result<SwitchingResource<D>, Error> {
        let mut merged_props = resource_meta_data.pool_properties_map();
        merged_props.retain(|name, _| to_be_changed_props.contains_key(name));
        merged_props.extend(
            to_be_changed_props
                .iter()
                .map(|(name, props)| (name.clone(), props.clone())),
        );
        self.create_switching_resource(
            resource_meta_data,
            to_be_changed_props,
            merged_props,
        )
    }

    fn create_switching_resource(
        &self,
        resource_meta_data: &Arc<ResourceMetaData<D>>,
        to_be_changed_props: &IndexMap<StorageUnitName, PoolProperties>,
        merged_props: IndexMap<StorageUnitName, PoolProperties>,
    ) -> Result<SwitchingResource<D>, Error> {
        let to_be_changed_node_map =
            create_storage_unit_node_map(to_be_changed_props);
        let node_props = self.aggregate_pool_properties(to_be_changed_props);
        let new_storage_resource = self.create_new_storage_resource(
            resource_meta_data,
            &to_be_changed_node_map,
            &node_props,
        )?;
        let stale_storage_resource = get_stale_data_sources(
            resource_meta_data,
            &to_be_changed_node_map,
            &node_props,
        );
        Ok(SwitchingResource::new(
            resource_meta_data.clone(),
            new_storage_resource,
            stale_storage_resource,
            merged_props,
            self.log.clone(),
        ))
    }

    // Aggregate the touched properties by storage node, logging the names
    // whose properties lose to an earlier name on the same node.
    fn aggregate_pool_properties(
        &self,
        props_map: &IndexMap<StorageUnitName, PoolProperties>,
    ) -> IndexMap<StorageNode, PoolProperties> {
        let result = aggregate_pool_properties(props_map);
        for (name, props) in props_map {
            let node = StorageNode::from_pool_properties(name, props);
            if let Some(kept) = result.get(&node) {
                if kept != props {
                    warn!(
                        self.log,
                        "Storage unit {} resolves to storage node {} with \
                         different pool properties than an earlier storage \
                         unit, the earlier properties are used",
                        name,
                        &node
                    );
                }
            }
        }
        result
    }

    fn create_new_storage_resource(
        &self,
        resource_meta_data: &ResourceMetaData<D>,
        to_be_changed_node_map: &IndexMap<StorageUnitName, StorageNode>,
        node_props: &IndexMap<StorageNode, PoolProperties>,
    ) -> Result<StorageResource<D>, Error> {
        let data_sources =
            self.get_new_storage_nodes(resource_meta_data, node_props)?;
        let storage_unit_node_map = get_new_storage_unit_node_map(
            resource_meta_data,
            to_be_changed_node_map,
        );
        Ok(StorageResource::new(data_sources, storage_unit_node_map))
    }

    fn get_new_storage_nodes(
        &self,
        resource_meta_data: &ResourceMetaData<D>,
        node_props: &IndexMap<StorageNode, PoolProperties>,
    ) -> Result<IndexMap<StorageNode, Option<D>>, Error> {
        let current = resource_meta_data.storage_resource();
        let mut result = current.data_sources.clone();
        result.retain(|node, _| node_props.contains_key(node));

        let mut created: Vec<(StorageNode, D)> = Vec::new();
        for (node, props) in node_props {
            let action = match current.data_source(node) {
                Some(_) if !is_modified_data_source(current, node, props) => {
                    debug!(
                        self.log,
                        "Keeping unchanged data source for storage node {}",
                        node
                    );
                    continue;
                }
                Some(_) => "Replaced",
                None => "Added",
            };
            match (self.create_data_source)(props) {
                Ok(data_source) => {
                    info!(
                        self.log,
                        "{} data source for storage node {}", action, node
                    );
                    created.push((node.clone(), data_source.clone()));
                    result.insert(node.clone(), Some(data_source));
                }
                Err(err) => {
                    error!(
                        self.log,
                        "Failed to create data source for storage node {}: {}",
                        node,
                        err
                    );
                    // Nothing created by a failed switch may outlive it
                    for (created_node, data_source) in created {
                        spawn_close(&self.log, &created_node, data_source);
                    }
                    return Err(Error::DataSourceCreationFailed {
                        storage_node: node.clone(),
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(result)
    }

    // The stale side of a drop: the nodes of the removed units that no
    // remaining unit resolves to, and the mappings of the removed units.
    fn get_to_be_removed_stale_data_sources(
        &self,
        resource_meta_data: &ResourceMetaData<D>,
        to_be_removed_node_map: &IndexMap<StorageUnitName, StorageNode>,
    ) -> StorageResource<D> {
        let reserved_node_map: IndexMap<&StorageUnitName, &StorageNode> =
            resource_meta_data
                .storage_units()
                .iter()
                .filter(|(name, _)| !to_be_removed_node_map.contains_key(*name))
                .map(|(name, unit)| (name, &unit.storage_node))
                .collect();
        let reserved_nodes: HashSet<&StorageNode> =
            reserved_node_map.values().copied().collect();
        let removed_nodes: HashSet<&StorageNode> =
            to_be_removed_node_map.values().collect();

        let data_sources: IndexMap<StorageNode, Option<D>> = resource_meta_data
            .data_sources()
            .iter()
            .filter(|(node, _)| {
                removed_nodes.contains(node) && !reserved_nodes.contains(node)
            })
            .map(|(node, m_data_source)| (node.clone(), m_data_source.clone()))
            .collect();
        for node in removed_nodes.intersection(&reserved_nodes) {
            trace!(
                self.log,
                "Storage node {} is still in use, not retiring it",
                node
            );
        }

        let storage_unit_node_map = resource_meta_data
            .storage_units()
            .iter()
            .filter(|(name, _)| !reserved_node_map.contains_key(name))
            .map(|(name, unit)| (name.clone(), unit.storage_node.clone()))
            .collect();

        StorageResource::new(data_sources, storage_unit_node_map)
    }
}

// A node is modified when it already has a data source and the incoming
// properties differ from the ones that data source was created with.
fn is_modified_data_source<D>(
    storage_resource: &StorageResource<D>,
    storage_node: &StorageNode,
    props: &PoolProperties,
) -> bool
where
    D: DataSource,
{
    storage_resource
        .data_source(storage_node)
        .map(|data_source| data_source.pool_properties() != *props)
        .unwrap_or(false)
}

// A mapping is modified when the unit already exists and now resolves to a
// different node.
fn is_modified_storage_unit_node_map<D>(
    resource_meta_data: &ResourceMetaData<D>,
    storage_unit_name: &str,
    storage_node: &StorageNode,
) -> bool
where
    D: DataSource,
{
    resource_meta_data
        .storage_units()
        .get(storage_unit_name)
        .map(|unit| unit.storage_node != *storage_node)
        .unwrap_or(false)
}

fn get_new_storage_unit_node_map<D>(
    resource_meta_data: &ResourceMetaData<D>,
    to_be_changed_node_map: &IndexMap<StorageUnitName, StorageNode>,
) -> IndexMap<StorageUnitName, StorageNode>
where
    D: DataSource,
{
    let current = resource_meta_data.storage_unit_node_map();
    let mut result = current.clone();
    result.retain(|name, _| to_be_changed_node_map.contains_key(name));
    for (name, node) in to_be_changed_node_map {
        if is_modified_storage_unit_node_map(resource_meta_data, name, node)
            || !current.contains_key(name)
        {
            result.insert(name.clone(), node.clone());
        }
    }
    result
}

// The stale side of an add or alter: the current data sources of modified
// nodes, the previous mappings of reassigned units, and the data sources of
// nodes that no unit resolves to once the reassignments are applied.
fn get_stale_data_sources<D>(
    resource_meta_data: &ResourceMetaData<D>,
    to_be_changed_node_map: &IndexMap<StorageUnitName, StorageNode>,
    node_props: &IndexMap<StorageNode, PoolProperties>,
) -> StorageResource<D>
where
    D: DataSource,
{
    let current = resource_meta_data.storage_resource();
    let mut data_sources: IndexMap<StorageNode, Option<D>> = node_props
        .iter()
        .filter(|(node, props)| is_modified_data_source(current, node, props))
        .map(|(node, _)| (node.clone(), current.data_source(node).cloned()))
        .collect();

    let storage_unit_node_map: IndexMap<StorageUnitName, StorageNode> =
        to_be_changed_node_map
            .iter()
            .filter(|(name, node)| {
                is_modified_storage_unit_node_map(resource_meta_data, name, node)
            })
            .filter_map(|(name, _)| {
                resource_meta_data
                    .storage_units()
                    .get(name)
                    .map(|unit| (name.clone(), unit.storage_node.clone()))
            })
            .collect();

    let mut surviving_node_map = resource_meta_data.storage_unit_node_map();
    for (name, node) in to_be_changed_node_map {
        surviving_node_map.insert(name.clone(), node.clone());
    }
    let referenced_nodes: HashSet<&StorageNode> =
        surviving_node_map.values().collect();
    for previous_node in storage_unit_node_map.values() {
        if referenced_nodes.contains(previous_node) {
            continue;
        }
        if let Some(m_data_source) = current.data_sources.get(previous_node) {
            data_sources
                .entry(previous_node.clone())
                .or_insert_with(|| m_data_source.clone());
        }
    }

    StorageResource::new(data_sources, storage_unit_node_map)
}

// Close a data source on its own thread. The implementation of `close` is
// outside the control of this crate so isolate its execution and never block
// the caller on it.
pub(crate) fn spawn_close<D>(
    log: &Logger,
    storage_node: &StorageNode,
    data_source: D,
) where
    D: DataSource,
{
    let close_log = log.clone();
    let close_node = storage_node.clone();
    let _close_thread = thread::spawn(move || {
        close_data_source(close_log, close_node, data_source)
    });
}

fn close_data_source<D>(log: Logger, storage_node: StorageNode, data_source: D)
where
    D: DataSource,
{
    info!(log, "Closing stale data source for storage node {}", &storage_node);
    if let Err(err) = data_source.close() {
        warn!(
            log,
            "Failed to properly close \
             stale data source for \
             storage node {}. Reason: {}",
            &storage_node,
            err
        );
    }
}
