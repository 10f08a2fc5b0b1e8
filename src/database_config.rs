// Copyright 2020 Joyent, Inc.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::data_source::DataSource;
use crate::properties::PoolProperties;
use crate::storage_node::{aggregate_data_sources, StorageNode};
use crate::storage_resource::StorageResource;
use crate::storage_unit::{
    create_storage_unit_node_map, StorageUnit, StorageUnitName,
};

/// A rule configuration attached to a database. Rules are carried alongside
/// the storage units but are not interpreted by this crate.
pub trait RuleConfiguration: Debug + Send + Sync {
    fn rule_type(&self) -> &str;
}

/// A database configuration assembled from pooled data sources.
#[derive(Debug)]
pub struct DataSourceProvidedDatabaseConfiguration<D> {
    rule_configurations: Vec<Arc<dyn RuleConfiguration>>,
    storage_units: IndexMap<StorageUnitName, StorageUnit<D>>,
    storage_resource: StorageResource<D>,
}

impl<D> DataSourceProvidedDatabaseConfiguration<D>
where
    D: DataSource,
{
    /// Assemble a configuration from already created data sources keyed by
    /// storage unit name. Each data source is asked for its pool properties,
    /// from which the storage nodes are derived. Data sources that resolve to
    /// the same node collapse onto the first one.
    pub fn new(
        data_sources: IndexMap<StorageUnitName, D>,
        rule_configurations: Vec<Arc<dyn RuleConfiguration>>,
    ) -> Self {
        let props_map: IndexMap<StorageUnitName, PoolProperties> =
            data_sources
                .iter()
                .map(|(name, ds)| (name.clone(), ds.pool_properties()))
                .collect();
        let storage_unit_node_map = create_storage_unit_node_map(&props_map);
        let storage_node_data_sources: IndexMap<StorageNode, Option<D>> =
            aggregate_data_sources(&data_sources)
                .into_iter()
                .map(|(node, ds)| (node, Some(ds)))
                .collect();
        let storage_units =
            create_storage_units(&storage_node_data_sources, props_map);
        DataSourceProvidedDatabaseConfiguration {
            rule_configurations,
            storage_units,
            storage_resource: StorageResource::new(
                storage_node_data_sources,
                storage_unit_node_map,
            ),
        }
    }

    /// Assemble a configuration from an existing storage resource and the
    /// pool properties of every storage unit, as done once a switch has been
    /// adopted. Units whose node has no data source in `storage_resource`
    /// get no data source.
    pub fn from_storage_resource(
        storage_resource: StorageResource<D>,
        rule_configurations: Vec<Arc<dyn RuleConfiguration>>,
        props_map: IndexMap<StorageUnitName, PoolProperties>,
    ) -> Self {
        let storage_units =
            create_storage_units(&storage_resource.data_sources, props_map);
        DataSourceProvidedDatabaseConfiguration {
            rule_configurations,
            storage_units,
            storage_resource,
        }
    }

    pub fn rule_configurations(&self) -> &[Arc<dyn RuleConfiguration>] {
        &self.rule_configurations
    }

    pub fn storage_units(&self) -> &IndexMap<StorageUnitName, StorageUnit<D>> {
        &self.storage_units
    }

    pub fn storage_resource(&self) -> &StorageResource<D> {
        &self.storage_resource
    }

    pub fn into_parts(
        self,
    ) -> (
        StorageResource<D>,
        IndexMap<StorageUnitName, StorageUnit<D>>,
        Vec<Arc<dyn RuleConfiguration>>,
    ) {
        (
            self.storage_resource,
            self.storage_units,
            self.rule_configurations,
        )
    }
}

fn create_storage_units<D>(
    data_sources: &IndexMap<StorageNode, Option<D>>,
    props_map: IndexMap<StorageUnitName, PoolProperties>,
) -> IndexMap<StorageUnitName, StorageUnit<D>>
where
    D: DataSource,
{
    props_map
        .into_iter()
        .map(|(name, props)| {
            let node = StorageNode::from_pool_properties(&name, &props);
            let data_source = data_sources.get(&node).cloned().flatten();
            (name, StorageUnit::new(node, props, data_source))
        })
        .collect()
}
