// Copyright 2020 Joyent, Inc.

use indexmap::IndexMap;

use crate::data_source::DataSource;
use crate::database_config::DataSourceProvidedDatabaseConfiguration;
use crate::properties::PoolProperties;
use crate::storage_node::StorageNode;
use crate::storage_resource::StorageResource;
use crate::storage_unit::{StorageUnit, StorageUnitName};

/// The currently accepted storage resource of a database together with its
/// full set of storage units.
///
/// A `ResourceMetaData` is an immutable snapshot. The switch manager reads it
/// and never modifies it; a new generation is built by the caller once a
/// switch has been adopted. Share it behind an `Arc` so that switch
/// computations against the same generation can run concurrently.
#[derive(Clone, Debug)]
pub struct ResourceMetaData<D> {
    storage_resource: StorageResource<D>,
    storage_units: IndexMap<StorageUnitName, StorageUnit<D>>,
}

impl<D> ResourceMetaData<D>
where
    D: DataSource,
{
    pub fn new(
        storage_resource: StorageResource<D>,
        storage_units: IndexMap<StorageUnitName, StorageUnit<D>>,
    ) -> Self {
        ResourceMetaData {
            storage_resource,
            storage_units,
        }
    }

    pub fn storage_resource(&self) -> &StorageResource<D> {
        &self.storage_resource
    }

    /// The deduplicated storage node to data source slots.
    pub fn data_sources(&self) -> &IndexMap<StorageNode, Option<D>> {
        &self.storage_resource.data_sources
    }

    pub fn storage_units(&self) -> &IndexMap<StorageUnitName, StorageUnit<D>> {
        &self.storage_units
    }

    /// The pool properties of every storage unit, in storage unit order.
    pub fn pool_properties_map(
        &self,
    ) -> IndexMap<StorageUnitName, PoolProperties> {
        self.storage_units
            .iter()
            .map(|(name, unit)| (name.clone(), unit.pool_properties.clone()))
            .collect()
    }

    /// The storage node of every storage unit, in storage unit order.
    pub fn storage_unit_node_map(
        &self,
    ) -> IndexMap<StorageUnitName, StorageNode> {
        self.storage_units
            .iter()
            .map(|(name, unit)| (name.clone(), unit.storage_node.clone()))
            .collect()
    }

    /// Return the names from `names` that are not storage units of this
    /// database.
    pub fn not_existed_storage_unit_names<'a, I>(&self, names: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| !self.storage_units.contains_key(*name))
            .collect()
    }
}

impl<D> From<DataSourceProvidedDatabaseConfiguration<D>> for ResourceMetaData<D>
where
    D: DataSource,
{
    fn from(config: DataSourceProvidedDatabaseConfiguration<D>) -> Self {
        let (storage_resource, storage_units, _) = config.into_parts();
        ResourceMetaData::new(storage_resource, storage_units)
    }
}
