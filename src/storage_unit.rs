// Copyright 2020 Joyent, Inc.

use indexmap::IndexMap;

use crate::data_source::DataSource;
use crate::properties::PoolProperties;
use crate::storage_node::StorageNode;

/// The logical name of a storage unit. This is a type alias for String.
pub type StorageUnitName = String;

/// A logical storage unit as seen by routing logic.
#[derive(Clone, Debug)]
pub struct StorageUnit<D> {
    /// The physical endpoint the unit resolves to.
    pub storage_node: StorageNode,
    /// The properties the unit is configured with.
    pub pool_properties: PoolProperties,
    /// The pooled data source serving the unit's storage node, if one exists.
    pub data_source: Option<D>,
}

impl<D> StorageUnit<D>
where
    D: DataSource,
{
    pub fn new(
        storage_node: StorageNode,
        pool_properties: PoolProperties,
        data_source: Option<D>,
    ) -> Self {
        StorageUnit {
            storage_node,
            pool_properties,
            data_source,
        }
    }
}

/// Derive the storage unit name to storage node map for a set of named pool
/// properties. There is exactly one entry per input name, in input order.
pub fn create_storage_unit_node_map(
    props_map: &IndexMap<StorageUnitName, PoolProperties>,
) -> IndexMap<StorageUnitName, StorageNode> {
    props_map
        .iter()
        .map(|(name, props)| {
            (name.clone(), StorageNode::from_pool_properties(name, props))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_map_has_one_entry_per_name() {
        let shared = PoolProperties::new("HikariDataSource")
            .with("url", "jdbc:postgresql://host1:5432/db0");
        let mut props = IndexMap::new();
        props.insert("ds_b".to_string(), shared.clone());
        props.insert("ds_a".to_string(), shared);
        props.insert(
            "ds_c".to_string(),
            PoolProperties::new("HikariDataSource")
                .with("host", "host2")
                .with("port", 5432)
                .with("database", "db1"),
        );

        let node_map = create_storage_unit_node_map(&props);
        let names: Vec<&str> = node_map.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["ds_b", "ds_a", "ds_c"]);
        assert_eq!(node_map["ds_b"], node_map["ds_a"]);
        assert_eq!(
            node_map["ds_c"],
            StorageNode::new("host2", Some(5432), Some("db1"))
        );
    }
}
