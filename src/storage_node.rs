// Copyright 2020 Joyent, Inc.

use indexmap::IndexMap;
use url::Url;

use derive_more::Display;

use crate::data_source::DataSource;
use crate::properties::PoolProperties;

const URL_KEYS: [&str; 2] = ["url", "jdbcUrl"];
const HOST_KEYS: [&str; 3] = ["host", "hostname", "serverName"];
const PORT_KEYS: [&str; 2] = ["port", "portNumber"];
const CATALOG_KEYS: [&str; 3] = ["database", "databaseName", "catalog"];

/// The port number of a storage node. This is a type alias for u16.
pub type StorageNodePort = u16;
/// The concatenation of the storage node host, port and catalog in the form
/// `host:port/catalog`. This is a type alias for String.
pub type StorageNodeName = String;

/// The identity of a physical storage endpoint.
///
/// A storage node is derived from the endpoint fields of a `PoolProperties`
/// only (host, port and catalog). Pool tuning attributes and credentials do
/// not participate, so any number of storage units whose properties point at
/// the same endpoint share one storage node and therefore one pooled data
/// source.
#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialOrd, PartialEq)]
#[display(fmt = "{}", name)]
pub struct StorageNode {
    /// The concatenation of host, port and catalog.
    pub name: StorageNodeName,
    /// The lower-cased host name or address of the endpoint.
    pub host: String,
    /// The port of the endpoint, if one is configured.
    pub port: Option<StorageNodePort>,
    /// The database or catalog on the endpoint, if one is configured.
    pub catalog: Option<String>,
}

impl StorageNode {
    /// Return a new instance of `StorageNode` for the given endpoint fields.
    pub fn new(
        host: &str,
        port: Option<StorageNodePort>,
        catalog: Option<&str>,
    ) -> Self {
        let host = host.to_lowercase();
        let catalog = catalog.filter(|c| !c.is_empty()).map(String::from);
        StorageNode {
            name: storage_node_name(&host, port, catalog.as_deref()),
            host,
            port,
            catalog,
        }
    }

    /// Derive the storage node of a storage unit from its pool properties.
    ///
    /// The endpoint is taken from a URL attribute if one is present and
    /// carries a host, and from the separate host, port and catalog
    /// attributes otherwise. Properties without any recognizable endpoint
    /// form a node of their own named after the storage unit.
    pub fn from_pool_properties(
        storage_unit_name: &str,
        props: &PoolProperties,
    ) -> Self {
        if let Some(node) = props.get_any(&URL_KEYS).and_then(from_url) {
            return node;
        }
        match props.get_any(&HOST_KEYS) {
            Some(host) => StorageNode::new(
                host.trim(),
                props
                    .get_any(&PORT_KEYS)
                    .and_then(|p| p.trim().parse::<StorageNodePort>().ok()),
                props.get_any(&CATALOG_KEYS).map(str::trim),
            ),
            None => StorageNode::for_storage_unit(storage_unit_name),
        }
    }

    // A node for properties without an endpoint. Storage unit names are case
    // sensitive, so the name is kept verbatim.
    fn for_storage_unit(storage_unit_name: &str) -> Self {
        StorageNode {
            name: storage_unit_name.to_string(),
            host: storage_unit_name.to_string(),
            port: None,
            catalog: None,
        }
    }
}

// Concatenate the host, port and catalog as `host:port/catalog`, leaving out
// the parts that are not configured.
fn storage_node_name(
    host: &str,
    port: Option<StorageNodePort>,
    catalog: Option<&str>,
) -> StorageNodeName {
    let port_str = port.map(|p| p.to_string()).unwrap_or_default();
    let colon = if port_str.is_empty() { "" } else { ":" };
    let catalog = catalog.unwrap_or("");
    let slash = if catalog.is_empty() { "" } else { "/" };
    [host, colon, port_str.as_str(), slash, catalog].concat()
}

// Parse an endpoint URL such as `jdbc:postgresql://host:5432/db?ssl=true`.
// Returns None when the URL has no host component.
fn from_url(raw: &str) -> Option<StorageNode> {
    let raw = raw.trim();
    let stripped = raw.strip_prefix("jdbc:").unwrap_or(raw);
    let url = Url::parse(stripped).ok()?;
    let host = url.host_str().filter(|h| !h.is_empty())?;
    let catalog = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()));
    Some(StorageNode::new(host, url.port(), catalog))
}

/// Collapse a storage unit name to pool properties map into a storage node to
/// pool properties map.
///
/// When several names resolve to the same storage node the properties of
/// the name encountered first are kept and later ones are ignored.
pub fn aggregate_pool_properties(
    props_map: &IndexMap<String, PoolProperties>,
) -> IndexMap<StorageNode, PoolProperties> {
    let mut result = IndexMap::with_capacity(props_map.len());
    for (name, props) in props_map {
        result
            .entry(StorageNode::from_pool_properties(name, props))
            .or_insert_with(|| props.clone());
    }
    result
}

/// Collapse a storage unit name to data source map into a storage node to
/// data source map. The storage node of each data source is derived from the
/// properties it reports. First-seen wins, as for
/// [`aggregate_pool_properties`].
pub fn aggregate_data_sources<D>(
    data_sources: &IndexMap<String, D>,
) -> IndexMap<StorageNode, D>
where
    D: DataSource,
{
    let mut result = IndexMap::with_capacity(data_sources.len());
    for (name, data_source) in data_sources {
        let node = StorageNode::from_pool_properties(
            name,
            &data_source.pool_properties(),
        );
        result.entry(node).or_insert_with(|| data_source.clone());
    }
    result
}
