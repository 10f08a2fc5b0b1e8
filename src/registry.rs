// Copyright 2020 Joyent, Inc.

use std::error;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use indexmap::IndexMap;
use slog::{debug, info, o, Drain, Logger};

use crate::data_source::DataSource;
use crate::error::Error;
use crate::metadata::ResourceMetaData;
use crate::properties::PoolProperties;
use crate::storage_unit::StorageUnitName;
use crate::switcher::types::SwitchingResource;
use crate::switcher::ResourceSwitchManager;

const METADATA_NODE: &str = "/metadata";
const STORAGE_UNITS_NODE: &str = "data_sources/units";

/// The kind of change a registry watch reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataChangedType {
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for DataChangedType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataChangedType::Added => fmt.write_str("added"),
            DataChangedType::Updated => fmt.write_str("updated"),
            DataChangedType::Deleted => fmt.write_str("deleted"),
        }
    }
}

/// A change of a registry key, as delivered to watchers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataChangedEvent {
    pub key: String,
    pub value: String,
    pub event_type: DataChangedType,
}

/// The distributed coordination layer that stores cluster configuration and
/// notifies watchers of changes to it.
///
/// Implementations notify a watcher by sending `DataChangedEvent`s on the
/// channel given to `watch` for every change at or below the watched key.
/// A watcher that is no longer interested drops its receiver, after which
/// the implementation should stop sending to it.
pub trait RegistryCenterRepository: Send + Sync {
    /// The error type returned by the repository operations.
    type Error: error::Error + Send + Sync + 'static;
    /// Return the value stored at `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;
    /// Return the names of the direct children of `key`, in the order the
    /// repository keeps them.
    fn get_children_keys(&self, key: &str) -> Result<Vec<String>, Self::Error>;
    fn persist(&self, key: &str, value: &str) -> Result<(), Self::Error>;
    /// Store a value that disappears when this repository's session ends.
    fn persist_ephemeral(&self, key: &str, value: &str)
        -> Result<(), Self::Error>;
    /// Remove `key` and everything below it.
    fn delete(&self, key: &str) -> Result<(), Self::Error>;
    fn watch(
        &self,
        key: &str,
        listener: Sender<DataChangedEvent>,
    ) -> Result<(), Self::Error>;
    fn close(&mut self);
    /// A short name identifying the repository implementation.
    fn get_type(&self) -> &str;
}

/// A storage unit change observed in the registry.
#[derive(Clone, Debug, PartialEq)]
pub enum StorageUnitChange {
    /// The unit was registered or its properties were replaced.
    Altered {
        name: StorageUnitName,
        props: PoolProperties,
    },
    Dropped {
        name: StorageUnitName,
    },
}

impl StorageUnitChange {
    /// Compute the switch that applies this change to `resource_meta_data`.
    /// Registered and altered units go through `create`, so the merged pool
    /// properties of the result cover the whole database.
    pub fn switch<D, F>(
        &self,
        manager: &ResourceSwitchManager<D, F>,
        resource_meta_data: &Arc<ResourceMetaData<D>>,
    ) -> Result<SwitchingResource<D>, Error>
    where
        D: DataSource,
        F: Fn(&PoolProperties) -> Result<D, D::Error> + Send + Sync + 'static,
    {
        match self {
            StorageUnitChange::Altered { name, props } => {
                let mut changed = IndexMap::with_capacity(1);
                changed.insert(name.clone(), props.clone());
                manager.create(resource_meta_data, &changed)
            }
            StorageUnitChange::Dropped { name } => {
                manager.create_by_drop_resource(resource_meta_data, &[name])
            }
        }
    }
}

/// Return the registry key under which the storage units of `database` are
/// kept.
pub fn storage_units_node(database: &str) -> String {
    [METADATA_NODE, "/", database, "/", STORAGE_UNITS_NODE].concat()
}

/// Return the registry key of one storage unit of `database`.
pub fn storage_unit_node(database: &str, storage_unit_name: &str) -> String {
    [storage_units_node(database).as_str(), "/", storage_unit_name].concat()
}

/// Persists storage unit pool properties to a registry and reads them back.
pub struct StorageUnitPersistService<'a, R>
where
    R: RegistryCenterRepository,
{
    repository: &'a R,
    log: Logger,
}

impl<'a, R> StorageUnitPersistService<'a, R>
where
    R: RegistryCenterRepository,
{
    pub fn new(repository: &'a R, log: Option<Logger>) -> Self {
        let log = log
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));
        StorageUnitPersistService {
            repository,
            log: log.new(o!("registry" => repository.get_type().to_string())),
        }
    }

    /// Store the pool properties of every given storage unit as a JSON
    /// document under the unit's key.
    pub fn persist(
        &self,
        database: &str,
        props_map: &IndexMap<StorageUnitName, PoolProperties>,
    ) -> Result<(), Error> {
        for (name, props) in props_map {
            let key = storage_unit_node(database, name);
            debug!(self.log, "Persisting storage unit {}", &key);
            self.repository
                .persist(&key, &props.to_json())
                .map_err(|e| registry_failure(&key, e))?;
        }
        info!(
            self.log,
            "Persisted {} storage units of database {}",
            props_map.len(),
            database
        );
        Ok(())
    }

    pub fn delete<S>(&self, database: &str, names: &[S]) -> Result<(), Error>
    where
        S: AsRef<str>,
    {
        for name in names {
            let key = storage_unit_node(database, name.as_ref());
            debug!(self.log, "Deleting storage unit {}", &key);
            self.repository
                .delete(&key)
                .map_err(|e| registry_failure(&key, e))?;
        }
        Ok(())
    }

    /// Load the pool properties of every storage unit of `database`, in the
    /// order the registry lists them.
    pub fn load(
        &self,
        database: &str,
    ) -> Result<IndexMap<StorageUnitName, PoolProperties>, Error> {
        let units_key = storage_units_node(database);
        let names = self
            .repository
            .get_children_keys(&units_key)
            .map_err(|e| registry_failure(&units_key, e))?;
        let mut result = IndexMap::with_capacity(names.len());
        for name in names {
            let key = storage_unit_node(database, &name);
            let value = self
                .repository
                .get(&key)
                .map_err(|e| registry_failure(&key, e))?;
            match value {
                Some(json) => {
                    result.insert(name, PoolProperties::from_json(&key, &json)?);
                }
                None => debug!(self.log, "Storage unit {} vanished", &key),
            }
        }
        Ok(result)
    }

    /// Watch the storage units of `database` for changes.
    pub fn watch(
        &self,
        database: &str,
        listener: Sender<DataChangedEvent>,
    ) -> Result<(), Error> {
        let key = storage_units_node(database);
        self.repository
            .watch(&key, listener)
            .map_err(|e| registry_failure(&key, e))
    }

    /// Translate a watched event into a storage unit change. Events for keys
    /// that are not a storage unit of `database` yield `None`.
    pub fn storage_unit_change(
        &self,
        database: &str,
        event: &DataChangedEvent,
    ) -> Result<Option<StorageUnitChange>, Error> {
        let name = match storage_unit_name(database, &event.key) {
            Some(name) => name,
            None => {
                debug!(self.log, "Ignoring {} event for {}",
                    event.event_type, &event.key);
                return Ok(None);
            }
        };
        let change = match event.event_type {
            DataChangedType::Added | DataChangedType::Updated => {
                StorageUnitChange::Altered {
                    props: PoolProperties::from_json(&event.key, &event.value)?,
                    name,
                }
            }
            DataChangedType::Deleted => StorageUnitChange::Dropped { name },
        };
        Ok(Some(change))
    }
}

// Extract the storage unit name from a key directly below the storage unit
// node of `database`.
fn storage_unit_name(database: &str, key: &str) -> Option<StorageUnitName> {
    let prefix = storage_units_node(database);
    key.strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|name| !name.is_empty() && !name.contains('/'))
        .map(String::from)
}

fn registry_failure<E>(key: &str, err: E) -> Error
where
    E: error::Error + Send + Sync + 'static,
{
    Error::RegistryFailure {
        key: key.to_string(),
        source: Box::new(err),
    }
}
