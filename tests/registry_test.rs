// Copyright 2020 Joyent, Inc.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use slog::{o, Drain, Logger};

use cueball_resource_switch::data_source::DataSource;
use cueball_resource_switch::database_config::DataSourceProvidedDatabaseConfiguration;
use cueball_resource_switch::error::Error;
use cueball_resource_switch::metadata::ResourceMetaData;
use cueball_resource_switch::properties::PoolProperties;
use cueball_resource_switch::registry::{
    storage_unit_node, storage_units_node, DataChangedEvent, DataChangedType,
    RegistryCenterRepository, StorageUnitChange, StorageUnitPersistService,
};
use cueball_resource_switch::storage_node::StorageNode;
use cueball_resource_switch::switcher::types::ResourceSwitchOptions;
use cueball_resource_switch::switcher::ResourceSwitchManager;

const DATABASE: &str = "sharding_db";
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct MemoryError(String);

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for MemoryError {}

// A registry that keeps every key in memory and notifies watchers
// synchronously from the writing thread.
pub struct MemoryRegistry {
    entries: Mutex<BTreeMap<String, String>>,
    ephemeral: Mutex<Vec<String>>,
    watchers: Mutex<Vec<(String, Sender<DataChangedEvent>)>>,
    broken_key: Option<String>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        MemoryRegistry {
            entries: Mutex::new(BTreeMap::new()),
            ephemeral: Mutex::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
            broken_key: None,
        }
    }

    pub fn broken_at(key: &str) -> Self {
        MemoryRegistry {
            broken_key: Some(key.to_string()),
            ..MemoryRegistry::new()
        }
    }

    fn check(&self, key: &str) -> Result<(), MemoryError> {
        match &self.broken_key {
            Some(broken) if broken == key => {
                Err(MemoryError(format!("session expired at {}", key)))
            }
            _ => Ok(()),
        }
    }

    fn notify(&self, key: &str, value: &str, event_type: DataChangedType) {
        let mut watchers = self.watchers.lock().unwrap();
        watchers.retain(|(prefix, tx)| {
            if !key.starts_with(prefix.as_str()) {
                return true;
            }
            let event = DataChangedEvent {
                key: key.to_string(),
                value: value.to_string(),
                event_type,
            };
            tx.send(event).is_ok()
        });
    }
}

impl RegistryCenterRepository for MemoryRegistry {
    type Error = MemoryError;

    fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        self.check(key)?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn get_children_keys(&self, key: &str) -> Result<Vec<String>, MemoryError> {
        self.check(key)?;
        let prefix = format!("{}/", key);
        let entries = self.entries.lock().unwrap();
        let mut children: Vec<String> = entries
            .keys()
            .filter_map(|k| k.strip_prefix(prefix.as_str()))
            .filter_map(|rest| rest.split('/').next())
            .map(String::from)
            .collect();
        children.dedup();
        Ok(children)
    }

    fn persist(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        self.check(key)?;
        let previous = self
            .entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        let event_type = match previous {
            Some(_) => DataChangedType::Updated,
            None => DataChangedType::Added,
        };
        self.notify(key, value, event_type);
        Ok(())
    }

    fn persist_ephemeral(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), MemoryError> {
        self.persist(key, value)?;
        self.ephemeral.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), MemoryError> {
        self.check(key)?;
        let prefix = format!("{}/", key);
        let removed: Vec<String> = {
            let mut entries = self.entries.lock().unwrap();
            let doomed: Vec<String> = entries
                .keys()
                .filter(|k| k.as_str() == key || k.starts_with(&prefix))
                .cloned()
                .collect();
            for k in &doomed {
                entries.remove(k);
            }
            doomed
        };
        for k in removed {
            self.notify(&k, "", DataChangedType::Deleted);
        }
        Ok(())
    }

    fn watch(
        &self,
        key: &str,
        listener: Sender<DataChangedEvent>,
    ) -> Result<(), MemoryError> {
        self.check(key)?;
        self.watchers
            .lock()
            .unwrap()
            .push((key.to_string(), listener));
        Ok(())
    }

    fn close(&mut self) {
        self.watchers.lock().unwrap().clear();
        let ephemeral: Vec<String> =
            self.ephemeral.lock().unwrap().drain(..).collect();
        let mut entries = self.entries.lock().unwrap();
        for key in ephemeral {
            entries.remove(&key);
        }
    }

    fn get_type(&self) -> &str {
        "memory"
    }
}

#[derive(Clone, Debug)]
pub struct TestPool {
    props: PoolProperties,
}

impl DataSource for TestPool {
    type Error = Infallible;

    fn pool_properties(&self) -> PoolProperties {
        self.props.clone()
    }

    fn close(&self) -> Result<(), Infallible> {
        Ok(())
    }
}

fn test_log() -> Logger {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    )
}

fn mysql(host: &str, db: &str) -> PoolProperties {
    PoolProperties::new("HikariDataSource")
        .with("url", format!("jdbc:mysql://{}:3306/{}", host, db))
        .with("password", "hunter2")
}

fn units(names: &[(&str, PoolProperties)]) -> IndexMap<String, PoolProperties> {
    names
        .iter()
        .map(|(name, props)| (name.to_string(), props.clone()))
        .collect()
}

#[test]
fn persisted_units_load_back() {
    let registry = MemoryRegistry::new();
    let service = StorageUnitPersistService::new(&registry, Some(test_log()));
    let stored = units(&[
        ("ds_0", mysql("db0.example.com", "orders")),
        ("ds_1", mysql("db1.example.com", "orders")),
    ]);

    service.persist(DATABASE, &stored).unwrap();
    assert!(registry
        .get(&storage_unit_node(DATABASE, "ds_0"))
        .unwrap()
        .unwrap()
        .contains("\"poolClassName\":\"HikariDataSource\""));

    let loaded = service.load(DATABASE).unwrap();
    assert_eq!(loaded, stored);

    service.delete(DATABASE, &["ds_0"]).unwrap();
    let loaded = service.load(DATABASE).unwrap();
    assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["ds_1"]);
}

#[test]
fn load_rejects_malformed_document() {
    let registry = MemoryRegistry::new();
    let key = storage_unit_node(DATABASE, "ds_0");
    registry.persist(&key, "{\"poolClassName\": 7}").unwrap();
    let service = StorageUnitPersistService::new(&registry, Some(test_log()));

    match service.load(DATABASE) {
        Err(Error::InvalidPoolProperties { key: bad, .. }) => {
            assert_eq!(bad, key)
        }
        other => panic!("unexpected load result: {:?}", other.map(|m| m.len())),
    }
}

#[test]
fn repository_errors_name_the_key() {
    let units_key = storage_units_node(DATABASE);
    let registry = MemoryRegistry::broken_at(&units_key);
    let service = StorageUnitPersistService::new(&registry, None);

    match service.load(DATABASE) {
        Err(err @ Error::RegistryFailure { .. }) => {
            assert!(err.to_string().contains(&units_key));
            let source = err.source().map(|s| s.to_string());
            assert_eq!(
                source,
                Some(format!("session expired at {}", units_key))
            );
        }
        other => panic!("unexpected load result: {:?}", other.map(|m| m.len())),
    }
}

#[test]
fn watched_events_become_storage_unit_changes() {
    let registry = MemoryRegistry::new();
    let service = StorageUnitPersistService::new(&registry, Some(test_log()));
    let (tx, rx) = channel();
    service.watch(DATABASE, tx).unwrap();

    let props = mysql("db2.example.com", "orders");
    service
        .persist(DATABASE, &units(&[("ds_2", props.clone())]))
        .unwrap();
    let added = rx.recv_timeout(EVENT_TIMEOUT).unwrap();
    assert_eq!(added.event_type, DataChangedType::Added);
    assert_eq!(
        service.storage_unit_change(DATABASE, &added).unwrap(),
        Some(StorageUnitChange::Altered {
            name: "ds_2".to_string(),
            props: props.clone(),
        })
    );

    let resized = props.with("maximumPoolSize", 30);
    service
        .persist(DATABASE, &units(&[("ds_2", resized)]))
        .unwrap();
    let updated = rx.recv_timeout(EVENT_TIMEOUT).unwrap();
    assert_eq!(updated.event_type, DataChangedType::Updated);

    service.delete(DATABASE, &["ds_2"]).unwrap();
    let deleted = rx.recv_timeout(EVENT_TIMEOUT).unwrap();
    assert_eq!(
        service.storage_unit_change(DATABASE, &deleted).unwrap(),
        Some(StorageUnitChange::Dropped {
            name: "ds_2".to_string()
        })
    );

    let unrelated = DataChangedEvent {
        key: format!("/metadata/{}/rules/sharding", DATABASE),
        value: String::new(),
        event_type: DataChangedType::Updated,
    };
    assert_eq!(service.storage_unit_change(DATABASE, &unrelated).unwrap(), None);
}

#[test]
fn closed_registry_stops_notifying() {
    let mut registry = MemoryRegistry::new();
    let (tx, rx) = channel();
    registry.watch(&storage_units_node(DATABASE), tx).unwrap();
    registry
        .persist_ephemeral(&storage_unit_node(DATABASE, "ds_tmp"), "{}")
        .unwrap();
    assert!(rx.recv_timeout(EVENT_TIMEOUT).is_ok());

    registry.close();

    assert!(rx.recv_timeout(EVENT_TIMEOUT).is_err());
    assert_eq!(
        registry.get(&storage_unit_node(DATABASE, "ds_tmp")).unwrap(),
        None
    );
    assert_eq!(registry.get_type(), "memory");
}

#[test]
fn storage_unit_changes_drive_switches() {
    let d0 = mysql("db0.example.com", "orders");
    let mut data_sources = IndexMap::new();
    data_sources.insert("ds_0".to_string(), TestPool { props: d0.clone() });
    let config =
        DataSourceProvidedDatabaseConfiguration::new(data_sources, vec![]);
    let meta_data = Arc::new(ResourceMetaData::from(config));
    let manager = ResourceSwitchManager::new(
        ResourceSwitchOptions {
            log: Some(test_log()),
        },
        |props: &PoolProperties| {
            Ok::<_, Infallible>(TestPool {
                props: props.clone(),
            })
        },
    );

    let added = StorageUnitChange::Altered {
        name: "ds_1".to_string(),
        props: mysql("db1.example.com", "orders"),
    };
    let switching = added.switch(&manager, &meta_data).unwrap();
    let merged: Vec<&String> =
        switching.merged_pool_properties().keys().collect();
    assert_eq!(merged, vec!["ds_0", "ds_1"]);
    let node1 = StorageNode::new("db1.example.com", Some(3306), Some("orders"));
    assert!(switching.new_storage_resource().data_source(&node1).is_some());

    let dropped = StorageUnitChange::Dropped {
        name: "ds_0".to_string(),
    };
    let switching = dropped.switch(&manager, &meta_data).unwrap();
    let stale = switching.stale_storage_resource();
    assert_eq!(stale.data_sources.len(), 1);
    assert!(switching.merged_pool_properties().is_empty());
}
