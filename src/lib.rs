// Copyright 2020 Joyent, Inc.

//! Storage resource switching for pooled data sources
//!
//! A database is configured as a set of logical *storage units*, each backed
//! by a pooled data source described by its [`PoolProperties`]:
//! properties/struct.PoolProperties.html. Several storage units may resolve to
//! the same physical *storage node* (host, port and catalog), in which case
//! they share one pool. When storage units are added, altered or dropped, the
//! [`ResourceSwitchManager`]: switcher/struct.ResourceSwitchManager.html
//! computes a [`SwitchingResource`]: switcher/types/struct.SwitchingResource.html
//! describing which pools must be created, which existing pools carry over
//! unchanged and which become stale. The caller adopts the new side and then
//! closes the stale pools with `close_stale_data_sources`.
//!
//! Use of the switch manager requires an implementation of the
//! [`DataSource`]: data_source/trait.DataSource.html trait and a function
//! that creates a data source from a set of pool properties.
//!
//! # Example
//!
//! Alter the pool size of one storage unit of a database using a
//! hypothetical `HikariPool` data source.
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex};
//!
//! use indexmap::IndexMap;
//! use slog::{Drain, Logger, o};
//!
//! use cueball_resource_switch::database_config::DataSourceProvidedDatabaseConfiguration;
//! use cueball_resource_switch::metadata::ResourceMetaData;
//! use cueball_resource_switch::properties::PoolProperties;
//! use cueball_resource_switch::switcher::ResourceSwitchManager;
//! use cueball_resource_switch::switcher::types::ResourceSwitchOptions;
//!
//! fn main() {
//!     let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
//!     let log = Logger::root(
//!         Mutex::new(
//!             slog_term::FullFormat::new(plain).build()
//!         ).fuse(),
//!         o!("build-id" => "0.1.0")
//!     );
//!
//!     let props = PoolProperties::new("HikariDataSource")
//!         .with("url", "jdbc:postgresql://db0.example.com:5432/orders")
//!         .with("maximumPoolSize", 10);
//!
//!     let mut data_sources = IndexMap::new();
//!     data_sources.insert("ds_0".to_string(), HikariPool::connect(&props)?);
//!     let config =
//!         DataSourceProvidedDatabaseConfiguration::new(data_sources, vec![]);
//!     let meta_data = Arc::new(ResourceMetaData::from(config));
//!
//!     let manager = ResourceSwitchManager::new(
//!         ResourceSwitchOptions { log: Some(log) },
//!         |props: &PoolProperties| HikariPool::connect(props),
//!     );
//!
//!     let mut altered = IndexMap::new();
//!     altered.insert("ds_0".to_string(), props.with("maximumPoolSize", 50));
//!     let switching = manager
//!         .create_by_alter_data_source_pool_properties(&meta_data, &altered)?;
//!
//!     // Adopt switching.merge_storage_resource() here, then:
//!     switching.close_stale_data_sources();
//! }
//! ```

#![allow(missing_docs)]

pub mod data_source;
pub mod database_config;
pub mod error;
pub mod metadata;
pub mod properties;
pub mod registry;
pub mod storage_node;
pub mod storage_resource;
pub mod storage_unit;
pub mod switcher;
