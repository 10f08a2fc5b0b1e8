// Copyright 2020 Joyent, Inc.

use std::error::Error as StdError;

use thiserror::Error;

use crate::storage_node::StorageNode;

/// The boxed form of the error types supplied by `DataSource` and
/// `RegistryCenterRepository` implementations.
pub type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    /// The data source creation function rejected the pool properties for a
    /// storage node, either because they are invalid or because the endpoint
    /// could not be reached.
    #[error("failed to create data source for storage node {storage_node}")]
    DataSourceCreationFailed {
        storage_node: StorageNode,
        #[source]
        source: BoxedError,
    },
    #[error("registry operation on key {key} failed")]
    RegistryFailure {
        key: String,
        #[source]
        source: BoxedError,
    },
    #[error("invalid pool properties document at {key}")]
    InvalidPoolProperties {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
