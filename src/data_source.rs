// Copyright 2020 Joyent, Inc.

use std::error;

use crate::properties::PoolProperties;

/// A pooled data source
///
/// The `DataSource` trait defines the interface a pooled connection handle
/// must implement in order to be managed by a `ResourceSwitchManager`. The
/// handle itself is opaque: the switch manager never claims connections from
/// it, it only needs to know which `PoolProperties` the pool was created from
/// and how to shut it down.
///
/// Handles are shared between the storage units that resolve to the same
/// storage node and between successive resource generations, so `Clone` must
/// produce another reference to the same underlying pool (typically an `Arc`
/// wrapper), never a second pool.
///
/// New handles are produced by a creation function supplied to
/// `ResourceSwitchManager::new` with the following trait bounds:
/// ```rust,ignore
/// Fn(&PoolProperties) -> Result<D, D::Error> + Send + Sync + 'static
/// where D: DataSource
/// ```
pub trait DataSource: Clone + Send + 'static {
    /// The error type returned by `close` and by the creation function. The
    /// only constraint applied is that the selected error type must implement
    /// the [Error](https://doc.rust-lang.org/std/error/trait.Error.html)
    /// trait from the standard library and be safe to move across threads,
    /// since stale data sources are closed on their own threads.
    type Error: error::Error + Send + Sync + 'static;
    /// Recover the properties this data source was created with. For a pool
    /// that has not been reconfigured since creation this must be equal to
    /// the properties passed to the creation function.
    fn pool_properties(&self) -> PoolProperties;
    /// Release the pool. This may block until in-flight work has drained and
    /// must tolerate being called more than once.
    fn close(&self) -> Result<(), Self::Error>;
}
