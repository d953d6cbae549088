//! Global ref database: the consistency layer shared by all replicas.
//!
//! Replicas serving the same repository agree on ref values through a
//! backing consistency store. This crate defines the contract for that store
//! and two implementations of it.
//!
//! # Contract
//!
//! - [`GlobalRefDatabase::compare_and_put`] replaces a ref value only if the
//!   stored value still matches the caller's expectation.
//! - [`GlobalRefDatabase::lock_ref`] hands out a [`RefLock`] guard; the lock
//!   is released when the guard is released or dropped, on every exit path.
//! - Lock failures ([`GlobalRefDbError::Lock`]) are retryable; storage
//!   failures are not.
//!
//! # Implementations
//!
//! - [`InMemoryGlobalRefDatabase`] — mutex-backed store shared by clones
//! - [`NoopGlobalRefDatabase`] — for a replica running without peers
//!
//! [`open`] picks one of them from a [`GlobalRefDbConfig`].

pub mod config;
pub mod error;
pub mod lock;
pub mod memory;
pub mod noop;
pub mod traits;

pub use config::GlobalRefDbConfig;
pub use error::{GlobalRefDbError, Result};
pub use lock::{RefLock, RefLockSet};
pub use memory::InMemoryGlobalRefDatabase;
pub use noop::NoopGlobalRefDatabase;
pub use traits::GlobalRefDatabase;

use std::sync::Arc;

/// The global ref database selected by `config`.
///
/// An enabled configuration gets a fresh [`InMemoryGlobalRefDatabase`] with
/// the configured lock timeout; a disabled one gets the
/// [`NoopGlobalRefDatabase`].
pub fn open(config: &GlobalRefDbConfig) -> Arc<dyn GlobalRefDatabase> {
    if config.enabled {
        Arc::new(InMemoryGlobalRefDatabase::with_config(config))
    } else {
        tracing::debug!("global ref database disabled, using no-op backend");
        Arc::new(NoopGlobalRefDatabase)
    }
}
