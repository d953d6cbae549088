//! The [`GlobalRefDatabase`] trait: the consistency contract every replica
//! goes through before moving a ref.

use std::collections::BTreeSet;

use refdb_refs::Ref;
use refdb_types::ProjectName;
use tracing::{debug, warn};

use crate::error::Result;
use crate::lock::{RefLock, RefLockSet};

/// Replica-consistent view of ref state with compare-and-put semantics.
///
/// Implementations are backed by a store shared by all replicas. Per-ref
/// compare-and-put must be linearizable; there is no ordering across refs
/// unless the caller holds all their locks first.
pub trait GlobalRefDatabase: Send + Sync {
    /// Whether the locally held `reference` is the latest value known to the
    /// global store. A ref the store has never recorded is up to date.
    ///
    /// Has no side effects. Fails with [`GlobalRefDbError::Lock`] when the
    /// store cannot be consulted.
    ///
    /// [`GlobalRefDbError::Lock`]: crate::GlobalRefDbError::Lock
    fn is_up_to_date(&self, project: &ProjectName, reference: &Ref) -> Result<bool>;

    /// Replace the stored value of a ref with `new_ref` iff the stored value
    /// matches `current` under [`Ref::matches_for_cas`].
    ///
    /// Pass [`Ref::null`] as `current` to require that the ref does not exist
    /// yet; the name is then taken from `new_ref`. A `new_ref` with the zero
    /// id removes the ref. Returns `Ok(false)` on a clean mismatch and errors
    /// only on storage failures.
    fn compare_and_put(&self, project: &ProjectName, current: &Ref, new_ref: &Ref) -> Result<bool>;

    /// Take the exclusive lock on `(project, ref_name)`.
    ///
    /// Waits at most the backend's lock timeout, then fails with
    /// [`GlobalRefDbError::Lock`](crate::GlobalRefDbError::Lock). The lock is
    /// held until the returned guard is released or dropped.
    fn lock_ref(&self, project: &ProjectName, ref_name: &str) -> Result<RefLock>;

    /// Cheap existence check. Gives no guarantee past the moment it returns:
    /// use [`lock_ref`](Self::lock_ref) and
    /// [`compare_and_put`](Self::compare_and_put) for read-then-write.
    fn exists(&self, project: &ProjectName, ref_name: &str) -> bool;

    /// Drop all state kept for `project`. Removing an unknown project is a
    /// no-op.
    fn remove_project(&self, project: &ProjectName) -> Result<()>;

    /// Lock several refs of one project.
    ///
    /// Names are deduplicated and locked in lexicographic order, so callers
    /// locking overlapping sets cannot deadlock. If any lock fails, the ones
    /// already taken are released before the error is returned.
    fn lock_refs(&self, project: &ProjectName, ref_names: &[String]) -> Result<RefLockSet> {
        let ordered: BTreeSet<&str> = ref_names.iter().map(String::as_str).collect();
        let mut set = RefLockSet::new();
        for name in ordered {
            match self.lock_ref(project, name) {
                Ok(lock) => set.push(lock),
                Err(e) => {
                    warn!(%project, ref_name = name, held = set.len(), error = %e, "aborting multi-ref lock");
                    return Err(e);
                }
            }
        }
        debug!(%project, count = set.len(), "locked refs");
        Ok(set)
    }
}
