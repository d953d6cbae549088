//! Scoped ref lock guards.
//!
//! A [`RefLock`] owns exclusive access to one `(project, ref)` pair until it
//! is released, either explicitly through [`RefLock::release`] or by being
//! dropped. Release runs at most once; later calls do nothing.

use std::fmt;

use refdb_types::ProjectName;
use tracing::debug;
use uuid::Uuid;

type Releaser = Box<dyn FnOnce() + Send>;

/// Guard for a lock held on a single ref in the global ref database.
pub struct RefLock {
    project: ProjectName,
    ref_name: String,
    owner: Uuid,
    releaser: Option<Releaser>,
}

impl RefLock {
    /// Wrap a held lock. `release` is called exactly once, on the first of
    /// [`RefLock::release`] or drop.
    pub fn new(
        project: ProjectName,
        ref_name: impl Into<String>,
        owner: Uuid,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            project,
            ref_name: ref_name.into(),
            owner,
            releaser: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release, for backends without locking.
    pub fn unbound(project: ProjectName, ref_name: impl Into<String>) -> Self {
        Self {
            project,
            ref_name: ref_name.into(),
            owner: Uuid::now_v7(),
            releaser: None,
        }
    }

    pub fn project(&self) -> &ProjectName {
        &self.project
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    /// Token identifying this holder to the backing store.
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Whether the lock has not been released yet.
    pub fn is_held(&self) -> bool {
        self.releaser.is_some()
    }

    /// Release the lock. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(release) = self.releaser.take() {
            release();
            debug!(project = %self.project, ref_name = %self.ref_name, owner = %self.owner, "ref lock released");
        }
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RefLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefLock")
            .field("project", &self.project)
            .field("ref_name", &self.ref_name)
            .field("owner", &self.owner)
            .field("held", &self.is_held())
            .finish()
    }
}

/// Locks held on several refs of one project.
///
/// Locks are released in reverse acquisition order when the set is dropped.
#[derive(Debug, Default)]
pub struct RefLockSet {
    locks: Vec<RefLock>,
}

impl RefLockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, lock: RefLock) {
        self.locks.push(lock);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Names of the locked refs in acquisition order.
    pub fn ref_names(&self) -> impl Iterator<Item = &str> {
        self.locks.iter().map(RefLock::ref_name)
    }

    /// Whether `ref_name` is covered by this set.
    pub fn holds(&self, ref_name: &str) -> bool {
        self.locks.iter().any(|l| l.ref_name() == ref_name && l.is_held())
    }

    /// Release every lock now. Calling again is a no-op.
    pub fn release_all(&mut self) {
        while let Some(mut lock) = self.locks.pop() {
            lock.release();
        }
    }
}

impl Drop for RefLockSet {
    fn drop(&mut self) {
        self.release_all();
    }
}
