//! In-memory global ref database.
//!
//! [`InMemoryGlobalRefDatabase`] keeps ref values and the lock table behind
//! mutexes inside one process. Clones share state, so threads holding clones
//! behave like replicas talking to the same consistency store. Used by tests
//! and by the `refdb simulate` command.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use refdb_refs::{validate_ref_name, Ref, RefStorage};
use refdb_types::ProjectName;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GlobalRefDbConfig;
use crate::error::{GlobalRefDbError, Result};
use crate::lock::RefLock;
use crate::traits::GlobalRefDatabase;

type LockKey = (ProjectName, String);

#[derive(Debug, Default)]
struct Shared {
    refs: Mutex<HashMap<ProjectName, HashMap<String, Ref>>>,
    locks: Mutex<HashMap<LockKey, Uuid>>,
    released: Condvar,
}

impl Shared {
    fn release(&self, key: &LockKey, owner: Uuid) {
        // Release must go through even if another holder panicked.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key) == Some(&owner) {
            locks.remove(key);
            self.released.notify_all();
        }
    }
}

/// A [`GlobalRefDatabase`] held entirely in memory.
#[derive(Clone, Debug)]
pub struct InMemoryGlobalRefDatabase {
    shared: Arc<Shared>,
    lock_timeout: Duration,
}

impl InMemoryGlobalRefDatabase {
    /// Create an empty database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&GlobalRefDbConfig::default())
    }

    pub fn with_config(config: &GlobalRefDbConfig) -> Self {
        Self {
            shared: Arc::default(),
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// The value recorded for a ref, if any.
    pub fn get(&self, project: &ProjectName, ref_name: &str) -> Result<Option<Ref>> {
        let refs = self.refs()?;
        Ok(refs.get(project).and_then(|p| p.get(ref_name)).cloned())
    }

    /// Names of all refs recorded for a project, sorted.
    pub fn ref_names(&self, project: &ProjectName) -> Result<Vec<String>> {
        let refs = self.refs()?;
        let mut names: Vec<String> = refs
            .get(project)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    /// Whether some holder currently owns the lock on a ref.
    pub fn is_locked(&self, project: &ProjectName, ref_name: &str) -> bool {
        let locks = self.shared.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.contains_key(&(project.clone(), ref_name.to_string()))
    }

    fn refs(&self) -> Result<MutexGuard<'_, HashMap<ProjectName, HashMap<String, Ref>>>> {
        self.shared
            .refs
            .lock()
            .map_err(|e| GlobalRefDbError::Storage(format!("ref table poisoned: {e}")))
    }
}

impl Default for InMemoryGlobalRefDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalRefDatabase for InMemoryGlobalRefDatabase {
    fn is_up_to_date(&self, project: &ProjectName, reference: &Ref) -> Result<bool> {
        let refs = self.shared.refs.lock().map_err(|e| {
            GlobalRefDbError::lock(project, reference.name(), format!("ref table poisoned: {e}"))
        })?;
        let up_to_date = match refs.get(project).and_then(|p| p.get(reference.name())) {
            Some(stored) => stored.matches_for_cas(reference),
            None => true,
        };
        Ok(up_to_date)
    }

    fn compare_and_put(&self, project: &ProjectName, current: &Ref, new_ref: &Ref) -> Result<bool> {
        let name = if current.is_null() {
            new_ref.name()
        } else {
            current.name()
        };
        if name != new_ref.name() {
            return Err(GlobalRefDbError::RefNameMismatch {
                expected: name.to_string(),
                actual: new_ref.name().to_string(),
            });
        }
        validate_ref_name(name)?;

        let mut refs = self.refs()?;
        let stored = refs
            .get(project)
            .and_then(|p| p.get(name))
            .cloned()
            .unwrap_or_else(Ref::null);
        if !stored.matches_for_cas(current) {
            debug!(%project, ref_name = name, expected = %current, found = %stored, "compare-and-put mismatch");
            return Ok(false);
        }

        let deletes = !new_ref.is_symbolic() && new_ref.object_id_or_zero().is_zero();
        if deletes {
            if let Some(project_refs) = refs.get_mut(project) {
                project_refs.remove(name);
                if project_refs.is_empty() {
                    refs.remove(project);
                }
            }
        } else {
            refs.entry(project.clone())
                .or_default()
                .insert(name.to_string(), stored_value(new_ref));
        }
        debug!(%project, ref_name = name, value = %new_ref, "compare-and-put applied");
        Ok(true)
    }

    fn lock_ref(&self, project: &ProjectName, ref_name: &str) -> Result<RefLock> {
        validate_ref_name(ref_name)?;
        let key: LockKey = (project.clone(), ref_name.to_string());
        let owner = Uuid::now_v7();
        let deadline = Instant::now() + self.lock_timeout;

        let mut locks = self.shared.locks.lock().map_err(|e| {
            GlobalRefDbError::lock(project, ref_name, format!("lock table poisoned: {e}"))
        })?;
        while locks.contains_key(&key) {
            let now = Instant::now();
            if now >= deadline {
                warn!(%project, ref_name, timeout = ?self.lock_timeout, "ref lock timed out");
                return Err(GlobalRefDbError::lock(
                    project,
                    ref_name,
                    format!("held by another owner after waiting {:?}", self.lock_timeout),
                ));
            }
            let (guard, _) = self
                .shared
                .released
                .wait_timeout(locks, deadline - now)
                .map_err(|e| {
                    GlobalRefDbError::lock(project, ref_name, format!("lock table poisoned: {e}"))
                })?;
            locks = guard;
        }
        locks.insert(key.clone(), owner);
        drop(locks);
        debug!(%project, ref_name, %owner, "ref lock acquired");

        let shared = Arc::clone(&self.shared);
        Ok(RefLock::new(project.clone(), ref_name, owner, move || {
            shared.release(&key, owner);
        }))
    }

    fn exists(&self, project: &ProjectName, ref_name: &str) -> bool {
        let refs = self.shared.refs.lock().unwrap_or_else(PoisonError::into_inner);
        refs.get(project).is_some_and(|p| p.contains_key(ref_name))
    }

    fn remove_project(&self, project: &ProjectName) -> Result<()> {
        let locks = self
            .shared
            .locks
            .lock()
            .map_err(|e| GlobalRefDbError::Storage(format!("lock table poisoned: {e}")))?;
        let held = locks.keys().filter(|(p, _)| p == project).count();
        if held > 0 {
            warn!(%project, held, "refusing to remove project with held ref locks");
            return Err(GlobalRefDbError::Storage(format!(
                "cannot remove project {project}: {held} ref lock(s) held"
            )));
        }
        let mut refs = self.refs()?;
        let removed = refs.remove(project).map(|p| p.len()).unwrap_or(0);
        debug!(%project, removed, "project removed from global ref database");
        Ok(())
    }
}

/// The form a value takes once recorded by the store.
fn stored_value(new_ref: &Ref) -> Ref {
    match new_ref.target() {
        Some(target) => Ref::symbolic(new_ref.name(), target, RefStorage::Loose),
        None => match new_ref.peeled_object_id() {
            Some(peeled) => Ref::peeled_tag(
                new_ref.name(),
                new_ref.object_id_or_zero(),
                peeled,
                RefStorage::Loose,
            ),
            None => Ref::object(new_ref.name(), new_ref.object_id_or_zero(), RefStorage::Loose),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdb_types::ObjectId;
    use std::sync::mpsc;
    use std::thread;

    fn project() -> ProjectName {
        ProjectName::new("gerrit").unwrap()
    }

    fn id(n: u8) -> ObjectId {
        ObjectId::from_raw([n; 20])
    }

    fn fast_db() -> InMemoryGlobalRefDatabase {
        InMemoryGlobalRefDatabase::with_config(
            &GlobalRefDbConfig::default().with_lock_timeout(Duration::from_millis(50)),
        )
    }

    #[test]
    fn create_from_null_only_once() {
        let db = InMemoryGlobalRefDatabase::new();
        let p = project();
        let desired = Ref::new_ref("refs/x", id(1));

        assert!(db.compare_and_put(&p, &Ref::null(), &desired).unwrap());
        assert!(!db.compare_and_put(&p, &Ref::null(), &desired).unwrap());
        assert!(db.exists(&p, "refs/x"));
    }

    #[test]
    fn update_requires_current_value() {
        let db = InMemoryGlobalRefDatabase::new();
        let p = project();
        let v1 = Ref::new_ref("refs/heads/master", id(1));
        let v2 = Ref::new_ref("refs/heads/master", id(2));
        let v3 = Ref::new_ref("refs/heads/master", id(3));
        db.compare_and_put(&p, &Ref::null(), &v1).unwrap();

        // Stale expectation.
        assert!(!db.compare_and_put(&p, &v2, &v3).unwrap());
        assert!(db.compare_and_put(&p, &v1, &v2).unwrap());
        assert_eq!(
            db.get(&p, "refs/heads/master").unwrap().unwrap().object_id(),
            Some(id(2))
        );
    }

    #[test]
    fn stored_values_are_not_network_refs() {
        let db = InMemoryGlobalRefDatabase::new();
        let p = project();
        db.compare_and_put(&p, &Ref::null(), &Ref::new_ref("refs/x", id(1)))
            .unwrap();
        let stored = db.get(&p, "refs/x").unwrap().unwrap();
        assert_eq!(stored.storage(), RefStorage::Loose);
    }

    #[test]
    fn zero_new_value_deletes() {
        let db = InMemoryGlobalRefDatabase::new();
        let p = project();
        let v1 = Ref::new_ref("refs/x", id(1));
        db.compare_and_put(&p, &Ref::null(), &v1).unwrap();
        assert!(db
            .compare_and_put(&p, &v1, &Ref::new_ref("refs/x", ObjectId::zero()))
            .unwrap());
        assert!(!db.exists(&p, "refs/x"));
        assert!(db.ref_names(&p).unwrap().is_empty());
    }

    #[test]
    fn symbolic_refs_compare_by_target() {
        let db = InMemoryGlobalRefDatabase::new();
        let p = project();
        let head = Ref::symbolic("HEAD", "refs/heads/master", RefStorage::Network);
        db.compare_and_put(&p, &Ref::null(), &head).unwrap();

        let object_head = Ref::object("HEAD", id(1), RefStorage::Loose);
        let stable = Ref::symbolic("HEAD", "refs/heads/stable", RefStorage::Network);
        assert!(!db.compare_and_put(&p, &object_head, &stable).unwrap());
        assert!(db.compare_and_put(&p, &head, &stable).unwrap());
        assert_eq!(db.get(&p, "HEAD").unwrap().unwrap().target(), Some("refs/heads/stable"));
    }

    #[test]
    fn name_mismatch_is_an_error() {
        let db = InMemoryGlobalRefDatabase::new();
        let p = project();
        let err = db
            .compare_and_put(
                &p,
                &Ref::new_ref("refs/a", id(1)),
                &Ref::new_ref("refs/b", id(2)),
            )
            .unwrap_err();
        assert!(matches!(err, GlobalRefDbError::RefNameMismatch { .. }));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let db = InMemoryGlobalRefDatabase::new();
        let err = db
            .compare_and_put(&project(), &Ref::null(), &Ref::new_ref("refs/a..b", id(1)))
            .unwrap_err();
        assert!(matches!(err, GlobalRefDbError::InvalidRef(_)));
        assert!(!err.is_lock_failure());
    }

    #[test]
    fn projects_are_isolated() {
        let db = InMemoryGlobalRefDatabase::new();
        let a = ProjectName::new("a").unwrap();
        let b = ProjectName::new("b").unwrap();
        db.compare_and_put(&a, &Ref::null(), &Ref::new_ref("refs/x", id(1)))
            .unwrap();
        assert!(!db.exists(&b, "refs/x"));
        assert!(db
            .compare_and_put(&b, &Ref::null(), &Ref::new_ref("refs/x", id(2)))
            .unwrap());
    }

    #[test]
    fn up_to_date_tracks_latest_value() {
        let db = InMemoryGlobalRefDatabase::new();
        let p = project();
        let v1 = Ref::object("refs/heads/master", id(1), RefStorage::Loose);
        // Unknown to the store.
        assert!(db.is_up_to_date(&p, &v1).unwrap());

        db.compare_and_put(&p, &Ref::null(), &Ref::new_ref("refs/heads/master", id(1)))
            .unwrap();
        assert!(db.is_up_to_date(&p, &v1).unwrap());

        db.compare_and_put(&p, &v1, &Ref::new_ref("refs/heads/master", id(2)))
            .unwrap();
        assert!(!db.is_up_to_date(&p, &v1).unwrap());
    }

    #[test]
    fn second_lock_times_out() {
        let db = fast_db();
        let p = project();
        let _held = db.lock_ref(&p, "refs/heads/master").unwrap();

        let err = db.lock_ref(&p, "refs/heads/master").unwrap_err();
        assert!(err.is_lock_failure());
        match err {
            GlobalRefDbError::Lock { project, ref_name, .. } => {
                assert_eq!(project, p);
                assert_eq!(ref_name, "refs/heads/master");
            }
            other => panic!("expected lock error, got {other}"),
        }
    }

    #[test]
    fn lock_is_reacquirable_after_release() {
        let db = fast_db();
        let p = project();
        let mut lock = db.lock_ref(&p, "refs/heads/master").unwrap();
        assert!(db.is_locked(&p, "refs/heads/master"));
        lock.release();
        lock.release();
        assert!(!db.is_locked(&p, "refs/heads/master"));
        let _again = db.lock_ref(&p, "refs/heads/master").unwrap();
    }

    #[test]
    fn different_refs_lock_independently() {
        let db = fast_db();
        let p = project();
        let _a = db.lock_ref(&p, "refs/heads/a").unwrap();
        let _b = db.lock_ref(&p, "refs/heads/b").unwrap();
        let other = ProjectName::new("other").unwrap();
        let _c = db.lock_ref(&other, "refs/heads/a").unwrap();
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let db = InMemoryGlobalRefDatabase::with_config(
            &GlobalRefDbConfig::default().with_lock_timeout(Duration::from_secs(5)),
        );
        let p = project();
        let held = db.lock_ref(&p, "refs/heads/master").unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let waiter = {
            let db = db.clone();
            let p = p.clone();
            thread::spawn(move || {
                started_tx.send(()).unwrap();
                db.lock_ref(&p, "refs/heads/master").map(|l| l.owner())
            })
        };
        started_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        let first_owner = held.owner();
        drop(held);

        let second_owner = waiter.join().unwrap().unwrap();
        assert_ne!(first_owner, second_owner);
    }

    #[test]
    fn lock_refs_is_all_or_nothing() {
        let db = fast_db();
        let p = project();
        let _blocker = db.lock_ref(&p, "refs/heads/b").unwrap();

        let names = vec!["refs/heads/c".to_string(), "refs/heads/b".to_string(), "refs/heads/a".to_string()];
        let err = db.lock_refs(&p, &names).unwrap_err();
        assert!(err.is_lock_failure());
        // "refs/heads/a" was taken first and must have been given back.
        assert!(!db.is_locked(&p, "refs/heads/a"));
        assert!(!db.is_locked(&p, "refs/heads/c"));
    }

    #[test]
    fn lock_refs_sorts_and_dedups() {
        let db = fast_db();
        let p = project();
        let names = vec![
            "refs/heads/z".to_string(),
            "refs/heads/a".to_string(),
            "refs/heads/z".to_string(),
        ];
        let set = db.lock_refs(&p, &names).unwrap();
        assert_eq!(set.ref_names().collect::<Vec<_>>(), vec!["refs/heads/a", "refs/heads/z"]);
        drop(set);
        assert!(!db.is_locked(&p, "refs/heads/z"));
    }

    #[test]
    fn remove_unknown_project_is_noop() {
        let db = InMemoryGlobalRefDatabase::new();
        db.remove_project(&project()).unwrap();
    }

    #[test]
    fn remove_project_purges_refs() {
        let db = InMemoryGlobalRefDatabase::new();
        let p = project();
        db.compare_and_put(&p, &Ref::null(), &Ref::new_ref("refs/x", id(1)))
            .unwrap();
        db.remove_project(&p).unwrap();
        assert!(!db.exists(&p, "refs/x"));
        assert!(db
            .compare_and_put(&p, &Ref::null(), &Ref::new_ref("refs/x", id(1)))
            .unwrap());
    }

    #[test]
    fn remove_project_fails_closed_while_locked() {
        let db = fast_db();
        let p = project();
        db.compare_and_put(&p, &Ref::null(), &Ref::new_ref("refs/x", id(1)))
            .unwrap();
        let lock = db.lock_ref(&p, "refs/x").unwrap();

        let err = db.remove_project(&p).unwrap_err();
        assert!(matches!(err, GlobalRefDbError::Storage(_)));
        assert!(db.exists(&p, "refs/x"), "state must be left untouched");

        drop(lock);
        db.remove_project(&p).unwrap();
        assert!(!db.exists(&p, "refs/x"));
    }
}
