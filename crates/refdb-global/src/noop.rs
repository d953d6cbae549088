//! Global ref database for a replica that runs alone.

use refdb_refs::Ref;
use refdb_types::ProjectName;

use crate::error::Result;
use crate::lock::RefLock;
use crate::traits::GlobalRefDatabase;

/// A [`GlobalRefDatabase`] that records nothing and never disagrees.
///
/// Every ref is up to date, every compare-and-put succeeds and every lock is
/// granted at once. Local git ref updates remain the only guard, which is
/// correct when no other replica shares the repository.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopGlobalRefDatabase;

impl GlobalRefDatabase for NoopGlobalRefDatabase {
    fn is_up_to_date(&self, _project: &ProjectName, _reference: &Ref) -> Result<bool> {
        Ok(true)
    }

    fn compare_and_put(&self, _project: &ProjectName, _current: &Ref, _new_ref: &Ref) -> Result<bool> {
        Ok(true)
    }

    fn lock_ref(&self, project: &ProjectName, ref_name: &str) -> Result<RefLock> {
        Ok(RefLock::unbound(project.clone(), ref_name))
    }

    fn exists(&self, _project: &ProjectName, _ref_name: &str) -> bool {
        false
    }

    fn remove_project(&self, _project: &ProjectName) -> Result<()> {
        Ok(())
    }
}
