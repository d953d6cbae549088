//! Contention simulation: several threads stand in for replicas that share
//! one repository and coordinate through a global ref database.

use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use anyhow::Context;
use refdb_batch::{retry_on_lock_failure, BatchError, BatchRefUpdate, BatchResult, RetryConfig};
use refdb_global::{GlobalRefDatabase, GlobalRefDbError};
use refdb_types::{ObjectId, ProjectName};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct SimulationParams {
    pub project: ProjectName,
    pub replicas: usize,
    pub batches: usize,
    pub refs: usize,
}

/// What one replica saw.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReplicaStats {
    pub replica: usize,
    pub succeeded: usize,
    pub retries: usize,
    pub exhausted: usize,
    pub failed: usize,
    /// Refs this replica overwrote without having seen their latest value.
    pub lost_updates: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefState {
    pub name: String,
    pub id: Option<ObjectId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulationReport {
    pub project: ProjectName,
    pub replicas: Vec<ReplicaStats>,
    pub refs: Vec<RefState>,
}

impl SimulationReport {
    pub fn total(&self, f: impl Fn(&ReplicaStats) -> usize) -> usize {
        self.replicas.iter().map(f).sum()
    }
}

/// The git refs every replica reads from and writes to.
#[derive(Default)]
struct Repository {
    refs: Mutex<HashMap<String, ObjectId>>,
}

impl Repository {
    fn read(&self, names: &[String]) -> BatchResult<Vec<ObjectId>> {
        let refs = self
            .refs
            .lock()
            .map_err(|_| GlobalRefDbError::Storage("repository poisoned".into()))?;
        Ok(names
            .iter()
            .map(|n| refs.get(n).copied().unwrap_or_else(ObjectId::zero))
            .collect())
    }

    /// Write an applied batch; returns how many refs no longer held the
    /// value the batch expected.
    fn write(&self, batch: &BatchRefUpdate) -> BatchResult<usize> {
        let mut refs = self
            .refs
            .lock()
            .map_err(|_| GlobalRefDbError::Storage("repository poisoned".into()))?;
        let mut lost = 0;
        for command in batch.commands() {
            let current = refs.get(command.ref_name()).copied().unwrap_or_else(ObjectId::zero);
            if current != command.old_id() {
                lost += 1;
            }
            refs.insert(command.ref_name().to_string(), command.new_id());
        }
        Ok(lost)
    }
}

fn ref_name(index: usize) -> String {
    format!("refs/heads/sim-{index}")
}

/// Distinct id for the value replica `replica` writes in batch `batch`.
fn value_id(replica: usize, batch: usize, ref_index: usize) -> ObjectId {
    let mut raw = [0u8; 20];
    raw[..8].copy_from_slice(&(replica as u64 + 1).to_be_bytes());
    raw[8..16].copy_from_slice(&(batch as u64).to_be_bytes());
    raw[16..].copy_from_slice(&(ref_index as u32).to_be_bytes());
    ObjectId::from_raw(raw)
}

fn run_replica(
    db: &dyn GlobalRefDatabase,
    repo: &Repository,
    retry: &RetryConfig,
    params: &SimulationParams,
    replica: usize,
) -> ReplicaStats {
    let mut stats = ReplicaStats {
        replica,
        ..Default::default()
    };
    let names: Vec<String> = (0..params.refs).map(ref_name).collect();
    for batch_no in 0..params.batches {
        let outcome = retry_on_lock_failure(retry, |attempt| -> BatchResult<usize> {
            if attempt > 1 {
                stats.retries += 1;
            }
            // Re-read the repository on every attempt.
            let old = repo.read(&names)?;
            let mut batch = BatchRefUpdate::new();
            for (i, (name, old)) in names.iter().zip(old).enumerate() {
                batch.add_update(name.as_str(), old, value_id(replica, batch_no, i))?;
            }
            batch.execute_checked(db, &params.project)?;
            repo.write(&batch)
        });
        match outcome {
            Ok(lost) => {
                stats.succeeded += 1;
                stats.lost_updates += lost;
            }
            Err(BatchError::RetriesExhausted { .. }) => stats.exhausted += 1,
            Err(e) => {
                debug!(replica, batch = batch_no, error = %e, "batch failed");
                stats.failed += 1;
            }
        }
    }
    stats
}

/// Run the replicas against `db` and report what each one saw.
pub fn run(
    params: SimulationParams,
    db: Arc<dyn GlobalRefDatabase>,
    retry: &RetryConfig,
) -> anyhow::Result<SimulationReport> {
    let repo = Arc::new(Repository::default());
    let params = Arc::new(params);
    let barrier = Arc::new(Barrier::new(params.replicas.max(1)));
    info!(
        project = %params.project,
        replicas = params.replicas,
        batches = params.batches,
        refs = params.refs,
        "starting simulation"
    );

    let handles: Vec<_> = (0..params.replicas)
        .map(|replica| {
            let db = Arc::clone(&db);
            let repo = Arc::clone(&repo);
            let retry = retry.clone();
            let params = Arc::clone(&params);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                run_replica(db.as_ref(), &repo, &retry, &params, replica)
            })
        })
        .collect();

    let mut replicas = Vec::with_capacity(handles.len());
    for handle in handles {
        let stats = handle
            .join()
            .map_err(|_| anyhow::anyhow!("replica thread panicked"))?;
        replicas.push(stats);
    }

    let names: Vec<String> = (0..params.refs).map(ref_name).collect();
    let ids = repo.read(&names).context("reading final refs")?;
    let refs = names
        .into_iter()
        .zip(ids)
        .map(|(name, id)| RefState {
            name,
            id: (!id.is_zero()).then_some(id),
        })
        .collect();

    Ok(SimulationReport {
        project: params.project.clone(),
        replicas,
        refs,
    })
}
