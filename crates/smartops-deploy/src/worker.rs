//! Worker pool — tokio tasks draining the task queue.
//!
//! Each task is claimed from the `tasks` table before it runs and deleted
//! (acknowledged) afterwards, whatever the outcome. A task that is not in
//! the table was either never committed or already handled, and is
//! dropped.

use std::sync::Arc;

use smartops_lifecycle::Task;
use smartops_state::{StateResult, StateStore, TaskRecord};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actions::{ActionOutcome, DeployActions};
use crate::lock::with_store;
use crate::queue::TaskReceiver;

pub const DEFAULT_WORKERS: usize = 4;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `count` workers sharing one receiver.
    pub fn spawn(count: usize, store: StateStore, actions: DeployActions, receiver: TaskReceiver) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..count.max(1))
            .map(|worker| {
                let store = store.clone();
                let actions = actions.clone();
                let receiver = receiver.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    run_worker(worker, store, actions, receiver, shutdown).await;
                })
            })
            .collect::<Vec<_>>();

        info!(workers = handles.len(), "worker pool started");
        Self {
            handles,
            shutdown_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop taking new tasks and wait for in-flight ones to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker panicked");
            }
        }
        info!("worker pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    store: StateStore,
    actions: DeployActions,
    receiver: Arc<Mutex<TaskReceiver>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker, "worker started");
    loop {
        let record = tokio::select! {
            _ = shutdown.changed() => break,
            record = async { receiver.lock().await.recv().await } => match record {
                Some(record) => record,
                None => break,
            },
        };
        process(worker, &store, &actions, record).await;
    }
    debug!(worker, "worker stopped");
}

/// Claim, run and acknowledge one task.
pub async fn process(
    worker: usize,
    store: &StateStore,
    actions: &DeployActions,
    record: TaskRecord,
) -> Option<ActionOutcome> {
    let task_id = record.id;

    // A write transaction waits for the enqueuing handler to commit.
    let claimed = with_store(store, move |store| {
        store.write(|txn| txn.get::<TaskRecord>(task_id))
    })
    .await;
    match claimed {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(worker, task_id, "task no longer pending, skipping");
            return None;
        }
        Err(e) => {
            error!(worker, task_id, error = %e, "cannot claim task");
            return None;
        }
    }

    let outcome = match Task::try_from(&record) {
        Ok(task) => {
            debug!(worker, task_id, task = task.kind.as_str(), app_id = task.args.app_id, "running task");
            let outcome = actions.run(&task).await;
            match &outcome {
                ActionOutcome::Completed => info!(worker, task_id, "task completed"),
                ActionOutcome::Failed(message) => warn!(worker, task_id, %message, "task failed"),
                ActionOutcome::Abandoned => info!(worker, task_id, "task abandoned"),
            }
            Some(outcome)
        }
        Err(e) => {
            error!(worker, task_id, name = %record.name, error = %e, "dropping undecodable task");
            None
        }
    };

    if let Err(e) = acknowledge(store, task_id).await {
        error!(worker, task_id, error = %e, "failed to acknowledge task");
    }
    outcome
}

async fn acknowledge(store: &StateStore, task_id: u64) -> StateResult<bool> {
    with_store(store, move |store| {
        store.write(|txn| txn.remove::<TaskRecord>(task_id))
    })
    .await
}
