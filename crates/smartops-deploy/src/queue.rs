//! In-process task queue.
//!
//! Delivery is an unbounded channel to the worker pool. Durability comes
//! from the `tasks` table: handlers persist a task before sending it, and
//! workers delete it once handled, so tasks still in the table at startup
//! are re-sent by [`LocalTaskQueue::recover`].

use smartops_lifecycle::{QueueError, TaskQueue};
use smartops_state::{StateResult, StateStore, TaskRecord};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::lock::{clear_stale_leases, with_store};

pub type TaskReceiver = mpsc::UnboundedReceiver<TaskRecord>;

#[derive(Debug, Clone)]
pub struct LocalTaskQueue {
    sender: mpsc::UnboundedSender<TaskRecord>,
}

impl LocalTaskQueue {
    /// A queue plus the receiving end for the worker pool.
    pub fn channel() -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Re-send every task that was accepted but never acknowledged.
    ///
    /// Leases held by the previous run are cleared first, otherwise the
    /// re-sent tasks would find their app still locked and be abandoned.
    pub async fn recover(&self, store: &StateStore) -> StateResult<usize> {
        clear_stale_leases(store).await?;
        let pending = with_store(store, |store| store.list::<TaskRecord>()).await?;
        let count = pending.len();
        for task in &pending {
            if self.send(task).is_err() {
                break;
            }
        }
        if count > 0 {
            info!(count, "re-sent unacknowledged tasks");
        }
        Ok(count)
    }
}

impl TaskQueue for LocalTaskQueue {
    fn send(&self, task: &TaskRecord) -> Result<(), QueueError> {
        self.sender
            .send(task.clone())
            .map_err(|_| QueueError::Closed)?;
        debug!(task_id = task.id, name = %task.name, "task queued");
        Ok(())
    }
}
