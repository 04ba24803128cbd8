//! Serialized action lock.
//!
//! A named lease in the store, shared by every worker of the daemon.
//! Acquisition polls until a timeout. A lease expires on its own if its
//! holder dies without releasing it, and leases of an earlier run are
//! dropped by [`clear_stale_leases`] when that run's tasks are recovered.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use smartops_state::{
    AppId, Lease, StateError, StateResult, StateStore, action_lock_name, epoch_millis,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::LockError;

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);
static PROCESS_TOKEN: OnceLock<String> = OnceLock::new();

/// Identifies this process run in lease owners: pid plus start time, so a
/// restarted daemon that gets the same pid is still told apart.
fn process_token() -> &'static str {
    PROCESS_TOKEN.get_or_init(|| format!("{}.{}", std::process::id(), epoch_millis()))
}

fn next_owner() -> String {
    format!(
        "{}-{}",
        process_token(),
        NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Whether `lease` was taken by this process run.
pub fn held_by_this_process(lease: &Lease) -> bool {
    lease
        .owner
        .strip_prefix(process_token())
        .is_some_and(|rest| rest.starts_with('-'))
}

/// Drop leases left behind by earlier runs of the daemon. Their holders
/// are gone.
pub async fn clear_stale_leases(store: &StateStore) -> StateResult<Vec<Lease>> {
    let dropped = with_store(store, |store| store.clear_leases(held_by_this_process)).await?;
    for lease in &dropped {
        info!(lock = %lease.name, owner = %lease.owner, "cleared lease from an earlier run");
    }
    Ok(dropped)
}

/// Run a store call on tokio's blocking pool.
pub(crate) async fn with_store<T, F>(store: &StateStore, f: F) -> StateResult<T>
where
    F: FnOnce(&StateStore) -> StateResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| StateError::Interrupted(e.to_string()))?
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// How long to keep trying before giving up.
    pub acquire_timeout: Duration,
    /// How long a held lease stays valid without being released.
    pub lease: Duration,
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_millis(1000),
            lease: Duration::from_secs(1000),
            poll_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Clone)]
pub struct SerializedActionLock {
    store: StateStore,
    config: LockConfig,
}

impl SerializedActionLock {
    pub fn new(store: StateStore, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Lease name guarding actions on `app_id`.
    pub fn lock_name(app_id: AppId) -> String {
        action_lock_name(app_id)
    }

    /// Wait up to the acquire timeout for the lock on `app_id`.
    pub async fn acquire(&self, app_id: AppId) -> Result<ActionLockGuard, LockError> {
        let name = Self::lock_name(app_id);
        let owner = next_owner();
        let lease = self.config.lease;
        let started = Instant::now();

        loop {
            let acquired = {
                let (name, owner) = (name.clone(), owner.clone());
                with_store(&self.store, move |store| {
                    store.try_acquire_lease(&name, &owner, lease)
                })
                .await?
            };
            if acquired {
                debug!(lock = %name, %owner, "acquired lock");
                return Ok(ActionLockGuard {
                    store: self.store.clone(),
                    name,
                    owner,
                    released: false,
                });
            }

            let waited = started.elapsed();
            if waited >= self.config.acquire_timeout {
                info!(lock = %name, ?waited, "lock is already held");
                return Err(LockError::Unavailable { name, waited });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

/// Holds the lock until released or dropped.
pub struct ActionLockGuard {
    store: StateStore,
    name: String,
    owner: String,
    released: bool,
}

impl ActionLockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release now and report whether this guard still held the lease.
    pub async fn release(mut self) -> Result<bool, LockError> {
        self.released = true;
        let (name, owner) = (self.name.clone(), self.owner.clone());
        let held = with_store(&self.store, move |store| store.release_lease(&name, &owner)).await?;
        debug!(lock = %self.name, held, "released lock");
        Ok(held)
    }
}

impl Drop for ActionLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.store.release_lease(&self.name, &self.owner) {
            Ok(_) => debug!(lock = %self.name, "released lock"),
            Err(e) => warn!(lock = %self.name, error = %e, "failed to release lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> LockConfig {
        LockConfig {
            acquire_timeout: Duration::from_millis(100),
            lease: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn second_acquire_times_out() {
        let store = StateStore::open_in_memory().unwrap();
        let lock = SerializedActionLock::new(store, quick());

        let guard = lock.acquire(1).await.unwrap();
        assert_eq!(guard.name(), "serialized_action:1");

        let err = lock.acquire(1).await.err().unwrap();
        match err {
            LockError::Unavailable { name, waited } => {
                assert_eq!(name, "serialized_action:1");
                assert!(waited >= Duration::from_millis(100));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Different apps do not contend.
        lock.acquire(2).await.unwrap();
    }

    #[tokio::test]
    async fn drop_releases() {
        let store = StateStore::open_in_memory().unwrap();
        let lock = SerializedActionLock::new(store.clone(), quick());

        {
            let _guard = lock.acquire(1).await.unwrap();
        }
        assert!(store.get_lease("serialized_action:1").unwrap().is_none());
        let guard = lock.acquire(1).await.unwrap();
        assert!(guard.release().await.unwrap());
    }

    #[tokio::test]
    async fn waiter_gets_lock_once_released() {
        let store = StateStore::open_in_memory().unwrap();
        let lock = SerializedActionLock::new(
            store,
            LockConfig {
                acquire_timeout: Duration::from_secs(5),
                ..quick()
            },
        );

        let guard = lock.acquire(1).await.unwrap();
        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire(1).await.map(|g| g.name().to_string()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(guard);

        assert_eq!(waiter.await.unwrap().unwrap(), "serialized_action:1");
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .try_acquire_lease("serialized_action:1", "dead-worker", Duration::ZERO)
            .unwrap();
        let lock = SerializedActionLock::new(store, quick());
        lock.acquire(1).await.unwrap();
    }

    #[tokio::test]
    async fn leases_from_earlier_runs_are_cleared() {
        let store = StateStore::open_in_memory().unwrap();
        let lock = SerializedActionLock::new(store.clone(), quick());
        let live = lock.acquire(2).await.unwrap();
        store
            .try_acquire_lease("serialized_action:1", "4242.17-1", Duration::from_secs(1000))
            .unwrap();

        let dropped = clear_stale_leases(&store).await.unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].owner, "4242.17-1");

        // The live guard's lease survives; the stale one is free again.
        assert!(store.get_lease(live.name()).unwrap().is_some());
        lock.acquire(1).await.unwrap();
    }

    #[test]
    fn owner_prefix_must_match_whole_token() {
        let lease = |owner: String| Lease {
            name: "serialized_action:1".to_string(),
            owner,
            expires_at_ms: 0,
        };
        assert!(held_by_this_process(&lease(next_owner())));
        assert!(!held_by_this_process(&lease(format!("{}9-1", process_token()))));
        assert!(!held_by_this_process(&lease("1.2-3".to_string())));
    }

    #[tokio::test]
    async fn store_calls_leave_the_runtime_free() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicBool;

        let store = StateStore::open_in_memory().unwrap();
        let ticked = Arc::new(AtomicBool::new(false));
        let ticker = {
            let ticked = ticked.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticked.store(true, Ordering::SeqCst);
            })
        };

        // A slow call; on the single runtime thread the ticker could not run meanwhile.
        let seen = {
            let ticked = ticked.clone();
            with_store(&store, move |store| {
                std::thread::sleep(Duration::from_millis(300));
                store.get_lease("serialized_action:1")?;
                Ok(ticked.load(Ordering::SeqCst))
            })
            .await
            .unwrap()
        };
        assert!(seen);
        ticker.await.unwrap();
    }
}
