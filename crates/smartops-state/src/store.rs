//! StateStore — redb-backed record persistence for SmartOps.
//!
//! Single-record reads go through [`StateStore::get`] / [`StateStore::list`].
//! Anything that touches more than one record runs inside
//! [`StateStore::write`], which commits the closure's writes only when it
//! returns `Ok`. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Closure factories turning a `Display` error into a `StateError`.
macro_rules! map_err {
    (open) => {
        |e| StateError::Open(e.to_string())
    };
    (codec $kind:expr) => {
        |e| StateError::Codec {
            kind: $kind,
            message: e.to_string(),
        }
    };
    ($op:literal) => {
        |e| StateError::Storage {
            op: $op,
            message: e.to_string(),
        }
    };
}

/// Unique-name indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameIndex {
    Apps,
    CapacityPlans,
}

impl NameIndex {
    fn table(self) -> TableDefinition<'static, &'static str, u64> {
        match self {
            NameIndex::Apps => APP_NAMES,
            NameIndex::CapacityPlans => CAPACITY_PLAN_NAMES,
        }
    }

    fn label(self) -> &'static str {
        match self {
            NameIndex::Apps => "app name",
            NameIndex::CapacityPlans => "capacity plan name",
        }
    }
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!("begin"))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [APPS, STATUSES, BLUEPRINTS, SLAS, CAPACITY_PLANS, TASKS] {
            txn.open_table(table).map_err(map_err!("open table"))?;
        }
        for table in [APP_NAMES, CAPACITY_PLAN_NAMES, SEQUENCES] {
            txn.open_table(table).map_err(map_err!("open table"))?;
        }
        txn.open_table(LOCKS).map_err(map_err!("open table"))?;
        txn.commit().map_err(map_err!("commit"))?;
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────────

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`; aborts, discarding every write made
    /// through the handle, when it returns `Err`.
    pub fn write<T, E>(&self, f: impl FnOnce(&mut WriteTxn) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StateError>,
    {
        let inner = self.db.begin_write().map_err(map_err!("begin"))?;
        let mut txn = WriteTxn { inner };
        match f(&mut txn) {
            Ok(value) => {
                txn.inner.commit().map_err(map_err!("commit"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.inner.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }

    /// Run `f` against a consistent read snapshot.
    pub fn read<T, E>(&self, f: impl FnOnce(&ReadTxn) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StateError>,
    {
        let inner = self.db.begin_read().map_err(map_err!("begin"))?;
        f(&ReadTxn { inner })
    }

    /// Get one record by id.
    pub fn get<R: Record>(&self, id: u64) -> StateResult<Option<R>> {
        self.read(|txn| txn.get(id))
    }

    /// List every record of a kind, in id order.
    pub fn list<R: Record>(&self) -> StateResult<Vec<R>> {
        self.read(|txn| txn.list())
    }

    // ── Leases ─────────────────────────────────────────────────────

    /// Take the named lease if it is free or expired. Returns true on success.
    pub fn try_acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> StateResult<bool> {
        let now = epoch_millis();
        self.write(|txn| {
            let mut table = txn.inner.open_table(LOCKS).map_err(map_err!("open table"))?;
            let current: Option<Lease> = match table.get(name).map_err(map_err!("read"))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(codec "lease"))?)
                }
                None => None,
            };
            if let Some(lease) = current {
                if !lease.is_expired(now) {
                    return Ok(false);
                }
                debug!(%name, previous_owner = %lease.owner, "taking over expired lease");
            }

            let lease = Lease {
                name: name.to_string(),
                owner: owner.to_string(),
                expires_at_ms: now.saturating_add(ttl.as_millis() as u64),
            };
            let value = serde_json::to_vec(&lease).map_err(map_err!(codec "lease"))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!("write"))?;
            Ok(true)
        })
    }

    /// Release the named lease if `owner` still holds it. Returns true if released.
    pub fn release_lease(&self, name: &str, owner: &str) -> StateResult<bool> {
        self.write(|txn| {
            let mut table = txn.inner.open_table(LOCKS).map_err(map_err!("open table"))?;
            let held_by_owner = match table.get(name).map_err(map_err!("read"))? {
                Some(guard) => {
                    let lease: Lease =
                        serde_json::from_slice(guard.value()).map_err(map_err!(codec "lease"))?;
                    lease.owner == owner
                }
                None => false,
            };
            if held_by_owner {
                table.remove(name).map_err(map_err!("write"))?;
            }
            Ok(held_by_owner)
        })
    }

    /// Drop every lease for which `keep` returns false, returning what was dropped.
    pub fn clear_leases(&self, keep: impl Fn(&Lease) -> bool) -> StateResult<Vec<Lease>> {
        self.write(|txn| {
            let mut table = txn.inner.open_table(LOCKS).map_err(map_err!("open table"))?;
            let mut dropped = Vec::new();
            for entry in table.iter().map_err(map_err!("read"))? {
                let (_, value) = entry.map_err(map_err!("read"))?;
                let lease: Lease =
                    serde_json::from_slice(value.value()).map_err(map_err!(codec "lease"))?;
                if !keep(&lease) {
                    dropped.push(lease);
                }
            }
            for lease in &dropped {
                table.remove(lease.name.as_str()).map_err(map_err!("write"))?;
                debug!(name = %lease.name, owner = %lease.owner, "lease cleared");
            }
            Ok(dropped)
        })
    }

    /// Current holder of the named lease, expired or not.
    pub fn get_lease(&self, name: &str) -> StateResult<Option<Lease>> {
        let txn = self.db.begin_read().map_err(map_err!("begin"))?;
        let table = txn.open_table(LOCKS).map_err(map_err!("open table"))?;
        match table.get(name).map_err(map_err!("read"))? {
            Some(guard) => {
                let lease: Lease =
                    serde_json::from_slice(guard.value()).map_err(map_err!(codec "lease"))?;
                Ok(Some(lease))
            }
            None => Ok(None),
        }
    }
}

// ── Transaction handles ────────────────────────────────────────────

/// Read-only snapshot handle.
pub struct ReadTxn {
    inner: redb::ReadTransaction,
}

impl ReadTxn {
    pub fn get<R: Record>(&self, id: u64) -> StateResult<Option<R>> {
        let table = self.inner.open_table(R::TABLE).map_err(map_err!("open table"))?;
        get_from(&table, id)
    }

    pub fn require<R: Record>(&self, id: u64) -> StateResult<R> {
        self.get(id)?.ok_or_else(|| not_found::<R>(id))
    }

    pub fn list<R: Record>(&self) -> StateResult<Vec<R>> {
        let table = self.inner.open_table(R::TABLE).map_err(map_err!("open table"))?;
        list_from(&table)
    }

    pub fn lookup_name(&self, index: NameIndex, name: &str) -> StateResult<Option<u64>> {
        let table = self
            .inner
            .open_table(index.table())
            .map_err(map_err!("open table"))?;
        Ok(table.get(name).map_err(map_err!("read"))?.map(|g| g.value()))
    }
}

/// Write transaction handle passed to [`StateStore::write`] closures.
pub struct WriteTxn {
    inner: redb::WriteTransaction,
}

impl WriteTxn {
    pub fn get<R: Record>(&self, id: u64) -> StateResult<Option<R>> {
        let table = self.inner.open_table(R::TABLE).map_err(map_err!("open table"))?;
        get_from(&table, id)
    }

    /// Like [`get`](Self::get), but a missing record is `NotFound`.
    pub fn require<R: Record>(&self, id: u64) -> StateResult<R> {
        self.get(id)?.ok_or_else(|| not_found::<R>(id))
    }

    pub fn list<R: Record>(&self) -> StateResult<Vec<R>> {
        let table = self.inner.open_table(R::TABLE).map_err(map_err!("open table"))?;
        list_from(&table)
    }

    /// Insert or replace a record.
    pub fn put<R: Record>(&mut self, record: &R) -> StateResult<()> {
        let id = record.id();
        let value = serde_json::to_vec(record).map_err(map_err!(codec R::KIND))?;
        let mut table = self.inner.open_table(R::TABLE).map_err(map_err!("open table"))?;
        table
            .insert(id, value.as_slice())
            .map_err(map_err!("write"))?;
        debug!(kind = R::KIND, id, "record stored");
        Ok(())
    }

    /// Delete a record. Returns true if it existed.
    pub fn remove<R: Record>(&mut self, id: u64) -> StateResult<bool> {
        let mut table = self.inner.open_table(R::TABLE).map_err(map_err!("open table"))?;
        let existed = table.remove(id).map_err(map_err!("write"))?.is_some();
        debug!(kind = R::KIND, id, existed, "record deleted");
        Ok(existed)
    }

    /// Hand out the next surrogate id for a record kind.
    pub fn next_id<R: Record>(&mut self) -> StateResult<u64> {
        let mut table = self.inner.open_table(SEQUENCES).map_err(map_err!("open table"))?;
        let last = table
            .get(R::KIND)
            .map_err(map_err!("read"))?
            .map(|g| g.value())
            .unwrap_or(0);
        let next = last + 1;
        table.insert(R::KIND, next).map_err(map_err!("write"))?;
        Ok(next)
    }

    pub fn lookup_name(&self, index: NameIndex, name: &str) -> StateResult<Option<u64>> {
        let table = self
            .inner
            .open_table(index.table())
            .map_err(map_err!("open table"))?;
        Ok(table.get(name).map_err(map_err!("read"))?.map(|g| g.value()))
    }

    /// Bind a unique name to `id`. Fails with `Duplicate` if another id holds it.
    pub fn claim_name(&mut self, index: NameIndex, name: &str, id: u64) -> StateResult<()> {
        let mut table = self
            .inner
            .open_table(index.table())
            .map_err(map_err!("open table"))?;
        let holder = table.get(name).map_err(map_err!("read"))?.map(|g| g.value());
        match holder {
            Some(existing) if existing != id => Err(StateError::Duplicate(format!(
                "{} {name} already exists",
                index.label()
            ))),
            Some(_) => Ok(()),
            None => {
                table.insert(name, id).map_err(map_err!("write"))?;
                Ok(())
            }
        }
    }

    pub fn release_name(&mut self, index: NameIndex, name: &str) -> StateResult<()> {
        let mut table = self
            .inner
            .open_table(index.table())
            .map_err(map_err!("open table"))?;
        table.remove(name).map_err(map_err!("write"))?;
        Ok(())
    }

    /// Delete the named lease whoever holds it. Returns true if it existed.
    pub fn remove_lease(&mut self, name: &str) -> StateResult<bool> {
        let mut table = self.inner.open_table(LOCKS).map_err(map_err!("open table"))?;
        let existed = table.remove(name).map_err(map_err!("write"))?.is_some();
        Ok(existed)
    }

    /// Delete an app together with every record it owns, its pending
    /// tasks and its action lease.
    pub fn delete_app(&mut self, app_id: AppId) -> StateResult<App> {
        let app: App = self.require(app_id)?;

        if let Some(blueprint_id) = app.blueprint_id {
            self.remove::<Blueprint>(blueprint_id)?;
        }
        if let Some(sla_id) = app.sla_id {
            self.remove::<Sla>(sla_id)?;
        }
        if let Some(plan_id) = app.capacity_plan_id {
            if let Some(plan) = self.get::<CapacityPlan>(plan_id)? {
                self.release_name(NameIndex::CapacityPlans, &plan.name)?;
            }
            self.remove::<CapacityPlan>(plan_id)?;
        }
        for task in self.list::<TaskRecord>()? {
            if task.app_id() == Some(app_id) {
                self.remove::<TaskRecord>(task.id)?;
            }
        }
        self.remove_lease(&action_lock_name(app_id))?;
        self.remove::<AppStatus>(app_id)?;
        self.release_name(NameIndex::Apps, &app.name)?;
        self.remove::<App>(app_id)?;

        debug!(app_id, name = %app.name, "app and owned records deleted");
        Ok(app)
    }
}

fn get_from<R: Record>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> StateResult<Option<R>> {
    match table.get(id).map_err(map_err!("read"))? {
        Some(guard) => {
            let record: R =
                serde_json::from_slice(guard.value()).map_err(map_err!(codec R::KIND))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

fn list_from<R: Record>(table: &impl ReadableTable<u64, &'static [u8]>) -> StateResult<Vec<R>> {
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!("read"))? {
        let (_, value) = entry.map_err(map_err!("read"))?;
        let record: R = serde_json::from_slice(value.value()).map_err(map_err!(codec R::KIND))?;
        results.push(record);
    }
    Ok(results)
}

fn not_found<R: Record>(id: u64) -> StateError {
    StateError::NotFound(format!("{} {id}", R::KIND))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app(txn: &mut WriteTxn, name: &str) -> App {
        let id = txn.next_id::<App>().unwrap();
        txn.claim_name(NameIndex::Apps, name, id).unwrap();
        let app = App::new(id, name);
        txn.put(&app).unwrap();
        txn.put(&AppStatus { app_id: id, status: Status::default() }).unwrap();
        app
    }

    // ── Record CRUD ────────────────────────────────────────────────

    #[test]
    fn app_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let app = store
            .write(|txn| Ok::<_, StateError>(test_app(txn, "shop")))
            .unwrap();

        let retrieved: Option<App> = store.get(app.id).unwrap();
        assert_eq!(retrieved, Some(app));
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get::<App>(42).unwrap().is_none());
    }

    #[test]
    fn require_reports_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.read(|txn| txn.require::<App>(9)).unwrap_err();
        assert!(matches!(err, StateError::NotFound(msg) if msg == "app 9"));
    }

    #[test]
    fn ids_are_sequential_per_kind() {
        let store = StateStore::open_in_memory().unwrap();
        let ids = store
            .write(|txn| {
                Ok::<_, StateError>((
                    txn.next_id::<App>()?,
                    txn.next_id::<App>()?,
                    txn.next_id::<Blueprint>()?,
                ))
            })
            .unwrap();
        assert_eq!(ids, (1, 2, 1));
    }

    #[test]
    fn list_in_id_order() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| {
                test_app(txn, "a");
                test_app(txn, "b");
                test_app(txn, "c");
                Ok::<_, StateError>(())
            })
            .unwrap();

        let names: Vec<String> = store.list::<App>().unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    // ── Transactions ───────────────────────────────────────────────

    #[test]
    fn failed_closure_rolls_back_every_write() {
        let store = StateStore::open_in_memory().unwrap();
        let result: StateResult<()> = store.write(|txn| {
            test_app(txn, "doomed");
            Err(StateError::NotFound("abort".to_string()))
        });
        assert!(result.is_err());

        assert!(store.list::<App>().unwrap().is_empty());
        assert!(store.list::<AppStatus>().unwrap().is_empty());
        let name = store.read(|txn| txn.lookup_name(NameIndex::Apps, "doomed")).unwrap();
        assert!(name.is_none());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .write(|txn| Ok::<_, StateError>(test_app(txn, "shop")))
            .unwrap();

        let err = store
            .write(|txn| txn.claim_name(NameIndex::Apps, "shop", 99))
            .unwrap_err();
        assert!(matches!(err, StateError::Duplicate(_)));
    }

    #[test]
    fn reclaiming_own_name_is_noop() {
        let store = StateStore::open_in_memory().unwrap();
        let app = store
            .write(|txn| Ok::<_, StateError>(test_app(txn, "shop")))
            .unwrap();
        store
            .write(|txn| txn.claim_name(NameIndex::Apps, "shop", app.id))
            .unwrap();
    }

    #[test]
    fn delete_app_cascades() {
        let store = StateStore::open_in_memory().unwrap();
        let app_id = store
            .write(|txn| {
                let mut app = test_app(txn, "shop");
                let sla = Sla {
                    id: txn.next_id::<Sla>()?,
                    app_id: app.id,
                    error_rate: 0.01,
                    latency: 200,
                    cost: DEFAULT_SLA_COST,
                    created_at: 0,
                    updated_at: 0,
                };
                let plan = CapacityPlan {
                    id: txn.next_id::<CapacityPlan>()?,
                    app_id: app.id,
                    name: "plan-a".to_string(),
                    is_auto: false,
                    config: serde_json::json!({}),
                    start_time: 0,
                    status: Status::default(),
                    created_at: 0,
                    updated_at: 0,
                };
                txn.claim_name(NameIndex::CapacityPlans, &plan.name, plan.id)?;
                txn.put(&sla)?;
                txn.put(&plan)?;
                app.sla_id = Some(sla.id);
                app.capacity_plan_id = Some(plan.id);
                txn.put(&app)?;
                Ok::<_, StateError>(app.id)
            })
            .unwrap();

        store.write(|txn| txn.delete_app(app_id)).unwrap();

        assert!(store.get::<App>(app_id).unwrap().is_none());
        assert!(store.get::<AppStatus>(app_id).unwrap().is_none());
        assert!(store.list::<Sla>().unwrap().is_empty());
        assert!(store.list::<CapacityPlan>().unwrap().is_empty());
        // Names are free again.
        store
            .write(|txn| {
                test_app(txn, "shop");
                txn.claim_name(NameIndex::CapacityPlans, "plan-a", 77)
            })
            .unwrap();
    }

    // ── Leases ─────────────────────────────────────────────────────

    #[test]
    fn lease_is_exclusive_until_released() {
        let store = StateStore::open_in_memory().unwrap();
        let ttl = Duration::from_secs(60);

        assert!(store.try_acquire_lease("serialized_action:1", "w0", ttl).unwrap());
        assert!(!store.try_acquire_lease("serialized_action:1", "w1", ttl).unwrap());
        // Other names are independent.
        assert!(store.try_acquire_lease("serialized_action:2", "w1", ttl).unwrap());

        // Only the owner can release.
        assert!(!store.release_lease("serialized_action:1", "w1").unwrap());
        assert!(store.release_lease("serialized_action:1", "w0").unwrap());
        assert!(store.try_acquire_lease("serialized_action:1", "w1", ttl).unwrap());
        assert_eq!(
            store.get_lease("serialized_action:1").unwrap().unwrap().owner,
            "w1"
        );
    }

    #[test]
    fn expired_lease_can_be_taken_over() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.try_acquire_lease("l", "w0", Duration::ZERO).unwrap());
        assert!(store.try_acquire_lease("l", "w1", Duration::from_secs(60)).unwrap());
        assert!(!store.release_lease("l", "w0").unwrap());
    }

    #[test]
    fn clear_leases_keeps_only_matching() {
        let store = StateStore::open_in_memory().unwrap();
        let ttl = Duration::from_secs(60);
        store.try_acquire_lease("serialized_action:1", "old-1", ttl).unwrap();
        store.try_acquire_lease("serialized_action:2", "live-1", ttl).unwrap();

        let dropped = store
            .clear_leases(|lease| lease.owner.starts_with("live-"))
            .unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].name, "serialized_action:1");
        assert!(store.get_lease("serialized_action:1").unwrap().is_none());
        assert!(store.get_lease("serialized_action:2").unwrap().is_some());
    }

    #[test]
    fn delete_app_drops_pending_tasks_and_lease() {
        let store = StateStore::open_in_memory().unwrap();
        let (doomed, other) = store
            .write(|txn| {
                let doomed = test_app(txn, "doomed").id;
                let other = test_app(txn, "other").id;
                for app_id in [doomed, other] {
                    let task = TaskRecord {
                        id: txn.next_id::<TaskRecord>()?,
                        name: "smartops.tasks.deploy_app".to_string(),
                        args: serde_json::json!([app_id, null, [], {}]),
                        enqueued_at: 0,
                    };
                    txn.put(&task)?;
                }
                Ok::<_, StateError>((doomed, other))
            })
            .unwrap();
        let ttl = Duration::from_secs(60);
        store.try_acquire_lease(&action_lock_name(doomed), "w0", ttl).unwrap();
        store.try_acquire_lease(&action_lock_name(other), "w1", ttl).unwrap();

        store.write(|txn| txn.delete_app(doomed)).unwrap();

        let remaining = store.list::<TaskRecord>().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].app_id(), Some(other));
        assert!(store.get_lease(&action_lock_name(doomed)).unwrap().is_none());
        assert!(store.get_lease(&action_lock_name(other)).unwrap().is_some());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        let app_id = {
            let store = StateStore::open(&db_path).unwrap();
            store
                .write(|txn| Ok::<_, StateError>(test_app(txn, "durable").id))
                .unwrap()
        };

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let app: App = store.get(app_id).unwrap().unwrap();
        assert_eq!(app.name, "durable");
        let next = store.write(|txn| txn.next_id::<App>()).unwrap();
        assert_eq!(next, app_id + 1);
    }
}
