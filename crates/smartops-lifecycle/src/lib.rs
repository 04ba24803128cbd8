//! smartops-lifecycle — app lifecycle for SmartOps.
//!
//! Owns the status state machine ([`machine`]) and the handlers that are
//! allowed to drive it. Each handler runs as one store transaction: the
//! record writes and the status transition they trigger commit together or
//! not at all.
//!
//! ```text
//! upsert_sla ──────────────────────► CREATING_STEP_1
//! validate_and_upsert_blueprint ───► CREATING_STEP_2
//! update_app { entrypoint } ───────► CREATING_STEP_3
//! update_app { test_plan } ────────► CREATING_STEP_4
//! request_dry_run ─────────────────► PLANNING        ─► record_capacity_plan ─► PLAN_GENERATED
//! request_deploy ──────────────────► LAUNCHING       ─► mark_launched        ─► LAUNCHED
//!                                                     ─► mark_error           ─► ERROR
//! reset_status ────────────────────► CREATING_STEP_0
//! ```

pub mod app;
pub mod blueprint;
pub mod capacity_plan;
pub mod dispatch;
pub mod error;
pub mod machine;
pub mod sla;
pub mod task;

pub use app::{AppUpdate, AppView, TEST_PLAN_FIELDS};
pub use capacity_plan::NewCapacityPlan;
pub use dispatch::LaunchOutcome;
pub use error::{LifecycleError, LifecycleResult};
pub use machine::{Transition, is_editable};
pub use task::{DeployArgs, QueueError, Task, TaskKind, TaskQueue, TaskReceipt};

use smartops_state::StateStore;

/// Handler entry point over a shared record store.
#[derive(Clone)]
pub struct Lifecycle {
    store: StateStore,
}

impl Lifecycle {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }
}
