//! Capacity plan handlers.
//!
//! An app holds at most one capacity plan. The planner posts it back while
//! the app is `PLANNING`, which completes the dry run.

use serde::Deserialize;
use serde_json::Value;
use smartops_state::{
    App, AppId, AppState, AppStatus, CapacityPlan, CapacityPlanId, NameIndex, Status, epoch_secs,
};
use tracing::info;

use crate::Lifecycle;
use crate::error::{LifecycleError, LifecycleResult};
use crate::machine::{self, Transition};

const GENERATED_MESSAGE: &str = "Capacity plan generated";

/// Body of a capacity plan submission.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCapacityPlan {
    pub name: String,
    #[serde(default)]
    pub is_auto: bool,
    #[serde(default)]
    pub config: Value,
}

impl Lifecycle {
    /// Store the capacity plan for an app, replacing any previous one.
    pub fn record_capacity_plan(
        &self,
        app_id: AppId,
        plan: NewCapacityPlan,
    ) -> LifecycleResult<CapacityPlan> {
        let name = plan.name.trim().to_string();
        if name.is_empty() {
            return Err(LifecycleError::Validation(
                "capacity plan name must not be empty".to_string(),
            ));
        }

        let stored = self.store.write(|txn| {
            let mut app: App = txn.require(app_id)?;
            let status: AppStatus = txn.require(app_id)?;
            if status.status.state == AppState::Error {
                return Err(LifecycleError::Absorbed(app_id));
            }

            let now = epoch_secs();
            let existing = match app.capacity_plan_id {
                Some(id) => txn.get::<CapacityPlan>(id)?,
                None => None,
            };
            let (id, created_at) = match &existing {
                Some(previous) => (previous.id, previous.created_at),
                None => (txn.next_id::<CapacityPlan>()?, now),
            };

            txn.claim_name(NameIndex::CapacityPlans, &name, id)?;
            if let Some(previous) = existing.as_ref().filter(|p| p.name != name) {
                txn.release_name(NameIndex::CapacityPlans, &previous.name)?;
            }

            let stored = CapacityPlan {
                id,
                app_id,
                name,
                is_auto: plan.is_auto,
                config: plan.config,
                start_time: now,
                status: Status {
                    state: AppState::PlanGenerated,
                    message: GENERATED_MESSAGE.to_string(),
                    ..Status::default()
                },
                created_at,
                updated_at: now,
            };
            txn.put(&stored)?;

            if app.capacity_plan_id != Some(id) {
                app.capacity_plan_id = Some(id);
                app.updated_at = now;
                txn.put(&app)?;
            }

            if status.status.state == AppState::Planning {
                machine::transition(
                    txn,
                    app_id,
                    Transition::info(AppState::PlanGenerated, GENERATED_MESSAGE),
                )?;
            }
            Ok(stored)
        })?;

        info!(app_id, plan_id = stored.id, name = %stored.name, "capacity plan recorded");
        Ok(stored)
    }

    pub fn get_capacity_plan(&self, plan_id: CapacityPlanId) -> LifecycleResult<CapacityPlan> {
        Ok(self.store.read(|txn| txn.require(plan_id))?)
    }

    /// The app's capacity plans (zero or one).
    pub fn list_capacity_plans(&self, app_id: AppId) -> LifecycleResult<Vec<CapacityPlan>> {
        self.store.read(|txn| {
            let app: App = txn.require(app_id)?;
            let plans = match app.capacity_plan_id {
                Some(id) => txn.get::<CapacityPlan>(id)?.into_iter().collect(),
                None => Vec::new(),
            };
            Ok(plans)
        })
    }
}
