//! Blueprint handlers.

use smartops_blueprint::{ControllerPlan, analyze, base_plan};
use smartops_state::{App, AppId, AppState, AppStatus, Blueprint, epoch_secs};
use tracing::info;

use crate::Lifecycle;
use crate::error::{LifecycleError, LifecycleResult};
use crate::machine::{self, Transition};

impl Lifecycle {
    /// Parse, validate and store a blueprint for an app, replacing any
    /// previous one wholesale.
    ///
    /// The app's resource counts are recomputed from the new topology and
    /// the app moves to `CREATING_STEP_2`. Invalid content leaves the app,
    /// its blueprint and its status untouched.
    pub fn validate_and_upsert_blueprint(
        &self,
        app_id: AppId,
        content: &str,
    ) -> LifecycleResult<Blueprint> {
        let analyzed = analyze(content)?;

        let blueprint = self.store.write(|txn| {
            let mut app: App = txn.require(app_id)?;
            let status: AppStatus = txn.require(app_id)?;
            machine::ensure_editable(&app.name, &status.status)?;

            let now = epoch_secs();
            let existing = match app.blueprint_id {
                Some(id) => txn.get::<Blueprint>(id)?,
                None => None,
            };
            let (id, created_at) = match existing {
                Some(previous) => (previous.id, previous.created_at),
                None => (txn.next_id::<Blueprint>()?, now),
            };

            let blueprint = Blueprint {
                id,
                app_id,
                content: analyzed.documents,
                content_string: analyzed.raw,
                entrypoints: analyzed.entrypoints,
                topology: analyzed.topology,
                created_at,
                updated_at: now,
            };
            txn.put(&blueprint)?;

            app.blueprint_id = Some(blueprint.id);
            app.set_counts(analyzed.counts);
            app.updated_at = now;
            txn.put(&app)?;

            machine::transition(
                txn,
                app_id,
                Transition::info(AppState::CreatingStep2, "Finished updating app blueprint"),
            )?;
            Ok::<_, LifecycleError>(blueprint)
        })?;

        info!(
            app_id,
            blueprint_id = blueprint.id,
            entrypoints = ?blueprint.entrypoints,
            "blueprint stored"
        );
        Ok(blueprint)
    }

    pub fn get_blueprint(&self, app_id: AppId) -> LifecycleResult<Blueprint> {
        self.store.read(|txn| {
            let app: App = txn.require(app_id)?;
            let id = app.blueprint_id.ok_or_else(|| missing_blueprint(app_id))?;
            Ok(txn.require::<Blueprint>(id)?)
        })
    }

    /// The manifest text as submitted, or an empty string if none was.
    pub fn get_raw_blueprint(&self, app_id: AppId) -> LifecycleResult<String> {
        self.store.read(|txn| {
            let app: App = txn.require(app_id)?;
            let raw = match app.blueprint_id {
                Some(id) => txn.require::<Blueprint>(id)?.content_string,
                None => String::new(),
            };
            Ok(raw)
        })
    }

    /// Starting plan for the capacity planner.
    pub fn dry_run_base_plan(&self, app_id: AppId) -> LifecycleResult<Vec<ControllerPlan>> {
        let blueprint = self.get_blueprint(app_id)?;
        Ok(base_plan(&blueprint.content)?)
    }
}

pub(crate) fn missing_blueprint(app_id: AppId) -> LifecycleError {
    LifecycleError::NotFound(format!(
        "app {app_id} does not have a valid blueprint, try submitting one first"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartops_blueprint::{BlueprintError, TopologyEntry};
    use smartops_state::StateStore;

    const WEB: &str = "\
apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  ports:
  - port: 80
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: webrc
spec:
  replicas: 3
  template:
    metadata:
      labels:
        name: web
    spec:
      containers:
      - name: nginx
        image: nginx
        resources:
          limits:
            cpu: 500m
            memory: 256Mi
";

    fn lifecycle_with_app() -> (Lifecycle, AppId) {
        let lc = Lifecycle::new(StateStore::open_in_memory().unwrap());
        let id = lc.create_app("shop").unwrap().app.id;
        (lc, id)
    }

    #[test]
    fn upsert_stores_topology_and_counts() {
        let (lc, id) = lifecycle_with_app();
        let blueprint = lc.validate_and_upsert_blueprint(id, WEB).unwrap();

        assert_eq!(blueprint.entrypoints, vec!["web"]);
        assert_eq!(
            blueprint.topology.get("web"),
            Some(&TopologyEntry {
                service_name: "web".to_string(),
                replica: Some(3),
            })
        );

        let view = lc.get_app(id).unwrap();
        assert_eq!(view.app.pods, 3);
        assert_eq!(view.app.services, 1);
        assert_eq!(view.app.containers, 1);
        assert_eq!(view.status.state, AppState::CreatingStep2);
        assert_eq!(view.status.message, "Finished updating app blueprint");
        assert_eq!(lc.get_raw_blueprint(id).unwrap(), WEB);
    }

    #[test]
    fn replacing_reuses_the_record() {
        let (lc, id) = lifecycle_with_app();
        let first = lc.validate_and_upsert_blueprint(id, WEB).unwrap();
        let only_service = WEB.split("---").next().unwrap();
        let second = lc.validate_and_upsert_blueprint(id, only_service).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.content.len(), 1);
        assert_eq!(lc.get_app(id).unwrap().app.containers, 0);
        assert_eq!(lc.get_blueprint(id).unwrap(), second);
    }

    #[test]
    fn invalid_blueprint_leaves_state_untouched() {
        let (lc, id) = lifecycle_with_app();
        lc.validate_and_upsert_blueprint(id, WEB).unwrap();
        let before = lc.get_app(id).unwrap();

        let err = lc
            .validate_and_upsert_blueprint(id, "apiVersion: v1\nkind: Pod\nmetadata:\n  name: x\n")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Blueprint(BlueprintError::Validation(_))));

        let err = lc.validate_and_upsert_blueprint(id, "kind: [unclosed").unwrap_err();
        assert!(matches!(err, LifecycleError::Blueprint(BlueprintError::Parse(_))));

        assert_eq!(lc.get_app(id).unwrap(), before);
        assert_eq!(lc.get_raw_blueprint(id).unwrap(), WEB);
    }

    #[test]
    fn raw_blueprint_empty_when_absent() {
        let (lc, id) = lifecycle_with_app();
        assert_eq!(lc.get_raw_blueprint(id).unwrap(), "");
        assert!(matches!(lc.get_blueprint(id), Err(LifecycleError::NotFound(_))));
        assert!(matches!(lc.dry_run_base_plan(id), Err(LifecycleError::NotFound(_))));
    }

    #[test]
    fn base_plan_from_stored_blueprint() {
        let (lc, id) = lifecycle_with_app();
        lc.validate_and_upsert_blueprint(id, WEB).unwrap();
        let plan = lc.dry_run_base_plan(id).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "web");
        assert_eq!(plan[0].pod_replicas, 3);
        assert_eq!(plan[0].containers[0].cpu, 0.5);
        assert_eq!(plan[0].containers[0].memory, 256.0);
    }
}
