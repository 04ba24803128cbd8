//! An app walked through its whole lifecycle against an on-disk store.

use std::sync::Mutex;

use serde_json::json;
use smartops_lifecycle::{
    AppUpdate, LaunchOutcome, Lifecycle, LifecycleError, NewCapacityPlan, QueueError, TaskQueue,
};
use smartops_state::{
    AppState, Blueprint, CapacityPlan, NameIndex, Severity, Sla, StateStore, TaskRecord,
};

const BLUEPRINT: &str = "\
apiVersion: v1
kind: Service
metadata:
  name: frontend
spec:
  selector:
    name: fe
---
apiVersion: v1
kind: ReplicationController
metadata:
  name: fe-rc
spec:
  replicas: 2
  selector:
    name: fe
  template:
    metadata:
      labels:
        name: fe
    spec:
      containers:
      - name: app
        image: shop/frontend
      - name: sidecar
        image: envoy
";

#[derive(Default)]
struct RecordingQueue {
    sent: Mutex<Vec<TaskRecord>>,
}

impl TaskQueue for RecordingQueue {
    fn send(&self, task: &TaskRecord) -> Result<(), QueueError> {
        self.sent.lock().unwrap().push(task.clone());
        Ok(())
    }
}

#[test]
fn full_lifecycle_and_cascade_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("smartops.redb")).unwrap();
    let lc = Lifecycle::new(store.clone());
    let queue = RecordingQueue::default();

    let app_id = lc.create_app("shop").unwrap().app.id;
    lc.upsert_sla(app_id, &json!({"error_rate": 0.01, "latency": 250}))
        .unwrap();
    let blueprint = lc.validate_and_upsert_blueprint(app_id, BLUEPRINT).unwrap();
    assert_eq!(blueprint.entrypoints, vec!["frontend".to_string()]);
    assert_eq!(blueprint.topology["fe"].service_name, "frontend");

    let view = lc.get_app(app_id).unwrap();
    assert_eq!((view.app.containers, view.app.pods, view.app.services), (2, 2, 1));

    lc.update_app(
        app_id,
        AppUpdate {
            entrypoint: Some("frontend".to_string()),
            test_plan: Some(
                json!({"url": "/", "load": 10})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
            ..AppUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(lc.get_status(app_id).unwrap().state, AppState::CreatingStep4);

    // Dry run, plan, then deploy.
    lc.request_dry_run(app_id, &queue).unwrap();
    assert_eq!(lc.get_status(app_id).unwrap().state, AppState::Planning);
    let plan = lc
        .record_capacity_plan(
            app_id,
            NewCapacityPlan {
                name: "capacity_plan_1".to_string(),
                is_auto: true,
                config: json!({"fe": {"replicas": 3}}),
            },
        )
        .unwrap();
    assert_eq!(lc.get_status(app_id).unwrap().state, AppState::PlanGenerated);

    lc.request_deploy(app_id, &queue).unwrap();
    lc.mark_launched(
        app_id,
        &LaunchOutcome {
            created: vec!["1frontend".to_string(), "1fe-rc".to_string()],
            failed: vec![],
        },
    )
    .unwrap();
    let status = lc.get_status(app_id).unwrap();
    assert_eq!(status.state, AppState::Launched);
    assert_eq!(status.severity, Severity::Info);

    let names: Vec<String> = queue.sent.lock().unwrap().iter().map(|t| t.name.clone()).collect();
    assert_eq!(
        names,
        ["smartops.tasks.deploy_capacity_planner", "smartops.tasks.deploy_app"]
    );

    // Delete cascades to every owned record and frees both names.
    let app = lc.delete_app(app_id).unwrap();
    assert!(store.get::<Blueprint>(blueprint.id).unwrap().is_none());
    assert!(store.get::<Sla>(app.sla_id.unwrap()).unwrap().is_none());
    assert!(store.get::<CapacityPlan>(plan.id).unwrap().is_none());
    assert!(matches!(lc.get_status(app_id), Err(LifecycleError::NotFound(_))));
    store
        .read(|txn| {
            assert!(txn.lookup_name(NameIndex::Apps, "shop")?.is_none());
            assert!(txn.lookup_name(NameIndex::CapacityPlans, "capacity_plan_1")?.is_none());
            Ok::<_, smartops_state::StateError>(())
        })
        .unwrap();
    lc.create_app("shop").unwrap();
}

#[test]
fn failed_deploy_is_absorbing_until_reset() {
    let store = StateStore::open_in_memory().unwrap();
    let lc = Lifecycle::new(store);
    let queue = RecordingQueue::default();

    let app_id = lc.create_app("shop").unwrap().app.id;
    lc.validate_and_upsert_blueprint(app_id, BLUEPRINT).unwrap();
    lc.request_deploy(app_id, &queue).unwrap();
    lc.mark_error(app_id, "Failed to deploy application: boom").unwrap();

    let status = lc.get_status(app_id).unwrap();
    assert_eq!(status.state, AppState::Error);
    assert_eq!(status.severity, Severity::Error);

    // Handler transitions are refused while in ERROR.
    let err = lc
        .upsert_sla(app_id, &json!({"error_rate": 0.1, "latency": 100}))
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Absorbed(_)), "{err}");

    lc.reset_status(app_id).unwrap();
    assert_eq!(lc.get_status(app_id).unwrap().state, AppState::CreatingStep0);
    lc.upsert_sla(app_id, &json!({"error_rate": 0.1, "latency": 100}))
        .unwrap();
}

#[test]
fn bad_blueprint_leaves_existing_one_untouched() {
    let store = StateStore::open_in_memory().unwrap();
    let lc = Lifecycle::new(store);
    let app_id = lc.create_app("shop").unwrap().app.id;
    let original = lc.validate_and_upsert_blueprint(app_id, BLUEPRINT).unwrap();
    let status = lc.get_status(app_id).unwrap();

    let bad = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: api\n";
    let err = lc.validate_and_upsert_blueprint(app_id, bad).unwrap_err();
    assert!(matches!(err, LifecycleError::Blueprint(_)), "{err}");

    assert_eq!(lc.get_blueprint(app_id).unwrap(), original);
    assert_eq!(lc.get_status(app_id).unwrap(), status);
    assert_eq!(lc.get_raw_blueprint(app_id).unwrap(), BLUEPRINT);
}
