//! App handlers: create, read, update, delete.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smartops_state::{
    App, AppId, AppState, AppStatus, Blueprint, NameIndex, ReadTxn, StateError, Status,
    epoch_secs,
};
use tracing::info;

use crate::Lifecycle;
use crate::error::{LifecycleError, LifecycleResult};
use crate::machine::{self, Transition};

/// Keys a test plan must carry, no more and no fewer.
pub const TEST_PLAN_FIELDS: [&str; 2] = ["url", "load"];

/// An app together with its current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppView {
    #[serde(flatten)]
    pub app: App,
    pub status: Status,
}

/// Fields accepted by [`Lifecycle::update_app`]; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppUpdate {
    pub name: Option<String>,
    pub entrypoint: Option<String>,
    pub test_plan: Option<Map<String, Value>>,
}

fn read_view(txn: &ReadTxn, app_id: AppId) -> Result<AppView, StateError> {
    let app: App = txn.require(app_id)?;
    let status: AppStatus = txn.require(app_id)?;
    Ok(AppView {
        app,
        status: status.status,
    })
}

fn check_test_plan(test_plan: &Map<String, Value>) -> LifecycleResult<()> {
    let matches = test_plan.len() == TEST_PLAN_FIELDS.len()
        && TEST_PLAN_FIELDS.iter().all(|key| test_plan.contains_key(*key));
    if matches {
        Ok(())
    } else {
        let keys: Vec<&str> = test_plan.keys().map(String::as_str).collect();
        Err(LifecycleError::Validation(format!(
            "test plan keys {keys:?} are invalid, expected {TEST_PLAN_FIELDS:?}"
        )))
    }
}

impl Lifecycle {
    /// Create an app in `CREATING_STEP_0`.
    pub fn create_app(&self, name: &str) -> LifecycleResult<AppView> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LifecycleError::Validation(
                "app name must not be empty".to_string(),
            ));
        }

        let view = self.store.write(|txn| {
            let id = txn.next_id::<App>()?;
            txn.claim_name(NameIndex::Apps, name, id)?;

            let app = App::new(id, name);
            let status = Status::default();
            txn.put(&app)?;
            txn.put(&AppStatus {
                app_id: id,
                status: status.clone(),
            })?;
            Ok::<_, LifecycleError>(AppView { app, status })
        })?;

        info!(app_id = view.app.id, name = %view.app.name, "app created");
        Ok(view)
    }

    pub fn list_apps(&self) -> LifecycleResult<Vec<AppView>> {
        self.store.read(|txn| {
            let apps: Vec<App> = txn.list()?;
            let mut views = Vec::with_capacity(apps.len());
            for app in apps {
                let status: AppStatus = txn.require(app.id)?;
                views.push(AppView {
                    app,
                    status: status.status,
                });
            }
            Ok(views)
        })
    }

    pub fn get_app(&self, app_id: AppId) -> LifecycleResult<AppView> {
        Ok(self.store.read(|txn| read_view(txn, app_id))?)
    }

    pub fn get_status(&self, app_id: AppId) -> LifecycleResult<Status> {
        let record: AppStatus = self.store.read(|txn| txn.require(app_id))?;
        Ok(record.status)
    }

    /// Rename an app, select its entrypoint, or set its test plan.
    ///
    /// Selecting an entrypoint moves the app to `CREATING_STEP_3` and setting
    /// a test plan to `CREATING_STEP_4`. An invalid field fails the whole
    /// update.
    pub fn update_app(&self, app_id: AppId, update: AppUpdate) -> LifecycleResult<AppView> {
        self.store.write(|txn| {
            let mut app: App = txn.require(app_id)?;
            let status: AppStatus = txn.require(app_id)?;
            machine::ensure_editable(&app.name, &status.status)?;

            if let Some(name) = update.name {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(LifecycleError::Validation(
                        "app name must not be empty".to_string(),
                    ));
                }
                if name != app.name {
                    txn.claim_name(NameIndex::Apps, &name, app.id)?;
                    txn.release_name(NameIndex::Apps, &app.name)?;
                    app.name = name;
                }
            }

            if let Some(entrypoint) = update.entrypoint {
                let blueprint = match app.blueprint_id {
                    Some(id) => txn.get::<Blueprint>(id)?,
                    None => None,
                };
                let known = blueprint.is_some_and(|b| b.entrypoints.contains(&entrypoint));
                if !known {
                    return Err(LifecycleError::Validation(format!(
                        "entrypoint {entrypoint} does not exist in blueprint"
                    )));
                }
                machine::transition(
                    txn,
                    app_id,
                    Transition::info(AppState::CreatingStep3, "Finished selecting entrypoints"),
                )?;
                app.entrypoint = Some(entrypoint);
            }

            if let Some(test_plan) = update.test_plan {
                check_test_plan(&test_plan)?;
                machine::transition(
                    txn,
                    app_id,
                    Transition::info(AppState::CreatingStep4, "Finished updating test plans"),
                )?;
                app.test_plan = test_plan;
            }

            app.updated_at = epoch_secs();
            txn.put(&app)?;
            let status: AppStatus = txn.require(app_id)?;
            Ok(AppView {
                app,
                status: status.status,
            })
        })
    }

    /// Delete an app and everything it owns.
    pub fn delete_app(&self, app_id: AppId) -> LifecycleResult<App> {
        let app = self.store.write(|txn| {
            let app: App = txn.require(app_id)?;
            let status: AppStatus = txn.require(app_id)?;
            machine::ensure_editable(&app.name, &status.status)?;
            Ok::<_, LifecycleError>(txn.delete_app(app_id)?)
        })?;

        info!(app_id, name = %app.name, "app deleted");
        Ok(app)
    }
}
