//! SLA handlers.

use serde_json::Value;
use smartops_state::{App, AppId, AppState, AppStatus, DEFAULT_SLA_COST, Sla, epoch_secs};
use tracing::info;

use crate::Lifecycle;
use crate::error::{LifecycleError, LifecycleResult};
use crate::machine::{self, Transition};

fn missing_parameter() -> LifecycleError {
    LifecycleError::Validation("Parameter missing in your request".to_string())
}

/// Numbers or numeric strings.
fn parse_error_rate(value: Option<&Value>) -> LifecycleResult<f64> {
    let rate = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    rate.filter(|r| r.is_finite()).ok_or_else(missing_parameter)
}

/// Whole milliseconds; fractional numbers are truncated.
fn parse_latency(value: Option<&Value>) -> LifecycleResult<u32> {
    let latency = match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    latency
        .and_then(|l| u32::try_from(l).ok())
        .ok_or_else(missing_parameter)
}

impl Lifecycle {
    /// Create or update an app's SLA from a request body carrying
    /// `error_rate` and `latency`.
    ///
    /// A new SLA gets the default cost; an update keeps the stored one.
    pub fn upsert_sla(&self, app_id: AppId, request: &Value) -> LifecycleResult<Sla> {
        let error_rate = parse_error_rate(request.get("error_rate"))?;
        let latency = parse_latency(request.get("latency"))?;

        let sla = self.store.write(|txn| {
            let mut app: App = txn.require(app_id)?;
            let status: AppStatus = txn.require(app_id)?;
            machine::ensure_editable(&app.name, &status.status)?;

            let now = epoch_secs();
            let existing = match app.sla_id {
                Some(id) => txn.get::<Sla>(id)?,
                None => None,
            };
            let sla = match existing {
                Some(previous) => Sla {
                    error_rate,
                    latency,
                    updated_at: now,
                    ..previous
                },
                None => Sla {
                    id: txn.next_id::<Sla>()?,
                    app_id,
                    error_rate,
                    latency,
                    cost: DEFAULT_SLA_COST,
                    created_at: now,
                    updated_at: now,
                },
            };
            txn.put(&sla)?;

            if app.sla_id != Some(sla.id) {
                app.sla_id = Some(sla.id);
                app.updated_at = now;
                txn.put(&app)?;
            }

            machine::transition(
                txn,
                app_id,
                Transition::info(AppState::CreatingStep1, "Finished posting app SLA"),
            )?;
            Ok::<_, LifecycleError>(sla)
        })?;

        info!(app_id, error_rate, latency, "sla stored");
        Ok(sla)
    }

    pub fn get_sla(&self, app_id: AppId) -> LifecycleResult<Sla> {
        self.store.read(|txn| {
            let app: App = txn.require(app_id)?;
            let id = app.sla_id.ok_or_else(|| {
                LifecycleError::NotFound(format!("app {app_id} does not have an sla"))
            })?;
            Ok(txn.require::<Sla>(id)?)
        })
    }
}
