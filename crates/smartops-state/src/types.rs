//! Record types for the SmartOps state store.
//!
//! An app owns at most one blueprint, one SLA, and one capacity plan, plus
//! exactly one status. Every record is serializable to/from JSON for
//! storage in redb tables.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::TableDefinition;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use smartops_blueprint::{ResourceCounts, ResourceDocument, Topology};

use crate::tables;

pub type AppId = u64;
pub type BlueprintId = u64;
pub type SlaId = u64;
pub type CapacityPlanId = u64;
pub type TaskId = u64;

/// A record stored in a `u64`-keyed table.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: TableDefinition<'static, u64, &'static [u8]>;
    /// Short kind label, used for id sequences and error messages.
    const KIND: &'static str;

    fn id(&self) -> u64;
}

// ── Status ────────────────────────────────────────────────────────

/// Lifecycle state of an app (or capacity plan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppState {
    #[serde(rename = "CREATING_STEP_0")]
    CreatingStep0,
    #[serde(rename = "CREATING_STEP_1")]
    CreatingStep1,
    #[serde(rename = "CREATING_STEP_2")]
    CreatingStep2,
    #[serde(rename = "CREATING_STEP_3")]
    CreatingStep3,
    #[serde(rename = "CREATING_STEP_4")]
    CreatingStep4,
    #[serde(rename = "PLANNING")]
    Planning,
    #[serde(rename = "PLAN_GENERATED")]
    PlanGenerated,
    #[serde(rename = "LAUNCHING")]
    Launching,
    #[serde(rename = "LAUNCHED")]
    Launched,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "DELETING")]
    Deleting,
    #[serde(rename = "DELETED")]
    Deleted,
}

impl AppState {
    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::CreatingStep0 => "CREATING_STEP_0",
            AppState::CreatingStep1 => "CREATING_STEP_1",
            AppState::CreatingStep2 => "CREATING_STEP_2",
            AppState::CreatingStep3 => "CREATING_STEP_3",
            AppState::CreatingStep4 => "CREATING_STEP_4",
            AppState::Planning => "PLANNING",
            AppState::PlanGenerated => "PLAN_GENERATED",
            AppState::Launching => "LAUNCHING",
            AppState::Launched => "LAUNCHED",
            AppState::Error => "ERROR",
            AppState::Deleting => "DELETING",
            AppState::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

/// `{state, message, severity}` as exposed on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub state: AppState,
    pub message: String,
    pub severity: Severity,
    /// Unix timestamp of the last transition.
    pub updated_at: u64,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: AppState::CreatingStep0,
            message: String::new(),
            severity: Severity::Info,
            updated_at: epoch_secs(),
        }
    }
}

/// Status row, keyed by the owning app id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStatus {
    pub app_id: AppId,
    #[serde(flatten)]
    pub status: Status,
}

impl Record for AppStatus {
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = tables::STATUSES;
    const KIND: &'static str = "status";

    fn id(&self) -> u64 {
        self.app_id
    }
}

// ── App ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub name: String,
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub test_plan: Map<String, Value>,
    /// Derived from the blueprint topology, never set directly.
    pub containers: u32,
    pub pods: u32,
    pub services: u32,
    pub blueprint_id: Option<BlueprintId>,
    pub sla_id: Option<SlaId>,
    pub capacity_plan_id: Option<CapacityPlanId>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl App {
    pub fn new(id: AppId, name: &str) -> Self {
        let now = epoch_secs();
        Self {
            id,
            name: name.to_string(),
            entrypoint: None,
            test_plan: Map::new(),
            containers: 0,
            pods: 0,
            services: 0,
            blueprint_id: None,
            sla_id: None,
            capacity_plan_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_counts(&mut self, counts: ResourceCounts) {
        self.containers = counts.containers;
        self.pods = counts.pods;
        self.services = counts.services;
    }

    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            containers: self.containers,
            pods: self.pods,
            services: self.services,
        }
    }
}

impl Record for App {
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = tables::APPS;
    const KIND: &'static str = "app";

    fn id(&self) -> u64 {
        self.id
    }
}

// ── Blueprint ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: BlueprintId,
    pub app_id: AppId,
    /// Validated documents in input order.
    pub content: Vec<ResourceDocument>,
    /// Original manifest text.
    pub content_string: String,
    pub entrypoints: Vec<String>,
    pub topology: Topology,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Record for Blueprint {
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = tables::BLUEPRINTS;
    const KIND: &'static str = "blueprint";

    fn id(&self) -> u64 {
        self.id
    }
}

// ── SLA ───────────────────────────────────────────────────────────

/// Cost assigned when an SLA is first posted.
pub const DEFAULT_SLA_COST: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sla {
    pub id: SlaId,
    pub app_id: AppId,
    pub error_rate: f64,
    /// Milliseconds.
    pub latency: u32,
    pub cost: f64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Record for Sla {
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = tables::SLAS;
    const KIND: &'static str = "sla";

    fn id(&self) -> u64 {
        self.id
    }
}

// ── Capacity plan ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityPlan {
    pub id: CapacityPlanId,
    pub app_id: AppId,
    pub name: String,
    pub is_auto: bool,
    #[serde(default)]
    pub config: Value,
    pub start_time: u64,
    pub status: Status,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Record for CapacityPlan {
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = tables::CAPACITY_PLANS;
    const KIND: &'static str = "capacity plan";

    fn id(&self) -> u64 {
        self.id
    }
}

// ── Tasks ─────────────────────────────────────────────────────────

/// A task accepted by the queue but not yet acknowledged by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    /// Positional arguments.
    pub args: Value,
    pub enqueued_at: u64,
}

impl TaskRecord {
    /// The app a task acts on, taken from the first positional argument.
    pub fn app_id(&self) -> Option<AppId> {
        self.args.get(0).and_then(Value::as_u64)
    }
}

impl Record for TaskRecord {
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = tables::TASKS;
    const KIND: &'static str = "task";

    fn id(&self) -> u64 {
        self.id
    }
}

// ── Leases ────────────────────────────────────────────────────────

/// Lease scope shared by every deploy action.
pub const ACTION_LOCK_SCOPE: &str = "serialized_action";

/// Lease name guarding deploy actions on `app_id`.
pub fn action_lock_name(app_id: AppId) -> String {
    format!("{ACTION_LOCK_SCOPE}:{app_id}")
}

/// A held named lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub name: String,
    pub owner: String,
    /// Unix timestamp (milliseconds) after which the lease may be taken over.
    pub expires_at_ms: u64,
}

impl Lease {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
