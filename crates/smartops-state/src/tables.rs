//! redb table definitions for the SmartOps record store.
//!
//! Record tables use `u64` surrogate keys and `&[u8]` values (JSON-serialized
//! records). Index and bookkeeping tables use `&str` keys.

use redb::TableDefinition;

/// Apps keyed by app id.
pub const APPS: TableDefinition<u64, &[u8]> = TableDefinition::new("apps");

/// App status keyed by the owning app id.
pub const STATUSES: TableDefinition<u64, &[u8]> = TableDefinition::new("statuses");

/// Blueprints keyed by blueprint id.
pub const BLUEPRINTS: TableDefinition<u64, &[u8]> = TableDefinition::new("blueprints");

/// SLAs keyed by SLA id.
pub const SLAS: TableDefinition<u64, &[u8]> = TableDefinition::new("slas");

/// Capacity plans keyed by plan id.
pub const CAPACITY_PLANS: TableDefinition<u64, &[u8]> = TableDefinition::new("capacity_plans");

/// Pending tasks keyed by task id.
pub const TASKS: TableDefinition<u64, &[u8]> = TableDefinition::new("tasks");

/// Unique app names → app id.
pub const APP_NAMES: TableDefinition<&str, u64> = TableDefinition::new("app_names");

/// Unique capacity plan names → plan id.
pub const CAPACITY_PLAN_NAMES: TableDefinition<&str, u64> =
    TableDefinition::new("capacity_plan_names");

/// Last issued id per record kind.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Named leases keyed by lock name.
pub const LOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("locks");
