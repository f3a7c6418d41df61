//! Data model for the cluster-management reconciliation engine.
//!
//! Defines the scheduler-side (`Node`, `Partition`) and cloud-side (`Instance`,
//! `InstanceHealthState`) records the reconciler operates on, plus the derived
//! maps used to cross-reference them each tick.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ─── Node state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStateFlag {
    Idle,
    Mixed,
    Allocated,
    Down,
    Drain,
    Completing,
    Power,
    Cloud,
    Maintenance,
    Unknown,
}

pub type NodeStateSet = BTreeSet<NodeStateFlag>;

// ─── Node ─────────────────────────────────────────────────────────────────────

/// A compute node as reported by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Either a routable IP, or equal to `name` when no backing instance is assigned.
    pub address: String,
    pub hostname: String,
    pub state: NodeStateSet,
}

impl Node {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        let name = name.into();
        let address = address.into();
        Self {
            hostname: name.clone(),
            name,
            address,
            state: NodeStateSet::new(),
        }
    }

    pub fn with_state(mut self, flags: impl IntoIterator<Item = NodeStateFlag>) -> Self {
        self.state = flags.into_iter().collect();
        self
    }

    /// Static nodes are long-lived and named with a `-static-` component.
    pub fn is_static(&self) -> bool {
        self.name.contains("-static-")
    }

    /// Dynamic nodes are created/destroyed on demand and named with `-dynamic-`.
    pub fn is_dynamic(&self) -> bool {
        self.name.contains("-dynamic-")
    }

    pub fn is_power_saving(&self) -> bool {
        self.state.contains(&NodeStateFlag::Power)
    }

    pub fn is_down(&self) -> bool {
        self.state.contains(&NodeStateFlag::Down)
    }

    pub fn is_drain(&self) -> bool {
        self.state.contains(&NodeStateFlag::Drain)
    }

    /// True iff the node's state is `DOWN`, ignoring an accompanying `CLOUD`
    /// flag. A node that is e.g. `DOWN+CLOUD` still counts as purely down for
    /// replacement-tracking purposes.
    pub fn is_purely_down(&self) -> bool {
        let relevant: NodeStateSet = self
            .state
            .iter()
            .filter(|f| **f != NodeStateFlag::Cloud)
            .copied()
            .collect();
        relevant.len() == 1 && relevant.contains(&NodeStateFlag::Down)
    }

    /// True once an IP has been assigned (address no longer equals the name).
    pub fn has_assigned_address(&self) -> bool {
        self.address != self.name
    }
}

// ─── Partition ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitionState {
    Up,
    Inactive,
    Drain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub node_name_specification: String,
    pub state: PartitionState,
}

impl Partition {
    pub fn is_active(&self) -> bool {
        self.state == PartitionState::Up
    }
}

// ─── Instance ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub private_ip: String,
    pub hostname: String,
    pub launch_time: DateTime<Utc>,
}

// ─── Instance health ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Ok,
    Impaired,
    Initializing,
    InsufficientData,
    NotApplicable,
}

impl CheckStatus {
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, CheckStatus::Impaired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDetail {
    pub name: String,
    pub impaired_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCheck {
    pub status: CheckStatus,
    pub details: Vec<StatusDetail>,
}

impl StatusCheck {
    /// Earliest `impaired_since` across all details. A detail carries no
    /// status of its own — it's a timestamped sub-component of whatever the
    /// parent check reports; callers gate on `status.is_unhealthy()` first.
    pub fn earliest_impaired_since(&self) -> Option<DateTime<Utc>> {
        self.details.iter().filter_map(|d| d.impaired_since).min()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceHealthState {
    pub instance_id: String,
    pub lifecycle_state: String,
    pub instance_status: StatusCheck,
    pub system_status: StatusCheck,
    pub scheduled_events: Vec<ScheduledEvent>,
}

/// The closed set of health-check kinds the health-check phase dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckKind {
    Ec2Health,
    ScheduledEvent,
}

impl std::fmt::Display for HealthCheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ec2Health => write!(f, "EC2 health check"),
            Self::ScheduledEvent => write!(f, "scheduled event"),
        }
    }
}

// ─── Derived maps ─────────────────────────────────────────────────────────────

/// Maps derived once per tick from a fresh cloud/scheduler snapshot.
#[derive(Debug, Default)]
pub struct DerivedMaps {
    pub ip_to_instance: HashMap<String, Instance>,
    pub ip_to_node: HashMap<String, Node>,
    pub id_to_instance: HashMap<String, Instance>,
}

impl DerivedMaps {
    pub fn build(instances: &[Instance], nodes: &[Node]) -> Self {
        let mut ip_to_instance = HashMap::new();
        let mut id_to_instance = HashMap::new();
        for instance in instances {
            ip_to_instance.insert(instance.private_ip.clone(), instance.clone());
            id_to_instance.insert(instance.instance_id.clone(), instance.clone());
        }

        let mut ip_to_node = HashMap::new();
        for node in nodes {
            ip_to_node.insert(node.address.clone(), node.clone());
        }

        Self {
            ip_to_instance,
            ip_to_node,
            id_to_instance,
        }
    }
}

// ─── Retry policy ─────────────────────────────────────────────────────────────

/// Bounded exponential backoff shared by the scheduler and cloud adapters.
///
/// Exhausted-then-fail: once `max_attempts` extra attempts are spent the
/// caller surfaces the failure rather than retrying forever.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given (0-indexed) retry attempt: `base * 2^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let factor = 1u64 << attempt.min(16);
        std::time::Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}
