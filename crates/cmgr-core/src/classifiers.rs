//! Pure predicates over node/instance snapshots. None of these take a
//! fallible dependency — a classifier that needs I/O is a design bug, not
//! something to handle here.

use crate::clock::time_is_up;
use chrono::{DateTime, Utc};
use cmgr_proto::{Instance, InstanceHealthState, Node};
use std::collections::{HashMap, HashSet};

/// True iff the node has been assigned a backing IP (its address no longer
/// equals its own name).
pub fn is_static_node_configuration_valid(node: &Node) -> bool {
    node.has_assigned_address()
}

/// True iff the node needs no backing instance right now (dynamic +
/// power-saving) or its address resolves to a live instance.
pub fn is_backing_instance_valid(node: &Node, ip_to_instance: &HashMap<String, Instance>) -> bool {
    if node.is_dynamic() && node.is_power_saving() {
        return true;
    }
    ip_to_instance.contains_key(&node.address)
}

/// True iff the node is a static node currently mid-replacement: tracked in
/// the replacement set, with a backing instance that hasn't outlived the
/// replacement timeout.
pub fn is_node_being_replaced(
    node: &Node,
    ip_to_instance: &HashMap<String, Instance>,
    static_nodes_in_replacement: &HashSet<String>,
    now: DateTime<Utc>,
    node_replacement_timeout_secs: i64,
) -> bool {
    if !static_nodes_in_replacement.contains(&node.name) {
        return false;
    }
    let Some(instance) = ip_to_instance.get(&node.address) else {
        return false;
    };
    !time_is_up(instance.launch_time, now, node_replacement_timeout_secs)
}

/// Scheduler-reported state health, independent of backing-instance validity.
pub fn is_node_state_healthy(
    node: &Node,
    in_replacement: bool,
    terminate_down_nodes: bool,
    terminate_drain_nodes: bool,
) -> bool {
    if node.is_down() {
        return in_replacement || !terminate_down_nodes;
    }
    if node.is_drain() {
        return in_replacement || !terminate_drain_nodes;
    }
    true
}

/// The full node health verdict the maintenance phase classifies on.
pub fn is_node_healthy(
    node: &Node,
    ip_to_instance: &HashMap<String, Instance>,
    in_replacement: bool,
    terminate_down_nodes: bool,
    terminate_drain_nodes: bool,
) -> bool {
    if node.is_static() && !is_static_node_configuration_valid(node) {
        return false;
    }
    if !is_backing_instance_valid(node, ip_to_instance) {
        return false;
    }
    is_node_state_healthy(node, in_replacement, terminate_down_nodes, terminate_drain_nodes)
}

/// True iff the instance fails the EC2-health check: `instance_status` or
/// `system_status` is impaired, and the earlier of their `ImpairedSince`
/// markers is at least `timeout_secs` in the past.
pub fn fail_ec2_health_check(health: &InstanceHealthState, now: DateTime<Utc>, timeout_secs: i64) -> bool {
    let earliest = [&health.instance_status, &health.system_status]
        .into_iter()
        .filter(|check| check.status.is_unhealthy())
        .filter_map(|check| check.earliest_impaired_since())
        .min();
    match earliest {
        Some(since) => time_is_up(since, now, timeout_secs),
        None => false,
    }
}

/// True iff the instance has at least one pending scheduled event.
pub fn fail_scheduled_events_check(health: &InstanceHealthState) -> bool {
    !health.scheduled_events.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmgr_proto::{CheckStatus, NodeStateFlag, StatusCheck, StatusDetail};

    fn ec2_health(impaired_since: DateTime<Utc>) -> InstanceHealthState {
        InstanceHealthState {
            instance_id: "i-1".to_string(),
            lifecycle_state: "running".to_string(),
            instance_status: StatusCheck {
                status: CheckStatus::Impaired,
                details: vec![StatusDetail {
                    name: "reachability".to_string(),
                    impaired_since: Some(impaired_since),
                }],
            },
            system_status: StatusCheck {
                status: CheckStatus::Initializing,
                details: vec![],
            },
            scheduled_events: vec![],
        }
    }

    #[test]
    fn ec2_health_timeout_boundary() {
        let since = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let at_boundary = since + chrono::Duration::seconds(30);
        let before_boundary = since + chrono::Duration::seconds(29);
        let health = ec2_health(since);
        assert!(fail_ec2_health_check(&health, at_boundary, 30));
        assert!(!fail_ec2_health_check(&health, before_boundary, 30));
    }

    #[test]
    fn ec2_health_check_has_no_details_gate_on_per_detail_status() {
        let since = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let health = InstanceHealthState {
            instance_id: "i-1".to_string(),
            lifecycle_state: "running".to_string(),
            instance_status: StatusCheck {
                status: CheckStatus::Impaired,
                details: vec![],
            },
            system_status: StatusCheck {
                status: CheckStatus::Ok,
                details: vec![],
            },
            scheduled_events: vec![],
        };
        // No ImpairedSince data at all: nothing to time out against yet, but
        // a genuinely-impaired check must never be suppressed by absent or
        // mixed per-detail data.
        assert!(!fail_ec2_health_check(&health, since + chrono::Duration::seconds(999), 30));
    }

    #[test]
    fn static_node_being_replaced_timeout_boundary() {
        let launch_time = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let node = Node::new("q1-st-static-1", "10.0.0.1")
            .with_state([NodeStateFlag::Down, NodeStateFlag::Cloud]);
        let mut ip_to_instance = HashMap::new();
        ip_to_instance.insert(
            "10.0.0.1".to_string(),
            Instance {
                instance_id: "i-1".to_string(),
                private_ip: "10.0.0.1".to_string(),
                hostname: "i-1".to_string(),
                launch_time,
            },
        );
        let mut in_replacement = HashSet::new();
        in_replacement.insert(node.name.clone());

        let before_boundary = launch_time + chrono::Duration::seconds(29);
        let at_boundary = launch_time + chrono::Duration::seconds(30);
        assert!(is_node_being_replaced(
            &node,
            &ip_to_instance,
            &in_replacement,
            before_boundary,
            30
        ));
        assert!(!is_node_being_replaced(
            &node,
            &ip_to_instance,
            &in_replacement,
            at_boundary,
            30
        ));
    }

    #[test]
    fn dynamic_power_saving_node_needs_no_backing_instance() {
        let node = Node::new("q1-dy-dynamic-1", "q1-dy-dynamic-1")
            .with_state([NodeStateFlag::Power]);
        assert!(is_backing_instance_valid(&node, &HashMap::new()));
    }

    #[test]
    fn down_node_is_healthy_when_terminate_down_nodes_disabled() {
        let node = Node::new("q1-st-static-1", "10.0.0.1").with_state([NodeStateFlag::Down]);
        assert!(!is_node_state_healthy(&node, false, true, true));
        assert!(is_node_state_healthy(&node, false, false, true));
        assert!(is_node_state_healthy(&node, true, true, true));
    }

    #[test]
    fn scheduled_events_check_is_presence_only() {
        let mut health = ec2_health(Utc::now());
        assert!(!fail_scheduled_events_check(&health));
        health.scheduled_events.push(cmgr_proto::ScheduledEvent {
            code: "system-reboot".to_string(),
            description: "scheduled reboot".to_string(),
        });
        assert!(fail_scheduled_events_check(&health));
    }
}
