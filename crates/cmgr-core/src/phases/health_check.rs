//! Health-check phase: drains nodes whose backing instance fails EC2 health
//! or has a pending scheduled event. Draining (not terminating) yields to
//! running jobs while the next tick's maintenance phase decides whether to
//! replace.

use crate::classifiers::{fail_ec2_health_check, fail_scheduled_events_check};
use chrono::{DateTime, Utc};
use cmgr_cloud::CloudClient;
use cmgr_proto::{HealthCheckKind, Instance, InstanceHealthState, Node};
use cmgr_scheduler::SchedulerClient;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    scheduler: &Arc<dyn SchedulerClient>,
    cloud: &Arc<dyn CloudClient>,
    live_instances: &[Instance],
    ip_to_node: &HashMap<String, Node>,
    now: DateTime<Utc>,
    health_check_timeout_secs: i64,
    ec2_enabled: bool,
    scheduled_event_enabled: bool,
) {
    let instance_ids: Vec<String> = live_instances.iter().map(|i| i.instance_id.clone()).collect();
    let unhealthy_states = match cloud.describe_unhealthy(&instance_ids).await {
        Ok(states) => states,
        Err(e) => {
            warn!(error = %e, "health check phase: describe_unhealthy failed");
            return;
        }
    };
    if unhealthy_states.is_empty() {
        return;
    }

    let id_to_instance: HashMap<String, Instance> = live_instances
        .iter()
        .map(|i| (i.instance_id.clone(), i.clone()))
        .collect();

    if ec2_enabled {
        handle_health_check(
            scheduler,
            &unhealthy_states,
            &id_to_instance,
            ip_to_node,
            HealthCheckKind::Ec2Health,
            now,
            health_check_timeout_secs,
        )
        .await;
    }
    if scheduled_event_enabled {
        handle_health_check(
            scheduler,
            &unhealthy_states,
            &id_to_instance,
            ip_to_node,
            HealthCheckKind::ScheduledEvent,
            now,
            health_check_timeout_secs,
        )
        .await;
    }
}

async fn handle_health_check(
    scheduler: &Arc<dyn SchedulerClient>,
    states: &[InstanceHealthState],
    id_to_instance: &HashMap<String, Instance>,
    ip_to_node: &HashMap<String, Node>,
    kind: HealthCheckKind,
    now: DateTime<Utc>,
    timeout_secs: i64,
) {
    let mut node_names = Vec::new();
    for state in states {
        let fails = match kind {
            HealthCheckKind::Ec2Health => fail_ec2_health_check(state, now, timeout_secs),
            HealthCheckKind::ScheduledEvent => fail_scheduled_events_check(state),
        };
        if !fails {
            continue;
        }
        let Some(instance) = id_to_instance.get(&state.instance_id) else {
            continue;
        };
        let Some(node) = ip_to_node.get(&instance.private_ip) else {
            continue;
        };
        node_names.push(node.name.clone());
    }

    if node_names.is_empty() {
        return;
    }

    let reason = format!("Node failing {kind}");
    info!(kind = %kind, nodes = ?node_names, "draining nodes failing health check");
    if let Err(e) = scheduler.drain(&node_names, &reason).await {
        warn!(error = %e, "health check phase: drain failed");
    }
}
