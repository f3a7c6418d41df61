//! The reconciler: orchestrates one tick end to end, isolating each phase's
//! failures from the others. Only the two truly fatal-for-tick conditions
//! (scheduler unreachable, cloud inventory unreachable) short-circuit the
//! remaining phases — everything else is logged and absorbed.

use crate::{heartbeat, phases};
use chrono::Utc;
use cmgr_cloud::CloudClient;
use cmgr_config::EngineConfig;
use cmgr_proto::DerivedMaps;
use cmgr_scheduler::SchedulerClient;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Holds the engine state that persists across ticks (but not process
/// restarts): the static-node replacement set.
pub struct Reconciler {
    scheduler: Arc<dyn SchedulerClient>,
    cloud: Arc<dyn CloudClient>,
    static_nodes_in_replacement: HashSet<String>,
}

impl Reconciler {
    pub fn new(scheduler: Arc<dyn SchedulerClient>, cloud: Arc<dyn CloudClient>) -> Self {
        Self {
            scheduler,
            cloud,
            static_nodes_in_replacement: HashSet::new(),
        }
    }

    /// Nodes currently tracked as mid-replacement. Exposed for tests and
    /// observability; the reconciler is the only writer.
    pub fn nodes_in_replacement(&self) -> &HashSet<String> {
        &self.static_nodes_in_replacement
    }

    /// Run one reconciliation pass. Never returns an error: phase-level
    /// failures are logged and swallowed, and fatal-for-tick conditions
    /// simply end the tick early.
    pub async fn tick(&mut self, config: &EngineConfig) {
        let now = Utc::now();

        if let Err(e) = heartbeat::write(&config.heartbeat_file_path, now) {
            warn!(error = %e, "failed to write heartbeat, continuing");
        }

        if config.disable_all_cluster_management {
            info!("cluster management disabled, skipping tick");
            return;
        }

        let partitions = match self.scheduler.list_partitions().await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "scheduler unavailable, aborting tick");
                return;
            }
        };

        let mut active_nodes = Vec::new();
        let mut inactive_nodes = Vec::new();
        for partition in &partitions {
            let nodes = match self
                .scheduler
                .list_nodes(Some(&partition.node_name_specification))
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, partition = %partition.name, "scheduler unavailable, aborting tick");
                    return;
                }
            };
            if partition.is_active() {
                active_nodes.extend(nodes);
            } else {
                inactive_nodes.extend(nodes);
            }
        }

        phases::inactive::run(&self.cloud, &inactive_nodes, config.terminate_max_batch_size).await;

        let live_instances = match self.cloud.list_cluster_instances(false, true).await {
            Ok(i) => i,
            Err(e) => {
                error!(error = %e, "cloud inventory unavailable, aborting remainder of tick");
                return;
            }
        };

        if active_nodes.is_empty() {
            phases::orphan::run(
                &self.cloud,
                &live_instances,
                &HashSet::new(),
                now,
                config.orphaned_instance_timeout_secs,
                config.terminate_max_batch_size,
            )
            .await;
            return;
        }

        let derived = DerivedMaps::build(&live_instances, &active_nodes);

        if !config.disable_all_health_checks {
            phases::health_check::run(
                &self.scheduler,
                &self.cloud,
                &live_instances,
                &derived.ip_to_node,
                now,
                config.health_check_timeout_secs,
                config.ec2_health_check_enabled(),
                config.scheduled_event_check_enabled(),
            )
            .await;
        }

        phases::maintenance::run(
            &self.scheduler,
            &self.cloud,
            &active_nodes,
            &derived.ip_to_instance,
            &mut self.static_nodes_in_replacement,
            now,
            config.node_replacement_timeout_secs,
            config.terminate_down_nodes,
            config.terminate_drain_nodes,
            config.launch_max_batch_size,
            config.terminate_max_batch_size,
            config.update_node_address,
        )
        .await;

        let ips_used_by_slurm: HashSet<String> = active_nodes
            .iter()
            .filter(|n| n.has_assigned_address())
            .map(|n| n.address.clone())
            .collect();

        phases::orphan::run(
            &self.cloud,
            &live_instances,
            &ips_used_by_slurm,
            now,
            config.orphaned_instance_timeout_secs,
            config.terminate_max_batch_size,
        )
        .await;
    }
}
