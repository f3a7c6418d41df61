//! Node-maintenance phase: updates the static-replacement set, classifies
//! active nodes as healthy/unhealthy, powers down unhealthy dynamic nodes,
//! and replaces unhealthy static nodes (down + terminate + relaunch).

use crate::classifiers::{is_node_being_replaced, is_node_healthy};
use chrono::{DateTime, Utc};
use cmgr_cloud::CloudClient;
use cmgr_proto::{Instance, Node};
use cmgr_scheduler::SchedulerClient;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

pub struct MaintenanceOutcome {
    pub unhealthy_dynamic: Vec<String>,
    pub unhealthy_static: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    scheduler: &Arc<dyn SchedulerClient>,
    cloud: &Arc<dyn CloudClient>,
    active_nodes: &[Node],
    ip_to_instance: &HashMap<String, Instance>,
    static_nodes_in_replacement: &mut HashSet<String>,
    now: DateTime<Utc>,
    node_replacement_timeout_secs: i64,
    terminate_down_nodes: bool,
    terminate_drain_nodes: bool,
    launch_max_batch_size: usize,
    terminate_max_batch_size: usize,
    update_node_address: bool,
) -> MaintenanceOutcome {
    let active_by_name: HashMap<&str, &Node> =
        active_nodes.iter().map(|n| (n.name.as_str(), n)).collect();

    // A node leaves the replacement set once it reappears active and no
    // longer purely DOWN, or once it's no longer in the active list at all.
    static_nodes_in_replacement.retain(|name| match active_by_name.get(name.as_str()) {
        Some(node) => node.is_purely_down(),
        None => false,
    });

    let mut unhealthy_dynamic = Vec::new();
    let mut unhealthy_static = Vec::new();
    for node in active_nodes {
        let in_replacement = is_node_being_replaced(
            node,
            ip_to_instance,
            static_nodes_in_replacement,
            now,
            node_replacement_timeout_secs,
        );
        let healthy = is_node_healthy(
            node,
            ip_to_instance,
            in_replacement,
            terminate_down_nodes,
            terminate_drain_nodes,
        );
        if healthy {
            continue;
        }
        if node.is_dynamic() {
            unhealthy_dynamic.push(node.name.clone());
        } else {
            unhealthy_static.push(node.name.clone());
        }
    }

    if !unhealthy_dynamic.is_empty() {
        info!(nodes = ?unhealthy_dynamic, "powering down unhealthy dynamic nodes");
        if let Err(e) = scheduler
            .down_and_power_save(&unhealthy_dynamic, "Scheduler health check failed")
            .await
        {
            warn!(error = %e, "maintenance phase: down_and_power_save failed");
        }
    }

    if !unhealthy_static.is_empty() {
        info!(nodes = ?unhealthy_static, "marking unhealthy static nodes down for replacement");
        if let Err(e) = scheduler
            .down(
                &unhealthy_static,
                "Static node maintenance: unhealthy node is being replaced",
            )
            .await
        {
            warn!(error = %e, "maintenance phase: down failed");
        }

        let instance_ids: Vec<String> = unhealthy_static
            .iter()
            .filter_map(|name| active_by_name.get(name.as_str()))
            .filter_map(|node| ip_to_instance.get(&node.address))
            .map(|instance| instance.instance_id.clone())
            .collect();
        if !instance_ids.is_empty() {
            if let Err(e) = cloud.terminate(&instance_ids, terminate_max_batch_size).await {
                warn!(error = %e, "maintenance phase: terminate failed");
            }
        }

        if let Err(e) = cloud
            .launch_for_nodes(&unhealthy_static, launch_max_batch_size, update_node_address)
            .await
        {
            warn!(error = %e, "maintenance phase: launch_for_nodes failed");
        }

        static_nodes_in_replacement.extend(unhealthy_static.iter().cloned());
    }

    MaintenanceOutcome {
        unhealthy_dynamic,
        unhealthy_static,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmgr_cloud::testing::InMemoryCloudClient;
    use cmgr_proto::NodeStateFlag;
    use cmgr_scheduler::testing::InMemorySchedulerClient;

    fn instance(id: &str, ip: &str) -> Instance {
        Instance {
            instance_id: id.to_string(),
            private_ip: ip.to_string(),
            hostname: id.to_string(),
            launch_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unhealthy_static_replacement_matches_scenario_5() {
        let n1 = Node::new("n1", "ip-1").with_state([NodeStateFlag::Down]);
        let n2 = Node::new("n2", "ip-2").with_state([NodeStateFlag::Down]);
        let n3 = Node::new("n3", "ip-3").with_state([NodeStateFlag::Down]);
        let active_nodes = vec![n1, n2, n3];

        let mut ip_to_instance = HashMap::new();
        ip_to_instance.insert("ip-1".to_string(), instance("id-1", "ip-1"));
        ip_to_instance.insert("ip-2".to_string(), instance("id-2", "ip-2"));

        let mut in_replacement: HashSet<String> = HashSet::new();
        in_replacement.insert("X".to_string());

        let scheduler = Arc::new(InMemorySchedulerClient::default());
        let scheduler_dyn: Arc<dyn SchedulerClient> = scheduler.clone();
        let cloud = Arc::new(InMemoryCloudClient::default());
        let cloud_dyn: Arc<dyn CloudClient> = cloud.clone();

        let outcome = run(
            &scheduler_dyn,
            &cloud_dyn,
            &active_nodes,
            &ip_to_instance,
            &mut in_replacement,
            Utc::now(),
            600,
            true,
            true,
            5,
            1,
            true,
        )
        .await;

        assert_eq!(outcome.unhealthy_static.len(), 3);
        assert_eq!(scheduler.down_calls().len(), 1);
        assert_eq!(cloud.terminate_calls()[0].instance_ids.len(), 2);
        assert_eq!(cloud.terminate_calls()[0].batch_size, 1);
        assert_eq!(cloud.launch_calls()[0].node_names.len(), 3);
        assert_eq!(cloud.launch_calls()[0].batch_size, 5);
        assert!(!in_replacement.contains("X"));
        assert!(in_replacement.contains("n1"));
        assert!(in_replacement.contains("n2"));
        assert!(in_replacement.contains("n3"));
    }

    #[tokio::test]
    async fn replacement_set_drops_node_once_it_comes_back() {
        let recovered = Node::new("n1", "ip-1"); // no DOWN flag: came back healthy
        let mut ip_to_instance = HashMap::new();
        ip_to_instance.insert("ip-1".to_string(), instance("id-1", "ip-1"));
        let mut in_replacement: HashSet<String> = HashSet::new();
        in_replacement.insert("n1".to_string());

        let scheduler = Arc::new(InMemorySchedulerClient::default());
        let scheduler_dyn: Arc<dyn SchedulerClient> = scheduler;
        let cloud = Arc::new(InMemoryCloudClient::default());
        let cloud_dyn: Arc<dyn CloudClient> = cloud;

        run(
            &scheduler_dyn,
            &cloud_dyn,
            &[recovered],
            &ip_to_instance,
            &mut in_replacement,
            Utc::now(),
            600,
            true,
            true,
            5,
            5,
            true,
        )
        .await;

        assert!(!in_replacement.contains("n1"));
    }

    #[tokio::test]
    async fn replacement_set_drops_node_absent_from_active_list() {
        let still_down = Node::new("n2", "ip-2").with_state([NodeStateFlag::Down]);
        let mut ip_to_instance = HashMap::new();
        ip_to_instance.insert("ip-2".to_string(), instance("id-2", "ip-2"));
        let mut in_replacement: HashSet<String> = HashSet::new();
        in_replacement.insert("n2".to_string());
        in_replacement.insert("n4".to_string()); // not in the active list at all

        let scheduler = Arc::new(InMemorySchedulerClient::default());
        let scheduler_dyn: Arc<dyn SchedulerClient> = scheduler;
        let cloud = Arc::new(InMemoryCloudClient::default());
        let cloud_dyn: Arc<dyn CloudClient> = cloud;

        run(
            &scheduler_dyn,
            &cloud_dyn,
            &[still_down],
            &ip_to_instance,
            &mut in_replacement,
            Utc::now(),
            600,
            true,
            true,
            5,
            5,
            true,
        )
        .await;

        assert!(in_replacement.contains("n2"));
        assert!(!in_replacement.contains("n4"));
    }
}
