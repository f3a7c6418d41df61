//! Inactive-partition cleanup: terminates the instances backing every node
//! in an inactive partition. The scheduler-side node state is untouched —
//! the partition itself already blocks new scheduling.

use cmgr_cloud::CloudClient;
use cmgr_proto::Node;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(cloud: &Arc<dyn CloudClient>, inactive_nodes: &[Node], terminate_max_batch_size: usize) {
    let ips: Vec<String> = inactive_nodes
        .iter()
        .filter(|n| n.has_assigned_address())
        .map(|n| n.address.clone())
        .collect();

    if ips.is_empty() {
        return;
    }

    let instances = match cloud.list_instances_by_ip(&ips).await {
        Ok(instances) => instances,
        Err(e) => {
            warn!(error = %e, "inactive partition cleanup: list_instances_by_ip failed");
            return;
        }
    };
    if instances.is_empty() {
        return;
    }

    let instance_ids: Vec<String> = instances.into_iter().map(|i| i.instance_id).collect();
    info!(instances = ?instance_ids, "terminating instances backing inactive-partition nodes");
    if let Err(e) = cloud.terminate(&instance_ids, terminate_max_batch_size).await {
        warn!(error = %e, "inactive partition cleanup: terminate failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cmgr_cloud::testing::InMemoryCloudClient;
    use cmgr_proto::Instance;

    #[tokio::test]
    async fn terminates_backing_instances_for_inactive_nodes() {
        let node = Node::new("n5", "10.0.0.9");
        let unassigned = Node::new("n6", "n6");
        let cloud = Arc::new(InMemoryCloudClient::new(vec![Instance {
            instance_id: "i-9".to_string(),
            private_ip: "10.0.0.9".to_string(),
            hostname: "i-9".to_string(),
            launch_time: Utc::now(),
        }]));
        let cloud_dyn: Arc<dyn CloudClient> = cloud.clone();

        run(&cloud_dyn, &[node, unassigned], 1000).await;

        assert_eq!(cloud.terminate_calls()[0].instance_ids, vec!["i-9".to_string()]);
    }

    #[tokio::test]
    async fn no_assigned_addresses_skips_entirely() {
        let unassigned = Node::new("n6", "n6");
        let cloud = Arc::new(InMemoryCloudClient::default());
        let cloud_dyn: Arc<dyn CloudClient> = cloud.clone();

        run(&cloud_dyn, &[unassigned], 1000).await;

        assert!(cloud.terminate_calls().is_empty());
    }
}
