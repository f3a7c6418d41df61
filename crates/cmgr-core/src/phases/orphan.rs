//! Orphaned-instance phase: terminates live instances whose private IP is
//! not claimed by any active node, once they've outlived the orphan grace
//! period (instances in the middle of joining the scheduler are left alone).

use crate::clock::time_is_up;
use chrono::{DateTime, Utc};
use cmgr_cloud::CloudClient;
use cmgr_proto::Instance;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(
    cloud: &Arc<dyn CloudClient>,
    live_instances: &[Instance],
    ips_used_by_slurm: &HashSet<String>,
    now: DateTime<Utc>,
    orphaned_instance_timeout_secs: i64,
    terminate_max_batch_size: usize,
) {
    let orphans: Vec<String> = live_instances
        .iter()
        .filter(|i| !ips_used_by_slurm.contains(&i.private_ip))
        .filter(|i| time_is_up(i.launch_time, now, orphaned_instance_timeout_secs))
        .map(|i| i.instance_id.clone())
        .collect();

    if orphans.is_empty() {
        return;
    }

    info!(instances = ?orphans, "terminating orphaned instances");
    if let Err(e) = cloud.terminate(&orphans, terminate_max_batch_size).await {
        warn!(error = %e, "orphan phase: terminate failed");
    }
}
