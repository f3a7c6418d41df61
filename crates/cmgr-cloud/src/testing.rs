//! An in-memory [`CloudClient`] for tests and local runs — no real cloud
//! provider required.

use crate::{CloudClient, CloudResult};
use async_trait::async_trait;
use cmgr_proto::{Instance, InstanceHealthState};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct TrackedInstance {
    instance: Instance,
    is_master: bool,
    alive: bool,
}

#[derive(Debug, Clone)]
pub struct TerminateCall {
    pub instance_ids: Vec<String>,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct LaunchCall {
    pub node_names: Vec<String>,
    pub batch_size: usize,
    pub update_node_address: bool,
}

#[derive(Debug, Default)]
struct Inner {
    instances: Vec<TrackedInstance>,
    health: HashMap<String, InstanceHealthState>,
    terminate_calls: Vec<TerminateCall>,
    launch_calls: Vec<LaunchCall>,
    next_synthetic_id: u64,
}

/// Seeded with a set of instances up front; `launch_for_nodes` synthesizes
/// fresh instance records (so a subsequent listing call reflects the launch)
/// and `terminate` marks instances dead rather than actually removing them,
/// so tests can assert on both the recorded call and the resulting fleet view.
#[derive(Debug, Default)]
pub struct InMemoryCloudClient {
    inner: Mutex<Inner>,
}

impl InMemoryCloudClient {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                instances: instances
                    .into_iter()
                    .map(|instance| TrackedInstance {
                        instance,
                        is_master: false,
                        alive: true,
                    })
                    .collect(),
                ..Default::default()
            }),
        }
    }

    pub fn with_master(mut self, instance: Instance) -> Self {
        self.inner.lock().unwrap().instances.push(TrackedInstance {
            instance,
            is_master: true,
            alive: true,
        });
        self
    }

    pub fn set_health_state(&self, state: InstanceHealthState) {
        self.inner
            .lock()
            .unwrap()
            .health
            .insert(state.instance_id.clone(), state);
    }

    pub fn terminate_calls(&self) -> Vec<TerminateCall> {
        self.inner.lock().unwrap().terminate_calls.clone()
    }

    pub fn launch_calls(&self) -> Vec<LaunchCall> {
        self.inner.lock().unwrap().launch_calls.clone()
    }

    pub fn all_instances(&self) -> Vec<Instance> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .iter()
            .map(|t| t.instance.clone())
            .collect()
    }
}

#[async_trait]
impl CloudClient for InMemoryCloudClient {
    async fn list_cluster_instances(
        &self,
        include_master: bool,
        alive_only: bool,
    ) -> CloudResult<Vec<Instance>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .instances
            .iter()
            .filter(|t| include_master || !t.is_master)
            .filter(|t| !alive_only || t.alive)
            .map(|t| t.instance.clone())
            .collect())
    }

    async fn list_instances_by_ip(&self, ips: &[String]) -> CloudResult<Vec<Instance>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .instances
            .iter()
            .filter(|t| ips.contains(&t.instance.private_ip))
            .map(|t| t.instance.clone())
            .collect())
    }

    async fn terminate(&self, instance_ids: &[String], batch_size: usize) -> CloudResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.terminate_calls.push(TerminateCall {
            instance_ids: instance_ids.to_vec(),
            batch_size,
        });
        for t in inner.instances.iter_mut() {
            if instance_ids.contains(&t.instance.instance_id) {
                t.alive = false;
            }
        }
        Ok(())
    }

    async fn launch_for_nodes(
        &self,
        node_names: &[String],
        batch_size: usize,
        update_node_address: bool,
    ) -> CloudResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.launch_calls.push(LaunchCall {
            node_names: node_names.to_vec(),
            batch_size,
            update_node_address,
        });
        let launch_time = Utc::now();
        for name in node_names {
            let id = inner.next_synthetic_id;
            inner.next_synthetic_id += 1;
            inner.instances.push(TrackedInstance {
                instance: Instance {
                    instance_id: format!("i-synthetic-{id}"),
                    private_ip: format!("10.77.{}.{}", id / 256, id % 256),
                    hostname: name.clone(),
                    launch_time,
                },
                is_master: false,
                alive: true,
            });
        }
        Ok(())
    }

    async fn describe_unhealthy(&self, instance_ids: &[String]) -> CloudResult<Vec<InstanceHealthState>> {
        let inner = self.inner.lock().unwrap();
        Ok(instance_ids
            .iter()
            .filter_map(|id| inner.health.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmgr_proto::{CheckStatus, StatusCheck};

    fn instance(id: &str, ip: &str) -> Instance {
        Instance {
            instance_id: id.to_string(),
            private_ip: ip.to_string(),
            hostname: id.to_string(),
            launch_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lists_seeded_instances_and_resolves_by_ip() {
        let client = InMemoryCloudClient::new(vec![instance("i-1", "10.0.0.1")]);
        let all = client.list_cluster_instances(false, true).await.unwrap();
        assert_eq!(all.len(), 1);
        let resolved = client
            .list_instances_by_ip(&["10.0.0.1".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved[0].instance_id, "i-1");
    }

    #[tokio::test]
    async fn terminate_marks_dead_and_is_excluded_from_alive_only() {
        let client = InMemoryCloudClient::new(vec![instance("i-1", "10.0.0.1")]);
        client.terminate(&["i-1".to_string()], 1).await.unwrap();
        assert_eq!(client.terminate_calls().len(), 1);
        let alive = client.list_cluster_instances(false, true).await.unwrap();
        assert!(alive.is_empty());
        let all = client.list_cluster_instances(false, false).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn launch_for_nodes_synthesizes_instances() {
        let client = InMemoryCloudClient::default();
        client
            .launch_for_nodes(&["q1-st-static-1".to_string()], 5, true)
            .await
            .unwrap();
        assert_eq!(client.launch_calls().len(), 1);
        let all = client.list_cluster_instances(false, true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].hostname, "q1-st-static-1");
    }

    #[tokio::test]
    async fn describe_unhealthy_returns_only_seeded_ids() {
        let client = InMemoryCloudClient::new(vec![instance("i-1", "10.0.0.1")]);
        client.set_health_state(InstanceHealthState {
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
        });
        let result = client
            .describe_unhealthy(&["i-1".to_string(), "i-missing".to_string()])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].instance_id, "i-1");
    }
}
