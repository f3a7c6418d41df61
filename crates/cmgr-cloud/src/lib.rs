//! Cloud adapter: the reconciler's only window into the provider's
//! virtual-machine fleet.
//!
//! The trait is the whole contract — a real implementation would call the
//! cloud provider's API (describe/terminate/run-instances equivalents). This
//! crate ships only [`testing::InMemoryCloudClient`], which is enough to
//! drive the reconciler end-to-end in tests and local runs.

#![forbid(unsafe_code)]

pub mod testing;

use async_trait::async_trait;
use cmgr_proto::{Instance, InstanceHealthState, RetryPolicy};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("cloud provider unavailable: {0}")]
    Unavailable(String),
    #[error("cloud mutation failed: {0}")]
    MutationFailed(String),
}

pub type CloudResult<T> = Result<T, CloudError>;

/// Capabilities the reconciler needs from the cloud provider.
#[async_trait]
pub trait CloudClient: Send + Sync + std::fmt::Debug {
    /// Instances tagged with the cluster name, filtered to alive lifecycle
    /// states and (unless `include_master`) compute-node instance type.
    async fn list_cluster_instances(
        &self,
        include_master: bool,
        alive_only: bool,
    ) -> CloudResult<Vec<Instance>>;

    /// Resolve instance records from a set of private IPs.
    async fn list_instances_by_ip(&self, ips: &[String]) -> CloudResult<Vec<Instance>>;

    /// Batched termination.
    async fn terminate(&self, instance_ids: &[String], batch_size: usize) -> CloudResult<()>;

    /// Request fresh instances for the given node names. When
    /// `update_node_address` is set the caller is expected to push the newly
    /// assigned IPs back into the scheduler.
    async fn launch_for_nodes(
        &self,
        node_names: &[String],
        batch_size: usize,
        update_node_address: bool,
    ) -> CloudResult<()>;

    /// Instances failing at least one of: instance status, system status, or
    /// scheduled events.
    async fn describe_unhealthy(&self, instance_ids: &[String]) -> CloudResult<Vec<InstanceHealthState>>;
}

/// Wraps any [`CloudClient`] with bounded retry on the read-only listing and
/// describe calls. Mutations (`terminate`, `launch_for_nodes`) are not
/// retried — the engine reports the failure to the caller as-is rather than
/// risk double-applying a mutation.
#[derive(Debug)]
pub struct RetryingCloudClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: CloudClient> RetryingCloudClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn retry<T, F, Fut>(&self, op_name: &str, op: F) -> CloudResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = CloudResult<T>>,
    {
        let mut last_err = None;
        for attempt in 0..=self.policy.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(op = op_name, attempt, error = %e, "cloud call failed, retrying");
                    last_err = Some(e);
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }
}

#[async_trait]
impl<C: CloudClient> CloudClient for RetryingCloudClient<C> {
    async fn list_cluster_instances(
        &self,
        include_master: bool,
        alive_only: bool,
    ) -> CloudResult<Vec<Instance>> {
        self.retry("list_cluster_instances", || {
            self.inner.list_cluster_instances(include_master, alive_only)
        })
        .await
    }

    async fn list_instances_by_ip(&self, ips: &[String]) -> CloudResult<Vec<Instance>> {
        self.retry("list_instances_by_ip", || self.inner.list_instances_by_ip(ips))
            .await
    }

    async fn terminate(&self, instance_ids: &[String], batch_size: usize) -> CloudResult<()> {
        self.inner.terminate(instance_ids, batch_size).await
    }

    async fn launch_for_nodes(
        &self,
        node_names: &[String],
        batch_size: usize,
        update_node_address: bool,
    ) -> CloudResult<()> {
        self.inner
            .launch_for_nodes(node_names, batch_size, update_node_address)
            .await
    }

    async fn describe_unhealthy(&self, instance_ids: &[String]) -> CloudResult<Vec<InstanceHealthState>> {
        self.retry("describe_unhealthy", || self.inner.describe_unhealthy(instance_ids))
            .await
    }
}
