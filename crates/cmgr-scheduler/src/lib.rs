//! Scheduler adapter: the reconciler's only window into the batch scheduler's
//! partition/node inventory.
//!
//! The trait is the whole contract — a real implementation would shell out to
//! `sinfo`/`scontrol` or talk to the scheduler's REST API. This crate ships
//! only [`testing::InMemorySchedulerClient`], which is enough to drive the
//! reconciler end-to-end in tests and local runs.

#![forbid(unsafe_code)]

pub mod testing;

use async_trait::async_trait;
use cmgr_proto::{Node, Partition, RetryPolicy};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
    #[error("scheduler mutation failed: {0}")]
    MutationFailed(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Capabilities the reconciler needs from the batch scheduler.
#[async_trait]
pub trait SchedulerClient: Send + Sync + std::fmt::Debug {
    async fn list_partitions(&self) -> SchedulerResult<Vec<Partition>>;
    async fn list_nodes(&self, name_specification: Option<&str>) -> SchedulerResult<Vec<Node>>;

    /// Mark nodes as DRAIN — yields to running jobs, blocks new ones.
    async fn drain(&self, node_names: &[String], reason: &str) -> SchedulerResult<()>;

    /// Mark dynamic nodes down and request the scheduler reclaim them.
    async fn down_and_power_save(&self, node_names: &[String], reason: &str) -> SchedulerResult<()>;

    /// Mark static nodes down (they are about to be replaced).
    async fn down(&self, node_names: &[String], reason: &str) -> SchedulerResult<()>;
}

/// Wraps any [`SchedulerClient`] with bounded retry on the read-only listing
/// calls. Mutations are not retried — a failed drain/down call is reported to
/// the caller as-is, since retrying a partially-applied mutation risks
/// double-application.
#[derive(Debug)]
pub struct RetryingSchedulerClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: SchedulerClient> RetryingSchedulerClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn retry<T, F, Fut>(&self, op_name: &str, op: F) -> SchedulerResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = SchedulerResult<T>>,
    {
        let mut last_err = None;
        for attempt in 0..=self.policy.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(op = op_name, attempt, error = %e, "scheduler call failed, retrying");
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
impl<C: SchedulerClient> SchedulerClient for RetryingSchedulerClient<C> {
    async fn list_partitions(&self) -> SchedulerResult<Vec<Partition>> {
        self.retry("list_partitions", || self.inner.list_partitions())
            .await
    }

    async fn list_nodes(&self, name_specification: Option<&str>) -> SchedulerResult<Vec<Node>> {
        self.retry("list_nodes", || self.inner.list_nodes(name_specification))
            .await
    }

    async fn drain(&self, node_names: &[String], reason: &str) -> SchedulerResult<()> {
        self.inner.drain(node_names, reason).await
    }

    async fn down_and_power_save(&self, node_names: &[String], reason: &str) -> SchedulerResult<()> {
        self.inner.down_and_power_save(node_names, reason).await
    }

    async fn down(&self, node_names: &[String], reason: &str) -> SchedulerResult<()> {
        self.inner.down(node_names, reason).await
    }
}
