//! An in-memory [`SchedulerClient`] for tests and local runs — no real
//! scheduler required.

use crate::{SchedulerClient, SchedulerError, SchedulerResult};
use async_trait::async_trait;
use cmgr_proto::{Node, Partition};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub node_names: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Default)]
struct Inner {
    partitions: Vec<Partition>,
    nodes: Vec<Node>,
    drain_calls: Vec<RecordedCall>,
    down_and_power_save_calls: Vec<RecordedCall>,
    down_calls: Vec<RecordedCall>,
    fail_listing: bool,
}

/// A fully in-memory scheduler: partitions and nodes are seeded up front,
/// mutations are recorded rather than applied to a live scheduler, and
/// `fail_listing` can be toggled to exercise `SchedulerUnavailable` handling.
#[derive(Debug, Default)]
pub struct InMemorySchedulerClient {
    inner: Mutex<Inner>,
}

impl InMemorySchedulerClient {
    pub fn new(partitions: Vec<Partition>, nodes: Vec<Node>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                partitions,
                nodes,
                ..Default::default()
            }),
        }
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.inner.lock().unwrap().fail_listing = fail;
    }

    pub fn drain_calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().drain_calls.clone()
    }

    pub fn down_and_power_save_calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().down_and_power_save_calls.clone()
    }

    pub fn down_calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().down_calls.clone()
    }
}

#[async_trait]
impl SchedulerClient for InMemorySchedulerClient {
    async fn list_partitions(&self) -> SchedulerResult<Vec<Partition>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_listing {
            return Err(SchedulerError::Unavailable(
                "in-memory scheduler configured to fail".to_string(),
            ));
        }
        Ok(inner.partitions.clone())
    }

    async fn list_nodes(&self, name_specification: Option<&str>) -> SchedulerResult<Vec<Node>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_listing {
            return Err(SchedulerError::Unavailable(
                "in-memory scheduler configured to fail".to_string(),
            ));
        }
        Ok(match name_specification {
            None => inner.nodes.clone(),
            Some(spec) => inner
                .nodes
                .iter()
                .filter(|n| n.name.contains(spec))
                .cloned()
                .collect(),
        })
    }

    async fn drain(&self, node_names: &[String], reason: &str) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.drain_calls.push(RecordedCall {
            node_names: node_names.to_vec(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn down_and_power_save(&self, node_names: &[String], reason: &str) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.down_and_power_save_calls.push(RecordedCall {
            node_names: node_names.to_vec(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn down(&self, node_names: &[String], reason: &str) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.down_calls.push(RecordedCall {
            node_names: node_names.to_vec(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}
