//! Tasks the node has learned about from the network.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier of a task announced on the network.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a task identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Part of a task header that never changes after the task is announced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedHeader {
    /// Execution environment the task requires, e.g. `WASM`.
    pub environment: String,

    /// Unix timestamp (seconds) after which the task is no longer offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,
}

/// Header of a known task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHeader {
    /// Task identifier.
    pub task_id: TaskId,

    /// Immutable part of the header.
    pub fixed_header: FixedHeader,
}

/// Thread-safe registry of known task headers.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<BTreeMap<TaskId, TaskHeader>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a header, returning the one it replaced.
    pub fn insert(&self, header: TaskHeader) -> Option<TaskHeader> {
        debug!(
            "known task {} ({})",
            header.task_id, header.fixed_header.environment
        );
        self.tasks.write().insert(header.task_id.clone(), header)
    }

    /// Forgets a task.
    pub fn remove(&self, task_id: &TaskId) -> Option<TaskHeader> {
        self.tasks.write().remove(task_id)
    }

    /// Looks up a single header.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<TaskHeader> {
        self.tasks.read().get(task_id).cloned()
    }

    /// Number of known tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether no tasks are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Copy of every known header, ordered by task id.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<TaskId, TaskHeader> {
        self.tasks.read().clone()
    }
}
