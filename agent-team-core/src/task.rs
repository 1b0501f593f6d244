//! Task and assignment models
//!
//! Tasks are opaque units of work identified by id. The coordinator only cares
//! about their status, their declared dependencies and the routing hints
//! (preferred agent type, capability requirements) they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Status of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Completed,
    Escalated,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Escalated => write!(f, "escalated"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "completed" => Ok(TaskStatus::Completed),
            "escalated" => Ok(TaskStatus::Escalated),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::validation(format!("Unknown task status: {}", other))),
        }
    }
}

/// Task priority
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "critical" => Ok(TaskPriority::Critical),
            other => Err(Error::validation(format!(
                "Unknown task priority: {}",
                other
            ))),
        }
    }
}

/// Durable task record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub preferred_agent_type: Option<String>,
    pub required_capabilities: Vec<String>,
    /// Ids of tasks that must be completed before this one can be assigned
    pub dependencies: Vec<String>,
    pub assigned_agent_id: Option<String>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// New pending task without routing hints or dependencies
    pub fn new<S1: Into<String>, S2: Into<String>>(id: S1, title: S2) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::default(),
            preferred_agent_type: None,
            required_capabilities: Vec::new(),
            dependencies: Vec::new(),
            assigned_agent_id: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_dependency<S: Into<String>>(mut self, task_id: S) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    pub fn with_requirement<S: Into<String>>(mut self, capability: S) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }

    pub fn with_preferred_type<S: Into<String>>(mut self, agent_type: S) -> Self {
        self.preferred_agent_type = Some(agent_type.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Request that routes this task using its own hints
    pub fn assignment_request(&self) -> TaskAssignmentRequest {
        TaskAssignmentRequest {
            task_id: self.id.clone(),
            preferred_agent_type: self.preferred_agent_type.clone(),
            priority: self.priority,
            requirements: self.required_capabilities.clone(),
            context: None,
        }
    }
}

/// A unit of work to route to an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskAssignmentRequest {
    pub task_id: String,
    #[serde(default)]
    pub preferred_agent_type: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

impl TaskAssignmentRequest {
    pub fn new<S: Into<String>>(task_id: S) -> Self {
        Self {
            task_id: task_id.into(),
            preferred_agent_type: None,
            priority: TaskPriority::default(),
            requirements: Vec::new(),
            context: None,
        }
    }

    pub fn preferred_agent_type<S: Into<String>>(mut self, agent_type: S) -> Self {
        self.preferred_agent_type = Some(agent_type.into());
        self
    }

    pub fn requirement<S: Into<String>>(mut self, capability: S) -> Self {
        self.requirements.push(capability.into());
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Kind of assignment record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Primary,
    Escalation,
}

impl std::fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentKind::Primary => write!(f, "primary"),
            AssignmentKind::Escalation => write!(f, "escalation"),
        }
    }
}

impl std::str::FromStr for AssignmentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" => Ok(AssignmentKind::Primary),
            "escalation" => Ok(AssignmentKind::Escalation),
            other => Err(Error::validation(format!(
                "Unknown assignment kind: {}",
                other
            ))),
        }
    }
}

/// Status of an assignment record. Only `Active` is non-terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Completed,
    Escalated,
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentStatus::Active => write!(f, "active"),
            AssignmentStatus::Completed => write!(f, "completed"),
            AssignmentStatus::Escalated => write!(f, "escalated"),
        }
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(AssignmentStatus::Active),
            "completed" => Ok(AssignmentStatus::Completed),
            "escalated" => Ok(AssignmentStatus::Escalated),
            other => Err(Error::validation(format!(
                "Unknown assignment status: {}",
                other
            ))),
        }
    }
}

/// Binding of a task to an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: Uuid,
    pub task_id: String,
    pub agent_id: String,
    pub kind: AssignmentKind,
    pub status: AssignmentStatus,
    pub priority: TaskPriority,
    pub reason: Option<String>,
    pub escalated_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Active primary assignment
    pub fn primary<S1: Into<String>, S2: Into<String>>(
        task_id: S1,
        agent_id: S2,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            kind: AssignmentKind::Primary,
            status: AssignmentStatus::Active,
            priority,
            reason: None,
            escalated_to: None,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Escalation record; never counted as an active assignment
    pub fn escalation(
        task_id: &str,
        from_agent_id: &str,
        reason: &str,
        to_user_id: Option<&str>,
        priority: TaskPriority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            agent_id: from_agent_id.to_string(),
            kind: AssignmentKind::Escalation,
            status: AssignmentStatus::Escalated,
            priority,
            reason: Some(reason.to_string()),
            escalated_to: to_user_id.map(str::to_string),
            created_at: now,
            closed_at: Some(now),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }

    pub fn complete(&mut self) {
        self.status = AssignmentStatus::Completed;
        self.closed_at = Some(Utc::now());
    }
}

/// Result of completing a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionOutcome {
    pub task_id: String,
    pub agent_id: String,
    /// Dependent tasks assigned because this completion unblocked them
    pub unblocked: Vec<UnblockedTask>,
}

/// A dependent task that was automatically assigned
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnblockedTask {
    pub task_id: String,
    pub agent_id: String,
}
