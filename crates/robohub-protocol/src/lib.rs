use robohub_core::drive::MoveTarget;
use robohub_core::{RobotTask, TaskId, TaskType, TemplateId};
use serde::{Deserialize, Serialize};

pub const MOVE_CREATOR: &str = "robohub";
pub const MOVE_TYPE_STANDARD: &str = "standard";

/// Body of the robot's `POST /chassis/moves`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCommand {
    pub creator: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub target_x: f64,
    pub target_y: f64,
    #[serde(default)]
    pub target_z: f64,
    pub target_ori: f64,
    pub target_accuracy: f64,
    #[serde(default)]
    pub use_target_zone: bool,
    #[serde(default)]
    pub properties: MoveProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveProperties {
    pub inplace_rotate: bool,
}

impl From<&MoveTarget> for MoveCommand {
    fn from(target: &MoveTarget) -> Self {
        Self {
            creator: MOVE_CREATOR.to_string(),
            kind: MOVE_TYPE_STANDARD.to_string(),
            target_x: target.x,
            target_y: target.y,
            target_z: 0.0,
            target_ori: target.ori,
            target_accuracy: target.accuracy,
            use_target_zone: false,
            properties: MoveProperties { inplace_rotate: target.inplace_rotate },
        }
    }
}

/// Body of the robot's `PATCH /chassis/moves/current`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStateChange {
    pub state: String,
}

impl MoveStateChange {
    #[must_use]
    pub fn cancelled() -> Self {
        Self { state: "cancelled".to_string() }
    }
}

/// Frames pushed on `/ws/robot-tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    TaskUpdate(TaskUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: Option<TaskId>,
    pub serial_number: Option<String>,
    pub action: TaskAction,
    pub sent_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Created,
    Started,
    PriorityChanged,
    Reordered,
    Cancelled,
    Completed,
    Promoted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub serial_number: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskResponse {
    pub completed: RobotTask,
    pub promoted: Option<RobotTask>,
}
