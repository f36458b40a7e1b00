use super::AppState;
use crate::{error::ApiError, store::NewTask};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use robohub_core::{RobotTask, TaskId, TemplateId};
use robohub_protocol::{
    CompleteTaskResponse, CreateTaskRequest, ReorderRequest, TaskAction, UpdatePriorityRequest,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub(super) struct TaskFilter {
    serial_number: Option<String>,
    template_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct PendingFilter {
    serial_number: Option<String>,
}

pub(super) async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<RobotTask>>, ApiError> {
    let store = state.store.lock().await;
    let tasks = match (filter.serial_number, filter.template_id) {
        (Some(serial_number), _) => store.list_tasks_by_serial(&serial_number)?,
        (None, Some(template_id)) => store.list_tasks_by_template(TemplateId(template_id))?,
        (None, None) => store.list_tasks()?,
    };
    Ok(Json(tasks))
}

pub(super) async fn list_pending(
    State(state): State<AppState>,
    Query(filter): Query<PendingFilter>,
) -> Result<Json<Vec<RobotTask>>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.list_pending_tasks(filter.serial_number.as_deref())?))
}

pub(super) async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RobotTask>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.get_task(TaskId(id))?))
}

pub(super) async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<RobotTask>, ApiError> {
    if request.serial_number.trim().is_empty() {
        return Err(ApiError::bad_request("serial_number is required"));
    }
    let parameters = request.parameters.unwrap_or_else(|| serde_json::json!({}));
    if !parameters.is_object() {
        return Err(ApiError::bad_request("parameters must be a json object"));
    }

    let task = state.store.lock().await.create_task(NewTask {
        serial_number: request.serial_number,
        task_type: request.task_type,
        priority: request.priority.unwrap_or(0),
        template_id: request.template_id,
        parameters,
    })?;
    info!(task_id = %task.id, serial_number = %task.serial_number, task_type = task.task_type.as_str(), "task created");
    state.events.task_changed(&task, TaskAction::Created);
    Ok(Json(task))
}

pub(super) async fn update_priority(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePriorityRequest>,
) -> Result<Json<RobotTask>, ApiError> {
    let task = state.store.lock().await.update_priority(TaskId(id), request.priority)?;
    state.events.task_changed(&task, TaskAction::PriorityChanged);
    Ok(Json(task))
}

pub(super) async fn start_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RobotTask>, ApiError> {
    let task = state.store.lock().await.start_task(TaskId(id))?;
    state.events.task_changed(&task, TaskAction::Started);
    Ok(Json(task))
}

pub(super) async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RobotTask>, ApiError> {
    let task = state.store.lock().await.cancel_task(TaskId(id))?;
    info!(task_id = %task.id, serial_number = %task.serial_number, "task cancelled");
    state.events.task_changed(&task, TaskAction::Cancelled);
    Ok(Json(task))
}

pub(super) async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CompleteTaskResponse>, ApiError> {
    let (completed, promoted) = state.store.lock().await.complete_task(TaskId(id))?;
    info!(task_id = %completed.id, serial_number = %completed.serial_number, "task completed");
    state.events.task_changed(&completed, TaskAction::Completed);
    if let Some(promoted) = &promoted {
        state.events.task_changed(promoted, TaskAction::Promoted);
    }
    Ok(Json(CompleteTaskResponse { completed, promoted }))
}

pub(super) async fn reorder_tasks(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Vec<RobotTask>>, ApiError> {
    let tasks = state.store.lock().await.reorder_tasks(&request.task_ids)?;
    if !tasks.is_empty() {
        state.events.queue_reordered();
    }
    Ok(Json(tasks))
}
