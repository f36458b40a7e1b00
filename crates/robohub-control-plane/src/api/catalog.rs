use super::{AppState, deleted};
use crate::{
    error::ApiError,
    store::{AssignmentPatch, NewAssignment, NewTemplate, NewUser, TemplatePatch},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use robohub_core::{
    AssignmentId, RobotTemplateAssignment, TemplateId, UiTemplate, User, UserId, UserRole,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub(super) struct CreateTemplateRequest {
    name: String,
    description: Option<String>,
    layout: Option<serde_json::Value>,
    is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct UpdateTemplateRequest {
    name: Option<String>,
    description: Option<String>,
    layout: Option<serde_json::Value>,
    is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateAssignmentRequest {
    serial_number: String,
    template_id: TemplateId,
    name: Option<String>,
    is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct UpdateAssignmentRequest {
    serial_number: Option<String>,
    template_id: Option<TemplateId>,
    name: Option<String>,
    is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct AssignmentFilter {
    serial_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateUserRequest {
    username: String,
    display_name: Option<String>,
    role: Option<UserRole>,
}

pub(super) async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<UiTemplate>>, ApiError> {
    Ok(Json(state.store.lock().await.list_templates()?))
}

pub(super) async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UiTemplate>, ApiError> {
    Ok(Json(state.store.lock().await.get_template(TemplateId(id))?))
}

pub(super) async fn create_template(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<Json<UiTemplate>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let template = state.store.lock().await.create_template(NewTemplate {
        name: request.name,
        description: request.description,
        layout: request.layout.unwrap_or(serde_json::Value::Null),
        is_active: request.is_active.unwrap_or(true),
    })?;
    info!(template_id = %template.id, name = %template.name, "template created");
    Ok(Json(template))
}

pub(super) async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<UiTemplate>, ApiError> {
    let template = state.store.lock().await.update_template(
        TemplateId(id),
        TemplatePatch {
            name: request.name,
            description: request.description,
            layout: request.layout,
            is_active: request.is_active,
        },
    )?;
    Ok(Json(template))
}

pub(super) async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.lock().await.delete_template(TemplateId(id))?;
    info!(template_id = id, "template deleted");
    Ok(deleted())
}

pub(super) async fn list_assignments(
    State(state): State<AppState>,
    Query(filter): Query<AssignmentFilter>,
) -> Result<Json<Vec<RobotTemplateAssignment>>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.list_assignments(filter.serial_number.as_deref())?))
}

pub(super) async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RobotTemplateAssignment>, ApiError> {
    Ok(Json(state.store.lock().await.get_assignment(AssignmentId(id))?))
}

pub(super) async fn create_assignment(
    State(state): State<AppState>,
    Json(request): Json<CreateAssignmentRequest>,
) -> Result<Json<RobotTemplateAssignment>, ApiError> {
    if request.serial_number.trim().is_empty() {
        return Err(ApiError::bad_request("serial_number is required"));
    }
    let assignment = state.store.lock().await.create_assignment(NewAssignment {
        serial_number: request.serial_number,
        template_id: request.template_id,
        name: request.name,
        is_active: request.is_active.unwrap_or(true),
    })?;
    info!(
        assignment_id = %assignment.id,
        serial_number = %assignment.serial_number,
        template_id = %assignment.template_id,
        "template assigned"
    );
    Ok(Json(assignment))
}

pub(super) async fn update_assignment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateAssignmentRequest>,
) -> Result<Json<RobotTemplateAssignment>, ApiError> {
    let assignment = state.store.lock().await.update_assignment(
        AssignmentId(id),
        AssignmentPatch {
            serial_number: request.serial_number,
            template_id: request.template_id,
            name: request.name,
            is_active: request.is_active,
        },
    )?;
    Ok(Json(assignment))
}

pub(super) async fn delete_assignment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.lock().await.delete_assignment(AssignmentId(id))?;
    Ok(deleted())
}

pub(super) async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.store.lock().await.list_users()?))
}

pub(super) async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.store.lock().await.get_user(UserId(id))?))
}

pub(super) async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<User>, ApiError> {
    if request.username.trim().is_empty() {
        return Err(ApiError::bad_request("username is required"));
    }
    let user = state.store.lock().await.create_user(NewUser {
        username: request.username,
        display_name: request.display_name,
        role: request.role.unwrap_or(UserRole::Operator),
    })?;
    Ok(Json(user))
}

pub(super) async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.lock().await.delete_user(UserId(id))?;
    Ok(deleted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use axum::http::StatusCode;
    use serde_json::json;

    fn template_request(layout: serde_json::Value) -> CreateTemplateRequest {
        CreateTemplateRequest {
            name: "Laundry floor".to_string(),
            description: Some("3rd floor".to_string()),
            layout: Some(layout),
            is_active: None,
        }
    }

    #[tokio::test]
    async fn malformed_layout_string_falls_back_to_empty_layout() {
        let state = test_state();
        let Json(template) =
            create_template(State(state), Json(template_request(json!("{not json")))).await.unwrap();
        assert_eq!(template.layout, json!({}));
        assert!(template.is_active);
    }

    #[tokio::test]
    async fn layout_given_as_string_is_decoded() {
        let state = test_state();
        let Json(template) = create_template(
            State(state.clone()),
            Json(template_request(json!("{\"cards\":[\"map\",\"joystick\"]}"))),
        )
        .await
        .unwrap();
        assert_eq!(template.layout, json!({ "cards": ["map", "joystick"] }));

        let Json(updated) = update_template(
            State(state),
            Path(template.id.0),
            Json(UpdateTemplateRequest { name: Some("Renamed".to_string()), ..Default::default() }),
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.layout, template.layout);
    }

    #[tokio::test]
    async fn assignment_to_missing_template_is_404() {
        let state = test_state();
        let err = create_assignment(
            State(state),
            Json(CreateAssignmentRequest {
                serial_number: "SN-1".to_string(),
                template_id: TemplateId(12),
                name: None,
                is_active: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_assigned_template_is_409() {
        let state = test_state();
        let Json(template) =
            create_template(State(state.clone()), Json(template_request(json!({})))).await.unwrap();
        create_assignment(
            State(state.clone()),
            Json(CreateAssignmentRequest {
                serial_number: "SN-1".to_string(),
                template_id: template.id,
                name: None,
                is_active: None,
            }),
        )
        .await
        .unwrap();

        let err = delete_template(State(state.clone()), Path(template.id.0)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let Json(assignments) = list_assignments(
            State(state),
            Query(AssignmentFilter { serial_number: Some("SN-1".to_string()) }),
        )
        .await
        .unwrap();
        assert_eq!(assignments.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_is_409() {
        let state = test_state();
        let request = || CreateUserRequest {
            username: "operator1".to_string(),
            display_name: None,
            role: None,
        };
        let Json(user) = create_user(State(state.clone()), Json(request())).await.unwrap();
        assert_eq!(user.role, UserRole::Operator);
        let err = create_user(State(state), Json(request())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }
}
