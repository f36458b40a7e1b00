mod catalog;
mod feed;
mod robots;
mod tasks;

use crate::{
    events::EventHub,
    robot::{PoseCache, RobotClient},
    store::Store,
};
use axum::{
    Json, Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub robots: Arc<RobotClient>,
    pub poses: PoseCache,
    pub events: EventHub,
}

impl AppState {
    pub fn new(store: Store, robots: RobotClient, events: EventHub) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            robots: Arc::new(robots),
            poses: PoseCache::default(),
            events,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/templates", get(catalog::list_templates).post(catalog::create_template))
        .route(
            "/api/templates/{id}",
            get(catalog::get_template).put(catalog::update_template).delete(catalog::delete_template),
        )
        .route(
            "/api/robot-assignments",
            get(catalog::list_assignments).post(catalog::create_assignment),
        )
        .route(
            "/api/robot-assignments/{id}",
            get(catalog::get_assignment)
                .put(catalog::update_assignment)
                .delete(catalog::delete_assignment),
        )
        .route("/api/users", get(catalog::list_users).post(catalog::create_user))
        .route("/api/users/{id}", get(catalog::get_user).delete(catalog::delete_user))
        .route("/api/robot-tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/api/robot-tasks/pending", get(tasks::list_pending))
        .route("/api/robot-tasks/reorder", post(tasks::reorder_tasks))
        .route("/api/robot-tasks/{id}", get(tasks::get_task))
        .route("/api/robot-tasks/{id}/priority", put(tasks::update_priority))
        .route("/api/robot-tasks/{id}/start", post(tasks::start_task))
        .route("/api/robot-tasks/{id}/cancel", post(tasks::cancel_task))
        .route("/api/robot-tasks/{id}/complete", post(tasks::complete_task))
        .route("/api/robots", get(robots::list_robots))
        .route(
            "/api/robots/position/{serial_number}",
            get(robots::get_position).post(robots::report_position),
        )
        .route("/api/robots/move/{serial_number}", post(robots::move_robot))
        .route("/api/robots/move/{serial_number}/cancel", post(robots::cancel_move))
        .route("/ws/robot-tasks", get(feed::robot_tasks_socket))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

fn deleted() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::config::RobotDefaults;
    let robots = RobotClient::new(&RobotDefaults::default(), Default::default()).unwrap();
    AppState::new(Store::open_in_memory().unwrap(), robots, EventHub::new(16))
}
