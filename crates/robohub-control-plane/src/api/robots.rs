use super::AppState;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{Path, State},
};
use robohub_core::Pose;
use robohub_protocol::MoveCommand;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
pub(super) struct RobotSummary {
    serial_number: String,
    name: Option<String>,
    base_url: String,
    pose: Option<Pose>,
}

pub(super) async fn list_robots(State(state): State<AppState>) -> Json<Vec<RobotSummary>> {
    let mut robots = Vec::new();
    for (serial_number, entry) in state.robots.robots() {
        robots.push(RobotSummary {
            serial_number: serial_number.clone(),
            name: entry.name.clone(),
            base_url: entry.base_url.clone(),
            pose: state.poses.get(serial_number).await,
        });
    }
    Json(robots)
}

/// Live pose from the robot. The last known pose answers only when the
/// robot cannot.
pub(super) async fn get_position(
    State(state): State<AppState>,
    Path(serial_number): Path<String>,
) -> Result<Json<Pose>, ApiError> {
    match state.robots.fetch_pose(&serial_number).await {
        Ok(pose) => {
            state.poses.put(&serial_number, pose).await;
            Ok(Json(pose))
        }
        Err(err) => match state.poses.get(&serial_number).await {
            Some(pose) => {
                debug!(%serial_number, error = %err, "robot pose unavailable, serving last known");
                Ok(Json(pose))
            }
            None => Err(err.into()),
        },
    }
}

pub(super) async fn report_position(
    State(state): State<AppState>,
    Path(serial_number): Path<String>,
    Json(pose): Json<Pose>,
) -> Result<Json<Pose>, ApiError> {
    if !(pose.x.is_finite() && pose.y.is_finite() && pose.ori.is_finite()) {
        return Err(ApiError::bad_request("pose must be finite"));
    }
    debug!(%serial_number, x = pose.x, y = pose.y, ori = pose.ori, "pose reported");
    state.poses.put(&serial_number, pose).await;
    Ok(Json(pose))
}

pub(super) async fn move_robot(
    State(state): State<AppState>,
    Path(serial_number): Path<String>,
    Json(command): Json<MoveCommand>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(
        %serial_number,
        target_x = command.target_x,
        target_y = command.target_y,
        target_ori = command.target_ori,
        inplace_rotate = command.properties.inplace_rotate,
        "forwarding move"
    );
    Ok(Json(state.robots.send_move(&serial_number, &command).await?))
}

pub(super) async fn cancel_move(
    State(state): State<AppState>,
    Path(serial_number): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(%serial_number, "cancelling move");
    Ok(Json(state.robots.cancel_move(&serial_number).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::test_state,
        config::{RobotDefaults, RobotEntry},
        events::EventHub,
        robot::RobotClient,
        store::Store,
    };
    use axum::{Router, http::StatusCode, routing::get};
    use std::{
        collections::BTreeMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    #[tokio::test]
    async fn reported_position_is_served_from_cache() {
        let state = test_state();
        let pose = Pose { x: 4.0, y: 1.0, ori: 1.2 };
        report_position(State(state.clone()), Path("SN-7".to_string()), Json(pose)).await.unwrap();
        let Json(cached) = get_position(State(state), Path("SN-7".to_string())).await.unwrap();
        assert_eq!(cached, pose);
    }

    async fn moving_chassis() -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = Router::new().route(
            "/chassis/pose",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    let step = counter.fetch_add(1, Ordering::SeqCst) as f64;
                    Json(serde_json::json!({ "pos": [step, 0.0], "ori": 0.0 }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), calls)
    }

    fn state_with_robot(base_url: String) -> AppState {
        let mut robots = BTreeMap::new();
        robots.insert("SN-1".to_string(), RobotEntry { base_url, secret: None, name: None });
        let robots = RobotClient::new(&RobotDefaults::default(), robots).unwrap();
        AppState::new(Store::open_in_memory().unwrap(), robots, EventHub::new(4))
    }

    #[tokio::test]
    async fn position_follows_the_robot_between_reads() {
        let (base_url, calls) = moving_chassis().await;
        let state = state_with_robot(base_url);

        let mut xs = Vec::new();
        for _ in 0..3 {
            let Json(pose) = get_position(State(state.clone()), Path("SN-1".to_string())).await.unwrap();
            xs.push(pose.x);
        }
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(state.poses.get("SN-1").await.map(|p| p.x), Some(2.0));
    }

    #[tokio::test]
    async fn unreachable_robot_falls_back_to_last_known_pose() {
        let state = state_with_robot("http://127.0.0.1:9".to_string());
        let err = get_position(State(state.clone()), Path("SN-1".to_string())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let pose = Pose { x: 2.5, y: -1.0, ori: 0.3 };
        state.poses.put("SN-1", pose).await;
        let Json(served) = get_position(State(state), Path("SN-1".to_string())).await.unwrap();
        assert_eq!(served, pose);
    }

    #[tokio::test]
    async fn unconfigured_robot_is_404() {
        let state = test_state();
        let err = get_position(State(state.clone()), Path("SN-0".to_string())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err = cancel_move(State(state), Path("SN-0".to_string())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_finite_pose_is_rejected() {
        let state = test_state();
        let pose = Pose { x: f64::NAN, y: 0.0, ori: 0.0 };
        let err =
            report_position(State(state), Path("SN-7".to_string()), Json(pose)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
