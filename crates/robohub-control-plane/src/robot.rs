//! HTTP client for the robots' own chassis API.

use crate::config::{RobotDefaults, RobotEntry};
use reqwest::{Method, RequestBuilder, Response};
use robohub_core::Pose;
use robohub_protocol::{MoveCommand, MoveStateChange};
use serde::Deserialize;
use std::{collections::BTreeMap, collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("robot {0} is not configured")]
    UnknownRobot(String),
    #[error("robot {serial_number} unreachable: {source}")]
    Transport {
        serial_number: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("robot {serial_number} answered {status}: {body}")]
    Status { serial_number: String, status: u16, body: String },
    #[error("robot {serial_number} sent an unreadable body: {source}")]
    Decode {
        serial_number: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Pose as reported by the chassis, either flat or in tracked form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChassisPose {
    Flat(Pose),
    Tracked { pos: [f64; 2], ori: f64 },
}

impl From<ChassisPose> for Pose {
    fn from(value: ChassisPose) -> Self {
        match value {
            ChassisPose::Flat(pose) => pose,
            ChassisPose::Tracked { pos, ori } => Pose { x: pos[0], y: pos[1], ori },
        }
    }
}

pub struct RobotClient {
    http: reqwest::Client,
    secret_header: String,
    robots: BTreeMap<String, RobotEntry>,
}

impl RobotClient {
    pub fn new(defaults: &RobotDefaults, robots: BTreeMap<String, RobotEntry>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(defaults.request_timeout_ms))
            .build()?;
        Ok(Self { http, secret_header: defaults.secret_header.clone(), robots })
    }

    pub fn robots(&self) -> impl Iterator<Item = (&String, &RobotEntry)> {
        self.robots.iter()
    }

    pub async fn send_move(
        &self,
        serial_number: &str,
        command: &MoveCommand,
    ) -> Result<serde_json::Value, RobotError> {
        let request = self.request(Method::POST, serial_number, "/chassis/moves")?.json(command);
        let response = send(serial_number, request).await?;
        read_json(serial_number, response).await
    }

    pub async fn cancel_move(&self, serial_number: &str) -> Result<serde_json::Value, RobotError> {
        let request = self
            .request(Method::PATCH, serial_number, "/chassis/moves/current")?
            .json(&MoveStateChange::cancelled());
        let response = send(serial_number, request).await?;
        read_json(serial_number, response).await
    }

    pub async fn fetch_pose(&self, serial_number: &str) -> Result<Pose, RobotError> {
        let request = self.request(Method::GET, serial_number, "/chassis/pose")?;
        let response = send(serial_number, request).await?;
        let value = read_json(serial_number, response).await?;
        let pose: ChassisPose = serde_json::from_value(value).map_err(|source| RobotError::Decode {
            serial_number: serial_number.to_string(),
            source,
        })?;
        Ok(pose.into())
    }

    fn request(&self, method: Method, serial_number: &str, path: &str) -> Result<RequestBuilder, RobotError> {
        let robot = self
            .robots
            .get(serial_number)
            .ok_or_else(|| RobotError::UnknownRobot(serial_number.to_string()))?;
        let url = format!("{}{path}", robot.base_url);
        debug!(serial_number, %method, %url, "robot request");
        let mut request = self.http.request(method, url);
        if let Some(secret) = &robot.secret {
            request = request.header(self.secret_header.as_str(), secret);
        }
        Ok(request)
    }
}

async fn send(serial_number: &str, request: RequestBuilder) -> Result<Response, RobotError> {
    request
        .send()
        .await
        .map_err(|source| RobotError::Transport { serial_number: serial_number.to_string(), source })
}

/// Empty bodies read as JSON null.
async fn read_json(serial_number: &str, response: Response) -> Result<serde_json::Value, RobotError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| RobotError::Transport { serial_number: serial_number.to_string(), source })?;
    if !status.is_success() {
        return Err(RobotError::Status { serial_number: serial_number.to_string(), status: status.as_u16(), body });
    }
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|source| RobotError::Decode { serial_number: serial_number.to_string(), source })
}

/// Last known pose per serial number.
#[derive(Clone, Default)]
pub struct PoseCache {
    inner: Arc<Mutex<HashMap<String, Pose>>>,
}

impl PoseCache {
    pub async fn get(&self, serial_number: &str) -> Option<Pose> {
        self.inner.lock().await.get(serial_number).copied()
    }

    pub async fn put(&self, serial_number: &str, pose: Pose) {
        self.inner.lock().await.insert(serial_number.to_string(), pose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::{get, patch, post}};

    async fn fake_robot() -> String {
        let app = Router::new()
            .route(
                "/chassis/moves",
                post(|Json(body): Json<MoveCommand>| async move {
                    Json(serde_json::json!({ "id": 31, "target_ori": body.target_ori }))
                }),
            )
            .route(
                "/chassis/moves/current",
                patch(|Json(body): Json<MoveStateChange>| async move {
                    Json(serde_json::json!({ "state": body.state }))
                }),
            )
            .route(
                "/chassis/pose",
                get(|| async { Json(serde_json::json!({ "pos": [1.5, -2.0], "ori": 0.25 })) }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: String) -> RobotClient {
        let mut robots = BTreeMap::new();
        robots.insert(
            "SN-1".to_string(),
            RobotEntry { base_url, secret: Some("token".to_string()), name: None },
        );
        RobotClient::new(&RobotDefaults::default(), robots).unwrap()
    }

    #[tokio::test]
    async fn move_cancel_and_pose_round_trip_through_chassis_api() {
        let client = client_for(fake_robot().await);
        let command = MoveCommand {
            creator: "test".to_string(),
            kind: "standard".to_string(),
            target_x: 0.0,
            target_y: 0.0,
            target_z: 0.0,
            target_ori: -0.5,
            target_accuracy: 0.05,
            use_target_zone: false,
            properties: Default::default(),
        };
        let moved = client.send_move("SN-1", &command).await.unwrap();
        assert_eq!(moved["target_ori"], -0.5);

        let cancelled = client.cancel_move("SN-1").await.unwrap();
        assert_eq!(cancelled["state"], "cancelled");

        let pose = client.fetch_pose("SN-1").await.unwrap();
        assert_eq!(pose, Pose { x: 1.5, y: -2.0, ori: 0.25 });
    }

    #[tokio::test]
    async fn unknown_serial_is_rejected_before_any_request() {
        let client = client_for("http://127.0.0.1:9".to_string());
        assert!(matches!(client.cancel_move("SN-404").await, Err(RobotError::UnknownRobot(_))));
    }

    #[tokio::test]
    async fn missing_route_surfaces_status_error() {
        let app = Router::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let client = client_for(format!("http://{addr}"));
        match client.fetch_pose("SN-1").await {
            Err(RobotError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pose_cache_keeps_latest() {
        let cache = PoseCache::default();
        assert!(cache.get("SN-1").await.is_none());
        cache.put("SN-1", Pose { x: 1.0, y: 2.0, ori: 0.0 }).await;
        cache.put("SN-1", Pose { x: 3.0, y: 2.0, ori: 0.0 }).await;
        assert_eq!(cache.get("SN-1").await.map(|p| p.x), Some(3.0));
    }
}
