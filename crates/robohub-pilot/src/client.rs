use anyhow::{Context, Result, bail};
use reqwest::Response;
use robohub_core::{Pose, RobotTask, TaskId};
use robohub_protocol::{CompleteTaskResponse, CreateTaskRequest, MoveCommand, ReorderRequest};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// REST client for the control plane.
pub struct ControlPlane {
    http: reqwest::Client,
    base_url: String,
}

impl ControlPlane {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    #[must_use]
    pub fn ws_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{base}/ws/robot-tasks")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn position(&self, serial_number: &str) -> Result<Pose> {
        let response = self.http.get(self.url(&format!("/api/robots/position/{serial_number}"))).send().await?;
        decode(response).await
    }

    pub async fn send_move(&self, serial_number: &str, command: &MoveCommand) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(self.url(&format!("/api/robots/move/{serial_number}")))
            .json(command)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn cancel_move(&self, serial_number: &str) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(self.url(&format!("/api/robots/move/{serial_number}/cancel")))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn tasks(&self, serial_number: Option<&str>) -> Result<Vec<RobotTask>> {
        let mut request = self.http.get(self.url("/api/robot-tasks"));
        if let Some(serial_number) = serial_number {
            request = request.query(&[("serial_number", serial_number)]);
        }
        decode(request.send().await?).await
    }

    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<RobotTask> {
        let response = self.http.post(self.url("/api/robot-tasks")).json(request).send().await?;
        decode(response).await
    }

    pub async fn complete_task(&self, id: TaskId) -> Result<CompleteTaskResponse> {
        let response =
            self.http.post(self.url(&format!("/api/robot-tasks/{id}/complete"))).send().await?;
        decode(response).await
    }

    pub async fn cancel_task(&self, id: TaskId) -> Result<RobotTask> {
        let response = self.http.post(self.url(&format!("/api/robot-tasks/{id}/cancel"))).send().await?;
        decode(response).await
    }

    pub async fn reorder(&self, task_ids: Vec<TaskId>) -> Result<Vec<RobotTask>> {
        let response = self
            .http
            .post(self.url("/api/robot-tasks/reorder"))
            .json(&ReorderRequest { task_ids })
            .send()
            .await?;
        decode(response).await
    }
}

/// Non-2xx answers carry `{"ok": false, "error": ...}`.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        bail!("control plane answered {status}: {message}");
    }
    response.json::<T>().await.context("failed to decode control plane response")
}
