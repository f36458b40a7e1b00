//! Task list refreshes driven by the control plane's WebSocket, with a
//! polling fallback whenever the socket is unavailable.

use crate::client::ControlPlane;
use futures_util::StreamExt;
use robohub_core::RobotTask;
use robohub_protocol::FeedMessage;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Socket,
    Poll,
}

#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub source: FeedSource,
    pub tasks: Vec<RobotTask>,
}

pub struct TaskFeed {
    plane: Arc<ControlPlane>,
    poll_interval: Duration,
}

impl TaskFeed {
    pub fn new(plane: Arc<ControlPlane>, poll_interval: Duration) -> Self {
        Self { plane, poll_interval }
    }

    /// Runs until the receiving side of `events` is dropped.
    pub async fn run(&self, events: mpsc::Sender<FeedEvent>) {
        loop {
            match connect_async(self.plane.ws_url()).await {
                Ok((mut socket, _)) => {
                    info!("subscribed to task feed");
                    if !self.emit(FeedSource::Socket, &events).await {
                        return;
                    }
                    while let Some(frame) = socket.next().await {
                        match frame {
                            Ok(Message::Text(text)) => match serde_json::from_str::<FeedMessage>(&text) {
                                Ok(FeedMessage::TaskUpdate(update)) => {
                                    debug!(action = ?update.action, task_id = ?update.task_id, "task update");
                                    if !self.emit(FeedSource::Socket, &events).await {
                                        return;
                                    }
                                }
                                Err(err) => warn!(error = %err, "unrecognized feed frame"),
                            },
                            Ok(Message::Close(_)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                    warn!("task feed socket closed, polling");
                }
                Err(err) => warn!(error = %err, "task feed socket unavailable, polling"),
            }

            tokio::time::sleep(self.poll_interval).await;
            if !self.emit(FeedSource::Poll, &events).await {
                return;
            }
        }
    }

    /// Returns false once nobody is listening.
    async fn emit(&self, source: FeedSource, events: &mpsc::Sender<FeedEvent>) -> bool {
        match self.plane.tasks(None).await {
            Ok(tasks) => events.send(FeedEvent { source, tasks }).await.is_ok(),
            Err(err) => {
                warn!(error = %err, "task refresh failed");
                !events.is_closed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::ws::{Message as WsMessage, WebSocketUpgrade},
        response::IntoResponse,
        routing::get,
    };
    use robohub_core::{TaskId, TaskStatus, TaskType, now_ms};
    use robohub_protocol::{TaskAction, TaskUpdate};

    fn sample_tasks() -> Vec<RobotTask> {
        vec![RobotTask {
            id: TaskId(1),
            serial_number: "SN-1".to_string(),
            task_type: TaskType::Pickup,
            status: TaskStatus::Pending,
            priority: 0,
            template_id: None,
            parameters: serde_json::json!({}),
            created_at_ms: 0,
            started_at_ms: None,
            completed_at_ms: None,
        }]
    }

    async fn serve(app: Router) -> Arc<ControlPlane> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Arc::new(ControlPlane::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap())
    }

    #[tokio::test]
    async fn falls_back_to_polling_without_socket() {
        let app = Router::new().route("/api/robot-tasks", get(|| async { Json(sample_tasks()) }));
        let feed = TaskFeed::new(serve(app).await, Duration::from_millis(20));
        let (tx, mut rx) = mpsc::channel(4);
        let runner = tokio::spawn(async move { feed.run(tx).await });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, FeedSource::Poll);
        assert_eq!(event.tasks.len(), 1);

        drop(rx);
        runner.await.unwrap();
    }

    async fn push_one_update(ws: WebSocketUpgrade) -> impl IntoResponse {
        ws.on_upgrade(|mut socket| async move {
            let update = FeedMessage::TaskUpdate(TaskUpdate {
                task_id: Some(TaskId(1)),
                serial_number: Some("SN-1".to_string()),
                action: TaskAction::Completed,
                sent_at_ms: now_ms(),
            });
            let text = serde_json::to_string(&update).unwrap();
            let _ = socket.send(WsMessage::Text(text.into())).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
    }

    #[tokio::test]
    async fn socket_updates_trigger_refetch() {
        let app = Router::new()
            .route("/api/robot-tasks", get(|| async { Json(sample_tasks()) }))
            .route("/ws/robot-tasks", get(push_one_update));
        let feed = TaskFeed::new(serve(app).await, Duration::from_secs(30));
        let (tx, mut rx) = mpsc::channel(4);
        let runner = tokio::spawn(async move { feed.run(tx).await });

        let initial = rx.recv().await.unwrap();
        assert_eq!(initial.source, FeedSource::Socket);
        let refetched = rx.recv().await.unwrap();
        assert_eq!(refetched.source, FeedSource::Socket);
        assert_eq!(refetched.tasks[0].id, TaskId(1));

        runner.abort();
    }

    async fn close_right_away(ws: WebSocketUpgrade) -> impl IntoResponse {
        ws.on_upgrade(|mut socket| async move {
            let _ = socket.send(WsMessage::Close(None)).await;
        })
    }

    #[tokio::test]
    async fn dropped_socket_polls_then_reconnects() {
        let app = Router::new()
            .route("/api/robot-tasks", get(|| async { Json(sample_tasks()) }))
            .route("/ws/robot-tasks", get(close_right_away));
        let feed = TaskFeed::new(serve(app).await, Duration::from_millis(20));
        let (tx, mut rx) = mpsc::channel(8);
        let runner = tokio::spawn(async move { feed.run(tx).await });

        let mut sources = Vec::new();
        for _ in 0..3 {
            sources.push(rx.recv().await.unwrap().source);
        }
        assert_eq!(sources, vec![FeedSource::Socket, FeedSource::Poll, FeedSource::Socket]);

        runner.abort();
    }
}
