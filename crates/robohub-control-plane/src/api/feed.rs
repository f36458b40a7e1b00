use super::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use robohub_protocol::FeedMessage;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

pub(super) async fn robot_tasks_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| relay(socket, events))
}

async fn relay(socket: WebSocket, mut events: broadcast::Receiver<FeedMessage>) {
    let (mut sender, mut incoming) = socket.split();
    debug!("task feed subscriber connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(error = %err, "failed to encode task update");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "task feed subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("task feed subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use crate::api::{AppState, router, test_state};
    use crate::{events::EventHub, robot::RobotClient, store::Store};
    use futures_util::StreamExt;
    use robohub_core::{RobotTask, TaskId, TaskStatus, TaskType};
    use robohub_protocol::{FeedMessage, TaskAction};
    use tokio_tungstenite::tungstenite::Message;

    fn task(id: i64) -> RobotTask {
        RobotTask {
            id: TaskId(id),
            serial_number: "SN-3".to_string(),
            task_type: TaskType::Pickup,
            status: TaskStatus::Pending,
            priority: 0,
            template_id: None,
            parameters: serde_json::json!({}),
            created_at_ms: 0,
            started_at_ms: None,
            completed_at_ms: None,
        }
    }

    async fn serve(state: AppState) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    fn task_id_of(frame: Message) -> Option<TaskId> {
        let Message::Text(text) = frame else { panic!("expected a text frame") };
        let FeedMessage::TaskUpdate(update) = serde_json::from_str(&text).unwrap();
        update.task_id
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead_and_keeps_receiving() {
        let robots = RobotClient::new(&Default::default(), Default::default()).unwrap();
        let state = AppState::new(Store::open_in_memory().unwrap(), robots, EventHub::new(1));
        let addr = serve(state.clone()).await;
        let (mut socket, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/ws/robot-tasks")).await.unwrap();

        // Published back to back, the relay only gets to see the newest one.
        for id in 1..=3 {
            state.events.task_changed(&task(id), TaskAction::Created);
        }
        let frame = socket.next().await.unwrap().unwrap();
        assert_eq!(task_id_of(frame), Some(TaskId(3)));

        state.events.task_changed(&task(4), TaskAction::Started);
        let frame = socket.next().await.unwrap().unwrap();
        assert_eq!(task_id_of(frame), Some(TaskId(4)));
    }

    #[tokio::test]
    async fn socket_relays_task_updates() {
        let state = test_state();
        let addr = serve(state.clone()).await;
        let (mut socket, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/ws/robot-tasks")).await.unwrap();

        state.events.task_changed(&task(11), TaskAction::Created);

        let frame = socket.next().await.unwrap().unwrap();
        let Message::Text(text) = frame else { panic!("expected a text frame") };
        let FeedMessage::TaskUpdate(update) = serde_json::from_str(&text).unwrap();
        assert_eq!(update.task_id, Some(TaskId(11)));
        assert_eq!(update.serial_number.as_deref(), Some("SN-3"));
    }
}
