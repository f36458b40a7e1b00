use robohub_core::{RobotTask, now_ms};
use robohub_protocol::{FeedMessage, TaskAction, TaskUpdate};
use tokio::sync::broadcast;
use tracing::trace;

/// Fan-out of task change notifications to WebSocket subscribers.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<FeedMessage>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedMessage> {
        self.sender.subscribe()
    }

    pub fn publish(&self, message: FeedMessage) {
        // No subscribers is the normal idle state.
        if let Err(err) = self.sender.send(message) {
            trace!(dropped = ?err.0, "no task feed subscribers");
        }
    }

    pub fn task_changed(&self, task: &RobotTask, action: TaskAction) {
        self.publish(FeedMessage::TaskUpdate(TaskUpdate {
            task_id: Some(task.id),
            serial_number: Some(task.serial_number.clone()),
            action,
            sent_at_ms: now_ms(),
        }));
    }

    pub fn queue_reordered(&self) {
        self.publish(FeedMessage::TaskUpdate(TaskUpdate {
            task_id: None,
            serial_number: None,
            action: TaskAction::Reordered,
            sent_at_ms: now_ms(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robohub_core::{TaskId, TaskStatus, TaskType};

    #[tokio::test]
    async fn subscribers_receive_task_updates() {
        let hub = EventHub::new(8);
        let mut rx = hub.subscribe();
        let task = RobotTask {
            id: TaskId(2),
            serial_number: "SN-1".to_string(),
            task_type: TaskType::Dropoff,
            status: TaskStatus::Pending,
            priority: 0,
            template_id: None,
            parameters: serde_json::json!({}),
            created_at_ms: 0,
            started_at_ms: None,
            completed_at_ms: None,
        };
        hub.task_changed(&task, TaskAction::Created);
        hub.queue_reordered();

        let FeedMessage::TaskUpdate(first) = rx.recv().await.unwrap();
        assert_eq!(first.task_id, Some(TaskId(2)));
        assert_eq!(first.action, TaskAction::Created);
        let FeedMessage::TaskUpdate(second) = rx.recv().await.unwrap();
        assert_eq!(second.action, TaskAction::Reordered);
        assert!(second.serial_number.is_none());
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let hub = EventHub::new(0);
        hub.queue_reordered();
    }
}
