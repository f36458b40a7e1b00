use super::{Store, StoreError, StoreResult, json_column, opt_ms};
use robohub_core::{
    PARAM_PREVIOUS_TASK, PARAM_WAS_OPTIMIZED, RobotTask, TaskId, TaskStatus, TaskType, TemplateId,
    now_ms,
};
use rusqlite::{Connection, OptionalExtension, Params, params, types::Type};
use tracing::{debug, info};

const TASK_COLUMNS: &str = "
    SELECT id, serial_number, task_type, status, priority, template_id, parameters,
           created_at_ms, started_at_ms, completed_at_ms
    FROM robot_tasks
";

const QUEUE_ORDER: &str = "ORDER BY priority DESC, id ASC";

#[derive(Debug, Clone)]
pub struct NewTask {
    pub serial_number: String,
    pub task_type: TaskType,
    pub priority: i64,
    pub template_id: Option<TemplateId>,
    pub parameters: serde_json::Value,
}

impl Store {
    pub fn create_task(&mut self, task: NewTask) -> StoreResult<RobotTask> {
        if task.serial_number.trim().is_empty() {
            return Err(StoreError::Invalid("serial_number is required".to_string()));
        }
        self.conn.execute(
            "
            INSERT INTO robot_tasks (serial_number, task_type, status, priority, template_id, parameters, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                task.serial_number,
                task.task_type.as_str(),
                TaskStatus::Pending.as_str(),
                task.priority,
                task.template_id.map(|id| id.0),
                task.parameters.to_string(),
                now_ms() as i64
            ],
        )?;
        let id = TaskId(self.conn.last_insert_rowid());
        require_task(&self.conn, id)
    }

    pub fn get_task(&self, id: TaskId) -> StoreResult<RobotTask> {
        require_task(&self.conn, id)
    }

    pub fn list_tasks(&self) -> StoreResult<Vec<RobotTask>> {
        select_tasks(&self.conn, &format!("{TASK_COLUMNS} {QUEUE_ORDER}"), [])
    }

    pub fn list_tasks_by_serial(&self, serial_number: &str) -> StoreResult<Vec<RobotTask>> {
        select_tasks(
            &self.conn,
            &format!("{TASK_COLUMNS} WHERE serial_number = ?1 {QUEUE_ORDER}"),
            params![serial_number],
        )
    }

    pub fn list_tasks_by_template(&self, template_id: TemplateId) -> StoreResult<Vec<RobotTask>> {
        select_tasks(
            &self.conn,
            &format!("{TASK_COLUMNS} WHERE template_id = ?1 {QUEUE_ORDER}"),
            params![template_id.0],
        )
    }

    pub fn list_pending_tasks(&self, serial_number: Option<&str>) -> StoreResult<Vec<RobotTask>> {
        let pending = TaskStatus::Pending.as_str();
        match serial_number {
            Some(serial_number) => select_tasks(
                &self.conn,
                &format!("{TASK_COLUMNS} WHERE status = ?1 AND serial_number = ?2 {QUEUE_ORDER}"),
                params![pending, serial_number],
            ),
            None => select_tasks(
                &self.conn,
                &format!("{TASK_COLUMNS} WHERE status = ?1 {QUEUE_ORDER}"),
                params![pending],
            ),
        }
    }

    pub fn start_task(&mut self, id: TaskId) -> StoreResult<RobotTask> {
        let changed = self.conn.execute(
            "UPDATE robot_tasks SET status = ?2, started_at_ms = ?3 WHERE id = ?1",
            params![id.0, TaskStatus::InProgress.as_str(), now_ms() as i64],
        )?;
        ensure_changed(changed, id)?;
        require_task(&self.conn, id)
    }

    pub fn update_priority(&mut self, id: TaskId, priority: i64) -> StoreResult<RobotTask> {
        let changed = self.conn.execute(
            "UPDATE robot_tasks SET priority = ?2 WHERE id = ?1",
            params![id.0, priority],
        )?;
        ensure_changed(changed, id)?;
        require_task(&self.conn, id)
    }

    /// Cancels regardless of the current status, completed tasks included.
    pub fn cancel_task(&mut self, id: TaskId) -> StoreResult<RobotTask> {
        let changed = self.conn.execute(
            "UPDATE robot_tasks SET status = ?2, completed_at_ms = ?3 WHERE id = ?1",
            params![id.0, TaskStatus::Cancelled.as_str(), now_ms() as i64],
        )?;
        ensure_changed(changed, id)?;
        require_task(&self.conn, id)
    }

    /// Marks the task completed. When it was a DROPOFF, the highest priority
    /// pending PICKUP of the same robot is started in the same transaction
    /// and returned as the second element.
    pub fn complete_task(&mut self, id: TaskId) -> StoreResult<(RobotTask, Option<RobotTask>)> {
        let tx = self.conn.transaction()?;
        let now = now_ms() as i64;

        let task = require_task(&tx, id)?;
        tx.execute(
            "UPDATE robot_tasks SET status = ?2, completed_at_ms = ?3 WHERE id = ?1",
            params![id.0, TaskStatus::Completed.as_str(), now],
        )?;

        let mut promoted_id = None;
        if task.task_type == TaskType::Dropoff {
            let next_pickup = select_tasks(
                &tx,
                &format!(
                    "{TASK_COLUMNS} WHERE serial_number = ?1 AND status = ?2 AND task_type = ?3 {QUEUE_ORDER} LIMIT 1"
                ),
                params![
                    task.serial_number,
                    TaskStatus::Pending.as_str(),
                    TaskType::Pickup.as_str()
                ],
            )?
            .into_iter()
            .next();

            if let Some(pickup) = next_pickup {
                let parameters = mark_promoted(pickup.parameters, id);
                tx.execute(
                    "UPDATE robot_tasks SET status = ?2, started_at_ms = ?3, parameters = ?4 WHERE id = ?1",
                    params![
                        pickup.id.0,
                        TaskStatus::InProgress.as_str(),
                        now,
                        parameters.to_string()
                    ],
                )?;
                info!(
                    serial_number = %task.serial_number,
                    dropoff_id = %id,
                    pickup_id = %pickup.id,
                    "promoted pending pickup after dropoff"
                );
                promoted_id = Some(pickup.id);
            } else {
                debug!(serial_number = %task.serial_number, "no pending pickup to promote");
            }
        }

        let completed = require_task(&tx, id)?;
        let promoted = promoted_id.map(|pid| require_task(&tx, pid)).transpose()?;
        tx.commit()?;
        Ok((completed, promoted))
    }

    /// Assigns `len - index` as priority in list order. Unknown ids and tasks
    /// that are no longer pending keep their priority but still use a slot.
    /// Returns the tasks that were reprioritized, in list order.
    pub fn reorder_tasks(&mut self, task_ids: &[TaskId]) -> StoreResult<Vec<RobotTask>> {
        let tx = self.conn.transaction()?;
        let total = task_ids.len() as i64;
        let mut touched = Vec::new();
        for (index, id) in task_ids.iter().enumerate() {
            let changed = tx.execute(
                "UPDATE robot_tasks SET priority = ?2 WHERE id = ?1 AND status = ?3",
                params![id.0, total - index as i64, TaskStatus::Pending.as_str()],
            )?;
            if changed > 0 {
                touched.push(*id);
            } else {
                debug!(task_id = %id, "reorder skipped unknown or non-pending task");
            }
        }
        let tasks =
            touched.into_iter().map(|id| require_task(&tx, id)).collect::<StoreResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(tasks)
    }
}

fn mark_promoted(parameters: serde_json::Value, previous: TaskId) -> serde_json::Value {
    let mut object = match parameters {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    object.insert(PARAM_WAS_OPTIMIZED.to_string(), serde_json::Value::Bool(true));
    object.insert(PARAM_PREVIOUS_TASK.to_string(), serde_json::Value::from(previous.0));
    serde_json::Value::Object(object)
}

fn ensure_changed(changed: usize, id: TaskId) -> StoreResult<()> {
    if changed == 0 {
        return Err(StoreError::NotFound(format!("task {id}")));
    }
    Ok(())
}

fn require_task(conn: &Connection, id: TaskId) -> StoreResult<RobotTask> {
    conn.query_row(&format!("{TASK_COLUMNS} WHERE id = ?1"), params![id.0], map_task_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("task {id}")))
}

fn select_tasks(conn: &Connection, sql: &str, params: impl Params) -> StoreResult<Vec<RobotTask>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map_task_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RobotTask> {
    let id: i64 = row.get(0)?;
    let task_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(RobotTask {
        id: TaskId(id),
        serial_number: row.get(1)?,
        task_type: TaskType::parse(&task_type).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown task type {task_type}").into(),
            )
        })?,
        status: TaskStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                format!("unknown task status {status}").into(),
            )
        })?,
        priority: row.get(4)?,
        template_id: row.get::<_, Option<i64>>(5)?.map(TemplateId),
        parameters: json_column(&row.get::<_, String>(6)?, "parameters", id),
        created_at_ms: row.get::<_, i64>(7)? as u64,
        started_at_ms: opt_ms(row.get(8)?),
        completed_at_ms: opt_ms(row.get(9)?),
    })
}
