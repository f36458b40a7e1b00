use super::{Store, StoreError, StoreResult, json_column};
use robohub_core::{AssignmentId, RobotTemplateAssignment, TemplateId, UiTemplate, now_ms};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub layout: serde_json::Value,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub layout: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub serial_number: String,
    pub template_id: TemplateId,
    pub name: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentPatch {
    pub serial_number: Option<String>,
    pub template_id: Option<TemplateId>,
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// Layouts arrive either as JSON or as JSON encoded in a string. A string
/// that does not parse, or a null, becomes an empty layout.
#[must_use]
pub fn normalize_layout(layout: serde_json::Value) -> serde_json::Value {
    match layout {
        serde_json::Value::String(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(error = %err, "template layout string is not valid json, using empty layout");
            serde_json::json!({})
        }),
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    }
}

impl Store {
    pub fn create_template(&mut self, template: NewTemplate) -> StoreResult<UiTemplate> {
        if template.name.trim().is_empty() {
            return Err(StoreError::Invalid("name is required".to_string()));
        }
        let now = now_ms() as i64;
        self.conn.execute(
            "
            INSERT INTO ui_templates (name, description, layout, is_active, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ",
            params![
                template.name,
                template.description,
                normalize_layout(template.layout).to_string(),
                template.is_active,
                now
            ],
        )?;
        let id = TemplateId(self.conn.last_insert_rowid());
        require_template(&self.conn, id)
    }

    pub fn get_template(&self, id: TemplateId) -> StoreResult<UiTemplate> {
        require_template(&self.conn, id)
    }

    pub fn list_templates(&self) -> StoreResult<Vec<UiTemplate>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, layout, is_active, created_at_ms, updated_at_ms FROM ui_templates ORDER BY id",
        )?;
        let rows = stmt.query_map([], map_template_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_template(&mut self, id: TemplateId, patch: TemplatePatch) -> StoreResult<UiTemplate> {
        let existing = require_template(&self.conn, id)?;
        let name = patch.name.unwrap_or(existing.name);
        if name.trim().is_empty() {
            return Err(StoreError::Invalid("name must not be empty".to_string()));
        }
        let description = patch.description.or(existing.description);
        let layout = patch.layout.map(normalize_layout).unwrap_or(existing.layout);
        let is_active = patch.is_active.unwrap_or(existing.is_active);

        self.conn.execute(
            "
            UPDATE ui_templates
            SET name = ?2, description = ?3, layout = ?4, is_active = ?5, updated_at_ms = ?6
            WHERE id = ?1
            ",
            params![id.0, name, description, layout.to_string(), is_active, now_ms() as i64],
        )?;
        require_template(&self.conn, id)
    }

    /// Refuses while any assignment still points at the template.
    pub fn delete_template(&mut self, id: TemplateId) -> StoreResult<()> {
        require_template(&self.conn, id)?;
        let in_use: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM robot_template_assignments WHERE template_id = ?1",
            params![id.0],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(StoreError::Conflict(format!(
                "template {id} is assigned to {in_use} robot(s)"
            )));
        }
        self.conn.execute("DELETE FROM ui_templates WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    pub fn create_assignment(&mut self, assignment: NewAssignment) -> StoreResult<RobotTemplateAssignment> {
        if assignment.serial_number.trim().is_empty() {
            return Err(StoreError::Invalid("serial_number is required".to_string()));
        }
        require_template(&self.conn, assignment.template_id)?;

        let now = now_ms() as i64;
        self.conn.execute(
            "
            INSERT INTO robot_template_assignments (serial_number, template_id, name, is_active, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ",
            params![
                assignment.serial_number,
                assignment.template_id.0,
                assignment.name,
                assignment.is_active,
                now
            ],
        )?;
        let id = AssignmentId(self.conn.last_insert_rowid());
        require_assignment(&self.conn, id)
    }

    pub fn get_assignment(&self, id: AssignmentId) -> StoreResult<RobotTemplateAssignment> {
        require_assignment(&self.conn, id)
    }

    pub fn list_assignments(
        &self,
        serial_number: Option<&str>,
    ) -> StoreResult<Vec<RobotTemplateAssignment>> {
        const COLUMNS: &str = "SELECT id, serial_number, template_id, name, is_active, created_at_ms, updated_at_ms FROM robot_template_assignments";
        let mut stmt = match serial_number {
            Some(_) => self.conn.prepare(&format!("{COLUMNS} WHERE serial_number = ?1 ORDER BY id"))?,
            None => self.conn.prepare(&format!("{COLUMNS} ORDER BY id"))?,
        };
        let rows = match serial_number {
            Some(serial_number) => stmt.query_map(params![serial_number], map_assignment_row)?,
            None => stmt.query_map([], map_assignment_row)?,
        };
        let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update_assignment(
        &mut self,
        id: AssignmentId,
        patch: AssignmentPatch,
    ) -> StoreResult<RobotTemplateAssignment> {
        let existing = require_assignment(&self.conn, id)?;
        if let Some(template_id) = patch.template_id {
            require_template(&self.conn, template_id)?;
        }
        let serial_number = patch.serial_number.unwrap_or(existing.serial_number);
        if serial_number.trim().is_empty() {
            return Err(StoreError::Invalid("serial_number must not be empty".to_string()));
        }

        self.conn.execute(
            "
            UPDATE robot_template_assignments
            SET serial_number = ?2, template_id = ?3, name = ?4, is_active = ?5, updated_at_ms = ?6
            WHERE id = ?1
            ",
            params![
                id.0,
                serial_number,
                patch.template_id.unwrap_or(existing.template_id).0,
                patch.name.or(existing.name),
                patch.is_active.unwrap_or(existing.is_active),
                now_ms() as i64
            ],
        )?;
        require_assignment(&self.conn, id)
    }

    pub fn delete_assignment(&mut self, id: AssignmentId) -> StoreResult<()> {
        let changed =
            self.conn.execute("DELETE FROM robot_template_assignments WHERE id = ?1", params![id.0])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("assignment {id}")));
        }
        Ok(())
    }
}

fn require_template(conn: &Connection, id: TemplateId) -> StoreResult<UiTemplate> {
    conn.query_row(
        "SELECT id, name, description, layout, is_active, created_at_ms, updated_at_ms FROM ui_templates WHERE id = ?1",
        params![id.0],
        map_template_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("template {id}")))
}

fn require_assignment(conn: &Connection, id: AssignmentId) -> StoreResult<RobotTemplateAssignment> {
    conn.query_row(
        "SELECT id, serial_number, template_id, name, is_active, created_at_ms, updated_at_ms FROM robot_template_assignments WHERE id = ?1",
        params![id.0],
        map_assignment_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("assignment {id}")))
}

fn map_template_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UiTemplate> {
    let id: i64 = row.get(0)?;
    Ok(UiTemplate {
        id: TemplateId(id),
        name: row.get(1)?,
        description: row.get(2)?,
        layout: json_column(&row.get::<_, String>(3)?, "layout", id),
        is_active: row.get(4)?,
        created_at_ms: row.get::<_, i64>(5)? as u64,
        updated_at_ms: row.get::<_, i64>(6)? as u64,
    })
}

fn map_assignment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RobotTemplateAssignment> {
    Ok(RobotTemplateAssignment {
        id: AssignmentId(row.get(0)?),
        serial_number: row.get(1)?,
        template_id: TemplateId(row.get(2)?),
        name: row.get(3)?,
        is_active: row.get(4)?,
        created_at_ms: row.get::<_, i64>(5)? as u64,
        updated_at_ms: row.get::<_, i64>(6)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(name: &str) -> NewTemplate {
        NewTemplate {
            name: name.to_string(),
            description: None,
            layout: json!({ "widgets": [] }),
            is_active: true,
        }
    }

    #[test]
    fn layout_string_is_parsed_or_replaced() {
        assert_eq!(normalize_layout(json!("{\"widgets\":[1]}")), json!({ "widgets": [1] }));
        assert_eq!(normalize_layout(json!("{broken")), json!({}));
        assert_eq!(normalize_layout(serde_json::Value::Null), json!({}));
    }

    #[test]
    fn template_crud() {
        let mut store = Store::open_in_memory().unwrap();
        let created = store.create_template(template("Laundry")).unwrap();
        assert_eq!(created.layout, json!({ "widgets": [] }));
        assert!(created.is_active);

        let updated = store
            .update_template(
                created.id,
                TemplatePatch { is_active: Some(false), ..TemplatePatch::default() },
            )
            .unwrap();
        assert_eq!(updated.name, "Laundry");
        assert!(!updated.is_active);

        assert_eq!(store.list_templates().unwrap().len(), 1);
        store.delete_template(created.id).unwrap();
        assert!(matches!(store.get_template(created.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn assignment_requires_existing_template() {
        let mut store = Store::open_in_memory().unwrap();
        let err = store
            .create_assignment(NewAssignment {
                serial_number: "SN-1".to_string(),
                template_id: TemplateId(77),
                name: None,
                is_active: true,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn assigned_template_cannot_be_deleted() {
        let mut store = Store::open_in_memory().unwrap();
        let created = store.create_template(template("Trash")).unwrap();
        let assignment = store
            .create_assignment(NewAssignment {
                serial_number: "SN-1".to_string(),
                template_id: created.id,
                name: Some("lobby".to_string()),
                is_active: true,
            })
            .unwrap();
        assert!(matches!(store.delete_template(created.id), Err(StoreError::Conflict(_))));

        assert_eq!(store.list_assignments(Some("SN-1")).unwrap().len(), 1);
        assert!(store.list_assignments(Some("SN-2")).unwrap().is_empty());

        store.delete_assignment(assignment.id).unwrap();
        store.delete_template(created.id).unwrap();
    }

    #[test]
    fn assignment_patch_keeps_unset_fields() {
        let mut store = Store::open_in_memory().unwrap();
        let first = store.create_template(template("A")).unwrap();
        let second = store.create_template(template("B")).unwrap();
        let assignment = store
            .create_assignment(NewAssignment {
                serial_number: "SN-1".to_string(),
                template_id: first.id,
                name: Some("east wing".to_string()),
                is_active: true,
            })
            .unwrap();
        let updated = store
            .update_assignment(
                assignment.id,
                AssignmentPatch { template_id: Some(second.id), ..AssignmentPatch::default() },
            )
            .unwrap();
        assert_eq!(updated.template_id, second.id);
        assert_eq!(updated.name.as_deref(), Some("east wing"));
        assert_eq!(updated.serial_number, "SN-1");
    }
}
