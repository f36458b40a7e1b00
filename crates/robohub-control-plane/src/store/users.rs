use super::{Store, StoreError, StoreResult};
use robohub_core::{User, UserId, UserRole, now_ms};
use rusqlite::{OptionalExtension, params};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub display_name: Option<String>,
    pub role: UserRole,
}

impl Store {
    pub fn create_user(&mut self, user: NewUser) -> StoreResult<User> {
        let username = user.username.trim();
        if username.is_empty() {
            return Err(StoreError::Invalid("username is required".to_string()));
        }

        let taken: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )?;
        if taken != 0 {
            return Err(StoreError::Conflict(format!("username {username} is already taken")));
        }

        self.conn.execute(
            "INSERT INTO users (username, display_name, role, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![username, user.display_name, user.role.as_str(), now_ms() as i64],
        )?;
        self.get_user(UserId(self.conn.last_insert_rowid()))
    }

    pub fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.conn
            .query_row(
                "SELECT id, username, display_name, role, created_at_ms FROM users WHERE id = ?1",
                params![id.0],
                map_user_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, display_name, role, created_at_ms FROM users ORDER BY username",
        )?;
        let rows = stmt.query_map([], map_user_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_user(&mut self, id: UserId) -> StoreResult<()> {
        let changed = self.conn.execute("DELETE FROM users WHERE id = ?1", params![id.0])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        display_name: row.get(2)?,
        role: UserRole::from_db(&row.get::<_, String>(3)?),
        created_at_ms: row.get::<_, i64>(4)? as u64,
    })
}
