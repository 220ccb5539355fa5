use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, info};

use super::{CascadeSummary, Database};
use crate::error::{StoreError, StoreResult};
use crate::models::{NewUser, User, UserUpdate};

const USER_COLUMNS: &str = "id, name, image_url, email, created_at, updated_at";

impl Database {
    pub fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let user = user.validate()?;
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO users (id, name, image_url, email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![user.id, user.name, user.image_url, user.email, now],
        )?;
        info!(user_id = %user.id, "created user");
        self.require_user(&user.id)
    }

    pub fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                [email.trim()],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY name, id",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = users.len(), "listed users");
        Ok(users)
    }

    /// Applies a profile change. The id is not part of the update and stays fixed.
    pub fn update_user(&self, id: &str, update: UserUpdate) -> StoreResult<User> {
        let update = update.validate()?;
        if update.is_empty() {
            return self.require_user(id);
        }

        let changed = self.conn.execute(
            "UPDATE users SET
                 name = COALESCE(?2, name),
                 image_url = COALESCE(?3, image_url),
                 email = CASE WHEN ?4 THEN ?5 ELSE email END,
                 updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                update.name,
                update.image_url,
                update.email.is_some(),
                update.email.flatten(),
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("user", id));
        }
        debug!(user_id = %id, "updated user");
        self.require_user(id)
    }

    /// Deletes a user. Their applications go with them in the same transaction.
    pub fn delete_user(&self, id: &str) -> StoreResult<CascadeSummary> {
        let tx = self.conn.unchecked_transaction()?;
        let applications: i64 = tx.query_row(
            "SELECT COUNT(*) FROM job_listing_applications WHERE user_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if tx.execute("DELETE FROM users WHERE id = ?1", [id])? == 0 {
            return Err(StoreError::not_found("user", id));
        }
        tx.commit()?;

        info!(user_id = %id, applications, "deleted user");
        Ok(CascadeSummary {
            job_listings: 0,
            applications: applications as usize,
        })
    }

    fn require_user(&self, id: &str) -> StoreResult<User> {
        self.get_user(id)?
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            image_url: row.get(2)?,
            email: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}
