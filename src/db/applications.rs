use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, info};

use super::Database;
use crate::enums::ApplicationStage;
use crate::error::{StoreError, StoreResult};
use crate::models::{JobListingApplication, NewApplication, validate_rating};

const APPLICATION_COLUMNS: &str =
    "job_listing_id, user_id, cover_letter, rating, stage, created_at, updated_at";

/// Outcome of [`Database::upsert_application`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationWrite {
    Created,
    Updated,
}

impl Database {
    /// Records a new application in the `applied` stage. Applying twice to the
    /// same listing is a primary-key violation.
    pub fn create_application(&self, app: NewApplication) -> StoreResult<JobListingApplication> {
        let app = app.validate()?;
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO job_listing_applications
                 (job_listing_id, user_id, cover_letter, stage, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                app.job_listing_id,
                app.user_id,
                app.cover_letter,
                ApplicationStage::default(),
                now
            ],
        )?;
        info!(
            job_listing_id = %app.job_listing_id,
            user_id = %app.user_id,
            "created application"
        );
        self.require_application(&app.job_listing_id, &app.user_id)
    }

    /// Creates the application, or replaces the cover letter of an existing
    /// one. Re-applying without a letter keeps the stored letter. Stage and
    /// rating survive a re-application.
    pub fn upsert_application(
        &self,
        app: NewApplication,
    ) -> StoreResult<(JobListingApplication, ApplicationWrite)> {
        let app = app.validate()?;
        let tx = self.conn.unchecked_transaction()?;
        let existed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM job_listing_applications
                           WHERE job_listing_id = ?1 AND user_id = ?2)",
            params![app.job_listing_id, app.user_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO job_listing_applications
                 (job_listing_id, user_id, cover_letter, stage, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (job_listing_id, user_id) DO UPDATE SET
                 cover_letter = COALESCE(excluded.cover_letter, cover_letter),
                 updated_at = excluded.updated_at",
            params![
                app.job_listing_id,
                app.user_id,
                app.cover_letter,
                ApplicationStage::default(),
                Utc::now()
            ],
        )?;
        tx.commit()?;

        let write = if existed {
            ApplicationWrite::Updated
        } else {
            ApplicationWrite::Created
        };
        info!(
            job_listing_id = %app.job_listing_id,
            user_id = %app.user_id,
            ?write,
            "upserted application"
        );
        Ok((
            self.require_application(&app.job_listing_id, &app.user_id)?,
            write,
        ))
    }

    pub fn get_application(
        &self,
        job_listing_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<JobListingApplication>> {
        let app = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM job_listing_applications
                     WHERE job_listing_id = ?1 AND user_id = ?2",
                    APPLICATION_COLUMNS
                ),
                params![job_listing_id, user_id],
                Self::row_to_application,
            )
            .optional()?;
        Ok(app)
    }

    /// Applications to one listing, ordered by stage then oldest first.
    pub fn list_applications_for_listing(
        &self,
        job_listing_id: &str,
    ) -> StoreResult<Vec<JobListingApplication>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM job_listing_applications
             WHERE job_listing_id = ?1
             ORDER BY created_at, user_id",
            APPLICATION_COLUMNS
        ))?;
        let mut apps = stmt
            .query_map([job_listing_id], Self::row_to_application)?
            .collect::<Result<Vec<_>, _>>()?;
        // Stable sort keeps the created_at order within a stage
        apps.sort_by_key(|a| a.stage.sort_order());
        debug!(%job_listing_id, count = apps.len(), "listed applications for listing");
        Ok(apps)
    }

    pub fn list_applications_for_user(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<JobListingApplication>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM job_listing_applications
             WHERE user_id = ?1
             ORDER BY created_at DESC, job_listing_id",
            APPLICATION_COLUMNS
        ))?;
        let apps = stmt
            .query_map([user_id], Self::row_to_application)?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(%user_id, count = apps.len(), "listed applications for user");
        Ok(apps)
    }

    pub fn set_application_stage(
        &self,
        job_listing_id: &str,
        user_id: &str,
        stage: ApplicationStage,
    ) -> StoreResult<JobListingApplication> {
        let changed = self.conn.execute(
            "UPDATE job_listing_applications SET stage = ?3, updated_at = ?4
             WHERE job_listing_id = ?1 AND user_id = ?2",
            params![job_listing_id, user_id, stage, Utc::now()],
        )?;
        if changed == 0 {
            return Err(application_not_found(job_listing_id, user_id));
        }
        info!(%job_listing_id, %user_id, %stage, "changed application stage");
        self.require_application(job_listing_id, user_id)
    }

    /// Sets the recruiter rating (1 to 5). `None` clears it.
    pub fn set_application_rating(
        &self,
        job_listing_id: &str,
        user_id: &str,
        rating: Option<i64>,
    ) -> StoreResult<JobListingApplication> {
        validate_rating(rating)?;
        let changed = self.conn.execute(
            "UPDATE job_listing_applications SET rating = ?3, updated_at = ?4
             WHERE job_listing_id = ?1 AND user_id = ?2",
            params![job_listing_id, user_id, rating, Utc::now()],
        )?;
        if changed == 0 {
            return Err(application_not_found(job_listing_id, user_id));
        }
        debug!(%job_listing_id, %user_id, ?rating, "changed application rating");
        self.require_application(job_listing_id, user_id)
    }

    pub fn delete_application(&self, job_listing_id: &str, user_id: &str) -> StoreResult<()> {
        let removed = self.conn.execute(
            "DELETE FROM job_listing_applications WHERE job_listing_id = ?1 AND user_id = ?2",
            params![job_listing_id, user_id],
        )?;
        if removed == 0 {
            return Err(application_not_found(job_listing_id, user_id));
        }
        info!(%job_listing_id, %user_id, "deleted application");
        Ok(())
    }

    fn require_application(
        &self,
        job_listing_id: &str,
        user_id: &str,
    ) -> StoreResult<JobListingApplication> {
        self.get_application(job_listing_id, user_id)?
            .ok_or_else(|| application_not_found(job_listing_id, user_id))
    }

    fn row_to_application(row: &Row) -> rusqlite::Result<JobListingApplication> {
        Ok(JobListingApplication {
            job_listing_id: row.get(0)?,
            user_id: row.get(1)?,
            cover_letter: row.get(2)?,
            rating: row.get(3)?,
            stage: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

fn application_not_found(job_listing_id: &str, user_id: &str) -> StoreError {
    StoreError::not_found("application", format!("{}/{}", job_listing_id, user_id))
}
