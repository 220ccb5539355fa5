mod applications;
mod listings;
mod users;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::enums::{
    ApplicationStage, ExperienceLevel, JobListingStatus, JobListingType, LocationRequirement,
    WageInterval,
};
use crate::error::{StoreError, StoreResult};
use crate::models::{NewOrganization, Organization};

pub use applications::ApplicationWrite;

pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

/// Rows removed alongside a parent, reported by the delete operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeSummary {
    pub job_listings: usize,
    pub applications: usize,
}

impl Database {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Location on disk, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn configure(conn: &Connection) -> StoreResult<()> {
        // Foreign keys are off by default in SQLite and must be enabled per connection.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }

    pub fn init(&self) -> StoreResult<()> {
        self.conn.execute_batch(&schema_sql())?;
        info!("schema initialized");
        Ok(())
    }

    pub fn ensure_initialized(&self) -> StoreResult<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table'
               AND name IN ('organizations', 'users', 'job_listings', 'job_listing_applications')",
            [],
            |row| row.get(0),
        )?;
        if tables < 4 {
            return Err(StoreError::NotInitialized);
        }
        Ok(())
    }

    // --- Organization operations ---

    pub fn create_organization(&self, org: NewOrganization) -> StoreResult<Organization> {
        let org = org.validate()?;
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO organizations (id, name, image_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![org.id, org.name, org.image_url, now],
        )?;
        info!(organization_id = %org.id, "created organization");
        self.get_organization(&org.id)?
            .ok_or_else(|| StoreError::not_found("organization", org.id.clone()))
    }

    pub fn get_organization(&self, id: &str) -> StoreResult<Option<Organization>> {
        let org = self
            .conn
            .query_row(
                "SELECT id, name, image_url, created_at, updated_at
                 FROM organizations WHERE id = ?1",
                [id],
                |row| {
                    Ok(Organization {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        image_url: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(org)
    }

    /// Deletes an organization together with its listings and their applications.
    pub fn delete_organization(&self, id: &str) -> StoreResult<CascadeSummary> {
        let tx = self.conn.unchecked_transaction()?;
        let job_listings: i64 = tx.query_row(
            "SELECT COUNT(*) FROM job_listings WHERE organization_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        let applications: i64 = tx.query_row(
            "SELECT COUNT(*) FROM job_listing_applications a
             JOIN job_listings l ON l.id = a.job_listing_id
             WHERE l.organization_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        let removed = tx.execute("DELETE FROM organizations WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(StoreError::not_found("organization", id));
        }
        tx.commit()?;

        let summary = CascadeSummary {
            job_listings: job_listings as usize,
            applications: applications as usize,
        };
        info!(
            organization_id = %id,
            job_listings = summary.job_listings,
            applications = summary.applications,
            "deleted organization"
        );
        Ok(summary)
    }
}

/// DDL for every table. Enum columns get CHECK clauses built from the Rust
/// tag lists so the stored domain matches the types exactly.
fn schema_sql() -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            image_url TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            image_url TEXT NOT NULL,
            email TEXT UNIQUE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TRIGGER IF NOT EXISTS users_id_immutable
        BEFORE UPDATE OF id ON users
        WHEN NEW.id IS NOT OLD.id
        BEGIN
            SELECT RAISE(ABORT, 'users.id is immutable');
        END;

        CREATE TABLE IF NOT EXISTS job_listings (
            id TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            wage INTEGER CHECK (wage > 0),
            wage_interval TEXT CHECK (wage_interval IN ({wage_intervals})),
            state_abbreviation TEXT,
            city TEXT,
            is_featured INTEGER NOT NULL DEFAULT 0 CHECK (is_featured IN (0, 1)),
            location_requirement TEXT NOT NULL CHECK (location_requirement IN ({locations})),
            experience_level TEXT NOT NULL CHECK (experience_level IN ({levels})),
            status TEXT NOT NULL CHECK (status IN ({statuses})),
            type TEXT NOT NULL CHECK (type IN ({types})),
            posted_at TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_job_listings_state ON job_listings(state_abbreviation);
        CREATE INDEX IF NOT EXISTS idx_job_listings_org ON job_listings(organization_id);

        CREATE TABLE IF NOT EXISTS job_listing_applications (
            job_listing_id TEXT NOT NULL REFERENCES job_listings(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            cover_letter TEXT,
            rating INTEGER CHECK (rating BETWEEN {min_rating} AND {max_rating}),
            stage TEXT NOT NULL DEFAULT '{default_stage}' CHECK (stage IN ({stages})),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (job_listing_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_applications_user ON job_listing_applications(user_id);
        "#,
        wage_intervals = WageInterval::sql_domain(),
        locations = LocationRequirement::sql_domain(),
        levels = ExperienceLevel::sql_domain(),
        statuses = JobListingStatus::sql_domain(),
        types = JobListingType::sql_domain(),
        stages = ApplicationStage::sql_domain(),
        default_stage = ApplicationStage::default(),
        min_rating = crate::models::MIN_RATING,
        max_rating = crate::models::MAX_RATING,
    )
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::error::ConstraintKind;
    use crate::models::NewApplication;

    #[test]
    fn test_init_is_idempotent() {
        let db = db();
        db.init().unwrap();
        db.ensure_initialized().unwrap();
    }

    #[test]
    fn test_uninitialized_database_is_reported() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.ensure_initialized(),
            Err(StoreError::NotInitialized)
        ));
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = db();
        let enabled: i64 = db
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_raw_insert_with_undeclared_status_is_rejected() {
        let db = db();
        org(&db, "o1");
        let err: StoreError = db
            .conn
            .execute(
                "INSERT INTO job_listings (id, organization_id, title, description,
                     location_requirement, experience_level, status, type)
                 VALUES ('j1', 'o1', 'Dev', '...', 'remote', 'mid-level', 'archived', 'full-time')",
                [],
            )
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM job_listings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = std::env::temp_dir().join(format!("jobboard-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("jobboard.db");
        let db = Database::open(&path).unwrap();
        db.init().unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
        drop(db);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_duplicate_organization_is_primary_key_violation() {
        let db = db();
        org(&db, "o1");
        let err = db
            .create_organization(NewOrganization {
                id: "o1".to_string(),
                name: "Again".to_string(),
                image_url: None,
            })
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::PrimaryKey));
    }

    #[test]
    fn test_deleting_organization_cascades_through_listings() {
        let db = db();
        org(&db, "o1");
        org(&db, "o2");
        db.create_user(new_user("u1", None)).unwrap();
        let doomed = db.create_job_listing(new_listing("o1", "Dev")).unwrap();
        db.create_job_listing(new_listing("o1", "Ops")).unwrap();
        let kept = db.create_job_listing(new_listing("o2", "QA")).unwrap();
        for listing in [&doomed, &kept] {
            db.create_application(NewApplication {
                job_listing_id: listing.id.clone(),
                user_id: "u1".to_string(),
                cover_letter: None,
            })
            .unwrap();
        }

        let summary = db.delete_organization("o1").unwrap();
        assert_eq!(
            summary,
            CascadeSummary {
                job_listings: 2,
                applications: 1
            }
        );
        assert!(db.get_organization("o1").unwrap().is_none());
        assert!(db.get_job_listing(&doomed.id).unwrap().is_none());
        assert!(db.get_job_listing(&kept.id).unwrap().is_some());
        assert_eq!(db.list_applications_for_user("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing_organization() {
        let db = db();
        assert!(matches!(
            db.delete_organization("nope"),
            Err(StoreError::NotFound { entity: "organization", .. })
        ));
    }
}
