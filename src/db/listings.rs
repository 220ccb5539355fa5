use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};
use uuid::Uuid;

use super::{CascadeSummary, Database};
use crate::enums::JobListingStatus;
use crate::error::{StoreError, StoreResult};
use crate::models::{JobListing, JobListingFilter, JobListingUpdate, NewJobListing};

const LISTING_COLUMNS: &str = "id, organization_id, title, description, wage, wage_interval,
    state_abbreviation, city, is_featured, location_requirement, experience_level, status,
    type, posted_at, created_at, updated_at";

impl Database {
    /// Inserts a listing under a fresh UUID. A listing created as published
    /// is stamped with `posted_at` immediately.
    pub fn create_job_listing(&self, listing: NewJobListing) -> StoreResult<JobListing> {
        let listing = listing.validate()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let posted_at = (listing.status == JobListingStatus::Published).then_some(now);

        self.conn.execute(
            &format!(
                "INSERT INTO job_listings ({})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
                LISTING_COLUMNS
            ),
            params![
                id,
                listing.organization_id,
                listing.title,
                listing.description,
                listing.wage,
                listing.wage_interval,
                listing.state_abbreviation,
                listing.city,
                listing.is_featured,
                listing.location_requirement,
                listing.experience_level,
                listing.status,
                listing.listing_type,
                posted_at,
                now,
            ],
        )?;
        info!(
            job_listing_id = %id,
            organization_id = %listing.organization_id,
            status = %listing.status,
            "created job listing"
        );
        self.require_job_listing(&id)
    }

    pub fn get_job_listing(&self, id: &str) -> StoreResult<Option<JobListing>> {
        let listing = self
            .conn
            .query_row(
                &format!("SELECT {} FROM job_listings WHERE id = ?1", LISTING_COLUMNS),
                [id],
                Self::row_to_listing,
            )
            .optional()?;
        Ok(listing)
    }

    /// Searches listings. Featured listings sort first, then the most recently posted.
    pub fn list_job_listings(&self, filter: &JobListingFilter) -> StoreResult<Vec<JobListing>> {
        let mut sql = format!("SELECT {} FROM job_listings WHERE 1=1", LISTING_COLUMNS);
        let mut params: Vec<Box<dyn ToSql>> = vec![];

        let mut push = |clause: &str, value: Box<dyn ToSql>| {
            params.push(value);
            sql.push_str(&clause.replace("?", &format!("?{}", params.len())));
        };

        if let Some(status) = filter.status {
            push(" AND status = ?", Box::new(status));
        }
        if let Some(org) = &filter.organization_id {
            push(" AND organization_id = ?", Box::new(org.clone()));
        }
        if let Some(state) = &filter.state_abbreviation {
            push(
                " AND state_abbreviation = ?",
                Box::new(state.trim().to_ascii_uppercase()),
            );
        }
        if let Some(city) = &filter.city {
            push(" AND LOWER(city) = LOWER(?)", Box::new(city.trim().to_string()));
        }
        if let Some(req) = filter.location_requirement {
            push(" AND location_requirement = ?", Box::new(req));
        }
        if let Some(level) = filter.experience_level {
            push(" AND experience_level = ?", Box::new(level));
        }
        if let Some(ty) = filter.listing_type {
            push(" AND type = ?", Box::new(ty));
        }
        if let Some(title) = &filter.title_contains {
            // Plain substring match; `%` and `_` in the query are literal.
            push(
                " AND instr(LOWER(title), LOWER(?)) > 0",
                Box::new(title.trim().to_string()),
            );
        }
        if filter.featured_only {
            sql.push_str(" AND is_featured = 1");
        }

        sql.push_str(" ORDER BY is_featured DESC, posted_at IS NULL, posted_at DESC, created_at DESC, id");

        let mut stmt = self.conn.prepare(&sql)?;
        let listings = stmt
            .query_map(params_from_iter(params.iter()), Self::row_to_listing)?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = listings.len(), "listed job listings");
        Ok(listings)
    }

    pub fn update_job_listing(&self, id: &str, update: JobListingUpdate) -> StoreResult<JobListing> {
        let update = update.validate()?;
        let changed = self.conn.execute(
            "UPDATE job_listings SET
                 title = ?2, description = ?3, wage = ?4, wage_interval = ?5,
                 state_abbreviation = ?6, city = ?7, location_requirement = ?8,
                 experience_level = ?9, type = ?10, updated_at = ?11
             WHERE id = ?1",
            params![
                id,
                update.title,
                update.description,
                update.wage,
                update.wage_interval,
                update.state_abbreviation,
                update.city,
                update.location_requirement,
                update.experience_level,
                update.listing_type,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("job listing", id));
        }
        debug!(job_listing_id = %id, "updated job listing");
        self.require_job_listing(id)
    }

    /// Moves a listing to `status`. Publishing stamps `posted_at` the first
    /// time only; later republishes keep the original date.
    pub fn set_job_listing_status(
        &self,
        id: &str,
        status: JobListingStatus,
    ) -> StoreResult<JobListing> {
        let now = Utc::now();
        let changed = self.conn.execute(
            "UPDATE job_listings SET
                 status = ?2,
                 posted_at = CASE WHEN ?2 = 'published' THEN COALESCE(posted_at, ?3) ELSE posted_at END,
                 updated_at = ?3
             WHERE id = ?1",
            params![id, status, now],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("job listing", id));
        }
        info!(job_listing_id = %id, %status, "changed job listing status");
        self.require_job_listing(id)
    }

    pub fn set_job_listing_featured(&self, id: &str, featured: bool) -> StoreResult<JobListing> {
        let changed = self.conn.execute(
            "UPDATE job_listings SET is_featured = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, featured, Utc::now()],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("job listing", id));
        }
        debug!(job_listing_id = %id, featured, "changed job listing featuring");
        self.require_job_listing(id)
    }

    pub fn count_published_listings(&self, organization_id: &str) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM job_listings WHERE organization_id = ?1 AND status = ?2",
            params![organization_id, JobListingStatus::Published],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Deletes a listing and every application made to it.
    pub fn delete_job_listing(&self, id: &str) -> StoreResult<CascadeSummary> {
        let tx = self.conn.unchecked_transaction()?;
        let applications: i64 = tx.query_row(
            "SELECT COUNT(*) FROM job_listing_applications WHERE job_listing_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if tx.execute("DELETE FROM job_listings WHERE id = ?1", [id])? == 0 {
            return Err(StoreError::not_found("job listing", id));
        }
        tx.commit()?;

        info!(job_listing_id = %id, applications, "deleted job listing");
        Ok(CascadeSummary {
            job_listings: 1,
            applications: applications as usize,
        })
    }

    fn require_job_listing(&self, id: &str) -> StoreResult<JobListing> {
        self.get_job_listing(id)?
            .ok_or_else(|| StoreError::not_found("job listing", id))
    }

    fn row_to_listing(row: &Row) -> rusqlite::Result<JobListing> {
        Ok(JobListing {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            wage: row.get(4)?,
            wage_interval: row.get(5)?,
            state_abbreviation: row.get(6)?,
            city: row.get(7)?,
            is_featured: row.get(8)?,
            location_requirement: row.get(9)?,
            experience_level: row.get(10)?,
            status: row.get(11)?,
            listing_type: row.get(12)?,
            posted_at: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::*;
    use crate::enums::{
        ExperienceLevel, JobListingStatus, JobListingType, LocationRequirement, WageInterval,
    };
    use crate::error::{ConstraintKind, StoreError};
    use crate::models::{JobListingFilter, JobListingUpdate, NewApplication};

    #[test]
    fn test_create_listing_defaults() {
        let db = db();
        org(&db, "o1");
        let listing = db.create_job_listing(new_listing("o1", "Dev")).unwrap();

        assert_eq!(listing.id.len(), 36);
        assert_eq!(listing.organization_id, "o1");
        assert_eq!(listing.status, JobListingStatus::Draft);
        assert!(!listing.is_featured);
        assert_eq!(listing.posted_at, None);
        assert_eq!(listing.location_requirement, LocationRequirement::Remote);
        assert_eq!(listing.experience_level, ExperienceLevel::MidLevel);
        assert_eq!(listing.listing_type, JobListingType::FullTime);
        assert_eq!(db.get_job_listing(&listing.id).unwrap(), Some(listing));
    }

    #[test]
    fn test_listing_without_location_is_stored() {
        let db = db();
        org(&db, "o1");
        let mut new = new_listing("o1", "Dev");
        new.location_requirement = LocationRequirement::NotSpecified;
        let listing = db.create_job_listing(new).unwrap();
        assert_eq!(listing.location_requirement, LocationRequirement::NotSpecified);
        assert_eq!(listing.city, None);
        assert_eq!(listing.state_abbreviation, None);
    }

    #[test]
    fn test_listing_ids_are_unique() {
        let db = db();
        org(&db, "o1");
        let a = db.create_job_listing(new_listing("o1", "Dev")).unwrap();
        let b = db.create_job_listing(new_listing("o1", "Dev")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_listing_requires_existing_organization() {
        let db = db();
        let err = db.create_job_listing(new_listing("missing", "Dev")).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
        assert!(db.list_job_listings(&JobListingFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_wage_round_trips_with_interval() {
        let db = db();
        org(&db, "o1");
        let mut new = new_listing("o1", "Dev");
        new.wage = Some(120_000);
        new.wage_interval = Some(WageInterval::Yearly);
        let listing = db.create_job_listing(new).unwrap();
        assert_eq!(listing.wage, Some(120_000));
        assert_eq!(listing.wage_interval, Some(WageInterval::Yearly));
    }

    #[test]
    fn test_publish_sets_posted_at_once() {
        let db = db();
        org(&db, "o1");
        let listing = db.create_job_listing(new_listing("o1", "Dev")).unwrap();

        let published = db
            .set_job_listing_status(&listing.id, JobListingStatus::Published)
            .unwrap();
        assert_eq!(published.status, JobListingStatus::Published);
        let posted_at = published.posted_at.expect("posted_at set on publish");

        let delisted = db
            .set_job_listing_status(&listing.id, JobListingStatus::Delisted)
            .unwrap();
        assert_eq!(delisted.status, JobListingStatus::Delisted);
        assert_eq!(delisted.posted_at, Some(posted_at));

        let republished = db
            .set_job_listing_status(&listing.id, JobListingStatus::Published)
            .unwrap();
        assert_eq!(republished.posted_at, Some(posted_at));
    }

    #[test]
    fn test_created_as_published_has_posted_at() {
        let db = db();
        org(&db, "o1");
        let mut new = new_listing("o1", "Dev");
        new.status = JobListingStatus::Published;
        let listing = db.create_job_listing(new).unwrap();
        assert!(listing.posted_at.is_some());
        assert_eq!(db.count_published_listings("o1").unwrap(), 1);
    }

    #[test]
    fn test_status_of_missing_listing() {
        let db = db();
        let err = db
            .set_job_listing_status("nope", JobListingStatus::Published)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "job listing", .. }));
    }

    #[test]
    fn test_filter_by_status_state_and_title() {
        let db = db();
        org(&db, "o1");
        org(&db, "o2");

        let mut austin = new_listing("o1", "Backend Developer");
        austin.location_requirement = LocationRequirement::Hybrid;
        austin.city = Some("Austin".to_string());
        austin.state_abbreviation = Some("tx".to_string());
        let austin = db.create_job_listing(austin).unwrap();
        db.set_job_listing_status(&austin.id, JobListingStatus::Published)
            .unwrap();

        let remote = db.create_job_listing(new_listing("o2", "Designer")).unwrap();
        db.set_job_listing_status(&remote.id, JobListingStatus::Published)
            .unwrap();
        db.create_job_listing(new_listing("o1", "Draft Developer")).unwrap();

        let published = db
            .list_job_listings(&JobListingFilter {
                status: Some(JobListingStatus::Published),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(published.len(), 2);

        let in_tx = db
            .list_job_listings(&JobListingFilter {
                state_abbreviation: Some("TX".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(in_tx.len(), 1);
        assert_eq!(in_tx[0].id, austin.id);
        assert_eq!(in_tx[0].state_abbreviation.as_deref(), Some("TX"));

        let developers = db
            .list_job_listings(&JobListingFilter {
                title_contains: Some("developer".to_string()),
                organization_id: Some("o1".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(developers.len(), 2);

        let hybrid_published = db
            .list_job_listings(&JobListingFilter {
                status: Some(JobListingStatus::Published),
                location_requirement: Some(LocationRequirement::Hybrid),
                city: Some("austin".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hybrid_published.len(), 1);
    }

    #[test]
    fn test_title_search_treats_wildcards_literally() {
        let db = db();
        org(&db, "o1");
        db.create_job_listing(new_listing("o1", "1000 Remote Dev")).unwrap();
        db.create_job_listing(new_listing("o1", "C#Sharp Dev")).unwrap();
        let discount = db
            .create_job_listing(new_listing("o1", "100% Remote Dev"))
            .unwrap();

        let search = |text: &str| -> Vec<String> {
            db.list_job_listings(&JobListingFilter {
                title_contains: Some(text.to_string()),
                ..Default::default()
            })
            .unwrap()
            .into_iter()
            .map(|l| l.title)
            .collect()
        };

        assert_eq!(search("100%"), [discount.title.clone()]);
        assert!(search("C_Sharp").is_empty());
        assert_eq!(search("c#sharp"), ["C#Sharp Dev".to_string()]);
    }

    #[test]
    fn test_featured_listings_sort_first() {
        let db = db();
        org(&db, "o1");
        let plain = db.create_job_listing(new_listing("o1", "Plain")).unwrap();
        let star = db.create_job_listing(new_listing("o1", "Star")).unwrap();
        db.set_job_listing_status(&plain.id, JobListingStatus::Published)
            .unwrap();
        let star = db.set_job_listing_featured(&star.id, true).unwrap();
        assert!(star.is_featured);

        let all = db.list_job_listings(&JobListingFilter::default()).unwrap();
        assert_eq!(all[0].id, star.id);

        let featured = db
            .list_job_listings(&JobListingFilter {
                featured_only: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(featured.len(), 1);
    }

    #[test]
    fn test_update_listing_content() {
        let db = db();
        org(&db, "o1");
        let listing = db.create_job_listing(new_listing("o1", "Dev")).unwrap();

        let mut update = JobListingUpdate::from(&listing);
        update.title = "Senior Dev".to_string();
        update.experience_level = ExperienceLevel::SeniorLevel;
        update.wage = Some(80);
        update.wage_interval = Some(WageInterval::Hourly);
        let updated = db.update_job_listing(&listing.id, update).unwrap();

        assert_eq!(updated.title, "Senior Dev");
        assert_eq!(updated.experience_level, ExperienceLevel::SeniorLevel);
        assert_eq!(updated.wage, Some(80));
        assert_eq!(updated.status, listing.status);
        assert_eq!(updated.created_at, listing.created_at);
    }

    #[test]
    fn test_invalid_update_leaves_listing_unchanged() {
        let db = db();
        org(&db, "o1");
        let listing = db.create_job_listing(new_listing("o1", "Dev")).unwrap();

        let mut update = JobListingUpdate::from(&listing);
        update.title = "Changed".to_string();
        update.location_requirement = LocationRequirement::InOffice;
        let err = db.update_job_listing(&listing.id, update).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(db.get_job_listing(&listing.id).unwrap(), Some(listing));
    }

    #[test]
    fn test_deleting_listing_removes_its_applications() {
        let db = db();
        org(&db, "o1");
        db.create_user(new_user("u1", None)).unwrap();
        db.create_user(new_user("u2", None)).unwrap();
        let doomed = db.create_job_listing(new_listing("o1", "Dev")).unwrap();
        let other = db.create_job_listing(new_listing("o1", "Ops")).unwrap();
        for (listing, user) in [(&doomed, "u1"), (&doomed, "u2"), (&other, "u1")] {
            db.create_application(NewApplication {
                job_listing_id: listing.id.clone(),
                user_id: user.to_string(),
                cover_letter: None,
            })
            .unwrap();
        }

        let summary = db.delete_job_listing(&doomed.id).unwrap();
        assert_eq!(summary.applications, 2);
        assert!(db.list_applications_for_listing(&doomed.id).unwrap().is_empty());
        assert_eq!(db.list_applications_for_user("u1").unwrap().len(), 1);
        assert!(db.get_user("u2").unwrap().is_some());

        let orphans: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM job_listing_applications a
                 LEFT JOIN job_listings l ON l.id = a.job_listing_id
                 WHERE l.id IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
