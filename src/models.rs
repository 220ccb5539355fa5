use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::enums::{
    ApplicationStage, ExperienceLevel, JobListingStatus, JobListingType, LocationRequirement,
    WageInterval,
};
use crate::error::{ConstraintKind, StoreError, StoreResult};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

/// Owner of job listings. Only the columns listings need are kept here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrganization {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
}

/// Account record. `id` comes from the auth provider and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub email: Option<String>,
}

/// Partial profile change. `email: Some(None)` clears the address; in JSON
/// an absent `email` leaves it alone and `"email": null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub name: Option<String>,
    pub image_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<Option<String>>,
}

/// Keeps an explicit `null` distinct from a missing field.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListing {
    pub id: String,
    pub organization_id: String,
    pub title: String,
    pub description: String,
    pub wage: Option<i64>,
    pub wage_interval: Option<WageInterval>,
    pub state_abbreviation: Option<String>,
    pub city: Option<String>,
    pub is_featured: bool,
    pub location_requirement: LocationRequirement,
    pub experience_level: ExperienceLevel,
    pub status: JobListingStatus,
    #[serde(rename = "type")]
    pub listing_type: JobListingType,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJobListing {
    pub organization_id: String,
    pub title: String,
    pub description: String,
    pub wage: Option<i64>,
    pub wage_interval: Option<WageInterval>,
    pub state_abbreviation: Option<String>,
    pub city: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    pub location_requirement: LocationRequirement,
    pub experience_level: ExperienceLevel,
    #[serde(default = "default_status")]
    pub status: JobListingStatus,
    #[serde(rename = "type")]
    pub listing_type: JobListingType,
}

fn default_status() -> JobListingStatus {
    JobListingStatus::Draft
}

/// Editable listing content. Status and featuring have their own operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListingUpdate {
    pub title: String,
    pub description: String,
    pub wage: Option<i64>,
    pub wage_interval: Option<WageInterval>,
    pub state_abbreviation: Option<String>,
    pub city: Option<String>,
    pub location_requirement: LocationRequirement,
    pub experience_level: ExperienceLevel,
    #[serde(rename = "type")]
    pub listing_type: JobListingType,
}

impl From<&JobListing> for JobListingUpdate {
    fn from(listing: &JobListing) -> Self {
        Self {
            title: listing.title.clone(),
            description: listing.description.clone(),
            wage: listing.wage,
            wage_interval: listing.wage_interval,
            state_abbreviation: listing.state_abbreviation.clone(),
            city: listing.city.clone(),
            location_requirement: listing.location_requirement,
            experience_level: listing.experience_level,
            listing_type: listing.listing_type,
        }
    }
}

/// Search criteria for listings. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListingFilter {
    pub status: Option<JobListingStatus>,
    pub organization_id: Option<String>,
    pub state_abbreviation: Option<String>,
    pub city: Option<String>,
    pub location_requirement: Option<LocationRequirement>,
    pub experience_level: Option<ExperienceLevel>,
    pub listing_type: Option<JobListingType>,
    pub featured_only: bool,
    pub title_contains: Option<String>,
}

/// A user's application to a listing. Keyed by (job_listing_id, user_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListingApplication {
    pub job_listing_id: String,
    pub user_id: String,
    pub cover_letter: Option<String>,
    pub rating: Option<i64>,
    pub stage: ApplicationStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub job_listing_id: String,
    pub user_id: String,
    pub cover_letter: Option<String>,
}

// --- Validation ---
//
// These run before a write reaches SQLite. The schema repeats the rules it
// can express, so raw SQL writes are held to the same domain.

fn require(field: &'static str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::constraint(
            ConstraintKind::NotNull,
            format!("{} is required", field),
        ));
    }
    Ok(())
}

fn check(ok: bool, message: impl Into<String>) -> StoreResult<()> {
    if ok {
        Ok(())
    } else {
        Err(StoreError::constraint(ConstraintKind::Check, message))
    }
}

/// Trims optional text, turning blank input into `None`.
fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn validate_email(email: &Option<String>) -> StoreResult<()> {
    if let Some(email) = email {
        check(
            email.contains('@') && !email.starts_with('@') && !email.ends_with('@'),
            format!("'{}' is not an email address", email),
        )?;
    }
    Ok(())
}

pub(crate) fn validate_rating(rating: Option<i64>) -> StoreResult<()> {
    if let Some(r) = rating {
        check(
            (MIN_RATING..=MAX_RATING).contains(&r),
            format!("rating must be between {} and {}, got {}", MIN_RATING, MAX_RATING, r),
        )?;
    }
    Ok(())
}

impl NewOrganization {
    pub fn validate(mut self) -> StoreResult<Self> {
        require("organization id", &self.id)?;
        require("organization name", &self.name)?;
        self.image_url = normalize_optional(self.image_url);
        Ok(self)
    }
}

impl NewUser {
    pub fn validate(mut self) -> StoreResult<Self> {
        require("user id", &self.id)?;
        require("name", &self.name)?;
        require("image url", &self.image_url)?;
        self.email = normalize_optional(self.email);
        validate_email(&self.email)?;
        Ok(self)
    }
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.image_url.is_none() && self.email.is_none()
    }

    pub fn validate(mut self) -> StoreResult<Self> {
        if let Some(name) = &self.name {
            require("name", name)?;
        }
        if let Some(url) = &self.image_url {
            require("image url", url)?;
        }
        if let Some(email) = self.email.take() {
            let email = normalize_optional(email);
            validate_email(&email)?;
            self.email = Some(email);
        }
        Ok(self)
    }
}

/// Shared rules for listing content, used by both create and update.
struct ListingContent<'a> {
    title: &'a str,
    description: &'a str,
    wage: Option<i64>,
    wage_interval: Option<WageInterval>,
    state_abbreviation: &'a mut Option<String>,
    city: &'a mut Option<String>,
    location_requirement: LocationRequirement,
}

impl ListingContent<'_> {
    fn validate(self) -> StoreResult<()> {
        require("title", self.title)?;
        require("description", self.description)?;

        if let Some(wage) = self.wage {
            check(wage > 0, format!("wage must be positive, got {}", wage))?;
        }
        check(
            self.wage.is_some() == self.wage_interval.is_some(),
            "wage and wage interval must be set together",
        )?;

        *self.city = normalize_optional(self.city.take());
        *self.state_abbreviation =
            normalize_optional(self.state_abbreviation.take()).map(|s| s.to_ascii_uppercase());

        if let Some(state) = self.state_abbreviation.as_deref() {
            check(
                state.len() == 2 && state.chars().all(|c| c.is_ascii_alphabetic()),
                format!("'{}' is not a two-letter state abbreviation", state),
            )?;
        }

        if self.location_requirement.requires_address() {
            check(
                self.city.is_some(),
                format!("city is required for {} listings", self.location_requirement),
            )?;
            check(
                self.state_abbreviation.is_some(),
                format!(
                    "state abbreviation is required for {} listings",
                    self.location_requirement
                ),
            )?;
        }
        Ok(())
    }
}

impl NewJobListing {
    pub fn validate(mut self) -> StoreResult<Self> {
        require("organization id", &self.organization_id)?;
        ListingContent {
            title: &self.title,
            description: &self.description,
            wage: self.wage,
            wage_interval: self.wage_interval,
            state_abbreviation: &mut self.state_abbreviation,
            city: &mut self.city,
            location_requirement: self.location_requirement,
        }
        .validate()?;
        Ok(self)
    }
}

impl JobListingUpdate {
    pub fn validate(mut self) -> StoreResult<Self> {
        ListingContent {
            title: &self.title,
            description: &self.description,
            wage: self.wage,
            wage_interval: self.wage_interval,
            state_abbreviation: &mut self.state_abbreviation,
            city: &mut self.city,
            location_requirement: self.location_requirement,
        }
        .validate()?;
        Ok(self)
    }
}

impl NewApplication {
    pub fn validate(mut self) -> StoreResult<Self> {
        require("job listing id", &self.job_listing_id)?;
        require("user id", &self.user_id)?;
        self.cover_letter = normalize_optional(self.cover_letter);
        Ok(self)
    }
}
