mod config;
mod db;
mod enums;
mod error;
mod models;
mod telemetry;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use config::Config;
use db::{ApplicationWrite, Database};
use enums::{
    ApplicationStage, ExperienceLevel, JobListingStatus, JobListingType, LocationRequirement,
    WageInterval,
};
use models::{
    JobListing, JobListingApplication, JobListingFilter, JobListingUpdate, NewApplication,
    NewJobListing, NewOrganization, NewUser, UserUpdate,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jobboard")]
#[command(about = "Job board store - organizations, listings, users, and applications")]
struct Cli {
    /// Database file (overrides JOBBOARD_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage organizations
    Org {
        #[command(subcommand)]
        command: OrgCommands,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage job listings
    Listing {
        #[command(subcommand)]
        command: ListingCommands,
    },

    /// Apply to a job listing
    Apply {
        /// Job listing ID
        listing: String,

        /// User ID
        user: String,

        /// Cover letter text
        #[arg(short, long)]
        cover_letter: Option<String>,

        /// Update an existing application instead of failing
        #[arg(long)]
        replace: bool,
    },

    /// Review applications
    Application {
        #[command(subcommand)]
        command: ApplicationCommands,
    },
}

#[derive(Subcommand)]
enum OrgCommands {
    /// Add an organization
    Add {
        /// Organization ID (from the auth provider)
        id: String,

        #[arg(short, long)]
        name: String,

        #[arg(long)]
        image_url: Option<String>,
    },

    /// Show an organization and its listings
    Show { id: String },

    /// Delete an organization, its listings, and their applications
    Delete { id: String },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        /// User ID (from the auth provider)
        id: String,

        #[arg(short, long)]
        name: String,

        #[arg(long)]
        image_url: String,

        #[arg(short, long)]
        email: Option<String>,
    },

    /// List all users
    List,

    /// Show a user and their applications
    Show {
        /// User ID or email
        id: String,
    },

    /// Update a user's profile
    Update {
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        image_url: Option<String>,

        #[arg(short, long, conflicts_with = "clear_email")]
        email: Option<String>,

        /// Remove the user's email
        #[arg(long)]
        clear_email: bool,
    },

    /// Delete a user and their applications
    Delete { id: String },
}

#[derive(Subcommand)]
enum ListingCommands {
    /// Add a job listing (created as draft unless --status is given)
    Add {
        /// Owning organization ID
        #[arg(short, long)]
        org: String,

        #[arg(short, long)]
        title: String,

        /// Description text
        #[arg(short, long, conflicts_with = "description_file")]
        description: Option<String>,

        /// Read the description from a file
        #[arg(long)]
        description_file: Option<PathBuf>,

        /// Wage in whole currency units
        #[arg(long, requires = "wage_interval")]
        wage: Option<i64>,

        /// hourly, daily, weekly, bi-weekly, yearly, monthly
        #[arg(long)]
        wage_interval: Option<WageInterval>,

        /// Two-letter state abbreviation
        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        city: Option<String>,

        /// remote, in-office, hybrid, flexible, not-specified, other
        #[arg(short, long)]
        location: LocationRequirement,

        /// internship, entry-level, mid-level, senior-level
        #[arg(short, long)]
        experience: ExperienceLevel,

        /// full-time, part-time, contract, temporary, internship
        #[arg(long = "type")]
        listing_type: JobListingType,

        /// draft, published, delisted
        #[arg(long, default_value = "draft")]
        status: JobListingStatus,

        #[arg(long)]
        featured: bool,
    },

    /// List job listings
    List {
        #[arg(short, long)]
        status: Option<JobListingStatus>,

        #[arg(short, long)]
        org: Option<String>,

        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(short, long)]
        location: Option<LocationRequirement>,

        #[arg(short, long)]
        experience: Option<ExperienceLevel>,

        #[arg(long = "type")]
        listing_type: Option<JobListingType>,

        /// Only featured listings
        #[arg(long)]
        featured: bool,

        /// Title contains this text
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Show a job listing
    Show { id: String },

    /// Edit a listing's title, description, or wage
    Edit {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long, requires = "wage_interval", conflicts_with = "clear_wage")]
        wage: Option<i64>,

        #[arg(long, requires = "wage")]
        wage_interval: Option<WageInterval>,

        /// Remove wage and wage interval
        #[arg(long)]
        clear_wage: bool,
    },

    /// Change a listing's status (draft, published, delisted)
    Status { id: String, status: JobListingStatus },

    /// Mark a listing as featured
    Feature {
        id: String,

        /// Remove featuring instead
        #[arg(long)]
        off: bool,
    },

    /// Delete a listing and its applications
    Delete { id: String },
}

#[derive(Subcommand)]
enum ApplicationCommands {
    /// List applications for a listing or a user
    List {
        #[arg(short, long, required_unless_present = "user", conflicts_with = "user")]
        listing: Option<String>,

        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show one application
    Show { listing: String, user: String },

    /// Move an application to a stage (denied, applied, interested, interviewed, hired)
    Stage {
        listing: String,
        user: String,
        stage: ApplicationStage,
    },

    /// Rate an application from 1 to 5
    Rate {
        listing: String,
        user: String,

        #[arg(required_unless_present = "clear", value_parser = clap::value_parser!(i64).range(1..=5))]
        rating: Option<i64>,

        /// Remove the rating
        #[arg(long)]
        clear: bool,
    },

    /// Withdraw (delete) an application
    Withdraw { listing: String, user: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.db.as_deref());
    telemetry::init(&config.log_level)?;

    let db = Database::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;

    if let Commands::Init = cli.command {
        db.init()?;
        if let Some(path) = db.path() {
            println!("Database initialized at {}", path.display());
        }
        return Ok(());
    }

    db.ensure_initialized()?;
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Org { command } => run_org(&db, &out, command),
        Commands::User { command } => run_user(&db, &out, command),
        Commands::Listing { command } => run_listing(&db, &out, command),
        Commands::Apply {
            listing,
            user,
            cover_letter,
            replace,
        } => {
            let app = NewApplication {
                job_listing_id: listing,
                user_id: user,
                cover_letter,
            };
            if replace {
                let (app, write) = db.upsert_application(app)?;
                out.emit(&app, || {
                    let verb = match write {
                        ApplicationWrite::Created => "Applied",
                        ApplicationWrite::Updated => "Updated application",
                    };
                    println!("{} to listing {} as {}.", verb, app.job_listing_id, app.user_id);
                })
            } else {
                let app = db.create_application(app)?;
                out.emit(&app, || {
                    println!(
                        "Applied to listing {} as {} (stage: {}).",
                        app.job_listing_id, app.user_id, app.stage
                    );
                })
            }
        }
        Commands::Application { command } => run_application(&db, &out, command),
    }
}

fn run_org(db: &Database, out: &Output, command: OrgCommands) -> Result<()> {
    match command {
        OrgCommands::Add {
            id,
            name,
            image_url,
        } => {
            let org = db.create_organization(NewOrganization {
                id,
                name,
                image_url,
            })?;
            out.emit(&org, || println!("Added organization '{}' ({}).", org.name, org.id))
        }

        OrgCommands::Show { id } => {
            let org = db
                .get_organization(&id)?
                .ok_or_else(|| anyhow!("Organization '{}' not found", id))?;
            let listings = db.list_job_listings(&JobListingFilter {
                organization_id: Some(id.clone()),
                ..Default::default()
            })?;
            let published = db.count_published_listings(&id)?;

            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct OrgView<'a> {
                #[serde(flatten)]
                organization: &'a models::Organization,
                published_listings: usize,
                listings: &'a [JobListing],
            }

            out.emit(
                &OrgView {
                    organization: &org,
                    published_listings: published,
                    listings: &listings,
                },
                || {
                    println!("Organization {}", org.id);
                    println!("Name: {}", org.name);
                    if let Some(url) = &org.image_url {
                        println!("Image: {}", url);
                    }
                    println!("Published listings: {}", published);
                    if !listings.is_empty() {
                        println!();
                        print_listing_table(&listings);
                    }
                },
            )
        }

        OrgCommands::Delete { id } => {
            let summary = db.delete_organization(&id)?;
            out.emit(&summary, || {
                println!(
                    "Deleted organization '{}' ({} listing(s), {} application(s)).",
                    id, summary.job_listings, summary.applications
                )
            })
        }
    }
}

fn run_user(db: &Database, out: &Output, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add {
            id,
            name,
            image_url,
            email,
        } => {
            let user = db.create_user(NewUser {
                id,
                name,
                image_url,
                email,
            })?;
            out.emit(&user, || println!("Added user '{}' ({}).", user.name, user.id))
        }

        UserCommands::List => {
            let users = db.list_users()?;
            out.emit(&users, || {
                if users.is_empty() {
                    println!("No users found.");
                    return;
                }
                println!("{:<24} {:<24} {:<30}", "ID", "NAME", "EMAIL");
                println!("{}", "-".repeat(80));
                for user in &users {
                    println!(
                        "{:<24} {:<24} {:<30}",
                        truncate(&user.id, 22),
                        truncate(&user.name, 22),
                        truncate(user.email.as_deref().unwrap_or("-"), 28)
                    );
                }
            })
        }

        UserCommands::Show { id } => {
            let user = match db.get_user(&id)? {
                Some(user) => Some(user),
                None if id.contains('@') => db.get_user_by_email(&id)?,
                None => None,
            }
            .ok_or_else(|| anyhow!("User '{}' not found", id))?;
            let applications = db.list_applications_for_user(&user.id)?;

            #[derive(Serialize)]
            struct UserView<'a> {
                #[serde(flatten)]
                user: &'a models::User,
                applications: &'a [JobListingApplication],
            }

            out.emit(
                &UserView {
                    user: &user,
                    applications: &applications,
                },
                || {
                    println!("User {}", user.id);
                    println!("Name: {}", user.name);
                    println!("Image: {}", user.image_url);
                    if let Some(email) = &user.email {
                        println!("Email: {}", email);
                    }
                    println!("Created: {}", user.created_at.format("%Y-%m-%d %H:%M"));
                    if !applications.is_empty() {
                        println!("\nApplications ({}):", applications.len());
                        for app in &applications {
                            let title = db
                                .get_job_listing(&app.job_listing_id)
                                .ok()
                                .flatten()
                                .map(|l| l.title)
                                .unwrap_or_default();
                            println!("  {} - {} ({})", app.job_listing_id, title, app.stage);
                        }
                    }
                },
            )
        }

        UserCommands::Update {
            id,
            name,
            image_url,
            email,
            clear_email,
        } => {
            let email = if clear_email { Some(None) } else { email.map(Some) };
            let user = db.update_user(
                &id,
                UserUpdate {
                    name,
                    image_url,
                    email,
                },
            )?;
            out.emit(&user, || println!("Updated user '{}'.", user.id))
        }

        UserCommands::Delete { id } => {
            let summary = db.delete_user(&id)?;
            out.emit(&summary, || {
                println!(
                    "Deleted user '{}' ({} application(s)).",
                    id, summary.applications
                )
            })
        }
    }
}

fn run_listing(db: &Database, out: &Output, command: ListingCommands) -> Result<()> {
    match command {
        ListingCommands::Add {
            org,
            title,
            description,
            description_file,
            wage,
            wage_interval,
            state,
            city,
            location,
            experience,
            listing_type,
            status,
            featured,
        } => {
            let description = match (description, description_file) {
                (Some(text), _) => text,
                (None, Some(file)) => std::fs::read_to_string(&file).with_context(|| {
                    format!("Failed to read description file: {}", file.display())
                })?,
                (None, None) => return Err(anyhow!("--description or --description-file is required")),
            };

            let listing = db.create_job_listing(NewJobListing {
                organization_id: org,
                title,
                description,
                wage,
                wage_interval,
                state_abbreviation: state,
                city,
                is_featured: featured,
                location_requirement: location,
                experience_level: experience,
                status,
                listing_type,
            })?;
            out.emit(&listing, || {
                println!("Added job listing {} ({}).", listing.id, listing.status)
            })
        }

        ListingCommands::List {
            status,
            org,
            state,
            city,
            location,
            experience,
            listing_type,
            featured,
            query,
        } => {
            let listings = db.list_job_listings(&JobListingFilter {
                status,
                organization_id: org,
                state_abbreviation: state,
                city,
                location_requirement: location,
                experience_level: experience,
                listing_type,
                featured_only: featured,
                title_contains: query,
            })?;
            out.emit(&listings, || {
                if listings.is_empty() {
                    println!("No job listings found.");
                } else {
                    print_listing_table(&listings);
                }
            })
        }

        ListingCommands::Show { id } => {
            let listing = db
                .get_job_listing(&id)?
                .ok_or_else(|| anyhow!("Job listing '{}' not found", id))?;
            let applications = db.list_applications_for_listing(&id)?.len();
            out.emit(&listing, || print_listing(&listing, applications))
        }

        ListingCommands::Edit {
            id,
            title,
            description,
            wage,
            wage_interval,
            clear_wage,
        } => {
            let current = db
                .get_job_listing(&id)?
                .ok_or_else(|| anyhow!("Job listing '{}' not found", id))?;
            let mut update = JobListingUpdate::from(&current);
            if let Some(title) = title {
                update.title = title;
            }
            if let Some(description) = description {
                update.description = description;
            }
            if clear_wage {
                update.wage = None;
                update.wage_interval = None;
            } else if wage.is_some() {
                update.wage = wage;
                update.wage_interval = wage_interval;
            }
            let listing = db.update_job_listing(&id, update)?;
            out.emit(&listing, || println!("Updated job listing {}.", listing.id))
        }

        ListingCommands::Status { id, status } => {
            let current = db
                .get_job_listing(&id)?
                .ok_or_else(|| anyhow!("Job listing '{}' not found", id))?;
            if current.status != status && !current.status.can_transition_to(status) {
                tracing::warn!(
                    job_listing_id = %id,
                    from = %current.status,
                    to = %status,
                    "unusual status transition"
                );
            }
            let listing = db.set_job_listing_status(&id, status)?;
            out.emit(&listing, || {
                println!("Job listing {} is now {}.", listing.id, listing.status)
            })
        }

        ListingCommands::Feature { id, off } => {
            let listing = db.set_job_listing_featured(&id, !off)?;
            out.emit(&listing, || {
                if listing.is_featured {
                    println!("Job listing {} is featured.", listing.id);
                } else {
                    println!("Job listing {} is no longer featured.", listing.id);
                }
            })
        }

        ListingCommands::Delete { id } => {
            let summary = db.delete_job_listing(&id)?;
            out.emit(&summary, || {
                println!(
                    "Deleted job listing {} ({} application(s)).",
                    id, summary.applications
                )
            })
        }
    }
}

fn run_application(db: &Database, out: &Output, command: ApplicationCommands) -> Result<()> {
    match command {
        ApplicationCommands::List { listing, user } => {
            let apps = match (listing, user) {
                (Some(listing), _) => db.list_applications_for_listing(&listing)?,
                (None, Some(user)) => db.list_applications_for_user(&user)?,
                (None, None) => return Err(anyhow!("--listing or --user is required")),
            };
            out.emit(&apps, || {
                if apps.is_empty() {
                    println!("No applications found.");
                    return;
                }
                println!(
                    "{:<38} {:<20} {:<12} {:>6} {:<16}",
                    "LISTING", "USER", "STAGE", "RATING", "APPLIED"
                );
                println!("{}", "-".repeat(96));
                for app in &apps {
                    println!(
                        "{:<38} {:<20} {:<12} {:>6} {:<16}",
                        app.job_listing_id,
                        truncate(&app.user_id, 18),
                        app.stage,
                        app.rating.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
                        app.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            })
        }

        ApplicationCommands::Show { listing, user } => {
            let app = db
                .get_application(&listing, &user)?
                .ok_or_else(|| anyhow!("No application from '{}' to listing {}", user, listing))?;
            out.emit(&app, || {
                println!("Application {} / {}", app.job_listing_id, app.user_id);
                println!("Stage: {}", app.stage);
                if let Some(rating) = app.rating {
                    println!("Rating: {}/{}", rating, models::MAX_RATING);
                }
                println!("Applied: {}", app.created_at.format("%Y-%m-%d %H:%M"));
                if let Some(letter) = &app.cover_letter {
                    println!("\n--- Cover Letter ---\n{}", textwrap::fill(letter, 80));
                }
            })
        }

        ApplicationCommands::Stage {
            listing,
            user,
            stage,
        } => {
            let app = db.set_application_stage(&listing, &user, stage)?;
            out.emit(&app, || {
                println!("Application from '{}' moved to {}.", app.user_id, app.stage)
            })
        }

        ApplicationCommands::Rate {
            listing,
            user,
            rating,
            clear,
        } => {
            let rating = if clear { None } else { rating };
            let app = db.set_application_rating(&listing, &user, rating)?;
            out.emit(&app, || match app.rating {
                Some(r) => println!("Rated application from '{}' {}/{}.", app.user_id, r, models::MAX_RATING),
                None => println!("Cleared rating for application from '{}'.", app.user_id),
            })
        }

        ApplicationCommands::Withdraw { listing, user } => {
            db.delete_application(&listing, &user)?;
            if out.json {
                println!("{}", serde_json::json!({ "deleted": true }));
            } else {
                println!("Withdrew application from '{}' to listing {}.", user, listing);
            }
            Ok(())
        }
    }
}

/// Chooses between human-readable text and JSON on stdout.
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize + ?Sized>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).context("Failed to serialize output")?
            );
        } else {
            text();
        }
        Ok(())
    }
}

fn print_listing_table(listings: &[JobListing]) {
    println!(
        "{:<38} {:<10} {:<28} {:<14} {:<14} {:>14}",
        "ID", "STATUS", "TITLE", "LOCATION", "LEVEL", "WAGE"
    );
    println!("{}", "-".repeat(123));
    for listing in listings {
        let title = if listing.is_featured {
            format!("* {}", listing.title)
        } else {
            listing.title.clone()
        };
        println!(
            "{:<38} {:<10} {:<28} {:<14} {:<14} {:>14}",
            listing.id,
            listing.status,
            truncate(&title, 26),
            truncate(&location_label(listing), 12),
            listing.experience_level,
            wage_label(listing)
        );
    }
}

fn print_listing(listing: &JobListing, applications: usize) {
    println!("Job listing {}", listing.id);
    println!("Title: {}", listing.title);
    println!("Organization: {}", listing.organization_id);
    println!("Status: {}", listing.status);
    if listing.is_featured {
        println!("Featured: yes");
    }
    println!("Type: {}", listing.listing_type);
    println!("Experience: {}", listing.experience_level);
    println!("Location: {}", location_label(listing));
    if listing.wage.is_some() {
        println!("Wage: {}", wage_label(listing));
    }
    if let Some(posted) = listing.posted_at {
        println!("Posted: {}", posted.format("%Y-%m-%d %H:%M"));
    }
    println!("Created: {}", listing.created_at.format("%Y-%m-%d %H:%M"));
    println!("Applications: {}", applications);
    println!("\n--- Description ---\n{}", textwrap::fill(&listing.description, 80));
}

fn location_label(listing: &JobListing) -> String {
    match (&listing.city, &listing.state_abbreviation) {
        (Some(city), Some(state)) => format!("{}, {} ({})", city, state, listing.location_requirement),
        (None, Some(state)) => format!("{} ({})", state, listing.location_requirement),
        _ => listing.location_requirement.to_string(),
    }
}

fn wage_label(listing: &JobListing) -> String {
    match (listing.wage, listing.wage_interval) {
        (Some(wage), Some(interval)) => format!("${} {}", wage, interval),
        (Some(wage), None) => format!("${}", wage),
        _ => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Staff DevOps Engineer", 10), "Staff D...");
        assert_eq!(truncate("Développeur Senior", 8), "Dével...");
    }

    #[test]
    fn test_cli_rejects_undeclared_status() {
        let result = Cli::try_parse_from(["jobboard", "listing", "status", "j1", "archived"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["jobboard", "listing", "status", "j1", "published"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Listing {
                command: ListingCommands::Status {
                    status: JobListingStatus::Published,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_edit_wage_interval_needs_wage() {
        let lone = ["jobboard", "listing", "edit", "j1", "--wage-interval", "hourly"];
        assert!(Cli::try_parse_from(lone).is_err());

        let both = [
            "jobboard", "listing", "edit", "j1", "--wage", "40", "--wage-interval", "hourly",
        ];
        assert!(Cli::try_parse_from(both).is_ok());
    }

    #[test]
    fn test_cli_rating_range() {
        assert!(Cli::try_parse_from(["jobboard", "application", "rate", "j1", "u1", "6"]).is_err());
        assert!(Cli::try_parse_from(["jobboard", "application", "rate", "j1", "u1", "3"]).is_ok());
        assert!(
            Cli::try_parse_from(["jobboard", "application", "rate", "j1", "u1", "--clear"]).is_ok()
        );
    }

    #[test]
    fn test_labels() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db.create_organization(NewOrganization {
            id: "o1".to_string(),
            name: "Org".to_string(),
            image_url: None,
        })
        .unwrap();
        let listing = db
            .create_job_listing(NewJobListing {
                organization_id: "o1".to_string(),
                title: "Dev".to_string(),
                description: "...".to_string(),
                wage: Some(50),
                wage_interval: Some(WageInterval::Hourly),
                state_abbreviation: Some("CA".to_string()),
                city: Some("Oakland".to_string()),
                is_featured: false,
                location_requirement: LocationRequirement::Hybrid,
                experience_level: ExperienceLevel::EntryLevel,
                status: JobListingStatus::Draft,
                listing_type: JobListingType::PartTime,
            })
            .unwrap();
        assert_eq!(location_label(&listing), "Oakland, CA (hybrid)");
        assert_eq!(wage_label(&listing), "$50 hourly");
    }
}
