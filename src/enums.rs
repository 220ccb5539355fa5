use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returned when a string is not one of an enumeration's declared tags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {kind} (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

/// Declares a closed enumeration whose string tags are its stored representation.
///
/// Tags are listed in declaration order. Never reorder or rename one: the tag
/// text is what lands on disk and in JSON.
macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $tag:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $tag)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag),+
                }
            }

            /// Tags rendered as a SQL list, e.g. `'draft', 'published'`.
            pub fn sql_domain() -> String {
                Self::ALL
                    .iter()
                    .map(|v| format!("'{}'", v.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                        expected: Self::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_str().as_bytes())))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ParseEnumError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

closed_enum! {
    /// Pay period a listing's wage is quoted in.
    WageInterval, "wage interval" {
        Hourly => "hourly",
        Daily => "daily",
        Weekly => "weekly",
        BiWeekly => "bi-weekly",
        Yearly => "yearly",
        Monthly => "monthly",
    }
}

closed_enum! {
    /// Where the work is done.
    LocationRequirement, "location requirement" {
        Remote => "remote",
        InOffice => "in-office",
        Hybrid => "hybrid",
        Flexible => "flexible",
        NotSpecified => "not-specified",
        Other => "other",
    }
}

closed_enum! {
    ExperienceLevel, "experience level" {
        Internship => "internship",
        EntryLevel => "entry-level",
        MidLevel => "mid-level",
        SeniorLevel => "senior-level",
    }
}

closed_enum! {
    JobListingType, "job listing type" {
        FullTime => "full-time",
        PartTime => "part-time",
        Contract => "contract",
        Temporary => "temporary",
        Internship => "internship",
    }
}

closed_enum! {
    /// Visibility of a listing. Only published listings are live.
    JobListingStatus, "job listing status" {
        Draft => "draft",
        Published => "published",
        Delisted => "delisted",
    }
}

closed_enum! {
    /// Recruiter-facing progress of an application.
    #[derive(Default)]
    ApplicationStage, "application stage" {
        Denied => "denied",
        #[default]
        Applied => "applied",
        Interested => "interested",
        Interviewed => "interviewed",
        Hired => "hired",
    }
}

impl LocationRequirement {
    /// Whether listings with this requirement name a physical workplace,
    /// and so need a city and state.
    pub fn requires_address(self) -> bool {
        matches!(self, LocationRequirement::InOffice | LocationRequirement::Hybrid)
    }
}

impl JobListingStatus {
    /// Whether moving from `self` to `next` follows the usual listing lifecycle.
    ///
    /// The store does not call this; it is advisory for callers that want the
    /// draft -> published -> delisted flow.
    pub fn can_transition_to(self, next: JobListingStatus) -> bool {
        use JobListingStatus::*;
        matches!(
            (self, next),
            (Draft, Published) | (Published, Delisted) | (Delisted, Published) | (Published, Draft)
        )
    }
}

impl ApplicationStage {
    /// Position used when listing applications: active stages first, denied last.
    pub fn sort_order(self) -> u8 {
        match self {
            ApplicationStage::Applied => 0,
            ApplicationStage::Interested => 1,
            ApplicationStage::Interviewed => 2,
            ApplicationStage::Hired => 3,
            ApplicationStage::Denied => 4,
        }
    }
}
