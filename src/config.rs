use std::env;
use std::path::{Path, PathBuf};

pub const DB_ENV: &str = "JOBBOARD_DB";
pub const LOG_ENV: &str = "JOBBOARD_LOG";
const DEFAULT_LOG_LEVEL: &str = "warn";

/// Runtime settings for the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_level: String,
}

impl Config {
    /// Loads `.env` if present, then resolves settings from the flag and environment.
    pub fn load(db_flag: Option<&Path>) -> Self {
        dotenvy::dotenv().ok();
        Self::resolve(
            db_flag,
            env::var(DB_ENV).ok(),
            env::var(LOG_ENV).ok(),
            default_data_dir(),
        )
    }

    /// Precedence: `--db` flag, then `JOBBOARD_DB`, then the platform data
    /// directory, then the working directory.
    pub fn resolve(
        db_flag: Option<&Path>,
        db_env: Option<String>,
        log_env: Option<String>,
        data_dir: Option<PathBuf>,
    ) -> Self {
        let database_path = match (db_flag, db_env.filter(|v| !v.trim().is_empty())) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) => PathBuf::from(expand_home(path.trim())),
            (None, None) => data_dir
                .map(|dir| dir.join("jobboard.db"))
                .unwrap_or_else(|| PathBuf::from("jobboard.db")),
        };

        let log_level = log_env
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            database_path,
            log_level,
        }
    }
}

fn default_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "jobboard").map(|dirs| dirs.data_dir().to_path_buf())
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new() {
            return home.home_dir().join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}
