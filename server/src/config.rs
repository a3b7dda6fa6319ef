use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DB_FILE: &str = "filebox.db";
const CURRENT_DIR: &str = "./";
const UPLOADS_DIR: &str = "./uploads";
const PORT: u16 = 3000;
const ADMIN_EMAIL: &str = "admin@filebox.local";
const ADMIN_PASSWORD: &str = "admin";
const SESSION_TTL_HOURS: u64 = 24;
const MAX_FILE_SIZE: usize = 100 * 1024 * 1024;
const MAX_FILES: usize = 100;

/// Runtime settings shared by every request through `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub db: PathBuf,
    pub uploads_dir: PathBuf,
    pub port: u16,
    pub admin_email: String,
    pub admin_password: String,
    pub session_ttl: Duration,
    pub max_file_size: usize,
    pub max_files: usize,
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: PathBuf::from(CURRENT_DIR).join(DB_FILE),
            uploads_dir: PathBuf::from(UPLOADS_DIR),
            port: PORT,
            admin_email: ADMIN_EMAIL.to_owned(),
            admin_password: ADMIN_PASSWORD.to_owned(),
            session_ttl: Duration::from_secs(SESSION_TTL_HOURS * 3600),
            max_file_size: MAX_FILE_SIZE,
            max_files: MAX_FILES,
            secure_cookies: false,
        }
    }
}

impl Config {
    /// Builds configuration from `FILEBOX_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let dir = lookup("FILEBOX_DATA_DIR").unwrap_or_else(|| String::from(CURRENT_DIR));
        let db_file = lookup("FILEBOX_DATA_FILE").unwrap_or_else(|| String::from(DB_FILE));
        let ttl_hours = parse_or(&lookup, "FILEBOX_SESSION_TTL_HOURS", SESSION_TTL_HOURS);

        Self {
            db: PathBuf::from(dir).join(db_file),
            uploads_dir: lookup("FILEBOX_UPLOADS_DIR")
                .map_or_else(|| PathBuf::from(UPLOADS_DIR), PathBuf::from),
            port: parse_or(&lookup, "FILEBOX_PORT", PORT),
            admin_email: lookup("FILEBOX_ADMIN_EMAIL").unwrap_or_else(|| ADMIN_EMAIL.to_owned()),
            admin_password: lookup("FILEBOX_ADMIN_PASSWORD")
                .unwrap_or_else(|| ADMIN_PASSWORD.to_owned()),
            session_ttl: Duration::from_secs(ttl_hours.saturating_mul(3600)),
            max_file_size: parse_or(&lookup, "FILEBOX_MAX_FILE_SIZE", MAX_FILE_SIZE),
            max_files: parse_or(&lookup, "FILEBOX_MAX_FILES", MAX_FILES),
            secure_cookies: parse_or(&lookup, "FILEBOX_SECURE_COOKIES", false),
        }
    }

    /// Upper bound for a whole upload request body.
    #[must_use]
    pub fn body_limit(&self) -> usize {
        self.max_file_size.saturating_mul(self.max_files)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("invalid value '{raw}' for {key}, using default");
            default
        }),
        None => default,
    }
}
