// Configuration - Environment-variable driven, read once at startup

use std::env;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "snapsplit.db";
pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Everything the binaries need from the environment. Collaborator keys are
/// optional: a missing key disables that route with a "not configured"
/// answer instead of failing startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub addr: String,
    pub mindee_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            db_path: env::var("SNAPSPLIT_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH)),
            addr: env::var("SNAPSPLIT_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string()),
            mindee_api_key: non_empty(env::var("MINDEE_API_KEY").ok()),
            openai_api_key: non_empty(env::var("OPENAI_API_KEY").ok()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
