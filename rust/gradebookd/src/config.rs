use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "GRADEBOOKD_WORKSPACE";
pub const LOG_ENV: &str = "GRADEBOOKD_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        // A missing .env is normal.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            workspace: non_blank(WORKSPACE_ENV).map(|v| PathBuf::from(v.trim())),
            log_filter: non_blank(LOG_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}
