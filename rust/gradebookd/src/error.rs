use thiserror::Error;

#[derive(Debug, Error)]
pub enum GradebookError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadParams(String),
    #[error("select a workspace first")]
    NoWorkspace,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error("{0:#}")]
    Open(anyhow::Error),
    #[error("{0:#}")]
    Settings(anyhow::Error),
    #[error("{0:#}")]
    Backup(anyhow::Error),
}

impl GradebookError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadParams(_) => "bad_params",
            Self::NoWorkspace => "no_workspace",
            Self::Db(_) => "db_query_failed",
            Self::Io(_) => "io_failed",
            Self::Encode(_) => "encode_failed",
            Self::Open(_) => "db_open_failed",
            Self::Settings(_) => "settings_failed",
            Self::Backup(_) => "backup_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, GradebookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            GradebookError::validation("overlapping range").code(),
            "validation_failed"
        );
        assert_eq!(GradebookError::not_found("x").code(), "not_found");
        assert_eq!(GradebookError::NoWorkspace.code(), "no_workspace");
        assert_eq!(
            GradebookError::from(rusqlite::Error::QueryReturnedNoRows).code(),
            "db_query_failed"
        );
    }

    #[test]
    fn message_is_passed_through() {
        let e = GradebookError::not_found("No matching grade");
        assert_eq!(e.to_string(), "No matching grade");
    }
}
