use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid taxonomy: {0}")]
    Taxonomy(String),

    #[error("Unknown category code: {0}")]
    UnknownCategory(String),

    #[error("Invalid rule '{pattern}': {reason}")]
    InvalidRule { pattern: String, reason: String },

    #[error("Invalid metrics config: {0}")]
    MetricsConfig(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TallyError>;
