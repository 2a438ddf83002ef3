use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid timestamp '{0}' in database")]
    InvalidTimestamp(String),
    #[error("Plate {0} is already present")]
    DuplicatePlate(String),
    #[error("No {table} row with id {id}")]
    MissingRow { table: &'static str, id: i64 },
    #[error("Database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i32, supported: i32 },
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    #[error("Detection failed: {0}")]
    Detection(String),
    #[error("Recognition failed: {0}")]
    Recognition(String),
    #[error("Camera error: {0}")]
    Capture(String),
    #[error("Rendering failed: {0}")]
    Render(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
