use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not connect to OCR service: {0}")]
    Connection(String),

    #[error("OCR service returned status {0}")]
    OcrStatus(u16),

    #[error("Duplicate trip: {0}")]
    DuplicateTrip(String),

    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    #[error("Malformed Receipt: {0}")]
    MalformedReceipt(String),

    #[error("Not approved: {0}")]
    Declined(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Config Error: {0}")]
    Config(String),
}
