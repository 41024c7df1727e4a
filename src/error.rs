use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No quarterly data block found in agent output")]
    NoEmbeddedBlock,

    /// The agent returned the `OK` sentinel instead of data.
    #[error("Quarterly data block is 'OK' (no data yet)")]
    EmptyQuarterlyData,

    #[error("Could not parse quarterly data block as JSON: {0}")]
    MalformedBlock(String),

    #[error("Unsupported shape for quarterly data: {0}")]
    UnsupportedShape(String),

    #[error("Quarterly record is missing a 'quarter' field: {0}")]
    MissingQuarter(String),

    #[error("Agent task '{task}' failed: {message}")]
    AgentRun { task: String, message: String },

    #[error("Financial data fetch failed: {0}")]
    DataFetch(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "web")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
