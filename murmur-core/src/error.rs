//! Error types for murmur operations

/// Result type for murmur operations
pub type Result<T> = std::result::Result<T, MurmurError>;

/// Error types for the engagement and memory core
#[derive(Debug, thiserror::Error)]
pub enum MurmurError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Memory log append or read failed
    #[error("Memory log error: {0}")]
    MemoryLog(String),

    /// Engagement store could not load or save a record
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Agent collaborator failed
    #[error("Agent error: {0}")]
    Agent(String),

    /// Router collaborator failed
    #[error("Router error: {0}")]
    Router(String),

    /// Agent did not answer within the configured timeout
    #[error("Agent timed out after {0:?}")]
    AgentTimeout(std::time::Duration),

    /// Workflow hook failed
    #[error("Hook error: {0}")]
    Hook(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error from the engagement store
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for MurmurError {
    fn from(s: String) -> Self {
        MurmurError::Other(s)
    }
}

impl From<&str> for MurmurError {
    fn from(s: &str) -> Self {
        MurmurError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for MurmurError {
    fn from(err: anyhow::Error) -> Self {
        MurmurError::Other(err.to_string())
    }
}
