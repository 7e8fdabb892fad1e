//! Unified error handling for Elsinore
//!
//! A single error type shared by every Elsinore crate, built with thiserror
//! so each variant carries a proper Display and Error impl.

/// Result type alias using ElsinoreError
pub type Result<T> = std::result::Result<T, ElsinoreError>;

/// Unified error type for all Elsinore operations
#[derive(thiserror::Error, Debug)]
pub enum ElsinoreError {
    // ========================================================================
    // Lookup and uniqueness errors
    // ========================================================================
    #[error("not found: {0}")]
    NotFound(String),

    #[error("name '{0}' is already in use")]
    NameTaken(String),

    #[error("gpio '{0}' is already in use")]
    PinBusy(String),

    #[error("no pin could be resolved for '{0}'")]
    PinUnresolvable(String),

    #[error("probe {probe} is already assigned to temperature controller '{controller}', remove it first")]
    ProbeOwned { probe: String, controller: String },

    // ========================================================================
    // Input validation errors
    // ========================================================================
    #[error("could not parse '{0}' as a temperature")]
    InvalidTemperature(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Hardware and infrastructure errors
    // ========================================================================
    #[error("hardware failure: {0}")]
    Hardware(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl ElsinoreError {
    /// Create a NotFound error from a message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a hardware error from a message
    pub fn hardware(msg: impl Into<String>) -> Self {
        Self::Hardware(msg.into())
    }

    /// Create an invalid-input error from a message
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
