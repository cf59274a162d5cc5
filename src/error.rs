use thiserror::Error;

use crate::model::FindingStatus;

pub type Result<T> = std::result::Result<T, WardError>;

#[derive(Error, Debug)]
pub enum WardError {
    #[error("Not found: {entity} '{id}'")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid finding transition: {from} -> {to}")]
    InvalidTransition {
        from: FindingStatus,
        to: FindingStatus,
    },

    #[error("Collector error ({resource_type} in {region}): {message}")]
    Collector {
        resource_type: String,
        region: String,
        message: String,
    },

    #[error("Engine execution failed (exit_code={exit_code:?}, timed_out={timed_out}, memory_limit_exceeded={memory_limit_exceeded})")]
    EngineExecution {
        exit_code: Option<i32>,
        timed_out: bool,
        memory_limit_exceeded: bool,
    },

    #[error("Engine output invalid: {0}")]
    EngineOutput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}
