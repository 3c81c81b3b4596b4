//! Error types for the metamon training crate

use std::time::Duration;

use thiserror::Error;

/// Main error type for the metamon training crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    #[error("unknown architecture size '{input}'. Expected one of: {expected}")]
    UnknownArchSize { input: String, expected: String },

    #[error("unknown tokenizer '{input}'. Expected one of: {expected}")]
    UnknownTokenizer { input: String, expected: String },

    #[error("unknown observation space '{input}'. Expected one of: {expected}")]
    UnknownObservationSpace { input: String, expected: String },

    #[error("unknown reward function '{input}'. Expected one of: {expected}")]
    UnknownRewardFunction { input: String, expected: String },

    #[error("unknown opponent '{input}'. Expected one of: {expected}")]
    UnknownOpponent { input: String, expected: String },

    #[error("invalid battle format '{input}': {reason}")]
    InvalidBattleFormat { input: String, reason: String },

    #[error("team '{team}' was built for gen {team_gen} but the battle format is {format}")]
    TeamFormatMismatch {
        team: String,
        team_gen: u8,
        format: String,
    },

    #[error("observation policy mismatch: dataset uses '{dataset}', environments use '{live}'")]
    PolicyMismatch { dataset: String, live: String },

    #[error("environment fault in {spec}: {message}")]
    EnvironmentFault { spec: String, message: String },

    #[error("environment {spec} did not respond within {waited:?}")]
    EnvironmentTimeout { spec: String, waited: Duration },

    #[error("illegal action {action} (valid actions: {valid:?})")]
    IllegalAction { action: usize, valid: Vec<usize> },

    #[error("offline corpus error: {message}")]
    DataCorpus { message: String },

    #[error("offline corpus at '{root}' contains no replays for formats {formats:?}")]
    EmptyCorpus { root: String, formats: Vec<String> },

    #[error("checkpoint {ordinal} not found")]
    CheckpointNotFound { ordinal: u64 },

    #[error("checkpoint {ordinal} already exists and cannot be overwritten")]
    CheckpointExists { ordinal: u64 },

    #[error("checkpoint {ordinal} is older than the latest checkpoint {latest}; resume from {latest}")]
    CheckpointSuperseded { ordinal: u64, latest: u64 },

    #[error("failed to write checkpoint {ordinal}: {message}")]
    CheckpointWrite { ordinal: u64, message: String },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to {operation}: {message}")]
    SerializationContext { operation: String, message: String },

    #[error("progress bar template error: {message}")]
    ProgressBarTemplate { message: String },
}

impl Error {
    /// Whether the failure is local to one environment and may be retried by
    /// rebuilding that environment.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::EnvironmentFault { .. }
                | Error::EnvironmentTimeout { .. }
                | Error::IllegalAction { .. }
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn corpus(message: impl Into<String>) -> Self {
        Error::DataCorpus {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            operation: "IO operation".to_string(),
            source,
        }
    }
}
