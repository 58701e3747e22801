/// Unified error type for the rule learner
/// Provides structured error handling with categories for different failure modes
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FoilError {
    /// Configuration errors: missing/malformed JSON, bad paths, invalid settings
    #[error("Invalid configuration: {message}")]
    ConfigInvalid {
        message: String,
        path: Option<String>,
    },

    /// Data errors: field count mismatches, unparseable values in relation files
    #[error("Invalid data: {message}")]
    DataInvalid {
        message: String,
        file: Option<String>,
        line: Option<usize>,
    },

    /// Memory errors: the soft quota prevents materialising a candidate binding set
    #[error("Out of memory: {message}")]
    OutOfMemory {
        message: String,
        quota: Option<usize>,
        requested: Option<usize>,
    },

    /// Invariant violations: should never happen, indicates a bug
    #[error("Logic error: {message}")]
    LogicError { message: String },
}

impl FoilError {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
            path: None,
        }
    }

    pub fn config_invalid_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn data_invalid(message: impl Into<String>) -> Self {
        Self::DataInvalid {
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn data_invalid_at(
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
    ) -> Self {
        Self::DataInvalid {
            message: message.into(),
            file: Some(file.into()),
            line: Some(line),
        }
    }

    pub fn out_of_memory(message: impl Into<String>, quota: usize, requested: usize) -> Self {
        Self::OutOfMemory {
            message: message.into(),
            quota: Some(quota),
            requested: Some(requested),
        }
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::LogicError {
            message: message.into(),
        }
    }
}

/// Result type alias for learner operations
pub type FoilResult<T> = Result<T, FoilError>;
