//! Error types shared across the core

use thiserror::Error;

/// Errors surfaced by the question engine, stores and configuration
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("No questions of difficulty {difficulty} in the bank")]
    ExhaustedBank { difficulty: u8 },

    #[error("No questions available")]
    EmptyBank,

    #[error("Invalid difficulty: {0} (expected 1-4)")]
    InvalidDifficulty(u8),

    #[error("Invalid question bank: {0}")]
    InvalidBank(String),

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    /// The durable local store could not be opened or written.
    #[error("Offline storage unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import error: {0}")]
    Import(String),
}

pub type Result<T> = std::result::Result<T, QuizError>;

// ============= Python Bindings =============

#[cfg(feature = "python")]
impl From<QuizError> for pyo3::PyErr {
    fn from(e: QuizError) -> Self {
        use pyo3::exceptions::{PyRuntimeError, PyValueError};
        match e {
            QuizError::InvalidDifficulty(_) | QuizError::InvalidBank(_) | QuizError::Config(_) | QuizError::Import(_) => {
                PyValueError::new_err(e.to_string())
            }
            _ => PyRuntimeError::new_err(e.to_string()),
        }
    }
}

/// Complex results cross into Python as JSON strings
#[cfg(feature = "python")]
pub(crate) fn to_py_json<T: serde::Serialize>(value: &T) -> pyo3::PyResult<String> {
    Ok(serde_json::to_string(value).map_err(QuizError::from)?)
}
