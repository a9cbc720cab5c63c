//! MathQuiz Core - game logic for the MathQuiz battle mode
//!
//! Question selection and answer checking, XP/rank/achievement rules,
//! per-player statistics, and an offline queue that syncs progress and
//! scores once the device is back online. Python bindings are available
//! behind the `python` feature.

pub mod answers;
pub mod config;
pub mod error;
pub mod gamification;
pub mod import;
pub mod logging;
pub mod offline;
pub mod profile;
pub mod questions;
pub mod session;
pub mod stats;

mod util;

pub use answers::{check_answer, validate, AnswerCheck};
pub use config::CoreConfig;
pub use error::{QuizError, Result};
pub use gamification::{calculate_xp, check_achievements, rank_for_xp, Achievement, Rank};
pub use offline::{HttpTransport, OfflineQueue, SyncManager, SyncReport};
pub use profile::{GameService, MemoryUserStore, OutcomeReport, SqliteUserStore, UserProfile, UserStore};
pub use questions::{Difficulty, Question, QuestionBank, QuestionEngine, SessionPool};
pub use session::{GameMode, PlaySession};
pub use stats::{Outcome, UserStats};

/// MathQuiz Core Python module
#[cfg(feature = "python")]
#[pyo3::pymodule]
fn mathquiz_core(m: &pyo3::Bound<'_, pyo3::types::PyModule>) -> pyo3::PyResult<()> {
    use pyo3::prelude::*;

    // Functions
    m.add_function(wrap_pyfunction!(logging::py_init_logging, m)?)?;
    m.add_function(wrap_pyfunction!(gamification::py_calculate_xp, m)?)?;
    m.add_function(wrap_pyfunction!(gamification::py_rank_for_xp, m)?)?;

    // Classes
    m.add_class::<questions::PyQuestion>()?;
    m.add_class::<answers::PyAnswerCheck>()?;
    m.add_class::<session::PyQuizSession>()?;
    m.add_class::<profile::PyGameService>()?;
    m.add_class::<offline::PyOfflineSync>()?;

    Ok(())
}
