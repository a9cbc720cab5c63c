//! A single game played by one user

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::answers::{self, AnswerCheck};
use crate::config::SessionConfig;
use crate::error::{QuizError, Result};
use crate::offline::{ProgressEvent, ScoreEvent};
use crate::profile::{GameService, OutcomeReport, UserStore};
use crate::questions::{Difficulty, Question, QuestionEngine, SessionPool};
use crate::stats::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Open-ended practice at a chosen difficulty
    Campaign,
    /// Fixed number of questions with rising difficulty
    QuickBattle,
    /// Keeps going until the first wrong answer
    Survival,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::QuickBattle => "quick_battle",
            Self::Survival => "survival",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "campaign" => Some(Self::Campaign),
            "quick_battle" => Some(Self::QuickBattle),
            "survival" => Some(Self::Survival),
            _ => None,
        }
    }
}

/// One graded answer within a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedAnswer {
    pub question_id: String,
    pub input: String,
    pub check: AnswerCheck,
    #[serde(skip)]
    pub outcome: Outcome,
}

impl RecordedAnswer {
    pub fn progress_event(&self, user_id: &str) -> ProgressEvent {
        ProgressEvent {
            user_id: user_id.to_string(),
            question_id: self.question_id.clone(),
            answer: self.input.clone(),
            correct: self.check.is_correct,
            time_spent: self.outcome.time_seconds,
        }
    }
}

/// Session state: which questions were served and how the player is doing.
///
/// XP is credited separately because it depends on the player's overall
/// streak, which lives in their profile.
#[derive(Debug, Clone)]
pub struct PlaySession {
    mode: GameMode,
    difficulty: Difficulty,
    quick_battle_length: usize,
    pool: SessionPool,
    seen: HashSet<String>,
    served: usize,
    answered: u32,
    correct: u32,
    streak: u32,
    best_streak: u32,
    xp_earned: u64,
    failed: bool,
}

impl PlaySession {
    pub fn new(mode: GameMode, difficulty: Difficulty, quick_battle_length: usize) -> Self {
        Self {
            mode,
            difficulty,
            quick_battle_length,
            pool: SessionPool::new(),
            seen: HashSet::new(),
            served: 0,
            answered: 0,
            correct: 0,
            streak: 0,
            best_streak: 0,
            xp_earned: 0,
            failed: false,
        }
    }

    pub fn from_config(mode: GameMode, difficulty: Difficulty, config: &SessionConfig) -> Self {
        Self::new(mode, difficulty, config.quick_battle_length)
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn answered(&self) -> u32 {
        self.answered
    }

    pub fn correct(&self) -> u32 {
        self.correct
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn best_streak(&self) -> u32 {
        self.best_streak
    }

    pub fn xp_earned(&self) -> u64 {
        self.xp_earned
    }

    /// Difficulty of the next question to serve
    pub fn current_difficulty(&self) -> Difficulty {
        match self.mode {
            GameMode::QuickBattle => {
                let level = (self.served / 2 + 1).min(usize::from(Difficulty::MAX.get()));
                u8::try_from(level)
                    .ok()
                    .and_then(|l| Difficulty::new(l).ok())
                    .unwrap_or(Difficulty::MAX)
            }
            GameMode::Campaign | GameMode::Survival => self.difficulty,
        }
    }

    pub fn next_question(&mut self, engine: &QuestionEngine) -> Result<Question> {
        let difficulty = self.current_difficulty();
        let question = match engine.sample(difficulty, 1, &mut self.pool) {
            Ok(mut batch) if !batch.is_empty() => batch.swap_remove(0),
            Ok(_) | Err(QuizError::ExhaustedBank { .. }) => {
                debug!(difficulty = difficulty.get(), "no questions at difficulty, picking any unseen one");
                engine.random_question(&self.seen)?
            }
            Err(e) => return Err(e),
        };

        self.seen.insert(question.id.clone());
        self.served += 1;
        Ok(question)
    }

    /// Grade `input` and update the tally
    pub fn record(&mut self, question: &Question, input: &str, time_seconds: f64) -> RecordedAnswer {
        let check = answers::check_answer(question, input);
        self.answered += 1;
        if check.is_correct {
            self.correct += 1;
            self.streak += 1;
            self.best_streak = self.best_streak.max(self.streak);
        } else {
            self.streak = 0;
            if self.mode == GameMode::Survival {
                self.failed = true;
            }
        }

        RecordedAnswer {
            question_id: question.id.clone(),
            input: input.to_string(),
            outcome: Outcome {
                is_correct: check.is_correct,
                time_seconds,
                difficulty: question.difficulty,
            },
            check,
        }
    }

    pub fn credit_xp(&mut self, xp: u32) {
        self.xp_earned = self.xp_earned.saturating_add(u64::from(xp));
    }

    /// Grade an answer, apply it to the player's profile and credit the XP
    pub fn answer<S: UserStore>(
        &mut self,
        service: &GameService<S>,
        user_id: &str,
        question: &Question,
        input: &str,
        time_seconds: f64,
    ) -> Result<(RecordedAnswer, OutcomeReport)> {
        let recorded = self.record(question, input, time_seconds);
        let report = service.submit_outcome(user_id, &recorded.outcome)?;
        self.credit_xp(report.xp_gained);
        Ok((recorded, report))
    }

    pub fn is_finished(&self) -> bool {
        match self.mode {
            GameMode::QuickBattle => self.answered as usize >= self.quick_battle_length,
            GameMode::Survival => self.failed,
            GameMode::Campaign => false,
        }
    }

    /// Final result for the offline queue; the score is the XP earned
    pub fn score_event(&self, user_id: &str) -> ScoreEvent {
        ScoreEvent {
            user_id: user_id.to_string(),
            game_mode: self.mode,
            score: self.xp_earned,
            xp_earned: self.xp_earned,
            questions_answered: self.answered,
            correct_answers: self.correct,
        }
    }
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub use self::python::PyQuizSession;

#[cfg(feature = "python")]
mod python {
    use std::path::PathBuf;

    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    use super::{GameMode, PlaySession};
    use crate::answers::PyAnswerCheck;
    use crate::config::CoreConfig;
    use crate::error::to_py_json;
    use crate::questions::{Difficulty, PyQuestion, Question, QuestionEngine};

    /// A play session over the built-in bank plus the configured bank file.
    ///
    /// `quick_battle_length` and `bank_path` override the config file.
    #[pyclass(name = "QuizSession")]
    pub struct PyQuizSession {
        engine: QuestionEngine,
        session: PlaySession,
        current: Option<Question>,
    }

    #[pymethods]
    impl PyQuizSession {
        #[new]
        #[pyo3(signature = (mode, difficulty_level=1, config_path=None, quick_battle_length=None, bank_path=None))]
        fn new(
            mode: &str,
            difficulty_level: u8,
            config_path: Option<PathBuf>,
            quick_battle_length: Option<usize>,
            bank_path: Option<PathBuf>,
        ) -> PyResult<Self> {
            let mode =
                GameMode::parse(mode).ok_or_else(|| PyValueError::new_err(format!("unknown game mode: {}", mode)))?;
            let mut config = CoreConfig::load(config_path.as_deref())?;
            if let Some(length) = quick_battle_length {
                config.session.quick_battle_length = length;
            }
            if bank_path.is_some() {
                config.questions.bank_path = bank_path;
            }

            Ok(Self {
                engine: QuestionEngine::from_config(&config.questions)?,
                session: PlaySession::from_config(mode, Difficulty::new(difficulty_level)?, &config.session),
                current: None,
            })
        }

        fn next_question(&mut self) -> PyResult<PyQuestion> {
            let question = self.session.next_question(&self.engine)?;
            let py = PyQuestion::from(&question);
            self.current = Some(question);
            Ok(py)
        }

        /// Grade an answer to the current question
        fn record(&mut self, input: &str, time_seconds: f64) -> PyResult<PyAnswerCheck> {
            let question = self
                .current
                .take()
                .ok_or_else(|| PyRuntimeError::new_err("no question in progress"))?;
            Ok(self.session.record(&question, input, time_seconds).check.into())
        }

        fn credit_xp(&mut self, xp: u32) {
            self.session.credit_xp(xp);
        }

        fn is_finished(&self) -> bool {
            self.session.is_finished()
        }

        fn score_event_json(&self, user_id: &str) -> PyResult<String> {
            to_py_json(&self.session.score_event(user_id))
        }
    }
}
