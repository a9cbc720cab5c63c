//! Question bank and selection engine
//!
//! The bank is immutable once built. Which questions a player has already seen
//! lives in a [`SessionPool`] owned by the caller, so concurrent sessions never
//! drain each other's pools.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::answers;
use crate::config::QuestionsConfig;
use crate::error::{QuizError, Result};
use crate::import;

const BUILTIN_BANK: &str = include_str!("../data/question_bank.json");

/// Problem difficulty, 1 (basic) through 4 (expert)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: Difficulty = Difficulty(1);
    pub const MAX: Difficulty = Difficulty(4);

    pub fn new(level: u8) -> Result<Self> {
        if (1..=4).contains(&level) {
            Ok(Self(level))
        } else {
            Err(QuizError::InvalidDifficulty(level))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> [Difficulty; 4] {
        [Difficulty(1), Difficulty(2), Difficulty(3), Difficulty(4)]
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = QuizError;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl From<Difficulty> for u8 {
    fn from(d: Difficulty) -> u8 {
        d.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Equation,
    WordProblem,
    Enigma,
    MultipleChoice,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equation => "equation",
            Self::WordProblem => "word_problem",
            Self::Enigma => "enigma",
            Self::MultipleChoice => "multiple_choice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "equation" => Some(Self::Equation),
            "word_problem" => Some(Self::WordProblem),
            "enigma" => Some(Self::Enigma),
            "multiple_choice" => Some(Self::MultipleChoice),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    BasicOperations,
    LinearEquations,
    WordProblems,
    Enigmas,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicOperations => "basic_operations",
            Self::LinearEquations => "linear_equations",
            Self::WordProblems => "word_problems",
            Self::Enigmas => "enigmas",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic_operations" => Some(Self::BasicOperations),
            "linear_equations" => Some(Self::LinearEquations),
            "word_problems" => Some(Self::WordProblems),
            "enigmas" => Some(Self::Enigmas),
            _ => None,
        }
    }
}

/// Whether a problem is set in a local (Nicaraguan) context or a generic one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionContext {
    Nicaragua,
    #[default]
    General,
}

/// Expected answer: either a number (checked with tolerance) or free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Numeric(f64),
    Text(String),
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Numeric(n) => write!(f, "{}", n),
            Answer::Text(s) => f.write_str(s),
        }
    }
}

/// A practice problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub category: Category,
    #[serde(default)]
    pub context: QuestionContext,
    pub prompt: String,
    pub answer: Answer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub explanation: Vec<String>,
    pub time_limit_seconds: u32,
    pub xp_reward: u32,
}

impl Question {
    fn check(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(QuizError::InvalidBank("question with empty id".into()));
        }
        let is_mcq = self.question_type == QuestionType::MultipleChoice;
        match (&self.options, is_mcq) {
            (Some(options), true) => {
                let expected = self.answer.to_string();
                if !options.iter().any(|o| o.trim().eq_ignore_ascii_case(expected.trim())) {
                    return Err(QuizError::InvalidBank(format!(
                        "{}: answer '{}' is not one of the options",
                        self.id, expected
                    )));
                }
            }
            (None, true) => {
                return Err(QuizError::InvalidBank(format!(
                    "{}: multiple choice question without options",
                    self.id
                )))
            }
            (Some(_), false) => {
                return Err(QuizError::InvalidBank(format!(
                    "{}: options are only allowed on multiple choice questions",
                    self.id
                )))
            }
            (None, false) => {}
        }
        Ok(())
    }
}

/// Question counts for dashboards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BankStats {
    pub total: usize,
    pub by_difficulty: BTreeMap<u8, usize>,
    pub by_category: BTreeMap<String, usize>,
}

/// Immutable, validated collection of questions
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Build a bank, rejecting duplicate ids and malformed multiple choice entries
    pub fn from_questions(questions: Vec<Question>) -> Result<Self> {
        let mut seen = HashSet::new();
        for q in &questions {
            q.check()?;
            if !seen.insert(q.id.as_str()) {
                return Err(QuizError::InvalidBank(format!("duplicate question id '{}'", q.id)));
            }
        }
        Ok(Self { questions })
    }

    /// Parse a JSON array of questions
    pub fn from_json(json: &str) -> Result<Self> {
        let questions: Vec<Question> = serde_json::from_str(json)?;
        Self::from_questions(questions)
    }

    /// The bank shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_BANK)
    }

    /// Combine two banks; ids must stay unique
    pub fn merge(self, other: QuestionBank) -> Result<Self> {
        let mut questions = self.questions;
        questions.extend(other.questions);
        Self::from_questions(questions)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn all(&self) -> &[Question] {
        &self.questions
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn by_difficulty(&self, difficulty: Difficulty) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(move |q| q.difficulty == difficulty)
    }

    pub fn by_category(&self, category: Category, difficulty: Option<Difficulty>) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| q.category == category)
            .filter(|q| difficulty.map_or(true, |d| q.difficulty == d))
            .collect()
    }

    pub fn stats(&self) -> BankStats {
        let mut stats = BankStats {
            total: self.questions.len(),
            ..Default::default()
        };
        for q in &self.questions {
            *stats.by_difficulty.entry(q.difficulty.get()).or_insert(0) += 1;
            *stats.by_category.entry(q.category.as_str().to_string()).or_insert(0) += 1;
        }
        stats
    }
}

/// Ids handed out to one player since the last reset
#[derive(Debug, Clone, Default)]
pub struct SessionPool {
    used: HashSet<String>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn ids(&self) -> &HashSet<String> {
        &self.used
    }

    pub fn reset(&mut self) {
        self.used.clear();
    }

    fn mark(&mut self, id: &str) {
        self.used.insert(id.to_string());
    }
}

/// Selects, validates and explains questions from a shared bank
#[derive(Debug, Clone)]
pub struct QuestionEngine {
    bank: Arc<QuestionBank>,
}

impl QuestionEngine {
    pub fn new(bank: QuestionBank) -> Self {
        Self { bank: Arc::new(bank) }
    }

    pub fn builtin() -> Result<Self> {
        Ok(Self::new(QuestionBank::builtin()?))
    }

    /// Built-in bank, merged with the configured bank file if there is one
    pub fn from_config(config: &QuestionsConfig) -> Result<Self> {
        let mut bank = QuestionBank::builtin()?;
        if let Some(path) = &config.bank_path {
            bank = bank.merge(import::load_bank_file(path)?)?;
            info!(path = %path.display(), total = bank.len(), "merged extra question bank");
        }
        Ok(Self::new(bank))
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn question(&self, id: &str) -> Result<&Question> {
        self.bank
            .get(id)
            .ok_or_else(|| QuizError::QuestionNotFound(id.to_string()))
    }

    /// Draw `count` unseen questions of one difficulty
    pub fn sample(&self, difficulty: Difficulty, count: usize, pool: &mut SessionPool) -> Result<Vec<Question>> {
        self.sample_with_rng(difficulty, count, pool, &mut rand::thread_rng())
    }

    /// Like [`sample`](Self::sample) with a caller-supplied RNG.
    ///
    /// When fewer than `count` unseen questions remain, the whole pool is reset
    /// and selection runs once more over every question of that difficulty.
    pub fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        difficulty: Difficulty,
        count: usize,
        pool: &mut SessionPool,
        rng: &mut R,
    ) -> Result<Vec<Question>> {
        if self.bank.by_difficulty(difficulty).next().is_none() {
            return Err(QuizError::ExhaustedBank { difficulty: difficulty.get() });
        }

        let mut candidates: Vec<&Question> = self
            .bank
            .by_difficulty(difficulty)
            .filter(|q| !pool.contains(&q.id))
            .collect();

        if candidates.len() < count {
            debug!(
                difficulty = difficulty.get(),
                remaining = candidates.len(),
                requested = count,
                "question pool exhausted, resetting"
            );
            pool.reset();
            candidates = self.bank.by_difficulty(difficulty).collect();
        }

        candidates.shuffle(rng);
        candidates.truncate(count);

        for q in &candidates {
            pool.mark(&q.id);
        }
        Ok(candidates.into_iter().cloned().collect())
    }

    /// Pick any question not listed in `exclude`
    pub fn random_question(&self, exclude: &HashSet<String>) -> Result<Question> {
        self.random_question_with_rng(exclude, &mut rand::thread_rng())
    }

    pub fn random_question_with_rng<R: Rng + ?Sized>(
        &self,
        exclude: &HashSet<String>,
        rng: &mut R,
    ) -> Result<Question> {
        let candidates: Vec<&Question> = self
            .bank
            .all()
            .iter()
            .filter(|q| !exclude.contains(&q.id))
            .collect();

        candidates
            .choose(rng)
            .map(|q| (*q).clone())
            .ok_or(QuizError::EmptyBank)
    }

    pub fn validate(&self, question: &Question, user_answer: &str) -> bool {
        answers::validate(question, user_answer)
    }

    pub fn hint(&self, question: &Question) -> &'static str {
        hint_for(question.question_type)
    }
}

/// Static hint for a question type
pub fn hint_for(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::Equation => {
            "Recuerda aislar la variable realizando la misma operación en ambos lados de la ecuación."
        }
        QuestionType::WordProblem => {
            "Identifica la incógnita, plantea la ecuación basándote en la información dada."
        }
        QuestionType::Enigma => {
            "Lee cuidadosamente y identifica todas las relaciones matemáticas en el problema."
        }
        QuestionType::MultipleChoice => "Elimina las opciones que claramente no pueden ser correctas.",
    }
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub use self::python::PyQuestion;

#[cfg(feature = "python")]
mod python {
    use pyo3::prelude::*;

    use super::{hint_for, Question};

    #[pyclass(name = "Question")]
    #[derive(Debug, Clone)]
    pub struct PyQuestion {
        #[pyo3(get)]
        pub id: String,
        #[pyo3(get)]
        pub question_type: String,
        #[pyo3(get)]
        pub difficulty: u8,
        #[pyo3(get)]
        pub category: String,
        #[pyo3(get)]
        pub prompt: String,
        #[pyo3(get)]
        pub options: Option<Vec<String>>,
        #[pyo3(get)]
        pub explanation: Vec<String>,
        #[pyo3(get)]
        pub time_limit_seconds: u32,
        #[pyo3(get)]
        pub xp_reward: u32,
        #[pyo3(get)]
        pub hint: String,
    }

    impl From<&Question> for PyQuestion {
        fn from(q: &Question) -> Self {
            Self {
                id: q.id.clone(),
                question_type: q.question_type.as_str().to_string(),
                difficulty: q.difficulty.get(),
                category: q.category.as_str().to_string(),
                prompt: q.prompt.clone(),
                options: q.options.clone(),
                explanation: q.explanation.clone(),
                time_limit_seconds: q.time_limit_seconds,
                xp_reward: q.xp_reward,
                hint: hint_for(q.question_type).to_string(),
            }
        }
    }

    #[pymethods]
    impl PyQuestion {
        fn __repr__(&self) -> String {
            format!("Question(id='{}', difficulty={}, type='{}')", self.id, self.difficulty, self.question_type)
        }
    }
}
