//! Answer validation and feedback for submitted answers

use serde::Serialize;
use strsim::{jaro_winkler, levenshtein, normalized_levenshtein};

use crate::questions::{Answer, Question};

/// Maximum absolute difference accepted for numeric answers
pub const NUMERIC_TOLERANCE: f64 = 0.01;

/// Similarity above which a wrong text answer is reported as a near miss
const NEAR_MISS_THRESHOLD: f64 = 0.8;

/// Result of checking a submitted answer, with feedback for the player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerCheck {
    pub is_correct: bool,
    pub similarity: f64,
    pub feedback: String,
}

/// Check a raw answer against the question's expected answer.
///
/// Numeric answers accept anything within [`NUMERIC_TOLERANCE`]; unparseable
/// input is simply wrong. Text answers compare trimmed and case-insensitively.
pub fn validate(question: &Question, user_answer: &str) -> bool {
    match &question.answer {
        Answer::Numeric(expected) => parse_number(user_answer)
            .map(|n| (n - expected).abs() < NUMERIC_TOLERANCE)
            .unwrap_or(false),
        Answer::Text(expected) => normalize(user_answer) == normalize(expected),
    }
}

/// Validate and describe how close the answer was
pub fn check_answer(question: &Question, user_answer: &str) -> AnswerCheck {
    let is_correct = validate(question, user_answer);
    if is_correct {
        return AnswerCheck {
            is_correct,
            similarity: 1.0,
            feedback: "¡Correcto! ✓".to_string(),
        };
    }

    match &question.answer {
        Answer::Numeric(expected) => AnswerCheck {
            is_correct,
            similarity: 0.0,
            feedback: match parse_number(user_answer) {
                Some(_) => format!("Incorrecto. La respuesta es {}", expected),
                None => format!("'{}' no es un número. La respuesta es {}", user_answer.trim(), expected),
            },
        },
        Answer::Text(expected) => {
            let input = normalize(user_answer);
            let target = normalize(expected);
            // Jaro-Winkler weighs prefix typos more kindly than plain edit distance
            let similarity = normalized_levenshtein(&input, &target) * 0.4 + jaro_winkler(&input, &target) * 0.6;

            let feedback = if similarity >= NEAR_MISS_THRESHOLD {
                let distance = levenshtein(&input, &target);
                format!("¡Casi! {} caracteres de diferencia. La respuesta es '{}'", distance, expected)
            } else {
                format!("Incorrecto. La respuesta es '{}'", expected)
            };

            AnswerCheck {
                is_correct,
                similarity,
                feedback,
            }
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub use self::python::PyAnswerCheck;

#[cfg(feature = "python")]
mod python {
    use pyo3::prelude::*;

    use super::AnswerCheck;

    #[pyclass(name = "AnswerCheck")]
    #[derive(Debug, Clone)]
    pub struct PyAnswerCheck {
        #[pyo3(get)]
        pub is_correct: bool,
        #[pyo3(get)]
        pub similarity: f64,
        #[pyo3(get)]
        pub feedback: String,
    }

    impl From<AnswerCheck> for PyAnswerCheck {
        fn from(c: AnswerCheck) -> Self {
            Self {
                is_correct: c.is_correct,
                similarity: c.similarity,
                feedback: c.feedback,
            }
        }
    }

    #[pymethods]
    impl PyAnswerCheck {
        fn __repr__(&self) -> String {
            format!(
                "AnswerCheck(is_correct={}, similarity={:.2}, feedback='{}')",
                self.is_correct, self.similarity, self.feedback
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::QuestionBank;

    fn question(id: &str) -> Question {
        QuestionBank::builtin().unwrap().get(id).unwrap().clone()
    }

    #[test]
    fn test_numeric_tolerance() {
        let q = question("basic_001"); // answer 13
        assert!(validate(&q, "13"));
        assert!(validate(&q, "13.005"));
        assert!(validate(&q, " 12.995 "));
        assert!(!validate(&q, "13.02"));
        assert!(!validate(&q, "14"));
    }

    #[test]
    fn test_numeric_rejects_garbage() {
        let q = question("basic_001");
        assert!(!validate(&q, "trece"));
        assert!(!validate(&q, ""));
        assert!(!validate(&q, "NaN"));
        assert!(!validate(&q, "inf"));
    }

    #[test]
    fn test_negative_numeric_answer() {
        let q = question("linear_003"); // answer -13
        assert!(validate(&q, "-13"));
        assert!(!validate(&q, "13"));
    }

    #[test]
    fn test_text_answers_ignore_case_and_whitespace() {
        let q = question("enigma_002"); // answer "24 km"
        assert!(validate(&q, "24 km"));
        assert!(validate(&q, "  24 KM "));
        assert!(!validate(&q, "24km"));
        assert!(!validate(&q, "20 km"));
    }

    #[test]
    fn test_check_answer_agrees_with_validate() {
        let q = question("enigma_001"); // answer "20, 35, 20"
        let ok = check_answer(&q, "20, 35, 20");
        assert!(ok.is_correct);
        assert_eq!(ok.similarity, 1.0);

        let close = check_answer(&q, "20, 35, 21");
        assert!(!close.is_correct);
        assert!(close.similarity >= NEAR_MISS_THRESHOLD);
        assert!(close.feedback.starts_with("¡Casi!"));

        let far = check_answer(&q, "no sé");
        assert!(!far.is_correct);
        assert!(far.feedback.starts_with("Incorrecto"));
    }

    #[test]
    fn test_check_answer_numeric_feedback() {
        let q = question("basic_001");
        let wrong = check_answer(&q, "12");
        assert!(!wrong.is_correct);
        assert_eq!(wrong.feedback, "Incorrecto. La respuesta es 13");
        assert!(check_answer(&q, "abc").feedback.contains("no es un número"));
    }
}
