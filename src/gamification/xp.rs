//! XP awarded per answered problem

use serde::Serialize;

use crate::questions::Difficulty;

/// Streak bonus never exceeds this, however long the streak
pub const MAX_STREAK_BONUS: u32 = 50;

/// How an XP award was put together
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct XpBreakdown {
    pub base: u32,
    pub time_bonus: u32,
    pub streak_bonus: u32,
}

impl XpBreakdown {
    /// Break down the award for one answer. Wrong answers earn nothing.
    pub fn for_answer(is_correct: bool, time_seconds: f64, streak: u32, difficulty: Difficulty) -> Self {
        if !is_correct {
            return Self::default();
        }

        Self {
            base: 10 * u32::from(difficulty.get()),
            time_bonus: time_bonus(time_seconds),
            streak_bonus: streak.saturating_mul(2).min(MAX_STREAK_BONUS),
        }
    }

    pub fn total(&self) -> u32 {
        self.base + self.time_bonus + self.streak_bonus
    }
}

/// Faster answers earn more
fn time_bonus(time_seconds: f64) -> u32 {
    if time_seconds < 10.0 {
        15
    } else if time_seconds < 20.0 {
        10
    } else if time_seconds < 30.0 {
        5
    } else {
        0
    }
}

/// Total XP for one answer
pub fn calculate_xp(is_correct: bool, time_seconds: f64, streak: u32, difficulty: Difficulty) -> u32 {
    XpBreakdown::for_answer(is_correct, time_seconds, streak, difficulty).total()
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
#[pyo3::pyfunction]
#[pyo3(name = "calculate_xp")]
pub fn py_calculate_xp(is_correct: bool, time_seconds: f64, streak: u32, difficulty_level: u8) -> pyo3::PyResult<u32> {
    Ok(calculate_xp(is_correct, time_seconds, streak, Difficulty::new(difficulty_level)?))
}
