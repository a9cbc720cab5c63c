//! Running per-user statistics

use serde::{Deserialize, Serialize};

use crate::gamification::{self, Achievement};
use crate::questions::Difficulty;

/// One answered problem
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub is_correct: bool,
    pub time_seconds: f64,
    pub difficulty: Difficulty,
}

/// Statistics owned by a single user.
///
/// Only [`UserStats::apply_outcome`] should change the counters; the running
/// average assumes it started at zero and was never set any other way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_problems: u32,
    pub correct_answers: u32,
    pub current_streak: u32,
    pub max_streak: u32,
    pub average_time_seconds: f64,
    /// 0 until the first problem is answered
    pub fastest_time_seconds: f64,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStats {
    /// Zeroed stats with a private copy of the achievement catalog
    pub fn new() -> Self {
        Self {
            total_problems: 0,
            correct_answers: 0,
            current_streak: 0,
            max_streak: 0,
            average_time_seconds: 0.0,
            fastest_time_seconds: 0.0,
            achievements: gamification::new_achievement_set(),
        }
    }

    /// Accuracy as a percentage (0 when nothing was answered)
    pub fn accuracy(&self) -> f64 {
        if self.total_problems == 0 {
            0.0
        } else {
            f64::from(self.correct_answers) * 100.0 / f64::from(self.total_problems)
        }
    }

    /// Fold one outcome into the stats and return the XP it earned.
    ///
    /// The XP is not added anywhere; callers own the XP total and rank.
    pub fn apply_outcome(&mut self, outcome: &Outcome) -> u32 {
        let time = outcome.time_seconds;

        self.total_problems += 1;
        if outcome.is_correct {
            self.correct_answers += 1;
            self.current_streak += 1;
            self.max_streak = self.max_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }

        if self.fastest_time_seconds == 0.0 || time < self.fastest_time_seconds {
            self.fastest_time_seconds = time;
        }

        let n = f64::from(self.total_problems);
        self.average_time_seconds = (self.average_time_seconds * (n - 1.0) + time) / n;

        gamification::calculate_xp(outcome.is_correct, time, self.current_streak, outcome.difficulty)
    }

    pub fn unlocked_achievements(&self) -> impl Iterator<Item = &Achievement> {
        self.achievements.iter().filter(|a| a.unlocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(is_correct: bool, time_seconds: f64, level: u8) -> Outcome {
        Outcome {
            is_correct,
            time_seconds,
            difficulty: Difficulty::new(level).unwrap(),
        }
    }

    #[test]
    fn test_first_correct_answer() {
        let mut stats = UserStats::new();
        let xp = stats.apply_outcome(&outcome(true, 8.0, 1));

        assert_eq!(stats.total_problems, 1);
        assert_eq!(stats.correct_answers, 1);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.max_streak, 1);
        assert_eq!(stats.fastest_time_seconds, 8.0);
        assert_eq!(stats.average_time_seconds, 8.0);
        // 10 base + 15 time + 2 streak
        assert_eq!(xp, 27);
    }

    #[test]
    fn test_wrong_answer_breaks_streak() {
        let mut stats = UserStats::new();
        stats.apply_outcome(&outcome(true, 12.0, 2));
        stats.apply_outcome(&outcome(true, 12.0, 2));
        let xp = stats.apply_outcome(&outcome(false, 40.0, 2));

        assert_eq!(xp, 0);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.max_streak, 2);
        assert_eq!(stats.correct_answers, 2);
        assert_eq!(stats.total_problems, 3);
    }

    #[test]
    fn test_running_average_and_fastest() {
        let mut stats = UserStats::new();
        for t in [10.0, 20.0, 30.0, 4.0] {
            stats.apply_outcome(&outcome(false, t, 1));
        }
        assert!((stats.average_time_seconds - 16.0).abs() < 1e-9);
        assert_eq!(stats.fastest_time_seconds, 4.0);
    }

    #[test]
    fn test_streak_feeds_xp() {
        let mut stats = UserStats::new();
        let mut last = 0;
        for _ in 0..3 {
            last = stats.apply_outcome(&outcome(true, 25.0, 2));
        }
        // 20 base + 5 time + 3 * 2 streak
        assert_eq!(last, 31);
    }

    #[test]
    fn test_accuracy() {
        let mut stats = UserStats::new();
        assert_eq!(stats.accuracy(), 0.0);
        stats.apply_outcome(&outcome(true, 5.0, 1));
        stats.apply_outcome(&outcome(false, 5.0, 1));
        assert_eq!(stats.accuracy(), 50.0);
    }

    #[test]
    fn test_stats_roundtrip_through_json() {
        let mut stats = UserStats::new();
        stats.apply_outcome(&outcome(true, 3.0, 1));
        gamification::check_achievements(&mut stats);

        let json = serde_json::to_string(&stats).unwrap();
        let restored: UserStats = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, stats);
        assert_eq!(restored.unlocked_achievements().count(), 3);
    }
}
