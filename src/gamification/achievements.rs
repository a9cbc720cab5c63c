//! Achievement catalog and unlock evaluation
//!
//! The catalog is a static list of templates. Every user gets a deep copy
//! ([`new_achievement_set`]) so unlock state is never shared between users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::UserStats;

/// Accuracy achievements only count once this many problems were answered
pub const ACCURACY_MIN_PROBLEMS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// What an achievement's `requirement` is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    /// Total problems answered
    Problems,
    /// Best streak of correct answers
    Streak,
    /// Accuracy percentage
    Accuracy,
    /// Fastest answer, in seconds
    Speed,
    /// Awarded by hand, never unlocked automatically
    Special,
}

/// Static achievement definition
#[derive(Debug, Clone)]
pub struct AchievementTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub tier: Tier,
    pub category: AchievementCategory,
    pub requirement: u32,
}

pub static ACHIEVEMENTS: &[AchievementTemplate] = &[
    // === PROBLEMS ===
    AchievementTemplate {
        id: "first_steps",
        name: "Primeros Pasos",
        description: "Resuelve tu primer problema",
        icon: "🎯",
        tier: Tier::Bronze,
        category: AchievementCategory::Problems,
        requirement: 1,
    },
    AchievementTemplate {
        id: "problem_solver",
        name: "Solucionador",
        description: "Resuelve 10 problemas",
        icon: "🧮",
        tier: Tier::Bronze,
        category: AchievementCategory::Problems,
        requirement: 10,
    },
    AchievementTemplate {
        id: "math_warrior",
        name: "Guerrero Matemático",
        description: "Resuelve 50 problemas",
        icon: "⚔️",
        tier: Tier::Silver,
        category: AchievementCategory::Problems,
        requirement: 50,
    },
    AchievementTemplate {
        id: "algebra_master",
        name: "Maestro del Álgebra",
        description: "Resuelve 100 problemas",
        icon: "🏆",
        tier: Tier::Gold,
        category: AchievementCategory::Problems,
        requirement: 100,
    },
    AchievementTemplate {
        id: "math_legend",
        name: "Leyenda Matemática",
        description: "Resuelve 500 problemas",
        icon: "👑",
        tier: Tier::Platinum,
        category: AchievementCategory::Problems,
        requirement: 500,
    },
    // === STREAK ===
    AchievementTemplate {
        id: "streak_starter",
        name: "Inicio de Racha",
        description: "Consigue una racha de 5",
        icon: "🔥",
        tier: Tier::Bronze,
        category: AchievementCategory::Streak,
        requirement: 5,
    },
    AchievementTemplate {
        id: "hot_streak",
        name: "Racha Caliente",
        description: "Consigue una racha de 15",
        icon: "🌟",
        tier: Tier::Silver,
        category: AchievementCategory::Streak,
        requirement: 15,
    },
    AchievementTemplate {
        id: "unstoppable",
        name: "Imparable",
        description: "Consigue una racha de 30",
        icon: "💫",
        tier: Tier::Gold,
        category: AchievementCategory::Streak,
        requirement: 30,
    },
    // === ACCURACY ===
    AchievementTemplate {
        id: "accurate_shooter",
        name: "Tirador Preciso",
        description: "Mantén 90% de precisión en 20 problemas",
        icon: "🎯",
        tier: Tier::Silver,
        category: AchievementCategory::Accuracy,
        requirement: 90,
    },
    AchievementTemplate {
        id: "perfect_aim",
        name: "Puntería Perfecta",
        description: "Mantén 95% de precisión en 50 problemas",
        icon: "🏹",
        tier: Tier::Gold,
        category: AchievementCategory::Accuracy,
        requirement: 95,
    },
    // === SPEED ===
    AchievementTemplate {
        id: "speed_demon",
        name: "Demonio de Velocidad",
        description: "Resuelve un problema en menos de 10 segundos",
        icon: "⚡",
        tier: Tier::Silver,
        category: AchievementCategory::Speed,
        requirement: 10,
    },
    AchievementTemplate {
        id: "lightning_fast",
        name: "Rápido como el Rayo",
        description: "Resuelve un problema en menos de 5 segundos",
        icon: "🌩️",
        tier: Tier::Gold,
        category: AchievementCategory::Speed,
        requirement: 5,
    },
];

/// A user's copy of an achievement, with its unlock state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub tier: Tier,
    pub category: AchievementCategory,
    pub requirement: u32,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl Achievement {
    pub fn from_template(template: &AchievementTemplate) -> Self {
        Self {
            id: template.id.to_string(),
            name: template.name.to_string(),
            description: template.description.to_string(),
            icon: template.icon.to_string(),
            tier: template.tier,
            category: template.category,
            requirement: template.requirement,
            unlocked: false,
            unlocked_at: None,
        }
    }

    /// Whether `stats` satisfies this achievement's requirement
    pub fn is_met_by(&self, stats: &UserStats) -> bool {
        let requirement = f64::from(self.requirement);
        match self.category {
            AchievementCategory::Problems => stats.total_problems >= self.requirement,
            AchievementCategory::Streak => stats.max_streak >= self.requirement,
            AchievementCategory::Accuracy => {
                stats.total_problems >= ACCURACY_MIN_PROBLEMS && stats.accuracy() >= requirement
            }
            AchievementCategory::Speed => {
                stats.fastest_time_seconds > 0.0 && stats.fastest_time_seconds <= requirement
            }
            AchievementCategory::Special => false,
        }
    }

    fn unlock(&mut self, now: DateTime<Utc>) {
        self.unlocked = true;
        self.unlocked_at.get_or_insert(now);
    }
}

/// Fresh, fully locked copy of the catalog for a new user
pub fn new_achievement_set() -> Vec<Achievement> {
    ACHIEVEMENTS.iter().map(Achievement::from_template).collect()
}

/// Unlock every achievement `stats` newly qualifies for.
///
/// Returns the newly unlocked ones in catalog order. Already unlocked
/// achievements are skipped, so a second call with the same stats returns
/// nothing.
pub fn check_achievements(stats: &mut UserStats) -> Vec<Achievement> {
    check_achievements_at(stats, Utc::now())
}

pub fn check_achievements_at(stats: &mut UserStats, now: DateTime<Utc>) -> Vec<Achievement> {
    let mut achievements = std::mem::take(&mut stats.achievements);

    // Users stored before a catalog entry existed get it added, locked.
    for template in ACHIEVEMENTS {
        if !achievements.iter().any(|a| a.id == template.id) {
            achievements.push(Achievement::from_template(template));
        }
    }

    let mut newly_unlocked = Vec::new();
    for achievement in achievements.iter_mut() {
        if achievement.unlocked || !achievement.is_met_by(stats) {
            continue;
        }
        achievement.unlock(now);
        newly_unlocked.push(achievement.clone());
    }

    stats.achievements = achievements;
    newly_unlocked.sort_by_key(|a| catalog_position(&a.id));
    newly_unlocked
}

fn catalog_position(id: &str) -> usize {
    ACHIEVEMENTS
        .iter()
        .position(|t| t.id == id)
        .unwrap_or(ACHIEVEMENTS.len())
}
