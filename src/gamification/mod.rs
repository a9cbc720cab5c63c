//! Gamification: XP awards, ranks and achievements
//!
//! Everything here is a pure function of its inputs plus the static rank and
//! achievement catalogs.

mod achievements;
mod ranks;
mod xp;

pub use achievements::{
    check_achievements, check_achievements_at, new_achievement_set, Achievement, AchievementCategory,
    AchievementTemplate, Tier, ACCURACY_MIN_PROBLEMS, ACHIEVEMENTS,
};
pub use ranks::{rank_by_id, rank_for_xp, rank_progress, xp_to_next_rank, NextRank, Rank, RANKS};
pub use xp::{calculate_xp, XpBreakdown, MAX_STREAK_BONUS};

#[cfg(feature = "python")]
pub use ranks::py_rank_for_xp;
#[cfg(feature = "python")]
pub use xp::py_calculate_xp;
