//! User profiles, the user store capability, and outcome submission
//!
//! `GameService::submit_outcome` is the entry point the gameplay layer calls
//! after each answer: stats update, XP and rank, then achievements.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::gamification::{self, Achievement, Rank};
use crate::stats::{Outcome, UserStats};
use crate::util::lock;

/// Everything the core tracks about one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub xp: u64,
    pub rank_id: String,
    pub stats: UserStats,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            xp: 0,
            rank_id: gamification::rank_for_xp(0).id.to_string(),
            stats: UserStats::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn rank(&self) -> &'static Rank {
        gamification::rank_for_xp(self.xp)
    }
}

/// Get/put access to persisted profiles
pub trait UserStore: Send + Sync {
    fn get(&self, user_id: &str) -> Result<Option<UserProfile>>;
    fn put(&self, profile: &UserProfile) -> Result<()>;
}

/// Profiles kept in memory (tests, guest play)
#[derive(Default)]
pub struct MemoryUserStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(lock(&self.profiles).get(user_id).cloned())
    }

    fn put(&self, profile: &UserProfile) -> Result<()> {
        lock(&self.profiles).insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

/// Profiles stored in SQLite, stats serialized as JSON
#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

const PROFILES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    xp INTEGER NOT NULL DEFAULT 0,
    rank_id TEXT NOT NULL,
    stats TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

impl SqliteUserStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::open(&config.profiles_path)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(PROFILES_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl UserStore for SqliteUserStore {
    fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = lock(&self.conn);
        let row = conn
            .query_row(
                "SELECT user_id, display_name, xp, rank_id, stats, updated_at FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, display_name, xp, rank_id, stats_json, updated_ms)) = row else {
            return Ok(None);
        };

        Ok(Some(UserProfile {
            user_id,
            display_name,
            xp: u64::try_from(xp).unwrap_or(0),
            rank_id,
            stats: serde_json::from_str(&stats_json)?,
            updated_at: Utc.timestamp_millis_opt(updated_ms).single().unwrap_or_else(Utc::now),
        }))
    }

    fn put(&self, profile: &UserProfile) -> Result<()> {
        let stats_json = serde_json::to_string(&profile.stats)?;
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO profiles (user_id, display_name, xp, rank_id, stats, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                xp = excluded.xp,
                rank_id = excluded.rank_id,
                stats = excluded.stats,
                updated_at = excluded.updated_at",
            params![
                profile.user_id,
                profile.display_name,
                i64::try_from(profile.xp).unwrap_or(i64::MAX),
                profile.rank_id,
                stats_json,
                profile.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}

/// What one submitted answer changed
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub xp_gained: u32,
    pub total_xp: u64,
    pub previous_rank: &'static Rank,
    pub new_rank: &'static Rank,
    pub ranked_up: bool,
    pub new_achievements: Vec<Achievement>,
}

/// Applies outcomes to stored profiles, one user at a time
pub struct GameService<S: UserStore> {
    store: S,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: UserStore> GameService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the profile if it does not exist yet
    pub fn register(&self, user_id: &str, display_name: &str) -> Result<UserProfile> {
        self.with_user_lock(user_id, || {
            if let Some(existing) = self.store.get(user_id)? {
                return Ok(existing);
            }
            let profile = UserProfile::new(user_id, display_name);
            self.store.put(&profile)?;
            info!(user_id, "registered new player");
            Ok(profile)
        })
    }

    pub fn profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.store.get(user_id)
    }

    /// Record one answered problem for `user_id`.
    ///
    /// Calls for the same user are serialized; unknown users start from a
    /// fresh profile.
    pub fn submit_outcome(&self, user_id: &str, outcome: &Outcome) -> Result<OutcomeReport> {
        self.with_user_lock(user_id, || self.apply(user_id, outcome))
    }

    fn apply(&self, user_id: &str, outcome: &Outcome) -> Result<OutcomeReport> {
        let mut profile = self
            .store
            .get(user_id)?
            .unwrap_or_else(|| UserProfile::new(user_id, user_id));

        let previous_rank = profile.rank();
        let xp_gained = profile.stats.apply_outcome(outcome);
        profile.xp = profile.xp.saturating_add(u64::from(xp_gained));
        let new_rank = profile.rank();
        profile.rank_id = new_rank.id.to_string();

        let new_achievements = gamification::check_achievements(&mut profile.stats);
        profile.updated_at = Utc::now();
        self.store.put(&profile)?;

        debug!(
            user_id,
            correct = outcome.is_correct,
            difficulty = outcome.difficulty.get(),
            xp_gained,
            "outcome applied"
        );
        if new_rank.id != previous_rank.id {
            info!(user_id, from = previous_rank.name, to = new_rank.name, "rank changed");
        }
        for achievement in &new_achievements {
            info!(user_id, achievement = %achievement.id, "achievement unlocked");
        }

        Ok(OutcomeReport {
            xp_gained,
            total_xp: profile.xp,
            previous_rank,
            new_rank,
            ranked_up: new_rank.min_xp > previous_rank.min_xp,
            new_achievements,
        })
    }

    /// Run `f` while holding the user's lock.
    ///
    /// The map only holds entries for users with a call in flight: the last
    /// caller out removes it. Clones are only taken under the map lock, so
    /// the count checked here cannot grow behind our back.
    fn with_user_lock<R>(&self, user_id: &str, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let user_lock = lock(&self.user_locks)
            .entry(user_id.to_string())
            .or_default()
            .clone();

        let result = {
            let _held = lock(&*user_lock);
            f()
        };

        let mut locks = lock(&self.user_locks);
        if Arc::strong_count(&user_lock) == 2 {
            locks.remove(user_id);
        }
        result
    }

    /// Users with a submission currently in flight
    pub fn active_users(&self) -> usize {
        lock(&self.user_locks).len()
    }
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub use self::python::PyGameService;

#[cfg(feature = "python")]
mod python {
    use std::path::PathBuf;

    use pyo3::prelude::*;

    use super::{GameService, SqliteUserStore};
    use crate::config::CoreConfig;
    use crate::error::to_py_json;
    use crate::questions::Difficulty;
    use crate::stats::Outcome;

    /// Profiles live at `db_path` if given, else at the configured path
    #[pyclass(name = "GameService")]
    pub struct PyGameService {
        inner: GameService<SqliteUserStore>,
    }

    #[pymethods]
    impl PyGameService {
        #[new]
        #[pyo3(signature = (db_path=None, config_path=None))]
        fn new(db_path: Option<PathBuf>, config_path: Option<PathBuf>) -> PyResult<Self> {
            let mut config = CoreConfig::load(config_path.as_deref())?;
            if let Some(path) = db_path {
                config.storage.profiles_path = path;
            }
            Ok(Self {
                inner: GameService::new(SqliteUserStore::from_config(&config.storage)?),
            })
        }

        fn register(&self, user_id: &str, display_name: &str) -> PyResult<String> {
            to_py_json(&self.inner.register(user_id, display_name)?)
        }

        fn profile_json(&self, user_id: &str) -> PyResult<Option<String>> {
            match self.inner.profile(user_id)? {
                Some(profile) => Ok(Some(to_py_json(&profile)?)),
                None => Ok(None),
            }
        }

        fn submit_outcome(
            &self,
            user_id: &str,
            is_correct: bool,
            time_seconds: f64,
            difficulty_level: u8,
        ) -> PyResult<String> {
            let outcome = Outcome {
                is_correct,
                time_seconds,
                difficulty: Difficulty::new(difficulty_level)?,
            };
            to_py_json(&self.inner.submit_outcome(user_id, &outcome)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::Difficulty;
    use std::thread;
    use tempfile::tempdir;

    fn correct(time_seconds: f64, level: u8) -> Outcome {
        Outcome {
            is_correct: true,
            time_seconds,
            difficulty: Difficulty::new(level).unwrap(),
        }
    }

    #[test]
    fn test_submit_outcome_updates_profile() {
        let service = GameService::new(MemoryUserStore::new());
        service.register("u1", "Ana").unwrap();

        let report = service.submit_outcome("u1", &correct(8.0, 1)).unwrap();
        assert_eq!(report.xp_gained, 27);
        assert_eq!(report.total_xp, 27);
        assert_eq!(report.new_rank.id, "soldado");
        assert!(!report.ranked_up);
        let unlocked: Vec<&str> = report.new_achievements.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(unlocked, vec!["first_steps", "speed_demon"]);

        let profile = service.profile("u1").unwrap().unwrap();
        assert_eq!(profile.display_name, "Ana");
        assert_eq!(profile.xp, 27);
        assert_eq!(profile.stats.total_problems, 1);
    }

    #[test]
    fn test_rank_up_is_reported() {
        let store = MemoryUserStore::new();
        let mut profile = UserProfile::new("u2", "Luis");
        profile.xp = 990;
        store.put(&profile).unwrap();

        let service = GameService::new(store);
        let report = service.submit_outcome("u2", &correct(5.0, 4)).unwrap();
        assert_eq!(report.previous_rank.id, "soldado");
        assert_eq!(report.new_rank.id, "sargento");
        assert!(report.ranked_up);
        assert_eq!(service.profile("u2").unwrap().unwrap().rank_id, "sargento");
    }

    #[test]
    fn test_unknown_user_gets_fresh_profile() {
        let service = GameService::new(MemoryUserStore::new());
        let report = service.submit_outcome("guest", &correct(40.0, 2)).unwrap();
        assert_eq!(report.xp_gained, 22);
        assert!(service.profile("guest").unwrap().is_some());
    }

    #[test]
    fn test_register_keeps_existing_profile() {
        let service = GameService::new(MemoryUserStore::new());
        service.register("u3", "Carla").unwrap();
        service.submit_outcome("u3", &correct(8.0, 1)).unwrap();
        let again = service.register("u3", "Otra").unwrap();
        assert_eq!(again.display_name, "Carla");
        assert_eq!(again.xp, 27);
    }

    #[test]
    fn test_concurrent_submissions_are_serialized() {
        let service = Arc::new(GameService::new(MemoryUserStore::new()));
        service.register("racer", "Racer").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    for _ in 0..10 {
                        service.submit_outcome("racer", &correct(50.0, 1)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let profile = service.profile("racer").unwrap().unwrap();
        assert_eq!(profile.stats.total_problems, 80);
        assert_eq!(profile.stats.max_streak, 80);
        assert_eq!(service.active_users(), 0);
    }

    #[test]
    fn test_user_locks_do_not_accumulate() {
        let service = Arc::new(GameService::new(MemoryUserStore::new()));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    for i in 0..50 {
                        let user = format!("player_{}", (t * 50 + i) % 20);
                        service.submit_outcome(&user, &correct(12.0, 2)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(service.active_users(), 0);
        let total: u32 = (0..20)
            .map(|i| service.profile(&format!("player_{}", i)).unwrap().unwrap().stats.total_problems)
            .sum();
        assert_eq!(total, 200);

        // Registration releases its entry as well
        service.register("solo", "Solo").unwrap();
        assert_eq!(service.active_users(), 0);
    }

    #[test]
    fn test_sqlite_store_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.db");

        {
            let service = GameService::new(SqliteUserStore::open(&path).unwrap());
            service.register("u4", "Rosa").unwrap();
            service.submit_outcome("u4", &correct(3.0, 2)).unwrap();
        }

        let store = SqliteUserStore::open(&path).unwrap();
        let profile = store.get("u4").unwrap().unwrap();
        assert_eq!(profile.display_name, "Rosa");
        assert_eq!(profile.xp, 37);
        assert_eq!(profile.stats.fastest_time_seconds, 3.0);
        assert_eq!(profile.stats.unlocked_achievements().count(), 3);
        assert!(store.get("nobody").unwrap().is_none());
    }
}
