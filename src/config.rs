//! TOML configuration for the quiz core

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub questions: QuestionsConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub queue_path: PathBuf,
    pub profiles_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = data_dir();
        Self {
            queue_path: dir.join("offline.db"),
            profiles_path: dir.join("profiles.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub base_url: String,
    pub progress_endpoint: String,
    pub score_endpoint: String,
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".into(),
            progress_endpoint: "/api/sync/progress".into(),
            score_endpoint: "/api/sync/scores".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionsConfig {
    /// Extra bank merged into the built-in one
    pub bank_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub quick_battle_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quick_battle_length: 5,
        }
    }
}

impl CoreConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuizError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Read `path` if given, otherwise use the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| QuizError::Config(format!("failed to parse config: {}", e)))
    }
}

/// `<data_dir>/mathquiz`, or `./mathquiz` on platforms without one
fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mathquiz")
}
