//! Whiteboard configuration, stored as RON.
//!
//! ```ron
//! (
//!     placement: (horizontal_gap: 80.0, vertical_jitter: 60.0),
//!     history: (limit: 100),
//!     generation: (timeout: 120000, topic_max_items: 5),
//!     persistence: (debounce: 1000),
//! )
//! ```
//!
//! Every section and field is optional; missing values take the defaults in
//! [`constants`](crate::constants). Durations are milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use whiteboard_graph::{ChildPlacement, DEFAULT_HISTORY_LIMIT};
use whiteboard_graph::placement::{DEFAULT_HORIZONTAL_GAP, DEFAULT_NODE_SIZE, DEFAULT_VERTICAL_JITTER};
use whiteboard_types::Size;

use crate::constants::*;

/// Errors from loading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("RON parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("RON write error: {0}")]
    Write(#[from] ron::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Serde adapter: `Duration` as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub horizontal_gap: f64,
    pub vertical_jitter: f64,
    /// Assumed parent size before it has been measured.
    pub default_width: f64,
    pub default_height: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            horizontal_gap: DEFAULT_HORIZONTAL_GAP,
            vertical_jitter: DEFAULT_VERTICAL_JITTER,
            default_width: DEFAULT_NODE_SIZE.width,
            default_height: DEFAULT_NODE_SIZE.height,
        }
    }
}

impl PlacementConfig {
    pub fn to_placement(&self) -> ChildPlacement {
        ChildPlacement {
            horizontal_gap: self.horizontal_gap,
            vertical_jitter: self.vertical_jitter,
            default_size: Size::new(self.default_width, self.default_height),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: DEFAULT_HISTORY_LIMIT }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    #[serde(with = "millis")]
    pub idle_commit: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self { idle_commit: LIVE_IDLE_COMMIT }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    #[serde(with = "millis")]
    pub timeout: Duration,
    pub topic_max_items: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { timeout: GENERATION_TIMEOUT, topic_max_items: TOPIC_MAX_ITEMS }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    #[serde(with = "millis")]
    pub debounce: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { debounce: SAVE_DEBOUNCE }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    #[serde(with = "millis")]
    pub reconnect_initial: Duration,
    #[serde(with = "millis")]
    pub reconnect_max: Duration,
    pub backlog: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: RECONNECT_INITIAL,
            reconnect_max: RECONNECT_MAX,
            backlog: MAX_BACKLOG_EVENTS,
        }
    }
}

/// Complete client configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteboardConfig {
    pub placement: PlacementConfig,
    pub history: HistoryConfig,
    pub live: LiveConfig,
    pub generation: GenerationConfig,
    pub persistence: PersistenceConfig,
    pub push: PushConfig,
}

impl WhiteboardConfig {
    /// `~/.config/whiteboard/whiteboard.ron` (platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("whiteboard").join("whiteboard.ron"))
    }

    /// Parse RON text.
    pub fn from_ron(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. Missing or unreadable files are errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron(&text, path)?;
        info!(path = %path.display(), "loaded whiteboard config");
        Ok(config)
    }

    /// Load from a file, falling back to defaults when it doesn't exist.
    ///
    /// A file that exists but doesn't parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Reject values that would wedge the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.limit == 0 {
            return Err(ConfigError::Invalid("history.limit must be at least 1".into()));
        }
        if self.placement.vertical_jitter < 0.0 || !self.placement.vertical_jitter.is_finite() {
            return Err(ConfigError::Invalid("placement.vertical_jitter must be a finite value >= 0".into()));
        }
        if !self.placement.horizontal_gap.is_finite() {
            return Err(ConfigError::Invalid("placement.horizontal_gap must be finite".into()));
        }
        if self.push.reconnect_initial.is_zero() || self.push.reconnect_max < self.push.reconnect_initial {
            return Err(ConfigError::Invalid(
                "push.reconnect_initial must be > 0 and <= push.reconnect_max".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_constants() {
        let config = WhiteboardConfig::default();
        assert_eq!(config.history.limit, 100);
        assert_eq!(config.persistence.debounce, Duration::from_millis(1000));
        assert_eq!(config.generation.topic_max_items, 5);
        assert_eq!(config.placement.to_placement(), ChildPlacement::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let text = "(history: (limit: 7), generation: (timeout: 2500))";
        let config = WhiteboardConfig::from_ron(text, Path::new("inline")).unwrap();
        assert_eq!(config.history.limit, 7);
        assert_eq!(config.generation.timeout, Duration::from_millis(2500));
        assert_eq!(config.generation.topic_max_items, TOPIC_MAX_ITEMS);
        assert_eq!(config.push, PushConfig::default());
    }

    #[test]
    fn test_ron_round_trip() {
        let mut config = WhiteboardConfig::default();
        config.live.idle_commit = Duration::from_millis(250);
        let text = config.to_ron().unwrap();
        let back = WhiteboardConfig::from_ron(&text, Path::new("inline")).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(persistence: (debounce: 50))").unwrap();
        let config = WhiteboardConfig::load(file.path()).unwrap();
        assert_eq!(config.persistence.debounce, Duration::from_millis(50));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.ron");
        assert!(matches!(WhiteboardConfig::load(&path), Err(ConfigError::Io { .. })));
        assert_eq!(WhiteboardConfig::load_or_default(&path).unwrap(), WhiteboardConfig::default());
    }

    #[test]
    fn test_parse_error_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(history: (limit: \"lots\"))").unwrap();
        let err = WhiteboardConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = WhiteboardConfig::from_ron("(history: (limit: 0))", Path::new("inline")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
