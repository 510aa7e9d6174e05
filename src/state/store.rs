//! In-memory, per-entity time-ordered history.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StateError};
use crate::time::{parse_window, window_duration, Clock, SystemClock};

/// One recorded observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Observed value.
    pub value: f64,
    /// When it was recorded. Non-decreasing per entity.
    pub timestamp: DateTime<Utc>,
}

/// Temporal state store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateStoreConfig {
    /// Oldest entries are dropped once an entity holds more than this many.
    pub max_history_per_entity: usize,
    /// Entries older than this window (e.g. `"30d"`) are evicted on push.
    pub retention: Option<String>,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            max_history_per_entity: 10_000,
            retention: None,
        }
    }
}

impl StateStoreConfig {
    /// Checks the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a zero history bound or a
    /// retention window that does not parse to a positive duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_per_entity == 0 {
            return Err(ConfigError::Invalid {
                reason: "state.max_history_per_entity must be > 0".to_string(),
            });
        }
        if let Some(retention) = &self.retention {
            if parse_window(retention) <= 0.0 {
                return Err(ConfigError::Invalid {
                    reason: format!("state.retention '{retention}' is not a valid window"),
                });
            }
        }
        Ok(())
    }
}

fn lock_err(context: &'static str) -> StateError {
    StateError::Poisoned { context }
}

/// Append-only trailing-window store.
///
/// All writes are serialized behind one lock, and readers only ever see
/// fully appended entries.
///
/// # Examples
///
/// ```
/// use rulegate::state::TemporalStateStore;
///
/// let store = TemporalStateStore::default();
/// store.push("funding", 5000.0).unwrap();
/// store.push("funding", 7000.0).unwrap();
/// assert_eq!(store.calculate_average("funding", 3600.0).unwrap(), 6000.0);
/// assert_eq!(store.calculate_frequency("funding", 3600.0).unwrap(), 2);
/// ```
pub struct TemporalStateStore {
    clock: Arc<dyn Clock>,
    max_history: usize,
    retention: Option<Duration>,
    history: RwLock<HashMap<String, VecDeque<StateEntry>>>,
}

impl std::fmt::Debug for TemporalStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporalStateStore")
            .field("max_history", &self.max_history)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl Default for TemporalStateStore {
    fn default() -> Self {
        Self::new(&StateStoreConfig::default())
    }
}

impl TemporalStateStore {
    /// Creates a store on the system clock.
    #[must_use]
    pub fn new(config: &StateStoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a store on an explicit clock.
    #[must_use]
    pub fn with_clock(config: &StateStoreConfig, clock: Arc<dyn Clock>) -> Self {
        let retention = config
            .retention
            .as_deref()
            .map(parse_window)
            .filter(|secs| *secs > 0.0)
            .map(window_duration);
        Self {
            clock,
            max_history: config.max_history_per_entity.max(1),
            retention,
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Parses a window string into seconds. See [`crate::time::parse_window`].
    #[must_use]
    pub fn parse_window(window: &str) -> f64 {
        parse_window(window)
    }

    fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
        now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Appends a timestamped value for `entity`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Poisoned` if a writer panicked while holding the lock.
    pub fn push(&self, entity: &str, value: f64) -> Result<StateEntry, StateError> {
        let now = self.clock.now();
        let mut history = self.history.write().map_err(|_| lock_err("push"))?;
        let entries = history.entry(entity.to_string()).or_default();

        let timestamp = entries.back().map_or(now, |last| last.timestamp.max(now));
        let entry = StateEntry { value, timestamp };
        entries.push_back(entry);

        while entries.len() > self.max_history {
            entries.pop_front();
        }
        if let Some(retention) = self.retention {
            let cutoff = Self::cutoff(now, retention);
            while entries.front().is_some_and(|e| e.timestamp < cutoff) {
                entries.pop_front();
            }
        }
        Ok(entry)
    }

    /// Entries recorded within the last `window_seconds`, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Poisoned` if the lock is poisoned.
    pub fn get_window_data(&self, entity: &str, window_seconds: f64) -> Result<Vec<StateEntry>, StateError> {
        let cutoff = Self::cutoff(self.clock.now(), window_duration(window_seconds));
        let history = self.history.read().map_err(|_| lock_err("get_window_data"))?;
        let Some(entries) = history.get(entity) else {
            return Ok(Vec::new());
        };
        let start = entries.partition_point(|e| e.timestamp < cutoff);
        Ok(entries.range(start..).copied().collect())
    }

    /// Trailing mean over the window, or `None` when the window is empty.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Poisoned` if the lock is poisoned.
    pub fn trailing_average(&self, entity: &str, window_seconds: f64) -> Result<Option<f64>, StateError> {
        let data = self.get_window_data(entity, window_seconds)?;
        if data.is_empty() {
            return Ok(None);
        }
        let sum: f64 = data.iter().map(|e| e.value).sum();
        #[allow(clippy::cast_precision_loss)]
        Ok(Some(sum / data.len() as f64))
    }

    /// Trailing mean over the window; `0.0` when the window is empty.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Poisoned` if the lock is poisoned.
    pub fn calculate_average(&self, entity: &str, window_seconds: f64) -> Result<f64, StateError> {
        Ok(self.trailing_average(entity, window_seconds)?.unwrap_or(0.0))
    }

    /// Number of entries within the window.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Poisoned` if the lock is poisoned.
    pub fn calculate_frequency(&self, entity: &str, window_seconds: f64) -> Result<usize, StateError> {
        Ok(self.get_window_data(entity, window_seconds)?.len())
    }

    /// Removes all history for one entity.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Poisoned` if the lock is poisoned.
    pub fn clear_entity(&self, entity: &str) -> Result<(), StateError> {
        let mut history = self.history.write().map_err(|_| lock_err("clear_entity"))?;
        history.remove(entity);
        Ok(())
    }

    /// Entities with recorded history, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Poisoned` if the lock is poisoned.
    pub fn entities(&self) -> Result<Vec<String>, StateError> {
        let history = self.history.read().map_err(|_| lock_err("entities"))?;
        let mut names: Vec<String> = history.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Retained entry count for one entity.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Poisoned` if the lock is poisoned.
    pub fn len(&self, entity: &str) -> Result<usize, StateError> {
        let history = self.history.read().map_err(|_| lock_err("len"))?;
        Ok(history.get(entity).map_or(0, VecDeque::len))
    }
}
