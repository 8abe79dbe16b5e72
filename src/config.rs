use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Upper bound on buffered status events per subscriber.
pub const MAX_EVENT_CAPACITY: usize = 1 << 20;

/// Tunables for buffering and matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Normalized output lines kept per terminal
    pub prompt_buffer_lines: usize,
    /// Trailing lines concatenated when matching a split prompt
    pub prompt_window_lines: usize,
    /// Completed commands kept per terminal
    pub history_limit: usize,
    /// Longest line, in chars, that may count as an exit phrase
    pub termination_line_cutoff: usize,
    /// Partial input beyond this many bytes is dropped
    pub max_input_line: usize,
    /// Status events buffered per subscriber before it starts lagging
    pub event_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            prompt_buffer_lines: 10,
            prompt_window_lines: 3,
            history_limit: 100,
            termination_line_cutoff: 100,
            max_input_line: 4096,
            event_capacity: 256,
        }
    }
}

impl DetectorConfig {
    /// `<config_dir>/agent-presence/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("agent-presence").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate().map_err(|reason| Error::InvalidConfig {
            path: Some(path.to_path_buf()),
            reason,
        })?;
        debug!(path = %path.display(), ?config, "loaded detector config");
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when no
    /// file exists there.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        let capacities = [
            ("prompt_buffer_lines", self.prompt_buffer_lines),
            ("prompt_window_lines", self.prompt_window_lines),
            ("history_limit", self.history_limit),
            ("termination_line_cutoff", self.termination_line_cutoff),
            ("max_input_line", self.max_input_line),
            ("event_capacity", self.event_capacity),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(format!("{name} must be greater than zero"));
        }
        if self.event_capacity > MAX_EVENT_CAPACITY {
            return Err(format!(
                "event_capacity ({}) exceeds {MAX_EVENT_CAPACITY}",
                self.event_capacity
            ));
        }
        if self.prompt_window_lines > self.prompt_buffer_lines {
            return Err(format!(
                "prompt_window_lines ({}) exceeds prompt_buffer_lines ({})",
                self.prompt_window_lines, self.prompt_buffer_lines
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
    fn test_defaults_are_valid() {
        let config = DetectorConfig::default();
        assert_eq!(config.prompt_buffer_lines, 10);
        assert_eq!(config.history_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"history_limit": 20}}"#).unwrap();
        let config = DetectorConfig::load(file.path()).unwrap();
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.prompt_buffer_lines, 10);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"prompt_buffer_lines": 2, "prompt_window_lines": 3}}"#).unwrap();
        let err = DetectorConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"event_capacity": 0}}"#).unwrap();
        assert!(DetectorConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_reports_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            DetectorConfig::load(file.path()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DetectorConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
