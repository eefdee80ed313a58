//! `spillway.toml` discovery and parsing: streaming/throttle tuning and
//! named command sequences.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;

pub const CONFIG_FILE_NAME: &str = "spillway.toml";

/// Streaming and throttle knobs, resolved from config with the
/// built-in defaults filling the gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    /// Lines shown live at the start of a run before switching to
    /// buffer-only mode.
    pub head_line_limit: usize,
    /// Minimum interval between display repaints while streaming.
    pub render_throttle: Duration,
    /// Minimum interval between status-line count updates while
    /// buffering.
    pub status_throttle: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            head_line_limit: 80,
            render_throttle: Duration::from_millis(50),
            status_throttle: Duration::from_millis(250),
        }
    }
}

impl Tuning {
    /// Headless output wants the whole stream live; lifting the head
    /// limit keeps the buffer-only phase from ever engaging.
    pub fn unbounded_head(mut self) -> Self {
        self.head_line_limit = usize::MAX;
        self
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub sequence: IndexMap<String, SequenceConfig>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningConfig {
    #[serde(default)]
    pub head_line_limit: Option<usize>,
    #[serde(default)]
    pub render_throttle_ms: Option<u64>,
    #[serde(default)]
    pub status_throttle_ms: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceConfig {
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl ConfigFile {
    pub fn tuning(&self) -> Tuning {
        let defaults = Tuning::default();
        Tuning {
            head_line_limit: self
                .tuning
                .head_line_limit
                .unwrap_or(defaults.head_line_limit),
            render_throttle: self
                .tuning
                .render_throttle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.render_throttle),
            status_throttle: self
                .tuning
                .status_throttle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.status_throttle),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, error } => {
                write!(f, "failed to read {}: {error}", path.display())
            }
            ConfigError::Parse { path, error } => {
                write!(f, "failed to parse {}: {error}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a config file at a known path.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
        path: path.to_path_buf(),
        error,
    })?;
    toml::from_str(&raw).map_err(|error| ConfigError::Parse {
        path: path.to_path_buf(),
        error,
    })
}

/// Walk up from `start` looking for `spillway.toml`. Returns the path
/// and parsed file of the nearest one, or `None` when no ancestor has
/// one.
pub fn discover_config(start: &Path) -> Result<Option<(PathBuf, ConfigFile)>, ConfigError> {
    let mut current = Some(canonicalize_best_effort(start.to_path_buf()));
    while let Some(dir) = current {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            let config = load_config(&candidate)?;
            return Ok(Some((candidate, config)));
        }
        current = dir.parent().map(Path::to_path_buf);
    }
    Ok(None)
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_defaults_match_builtins() {
        let config = ConfigFile::default();
        assert_eq!(config.tuning(), Tuning::default());
        assert_eq!(Tuning::default().head_line_limit, 80);
    }

    #[test]
    fn tuning_overrides_apply_per_field() {
        let config: ConfigFile = toml::from_str(
            r#"
            [tuning]
            head_line_limit = 20
            status_throttle_ms = 500
            "#,
        )
        .expect("parse");
        let tuning = config.tuning();
        assert_eq!(tuning.head_line_limit, 20);
        assert_eq!(tuning.render_throttle, Duration::from_millis(50));
        assert_eq!(tuning.status_throttle, Duration::from_millis(500));
    }

    #[test]
    fn sequences_parse_in_file_order() {
        let config: ConfigFile = toml::from_str(
            r#"
            [sequence.diff]
            description = "stat summary then full diff"
            steps = [
                { command = "git", args = ["diff", "--stat"], label = "Changed files overview:" },
                { command = "git", args = ["diff"] },
            ]

            [sequence.audit]
            steps = [{ command = "npm", args = ["audit"] }]
            "#,
        )
        .expect("parse");
        let names: Vec<&String> = config.sequence.keys().collect();
        assert_eq!(names, ["diff", "audit"]);
        let diff = &config.sequence["diff"];
        assert_eq!(diff.steps.len(), 2);
        assert_eq!(diff.steps[0].label.as_deref(), Some("Changed files overview:"));
        assert!(diff.steps[1].label.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: Result<ConfigFile, _> = toml::from_str("[tuning]\nhead_limit = 3\n");
        assert!(parsed.is_err());
    }
}
