use serde::{Deserialize, Serialize};

use crate::error::Result;

const DEFAULT_MAX_UNDO: usize = 200;
const DEFAULT_MAX_NORMALIZE_ITERATIONS: usize = 100;
const DEFAULT_MAX_INDENT_LEVEL: usize = 8;
const DEFAULT_MAX_TOMBSTONES: usize = 4096;
const DEFAULT_BOUNDARY_CHARS: &str = ".,;:!?()[]{}\"'-/";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
    pub max_indent_level: usize,
    /// How many removed ids keep a recovery trail for stale coordinates.
    pub max_tombstones: usize,
    pub coalesce: CoalescePolicy,
    pub list: ListConfig,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = DEFAULT_MAX_UNDO;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = DEFAULT_MAX_NORMALIZE_ITERATIONS;
        }
        if self.max_indent_level == 0 {
            self.max_indent_level = DEFAULT_MAX_INDENT_LEVEL;
        }
        if self.max_tombstones == 0 {
            self.max_tombstones = DEFAULT_MAX_TOMBSTONES;
        }
        self.coalesce = self.coalesce.with_defaults();
        self.list = self.list.with_defaults();
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        Ok(config.with_defaults())
    }
}

/// Which characters end a run of typing that undo treats as one step.
/// ASCII whitespace always counts as a boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalescePolicy {
    pub boundary_chars: String,
}

impl CoalescePolicy {
    fn with_defaults(mut self) -> Self {
        if self.boundary_chars.is_empty() {
            self.boundary_chars = DEFAULT_BOUNDARY_CHARS.to_string();
        }
        self
    }

    pub fn is_boundary(&self, c: char) -> bool {
        c.is_whitespace() || self.boundary_chars.contains(c)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    pub checklist_class: String,
    pub checked_class: String,
    pub indent_class: String,
}

impl ListConfig {
    fn with_defaults(mut self) -> Self {
        if self.checklist_class.is_empty() {
            self.checklist_class = "o_checklist".to_string();
        }
        if self.checked_class.is_empty() {
            self.checked_class = "o_checked".to_string();
        }
        if self.indent_class.is_empty() {
            self.indent_class = "o_indent".to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let config = EditorConfig::default().with_defaults();
        assert_eq!(config.max_undo, 200);
        assert_eq!(config.max_normalize_iterations, 100);
        assert_eq!(config.max_indent_level, 8);
        assert_eq!(config.max_tombstones, 4096);
        assert_eq!(config.list.indent_class, "o_indent");
        assert!(config.coalesce.is_boundary(' '));
        assert!(config.coalesce.is_boundary('.'));
        assert!(!config.coalesce.is_boundary('a'));
    }

    #[test]
    fn json_overrides_keep_other_defaults() {
        let json = r##"{ "max_undo": 3, "coalesce": { "boundary_chars": "#" } }"##;
        let config = EditorConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_undo, 3);
        assert_eq!(config.max_normalize_iterations, 100);
        assert!(config.coalesce.is_boundary('#'));
        assert!(!config.coalesce.is_boundary('.'));
        assert!(config.coalesce.is_boundary('\t'));
    }
}
