use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Editor configuration. Every field has a default so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub snap: SnapConfig,
    pub layout: LayoutConfig,
    pub history: HistoryConfig,
    pub codegen: CodegenConfig,

    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snap: SnapConfig::default(),
            layout: LayoutConfig::default(),
            history: HistoryConfig::default(),
            codegen: CodegenConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

/// How the connection engine picks among candidates under the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnapPolicy {
    /// First candidate under the threshold in id order
    #[default]
    FirstFound,
    /// Globally nearest candidate; ties keep the earlier one
    Nearest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Maximum anchor distance (pixels) for a connection
    pub snap_radius: f32,

    /// Drag distance (pixels) after which a block leaves its owner
    pub detach_radius: f32,

    /// Grid used to tidy positions of blocks that did not connect
    pub grid_size: f32,

    pub policy: SnapPolicy,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            snap_radius: 28.0,
            detach_radius: 12.0,
            grid_size: 20.0,
            policy: SnapPolicy::FirstFound,
        }
    }
}

/// Anchor geometry shared with the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Horizontal inset of container slot anchors
    pub slot_indent: f32,

    /// Vertical spacing between slot / parameter rows
    pub row_height: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            slot_indent: 16.0,
            row_height: 24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum entries kept on each of the undo and redo stacks
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    pub indent_width: usize,

    /// Emit the "generated file" banner comment
    pub banner: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            indent_width: 2,
            banner: true,
        }
    }
}

impl EditorConfig {
    /// Load configuration from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: EditorConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        let snap = &self.snap;
        if !(snap.snap_radius > 0.0) {
            anyhow::bail!("snap.snap_radius must be greater than 0");
        }
        if !(snap.detach_radius > 0.0 && snap.detach_radius < snap.snap_radius) {
            anyhow::bail!(
                "snap.detach_radius ({}) must be positive and smaller than snap.snap_radius ({})",
                snap.detach_radius,
                snap.snap_radius
            );
        }
        if !(snap.grid_size > 0.0) {
            anyhow::bail!("snap.grid_size must be greater than 0");
        }
        if self.layout.row_height <= 0.0 {
            anyhow::bail!("layout.row_height must be greater than 0");
        }
        if self.history.capacity == 0 {
            tracing::warn!("history.capacity is 0, undo is disabled");
        }
        Ok(())
    }

    /// Effective log level, falling back to "info"
    pub fn log_level(&self) -> &str {
        if self.log_level.is_empty() {
            "info"
        } else {
            &self.log_level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EditorConfig::default();
        assert_eq!(config.snap.snap_radius, 28.0);
        assert_eq!(config.snap.policy, SnapPolicy::FirstFound);
        assert_eq!(config.history.capacity, 100);
        assert_eq!(config.log_level(), "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EditorConfig::default();
        config.snap.detach_radius = 40.0;
        assert!(config.validate().is_err());

        let mut config = EditorConfig::default();
        config.snap.grid_size = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "snap": {{ "policy": "nearest" }}, "log_level": "debug" }}"#).unwrap();

        let config = EditorConfig::load(file.path()).unwrap();
        assert_eq!(config.snap.policy, SnapPolicy::Nearest);
        assert_eq!(config.snap.snap_radius, 28.0);
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = EditorConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
