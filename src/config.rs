use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::compiler::DEFAULT_MAX_DEPTH;
use crate::error::{MhtmlError, MhtmlResult};
use crate::expr::Scope;

/// Compiler settings, usually loaded from a YAML file.
///
/// ```yaml
/// branding: false
/// defaultStyles: true
/// maxDepth: 64
/// globals:
///   site: Docs
///   pages: [home, about]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    /// Prefix output with the provenance comment.
    pub branding: bool,
    /// Append the default stylesheet to the output.
    pub default_styles: bool,
    pub max_depth: usize,
    /// Ambient scope visible to every directive.
    pub globals: Scope,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            branding: true,
            default_styles: false,
            max_depth: DEFAULT_MAX_DEPTH,
            globals: Scope::new(),
        }
    }
}

impl CompilerConfig {
    pub fn from_yaml(yaml: &str) -> MhtmlResult<Self> {
        let config: CompilerConfig = serde_yaml::from_str(yaml)?;
        if config.max_depth == 0 {
            return Err(MhtmlError::Config("maxDepth must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> MhtmlResult<Self> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_when_empty() {
        let config = CompilerConfig::from_yaml("{}").unwrap();
        assert_eq!(config, CompilerConfig::default());
        assert!(config.branding);
        assert!(!config.default_styles);
        assert_eq!(config.max_depth, 128);
    }

    #[test]
    fn test_camel_case_fields() {
        let yaml = r#"
branding: false
defaultStyles: true
maxDepth: 16
globals:
  user: Ada
  items: [1, 2, 3]
"#;
        let config = CompilerConfig::from_yaml(yaml).unwrap();
        assert!(!config.branding);
        assert!(config.default_styles);
        assert_eq!(config.max_depth, 16);
        assert_eq!(config.globals.get("user"), Some(&json!("Ada")));
        assert_eq!(config.globals.get("items"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(matches!(
            CompilerConfig::from_yaml("maxDepth: 0"),
            Err(MhtmlError::Config(_))
        ));
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        assert!(matches!(
            CompilerConfig::from_yaml("branding: [unclosed"),
            Err(MhtmlError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            CompilerConfig::from_file("/definitely/not/here.yaml"),
            Err(MhtmlError::Io(_))
        ));
    }
}
