//! Backend configuration (strand.toml)
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::ir::MethodRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Elide whitespace and shorten every generated name
    pub minify: bool,

    /// Spaces per indentation level when not minifying
    pub indent: usize,

    /// Record generated-position to source-location entries
    pub debug_locations: bool,

    /// Treat monitor acquisition as a suspension point
    pub monitors_suspend: bool,

    /// Replace string literals with references into one pooled table
    pub pool_strings: bool,

    /// Names of the runtime functions generated code calls
    pub runtime: RuntimeNames,

    /// Methods that block natively; the roots of suspension analysis
    pub intrinsics: Vec<MethodRef>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            minify: false,
            indent: 4,
            debug_locations: false,
            monitors_suspend: true,
            pool_strings: true,
            runtime: RuntimeNames::default(),
            intrinsics: default_intrinsics(),
        }
    }
}

fn default_intrinsics() -> Vec<MethodRef> {
    vec![
        MethodRef::new("java.lang.Thread", "sleep", "(J)V"),
        MethodRef::new("java.lang.Thread", "yield", "()V"),
        MethodRef::new("java.lang.Object", "wait", "(J)V"),
        MethodRef::new("java.util.concurrent.locks.LockSupport", "park", "()V"),
    ]
}

impl BackendConfig {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BackendConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indent > 16 {
            return Err(ConfigError::ValidationError(format!(
                "Indent of {} spaces is out of range (0-16)",
                self.indent
            )));
        }
        for (name, value) in self.runtime.entries() {
            if !is_identifier(value) {
                return Err(ConfigError::ValidationError(format!(
                    "Runtime name `{}` for {} is not an identifier",
                    value, name
                )));
            }
        }
        Ok(())
    }
}

/// Runtime entry points referenced by generated code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeNames {
    pub resuming: String,
    pub suspending: String,
    pub native_thread: String,
    pub invalid_pointer: String,
    /// Suspend-aware monitor acquire, used inside resumable methods
    pub monitor_enter: String,
    pub monitor_exit: String,
    /// Blocking forms, used by ordinary methods
    pub monitor_enter_sync: String,
    pub monitor_exit_sync: String,
    pub throw: String,
    pub wrap_exception: String,
    pub string_pool: String,
    pub string: String,
    pub class: String,
}

impl Default for RuntimeNames {
    fn default() -> Self {
        Self {
            resuming: "$rt_resuming".to_string(),
            suspending: "$rt_suspending".to_string(),
            native_thread: "$rt_nativeThread".to_string(),
            invalid_pointer: "$rt_invalidPointer".to_string(),
            monitor_enter: "$rt_monitorEnter".to_string(),
            monitor_exit: "$rt_monitorExit".to_string(),
            monitor_enter_sync: "$rt_monitorEnterSync".to_string(),
            monitor_exit_sync: "$rt_monitorExitSync".to_string(),
            throw: "$rt_throw".to_string(),
            wrap_exception: "$rt_wrapException".to_string(),
            string_pool: "$rt_stringPool".to_string(),
            string: "$rt_s".to_string(),
            class: "$rt_cls".to_string(),
        }
    }
}

impl RuntimeNames {
    fn entries(&self) -> [(&'static str, &str); 13] {
        [
            ("resuming", &self.resuming),
            ("suspending", &self.suspending),
            ("native_thread", &self.native_thread),
            ("invalid_pointer", &self.invalid_pointer),
            ("monitor_enter", &self.monitor_enter),
            ("monitor_exit", &self.monitor_exit),
            ("monitor_enter_sync", &self.monitor_enter_sync),
            ("monitor_exit_sync", &self.monitor_exit_sync),
            ("throw", &self.throw),
            ("wrap_exception", &self.wrap_exception),
            ("string_pool", &self.string_pool),
            ("string", &self.string),
            ("class", &self.class),
        ]
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '$' || c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '$' || c == '_' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = BackendConfig::from_toml("").unwrap();
        assert_eq!(config, BackendConfig::default());
        assert_eq!(config.intrinsics.len(), 4);
    }

    #[test]
    fn test_partial_override() {
        let config = BackendConfig::from_toml(
            r#"
minify = true
intrinsics = ["rt.Sched.block()V"]

[runtime]
suspending = "$s"
"#,
        )
        .unwrap();
        assert!(config.minify);
        assert_eq!(config.runtime.suspending, "$s");
        assert_eq!(config.runtime.resuming, "$rt_resuming");
        assert_eq!(config.intrinsics[0].name, "block");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = BackendConfig::from_toml("minfy = true").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_bad_runtime_name_rejected() {
        let err = BackendConfig::from_toml("[runtime]\nthrow = \"a b\"").unwrap_err();
        assert!(err.to_string().contains("not an identifier"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.toml");
        std::fs::write(&path, "indent = 2\n").unwrap();
        let config = BackendConfig::from_file(&path).unwrap();
        assert_eq!(config.indent, 2);
    }
}
