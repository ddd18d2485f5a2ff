// Parser safety limits module
//
// Provides configurable resource limits to prevent:
// - Stack overflow from deeply nested blocks and expressions
// - Memory exhaustion from very large source files
//
// All limits have permissive defaults and can be overridden via a TOML file

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file looked up by the command line tool
pub const DEFAULT_CONFIG_FILE: &str = "vbnet-parser.toml";

/// Parser safety limits with permissive defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserLimits {
    pub max_input_size: usize,    // Maximum source size in bytes
    pub max_token_count: usize,   // Maximum number of tokens per file
    pub max_nesting_depth: usize, // Maximum recursion depth (blocks + expressions)
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_input_size: 10_000_000, // 10 MB
            max_token_count: 1_000_000,
            max_nesting_depth: 256,
        }
    }
}

impl ParserLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load limits from a TOML file, falling back to defaults
    ///
    /// Returns error only if the file is unreadable or malformed, not if it is missing
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, LimitError> {
        let path = path.as_ref();

        if !path.exists() {
            log::debug!("no limits file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| LimitError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let limits = Self::from_toml_str(&content).map_err(|err| match err {
            LimitError::Malformed { message, .. } => LimitError::Malformed {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        log::debug!("loaded limits from {}: {:?}", path.display(), limits);
        Ok(limits)
    }

    /// Parse limits from TOML text; only the keys present override defaults
    pub fn from_toml_str(content: &str) -> Result<Self, LimitError> {
        let config: ConfigFile = toml::from_str(content).map_err(|e| LimitError::Malformed {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;

        let mut limits = Self::default();

        if let Some(section) = config.limits {
            if let Some(v) = section.max_input_size {
                limits.max_input_size = v;
            }
            if let Some(v) = section.max_token_count {
                limits.max_token_count = v;
            }
            if let Some(v) = section.max_nesting_depth {
                limits.max_nesting_depth = v;
            }
        }

        limits.validate()?;
        Ok(limits)
    }

    /// Validate that all limits are positive and not absurdly large
    pub fn validate(&self) -> Result<(), LimitError> {
        const MAX_REASONABLE: usize = 100_000_000; // 100 MB

        if self.max_input_size == 0 || self.max_input_size > MAX_REASONABLE {
            return Err(LimitError::invalid("max_input_size", self.max_input_size));
        }

        if self.max_token_count == 0 || self.max_token_count > MAX_REASONABLE {
            return Err(LimitError::invalid("max_token_count", self.max_token_count));
        }

        if self.max_nesting_depth == 0 || self.max_nesting_depth > 10_000 {
            return Err(LimitError::invalid(
                "max_nesting_depth",
                self.max_nesting_depth,
            ));
        }

        Ok(())
    }

    pub fn check_input(&self, source: &str) -> Result<(), LimitError> {
        if source.len() > self.max_input_size {
            return Err(LimitError::InputTooLarge {
                size: source.len(),
                max: self.max_input_size,
            });
        }
        Ok(())
    }

    pub fn check_token_count(&self, count: usize) -> Result<(), LimitError> {
        if count > self.max_token_count {
            return Err(LimitError::TooManyTokens {
                count,
                max: self.max_token_count,
            });
        }
        Ok(())
    }
}

/// TOML configuration structures for deserialization
#[derive(Debug, Deserialize)]
struct ConfigFile {
    limits: Option<LimitsSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LimitsSection {
    max_input_size: Option<usize>,
    max_token_count: Option<usize>,
    max_nesting_depth: Option<usize>,
}

/// Error type for limit validation, loading and enforcement
#[derive(Debug, Error)]
pub enum LimitError {
    #[error("Invalid limit '{name}': {value} (must be positive and reasonable)")]
    Invalid { name: &'static str, value: usize },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("Input too large: {size} bytes (max: {max} bytes)")]
    InputTooLarge { size: usize, max: usize },

    #[error("Token limit exceeded: {count} tokens (max: {max})")]
    TooManyTokens { count: usize, max: usize },
}

impl LimitError {
    fn invalid(name: &'static str, value: usize) -> Self {
        LimitError::Invalid { name, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_limits_are_reasonable() {
        let limits = ParserLimits::default();
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let limits = ParserLimits::default();
        assert_eq!(limits.max_input_size, 10_000_000);
        assert_eq!(limits.max_token_count, 1_000_000);
        assert_eq!(limits.max_nesting_depth, 256);
    }

    #[test]
    fn test_validation_catches_zero_values() {
        let mut limits = ParserLimits::default();
        limits.max_input_size = 0;
        assert!(limits.validate().is_err());

        limits = ParserLimits::default();
        limits.max_token_count = 0;
        assert!(limits.validate().is_err());

        limits = ParserLimits::default();
        limits.max_nesting_depth = 0;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_validation_catches_too_large_values() {
        let mut limits = ParserLimits::default();
        limits.max_input_size = 200_000_000;
        assert!(limits.validate().is_err());

        limits = ParserLimits::default();
        limits.max_nesting_depth = 20_000;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let limits = ParserLimits::from_toml_file("nonexistent-limits.toml").unwrap();
        assert_eq!(limits, ParserLimits::default());
    }

    #[test]
    fn test_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_input_size = 2000000\nmax_nesting_depth = 64").unwrap();

        let limits = ParserLimits::from_toml_file(file.path()).unwrap();
        assert_eq!(limits.max_input_size, 2_000_000); // Overridden
        assert_eq!(limits.max_nesting_depth, 64); // Overridden
        assert_eq!(limits.max_token_count, 1_000_000); // Default
    }

    #[test]
    fn test_malformed_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "this is not valid toml {{{{").unwrap();

        let err = ParserLimits::from_toml_file(file.path()).unwrap_err();
        assert!(matches!(err, LimitError::Malformed { .. }));
        assert!(err.to_string().starts_with("Failed to parse"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = ParserLimits::from_toml_str("[limits]\nmax_ast_nodes = 5\n");
        assert!(matches!(result, Err(LimitError::Malformed { .. })));
    }

    #[test]
    fn test_invalid_value_in_file_is_rejected() {
        let result = ParserLimits::from_toml_str("[limits]\nmax_nesting_depth = 0\n");
        assert!(matches!(
            result,
            Err(LimitError::Invalid {
                name: "max_nesting_depth",
                value: 0
            })
        ));
    }

    #[test]
    fn test_input_and_token_checks() {
        let limits = ParserLimits {
            max_input_size: 4,
            max_token_count: 2,
            ..Default::default()
        };
        assert!(limits.check_input("abcd").is_ok());
        assert!(matches!(
            limits.check_input("abcde"),
            Err(LimitError::InputTooLarge { size: 5, max: 4 })
        ));
        assert!(limits.check_token_count(2).is_ok());
        assert!(limits.check_token_count(3).is_err());
    }
}
