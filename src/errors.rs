//! GB-prefixed error types with structured error codes.
//!
//! These cover loading and saving the collaborators of a run (config, report,
//! location table, account snapshot, audit log). Policy outcomes such as an
//! unqualified location are plain values and never travel through here.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the crate.
pub type Result<T> = std::result::Result<T, GeoBidError>;

/// Top-level error type for geobid.
#[derive(Debug, Error)]
pub enum GeoBidError {
    #[error("[GB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[GB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[GB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[GB-2001] CSV failure in {context}: {details}")]
    Csv {
        context: &'static str,
        details: String,
    },

    #[error("[GB-2002] malformed record {line} in {context}: {details}")]
    MalformedRecord {
        context: &'static str,
        line: u64,
        details: String,
    },

    #[error("[GB-2003] account snapshot serialization failure: {details}")]
    Serialization { details: String },

    #[error("[GB-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[GB-3900] chart rendering failure: {details}")]
    Chart { details: String },
}

impl GeoBidError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "GB-1001",
            Self::MissingConfig { .. } => "GB-1002",
            Self::ConfigParse { .. } => "GB-1003",
            Self::Csv { .. } => "GB-2001",
            Self::MalformedRecord { .. } => "GB-2002",
            Self::Serialization { .. } => "GB-2003",
            Self::Io { .. } => "GB-3001",
            Self::Chart { .. } => "GB-3900",
        }
    }

    /// Process exit status: 2 for configuration problems (GB-1xxx), 1 for everything else.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.code().starts_with("GB-1") {
            2
        } else {
            1
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for invalid configuration.
    #[must_use]
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }
}

impl From<csv::Error> for GeoBidError {
    fn from(value: csv::Error) -> Self {
        Self::Csv {
            context: "csv",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for GeoBidError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for GeoBidError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_display_prefix() {
        let errors = vec![
            GeoBidError::invalid_config("min_bid above max_bid"),
            GeoBidError::MissingConfig { path: PathBuf::from("geobid.toml") },
            GeoBidError::ConfigParse { context: "toml", details: "x".to_string() },
            GeoBidError::Csv { context: "report", details: "x".to_string() },
            GeoBidError::MalformedRecord { context: "report", line: 3, details: "x".to_string() },
            GeoBidError::Serialization { details: "x".to_string() },
            GeoBidError::io("audit.csv", std::io::Error::new(std::io::ErrorKind::Other, "boom")),
            GeoBidError::Chart { details: "x".to_string() },
        ];
        for error in errors {
            let rendered = error.to_string();
            assert!(rendered.starts_with(&format!("[{}]", error.code())), "{}", rendered);
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(GeoBidError::invalid_config("x").exit_code(), 2);
        assert_eq!(GeoBidError::MissingConfig { path: PathBuf::from("geobid.toml") }.exit_code(), 2);
        assert_eq!(GeoBidError::ConfigParse { context: "toml", details: "x".to_string() }.exit_code(), 2);
        assert_eq!(GeoBidError::Csv { context: "report", details: "x".to_string() }.exit_code(), 1);
        assert_eq!(GeoBidError::Serialization { details: "x".to_string() }.exit_code(), 1);
        assert_eq!(GeoBidError::Chart { details: "x".to_string() }.exit_code(), 1);
    }

    #[test]
    fn test_toml_error_maps_to_config_parse() {
        let parse_error = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let error: GeoBidError = parse_error.into();
        assert_eq!(error.code(), "GB-1003");
    }
}
