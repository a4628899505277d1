use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// What is wrong with a key that failed schema validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaProblem {
    MissingSection,
    MissingKey,
    NotATable,
    NotAnArray,
    NotAString,
}

impl fmt::Display for SchemaProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingSection => "section is missing",
            Self::MissingKey => "key is missing",
            Self::NotATable => "is not a table",
            Self::NotAnArray => "is not an array",
            Self::NotAString => "value is not a string",
        };
        f.write_str(text)
    }
}

/// Errors raised while reading or writing configuration documents
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{what} not configured, run '{hint}'")]
    NotConfigured {
        what: &'static str,
        hint: &'static str,
    },

    #[error("Configuration file not found: {0}")]
    MissingDocument(Utf8PathBuf),

    #[error("Error parsing {location}: {message}")]
    Parse { location: String, message: String },

    #[error("Invalid configuration: [{section}] '{key}' {problem}")]
    Schema {
        section: String,
        key: String,
        problem: SchemaProblem,
    },

    #[error("Invalid configuration: unsupported build type '{0}'")]
    UnsupportedBuildType(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to read global configuration: {0}")]
    Layered(#[from] config::ConfigError),
}

impl ConfigError {
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn schema(section: &str, key: &str, problem: SchemaProblem) -> Self {
        Self::Schema {
            section: section.to_string(),
            key: key.to_string(),
            problem,
        }
    }

    /// The offending `(section, key)` for schema errors
    pub fn schema_location(&self) -> Option<(&str, &str)> {
        match self {
            Self::Schema { section, key, .. } => Some((section, key)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_message_names_key() {
        let error = ConfigError::schema("source", "src files", SchemaProblem::NotAnArray);
        assert_eq!(
            error.to_string(),
            "Invalid configuration: [source] 'src files' is not an array"
        );
        assert_eq!(error.schema_location(), Some(("source", "src files")));
    }

    #[test]
    fn test_not_configured_message() {
        let error = ConfigError::NotConfigured {
            what: "Toolchain",
            hint: "cppx profile",
        };
        assert_eq!(error.to_string(), "Toolchain not configured, run 'cppx profile'");
    }
}
