//! Error Types
//!
//! Every failure the processor surfaces at a call site:
//! - Configuration errors (unknown switch, unsupported value)
//! - Structural / API misuse (reentrant parse, no input)
//! - Fatal diagnostics that halted the pipeline
//! - I/O and encoding failures while reading a source
//!
//! Recoverable validation errors never appear here directly; they go through
//! the error-handler collaborator (see [`crate::report`]) and only become an
//! [`XmlError::Aborted`] if the handler asks to stop.

use thiserror::Error;

use crate::report::Diagnostic;

/// Errors raised by feature/property operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The switch name is not known to the configuration or any component.
    #[error("feature or property not recognized: {name}")]
    NotRecognized {
        /// The unrecognized name.
        name: String,
    },

    /// The switch is known but the requested value is outside its domain.
    #[error("feature or property not supported: {name} ({reason})")]
    NotSupported {
        /// The recognized name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The switch cannot change while a parse is running.
    #[error("cannot change {name} while a parse is in progress")]
    ParseInProgress {
        /// The locked name.
        name: String,
    },
}

impl ConfigError {
    pub(crate) fn not_recognized(name: &str) -> Self {
        ConfigError::NotRecognized {
            name: name.to_string(),
        }
    }

    pub(crate) fn not_supported(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::NotSupported {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum XmlError {
    /// A configuration call failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `parse` was invoked on a configuration that is already parsing.
    #[error("a parse is already in progress on this configuration")]
    AlreadyParsing,

    /// The API was used in a way the current state does not allow.
    #[error("{0}")]
    Structural(String),

    /// A fatal error halted the pipeline.
    #[error("fatal error: {0}")]
    Fatal(Diagnostic),

    /// The error handler asked to stop after a recoverable error.
    #[error("parse aborted by error handler: {0}")]
    Aborted(Diagnostic),

    /// Reading a source failed.
    #[error("I/O error reading {system_id}: {source}")]
    Io {
        /// The identifier of the source being read.
        system_id: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source bytes could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl XmlError {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        XmlError::Structural(message.into())
    }

    pub(crate) fn io(system_id: impl Into<String>, source: std::io::Error) -> Self {
        XmlError::Io {
            system_id: system_id.into(),
            source,
        }
    }

    /// The diagnostic carried by fatal or aborted errors.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            XmlError::Fatal(d) | XmlError::Aborted(d) => Some(d),
            _ => None,
        }
    }

    /// Check whether this is a configuration error of the "not recognized" kind.
    pub fn is_not_recognized(&self) -> bool {
        matches!(self, XmlError::Config(ConfigError::NotRecognized { .. }))
    }

    /// Check whether this is a configuration error of the "not supported" kind.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, XmlError::Config(ConfigError::NotSupported { .. }))
    }
}
