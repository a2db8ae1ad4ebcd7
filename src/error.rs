//! Error types for gmlas
//!
//! This module defines all error types used throughout the library.
//! Binding and cardinality failures carry the offending tag, table and
//! xpath so schema-authoring mistakes can be traced back to the document.

use std::fmt;
use thiserror::Error;

/// Result type alias using gmlas Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gmlas operations
#[derive(Error, Debug)]
pub enum Error {
    /// A schema location or a document node could not be bound to a declaration
    #[error("schema resolution error: {0}")]
    SchemaResolution(BindingError),

    /// A required field is missing or a link yields too many matches
    #[error("cardinality violation: {0}")]
    Cardinality(BindingError),

    /// XML Schema parsing error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The model cache file is not usable
    #[error("invalid model file: {0}")]
    ModelCache(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// A fetch was cancelled before it completed
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a schema resolution error
    pub fn resolution(error: BindingError) -> Self {
        Error::SchemaResolution(error)
    }

    /// Shorthand for a cardinality violation
    pub fn cardinality(error: BindingError) -> Self {
        Error::Cardinality(error)
    }
}

/// Binding failure with the document context it occurred in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingError {
    /// Error message
    pub message: String,
    /// Tag of the offending node
    pub tag: Option<String>,
    /// Table being built or populated
    pub table: Option<String>,
    /// Xpath key that failed
    pub xpath: Option<String>,
    /// Schema or document location
    pub location: Option<String>,
}

impl BindingError {
    /// Create a new binding error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tag: None,
            table: None,
            xpath: None,
            location: None,
        }
    }

    /// Set the offending node tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the xpath key
    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref tag) = self.tag {
            write!(f, "\n\nTag: {}", tag)?;
        }

        if let Some(ref table) = self.table {
            write!(f, "\n\nTable: {}", table)?;
        }

        if let Some(ref xpath) = self.xpath {
            write!(f, "\n\nXpath: {}", xpath)?;
        }

        if let Some(ref location) = self.location {
            write!(f, "\n\nLocation: {}", location)?;
        }

        Ok(())
    }
}

impl std::error::Error for BindingError {}

/// XML Schema parsing error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location in the schema file
    pub location: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref loc) = self.location {
            write!(f, "\n\nLocation: {}", loc)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}
