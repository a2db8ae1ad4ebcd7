//! XML namespace handling
//!
//! This module provides qualified names (QNames), prefix mappings used to
//! resolve QName-valued schema attributes, and the namespace URIs the
//! compiler treats specially.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, ParseError, Result};

/// XSD 1.0 namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema Instance namespace
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XLink namespace
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// GML 3.1.1 namespace
pub const GML_NAMESPACE: &str = "http://www.opengis.net/gml";

/// GML 3.2 namespace
pub const GML32_NAMESPACE: &str = "http://www.opengis.net/gml/3.2";

/// Returns true for namespaces whose attributes never need a declaration
pub fn is_reserved_attribute_namespace(namespace: Option<&str>) -> bool {
    matches!(
        namespace,
        Some(XSI_NAMESPACE) | Some(XLINK_NAMESPACE) | Some(XML_NAMESPACE)
    )
}

/// Returns true for the GML namespaces (3.1.1 and 3.2)
pub fn is_gml_namespace(namespace: Option<&str>) -> bool {
    matches!(namespace, Some(GML_NAMESPACE) | Some(GML32_NAMESPACE))
}

/// Short label of a namespace URI: its last segment that is not a version
///
/// `http://www.opengis.net/gml/3.2` gives `gml`, `urn:example:sites` gives
/// `sites`.
pub fn namespace_label(uri: &str) -> Option<&str> {
    uri.rsplit(|c| c == '/' || c == ':' || c == '#')
        .find(|segment| segment.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
}

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<String>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local_name: local_name.into(),
        }
    }

    /// Namespace as a string slice
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Check whether this name is in the given namespace with the given local name
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name == local_name
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// Namespace context for resolving prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceContext {
    /// Mapping from prefix to namespace URI
    prefixes: HashMap<String, String>,
    /// Default namespace (no prefix)
    default_namespace: Option<String>,
}

impl NamespaceContext {
    /// Create a new empty namespace context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace prefix mapping
    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    /// Set the default namespace (an empty URI undeclares it)
    pub fn set_default_namespace(&mut self, namespace: impl Into<String>) {
        let namespace = namespace.into();
        self.default_namespace = if namespace.is_empty() { None } else { Some(namespace) };
    }

    /// Get the namespace for a prefix
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        match prefix {
            "xml" => Some(XML_NAMESPACE),
            _ => self.prefixes.get(prefix).map(|s| s.as_str()),
        }
    }

    /// Get the default namespace
    pub fn get_default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Resolve a prefixed name (e.g. the value of a `type` attribute) to a QName
    pub fn resolve(&self, prefixed_name: &str) -> Result<QName> {
        let prefixed_name = prefixed_name.trim();
        if let Some((prefix, local)) = prefixed_name.split_once(':') {
            let namespace = self.get_namespace(prefix).ok_or_else(|| {
                Error::Parse(ParseError::new(format!(
                    "Unknown namespace prefix '{}' in '{}'",
                    prefix, prefixed_name
                )))
            })?;
            Ok(QName::namespaced(namespace, local))
        } else {
            Ok(QName::new(self.default_namespace.clone(), prefixed_name))
        }
    }
}
