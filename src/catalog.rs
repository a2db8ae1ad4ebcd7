//! XML Catalog support for schema location rewriting
//!
//! GML application schemas reference dozens of remote XSD files
//! (`http://schemas.opengis.net/...`). An OASIS XML catalog lets those
//! references be served from a local, offline copy instead.
//!
//! # Supported Elements
//!
//! - `<catalog>` / `<group>` - containers
//! - `<system>` / `<uri>` - exact identifier to URI mappings
//! - `<rewriteSystem>` / `<rewriteURI>` - prefix rewriting
//! - `<nextCatalog>` - includes another catalog file
//!
//! Relative URIs are resolved against the catalog file's own location.

use std::collections::HashMap;
use std::path::Path;

use crate::documents::{Document, Element};
use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::locations::Location;

/// XML Catalog for resolving schema locations
#[derive(Debug, Clone, Default)]
pub struct XmlCatalog {
    /// Exact identifier mappings (systemId / uri name -> location)
    exact: HashMap<String, Location>,
    /// Prefix rewrites, longest prefix wins
    rewrites: Vec<(String, Location)>,
}

impl XmlCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a file, following `<nextCatalog>` references
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.load_file(path.as_ref(), 0)?;
        Ok(catalog)
    }

    /// Parse catalog XML whose relative URIs resolve against `base`
    pub fn from_string(xml: &str, base: &Location) -> Result<Self> {
        let mut catalog = Self::new();
        let doc = Document::from_string(xml)?;
        catalog.parse_catalog(doc.root(), base, 0)?;
        Ok(catalog)
    }

    fn load_file(&mut self, path: &Path, depth: usize) -> Result<()> {
        const MAX_NESTING: usize = 16;
        if depth > MAX_NESTING {
            return Err(Error::LimitExceeded(format!(
                "Catalog nesting deeper than {} at '{}'",
                MAX_NESTING,
                path.display()
            )));
        }
        let doc = Document::from_file(path, &Limits::default()).map_err(|e| {
            Error::Resource(format!("Failed to read catalog '{}': {}", path.display(), e))
        })?;
        self.parse_catalog(doc.root(), &Location::Path(path.to_path_buf()), depth)
    }

    fn parse_catalog(&mut self, root: &Element, base: &Location, depth: usize) -> Result<()> {
        if root.local_name() != "catalog" {
            return Err(Error::Parse(ParseError::new(format!(
                "Expected catalog root element, got {}",
                root.local_name()
            ))));
        }
        self.process_children(&root.children, base, depth)
    }

    fn process_children(&mut self, children: &[Element], base: &Location, depth: usize) -> Result<()> {
        for child in children {
            match child.local_name() {
                "system" => {
                    if let (Some(id), Some(uri)) = (child.get_attribute("systemId"), child.get_attribute("uri")) {
                        self.exact.insert(id.to_string(), base.resolve(uri)?);
                    }
                }
                "uri" => {
                    if let (Some(name), Some(uri)) = (child.get_attribute("name"), child.get_attribute("uri")) {
                        self.exact.insert(name.to_string(), base.resolve(uri)?);
                    }
                }
                "rewriteSystem" | "rewriteURI" => {
                    let start = child
                        .get_attribute("systemIdStartString")
                        .or_else(|| child.get_attribute("uriStartString"));
                    if let (Some(start), Some(prefix)) = (start, child.get_attribute("rewritePrefix")) {
                        let mut prefix = prefix.to_string();
                        if !prefix.ends_with('/') {
                            prefix.push('/');
                        }
                        self.rewrites.push((start.to_string(), base.resolve(&prefix)?));
                    }
                }
                "nextCatalog" => {
                    if let Some(next) = child.get_attribute("catalog") {
                        match base.resolve(next)? {
                            Location::Path(path) if path.exists() => self.load_file(&path, depth + 1)?,
                            other => {
                                tracing::warn!(catalog = %other, "skipping unreadable nextCatalog");
                            }
                        }
                    }
                }
                "group" => self.process_children(&child.children, base, depth)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Rewrite a schema location, if the catalog knows it
    pub fn resolve(&self, location: &str) -> Option<Location> {
        if let Some(exact) = self.exact.get(location) {
            return Some(exact.clone());
        }

        let (start, prefix) = self
            .rewrites
            .iter()
            .filter(|(start, _)| location.starts_with(start.as_str()))
            .max_by_key(|(start, _)| start.len())?;
        let rest = location[start.len()..].trim_start_matches('/');
        match prefix {
            Location::Path(dir) => Some(Location::Path(dir.join(rest))),
            Location::Url(url) => url.join(rest).ok().map(Location::Url),
            Location::String(dir) => Some(Location::String(format!("{}/{}", dir.trim_end_matches('/'), rest))),
        }
    }

    /// Check if this catalog is empty (has no mappings)
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.rewrites.is_empty()
    }

    /// Get the number of mappings
    pub fn len(&self) -> usize {
        self.exact.len() + self.rewrites.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_exact_and_rewrite_mappings() {
        let xml = r#"<catalog xmlns="urn:oasis:names:tc:entity:xmlns:xml:catalog">
    <system systemId="urn:example:app.xsd" uri="schemas/app.xsd"/>
    <rewriteURI uriStartString="http://schemas.opengis.net/" rewritePrefix="mirror/ogc"/>
    <rewriteURI uriStartString="http://schemas.opengis.net/gml/" rewritePrefix="gml-local/"/>
</catalog>"#;
        let base = Location::Path(PathBuf::from("/offline/catalog.xml"));
        let catalog = XmlCatalog::from_string(xml, &base).unwrap();
        assert_eq!(catalog.len(), 3);

        assert_eq!(
            catalog.resolve("urn:example:app.xsd"),
            Some(Location::Path(PathBuf::from("/offline/schemas/app.xsd")))
        );
        assert_eq!(
            catalog.resolve("http://schemas.opengis.net/iso/19139/gmd.xsd"),
            Some(Location::Path(PathBuf::from("/offline/mirror/ogc/iso/19139/gmd.xsd")))
        );
        // longest prefix wins
        assert_eq!(
            catalog.resolve("http://schemas.opengis.net/gml/3.2.1/gml.xsd"),
            Some(Location::Path(PathBuf::from("/offline/gml-local/3.2.1/gml.xsd")))
        );
        assert!(catalog.resolve("http://example.com/other.xsd").is_none());
    }

    #[test]
    fn test_nested_catalogs() {
        let temp_dir = TempDir::new().unwrap();
        let sub_dir = temp_dir.path().join("sub");
        std::fs::create_dir_all(&sub_dir).unwrap();

        std::fs::write(
            temp_dir.path().join("catalog.xml"),
            r#"<catalog><system systemId="urn:main" uri="main.xsd"/><nextCatalog catalog="sub/catalog.xml"/></catalog>"#,
        )
        .unwrap();
        std::fs::write(
            sub_dir.join("catalog.xml"),
            r#"<catalog><group><uri name="urn:sub" uri="sub.xsd"/></group></catalog>"#,
        )
        .unwrap();

        let catalog = XmlCatalog::from_file(temp_dir.path().join("catalog.xml")).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.resolve("urn:sub"),
            Some(Location::Path(sub_dir.join("sub.xsd")))
        );
    }

    #[test]
    fn test_non_catalog_root_fails() {
        let base = Location::String("c.xml".to_string());
        assert!(XmlCatalog::from_string("<schema/>", &base).is_err());
    }
}
