//! Resource location resolution
//!
//! This module handles resolution of resource locations (URLs, file paths, etc.)
//! for loading schemas and XML documents, including resolution of
//! `schemaLocation` references relative to the referencing document.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::error::Result;

/// Resource location - can be a URL, file path, or string identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, ...)
    Url(Url),
    /// String identifier (for in-memory resources)
    String(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    pub fn parse(s: &str) -> Result<Self> {
        // Try to parse as URL first
        if let Ok(url) = Url::parse(s) {
            if url.scheme() == "file" {
                if let Ok(path) = url.to_file_path() {
                    return Ok(Location::Path(normalize_path(&path)));
                }
            } else if url.scheme().len() > 1 {
                // single-letter schemes are Windows drive letters
                return Ok(Location::Url(url));
            }
        }

        // Try as file path
        let path = PathBuf::from(s);
        if path.exists() || path.is_absolute() || s.starts_with('.') {
            return Ok(Location::Path(normalize_path(&path)));
        }

        // Otherwise treat as string identifier
        Ok(Location::String(s.to_string()))
    }

    /// Resolve a reference found inside the resource at this location
    pub fn resolve(&self, reference: &str) -> Result<Location> {
        if let Ok(url) = Url::parse(reference) {
            if url.scheme().len() > 1 {
                return Location::parse(reference);
            }
        }

        match self {
            Location::Url(base) => Ok(Location::Url(base.join(reference)?)),
            Location::Path(base) => {
                let reference_path = Path::new(reference);
                if reference_path.is_absolute() {
                    return Ok(Location::Path(normalize_path(reference_path)));
                }
                let dir = base.parent().unwrap_or_else(|| Path::new(""));
                Ok(Location::Path(normalize_path(&dir.join(reference_path))))
            }
            Location::String(_) if Path::new(reference).is_absolute() => {
                Ok(Location::Path(normalize_path(Path::new(reference))))
            }
            Location::String(base) => {
                let dir = match base.rfind('/') {
                    Some(idx) => &base[..=idx],
                    None => "",
                };
                let joined = normalize_path(&Path::new(dir).join(reference));
                Ok(Location::String(joined.to_string_lossy().replace('\\', "/")))
            }
        }
    }

    /// Normalized key used to memoize loaded resources
    pub fn key(&self) -> String {
        match self {
            Location::Path(p) => format!("file:{}", normalize_path(p).display()),
            Location::Url(u) => {
                let mut u = u.clone();
                u.set_fragment(None);
                u.to_string()
            }
            Location::String(s) => format!("mem:{}", s),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Path(p) => write!(f, "{}", p.display()),
            Location::Url(u) => write!(f, "{}", u),
            Location::String(s) => write!(f, "{}", s),
        }
    }
}

/// Lexically normalize a path, folding `.` and `..` components
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
