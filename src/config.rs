//! Build options and configuration files
//!
//! [`BuildOptions`] steer the model builder's merging policy and the
//! geometry defaults. [`Config`] bundles everything a conversion run needs
//! (schema locations, fetcher settings, cache directory, limits) and can be
//! loaded from a JSON file; unknown keys are rejected.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::limits::Limits;

/// Options of the model builder
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    /// Maximum nesting depth of a complex child inlined into its parent table;
    /// 0 gives every complex child its own table
    pub merge_max_depth: usize,
    /// Maximum number of columns an inlined child may add
    pub merge_max_columns: Option<usize>,
    /// SRID of geometries without `srsName`
    pub default_srid: i32,
    /// Coordinate dimension of geometries without `srsDimension`
    pub geometry_dimension_default: u8,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            merge_max_depth: 6,
            merge_max_columns: None,
            default_srid: 4326,
            geometry_dimension_default: 2,
        }
    }
}

impl BuildOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum inlining depth
    pub fn with_merge_max_depth(mut self, depth: usize) -> Self {
        self.merge_max_depth = depth;
        self
    }

    /// Set the maximum number of columns an inlined child may add
    pub fn with_merge_max_columns(mut self, columns: Option<usize>) -> Self {
        self.merge_max_columns = columns;
        self
    }

    /// Set the default SRID
    pub fn with_default_srid(mut self, srid: i32) -> Self {
        self.default_srid = srid;
        self
    }

    /// Set the default coordinate dimension
    pub fn with_geometry_dimension_default(mut self, dimension: u8) -> Self {
        self.geometry_dimension_default = dimension;
        self
    }
}

/// Settings of a conversion run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Schema locations (paths or URLs) loaded as the catalog roots
    pub schemas: Vec<String>,
    /// XML catalog rewriting schema locations to local copies
    pub catalog: Option<PathBuf>,
    /// Whether remote schemas may be downloaded
    pub allow_remote: bool,
    /// HTTP timeout per download attempt, in seconds
    pub timeout_secs: u64,
    /// Additional download attempts after a failure
    pub retries: u32,
    /// Directory of model cache files
    pub cache_dir: Option<PathBuf>,
    /// Builder options
    pub build: BuildOptions,
    /// Resource limits
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schemas: Vec::new(),
            catalog: None,
            allow_remote: true,
            timeout_secs: 30,
            retries: 2,
            cache_dir: None,
            build: BuildOptions::default(),
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a JSON configuration file
    ///
    /// Relative `schemas`, `catalog` and `cache_dir` entries are resolved
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read '{}': {}", path.display(), e)))?;
        let mut config = Self::from_json(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &Path| if p.is_relative() { base.join(p) } else { p.to_path_buf() };
        for schema in &mut self.schemas {
            if !schema.contains("://") && Path::new(schema.as_str()).is_relative() {
                *schema = base.join(schema.as_str()).to_string_lossy().into_owned();
            }
        }
        self.catalog = self.catalog.as_deref().map(join);
        self.cache_dir = self.cache_dir.as_deref().map(join);
    }

    /// HTTP timeout per attempt
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = BuildOptions::default();
        assert_eq!(options.merge_max_depth, 6);
        assert_eq!(options.merge_max_columns, None);
        assert_eq!(options.default_srid, 4326);

        let options = BuildOptions::new().with_merge_max_depth(0).with_default_srid(25832);
        assert_eq!(options.merge_max_depth, 0);
        assert_eq!(options.default_srid, 25832);
    }

    #[test]
    fn test_partial_json() {
        let config = Config::from_json(
            r#"{"schemas": ["http://example.com/app.xsd"], "build": {"merge_max_depth": 2}, "limits": {"max_xml_depth": 50}}"#,
        )
        .unwrap();
        assert_eq!(config.build.merge_max_depth, 2);
        assert_eq!(config.build.default_srid, 4326);
        assert_eq!(config.limits.max_xml_depth, 50);
        assert!(config.allow_remote);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(Config::from_json(r#"{"merge_depth": 3}"#), Err(Error::Config(_))));
        assert!(matches!(
            Config::from_json(r#"{"build": {"depth": 3}}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_file_paths_are_rebased() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gmlas.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"schemas": ["xsd/app.xsd", "https://example.com/gml.xsd"], "cache_dir": "cache"}}"#
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.schemas[0], dir.path().join("xsd/app.xsd").to_string_lossy());
        assert_eq!(config.schemas[1], "https://example.com/gml.xsd");
        assert_eq!(config.cache_dir, Some(dir.path().join("cache")));
    }
}
