//! Conversion pipeline
//!
//! [`Converter`] owns a loaded [`SchemaCatalog`] and the model being
//! accumulated. Each document is resolved and built into a working copy
//! of the table shapes, then populated with the accumulated rows moved in;
//! the copy replaces the model only when every step succeeded, so a
//! failing document leaves earlier results intact.

use std::path::{Path, PathBuf};

use crate::cache::ModelCache;
use crate::catalog::XmlCatalog;
use crate::config::{BuildOptions, Config};
use crate::documents::Document;
use crate::error::{Error, Result};
use crate::geometry::{GeometryCodec, GmlGeometryCodec};
use crate::limits::Limits;
use crate::loaders::{CancelToken, Loader, SchemaFetcher};
use crate::locations::Location;
use crate::model::{InstancePopulator, Model, ModelBuilder};
use crate::resolver::resolve;
use crate::schema::SchemaCatalog;

/// Schema loader configured from `config`
pub fn loader(config: &Config, cancel: CancelToken) -> Result<Loader> {
    let mut loader = Loader::new()
        .with_limits(config.limits.clone())
        .with_allow_remote(config.allow_remote)
        .with_timeout(config.timeout())
        .with_retries(config.retries)
        .with_cancel_token(cancel);
    if let Some(path) = &config.catalog {
        loader = loader.with_catalog(XmlCatalog::from_file(path)?);
    }
    Ok(loader)
}

/// Outcome of a batch of documents
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Documents converted, with the number of rows each added
    pub converted: Vec<(PathBuf, usize)>,
    /// Documents rejected for cardinality violations
    pub failed: Vec<(PathBuf, Error)>,
}

/// Converts documents into one accumulated model
pub struct Converter {
    catalog: SchemaCatalog,
    options: BuildOptions,
    limits: Limits,
    codec: Box<dyn GeometryCodec>,
    cache: Option<ModelCache>,
    model: Model,
}

impl Converter {
    /// Converter over a loaded schema catalog with default options
    pub fn new(catalog: SchemaCatalog) -> Self {
        let options = BuildOptions::default();
        Self {
            codec: Box::new(GmlGeometryCodec::new(options.default_srid)),
            catalog,
            options,
            limits: Limits::default(),
            cache: None,
            model: Model::new(),
        }
    }

    /// Load the configured schemas with the default loader
    pub fn from_config(config: &Config) -> Result<Self> {
        let loader = loader(config, CancelToken::new())?;
        Self::from_config_with_fetcher(config, &loader)
    }

    /// Load the configured schemas through `fetcher`
    pub fn from_config_with_fetcher(config: &Config, fetcher: &dyn SchemaFetcher) -> Result<Self> {
        if config.schemas.is_empty() {
            return Err(Error::Config("no schema locations given".to_string()));
        }
        let roots = config
            .schemas
            .iter()
            .map(|s| Location::parse(s))
            .collect::<Result<Vec<_>>>()?;
        let catalog = SchemaCatalog::load(&roots, fetcher, &config.limits)?;
        tracing::info!(documents = catalog.locations().len(), "schemas loaded");

        let mut converter = Self::new(catalog)
            .with_options(config.build.clone())
            .with_limits(config.limits.clone());
        if let Some(dir) = &config.cache_dir {
            converter = converter.with_cache(ModelCache::new(dir));
        }
        Ok(converter)
    }

    /// Set the builder options; the default codec follows their SRID
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.codec = Box::new(GmlGeometryCodec::new(options.default_srid));
        self.options = options;
        self
    }

    /// Set the document limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the geometry codec
    pub fn with_codec(mut self, codec: impl GeometryCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Use a model cache for file conversions
    pub fn with_cache(mut self, cache: ModelCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Start from an existing model
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// The schema catalog
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// The accumulated model
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Take the accumulated model
    pub fn into_model(self) -> Model {
        self.model
    }

    /// Convert a parsed document; returns the number of rows added
    pub fn convert_document(&mut self, doc: &Document) -> Result<usize> {
        let root = doc.root();
        let types = resolve(root, &self.catalog)?;
        let outcome = ModelBuilder::new(&types, &self.options)
            .with_model(self.model.without_rows())
            .build(root)?;

        // rows move into the working model and back out if population fails
        let mut model = outcome.model;
        model.rows = std::mem::take(&mut self.model.rows);
        let population = match &outcome.root_table {
            Some(root_table) => InstancePopulator::new(&model, &outcome.placements, self.codec.as_ref())
                .populate_document(root, root_table)
                .map(Some),
            None => Ok(None),
        };
        match population {
            Ok(population) => {
                let rows = population.as_ref().map_or(0, |p| p.row_count());
                if let Some(population) = population {
                    population.commit(&mut model);
                }
                self.model = model;
                Ok(rows)
            }
            Err(e) => {
                self.model.rows = std::mem::take(&mut model.rows);
                Err(e)
            }
        }
    }

    /// Convert a document held in a string
    pub fn convert_str(&mut self, xml: &str) -> Result<usize> {
        let doc = Document::parse(xml.as_bytes(), &self.limits)?;
        self.convert_document(&doc)
    }

    /// Convert a document file, going through the model cache when configured
    ///
    /// The cache only stands in for a conversion into an empty model; a
    /// rejected cache file is logged and rebuilt.
    pub fn convert_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let span = tracing::info_span!("document", path = %path.display());
        let _enter = span.enter();

        let key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
        let cache = self.cache.clone().filter(|_| self.model.tables.is_empty());

        if let Some(cache) = &cache {
            match cache.load(&key) {
                Ok(Some(model)) => {
                    let rows = model.row_count();
                    tracing::info!(rows, "model loaded from cache");
                    self.model = model;
                    return Ok(rows);
                }
                Ok(None) => {}
                Err(e @ Error::ModelCache(_)) => tracing::warn!(error = %e, "model cache rejected, rebuilding"),
                Err(e) => return Err(e),
            }
        }

        let doc = Document::from_file(path, &self.limits)?;
        let rows = self.convert_document(&doc)?;

        if let Some(cache) = &cache {
            if let Err(e) = cache.store(&key, &self.model) {
                tracing::warn!(error = %e, "model cache not written");
            }
        }
        Ok(rows)
    }

    /// Convert documents in order
    ///
    /// A document violating cardinality is reported and skipped; any other
    /// error aborts the batch.
    pub fn convert_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for path in paths {
            let path = path.as_ref();
            match self.convert_file(path) {
                Ok(rows) => report.converted.push((path.to_path_buf(), rows)),
                Err(e @ Error::Cardinality(_)) => {
                    tracing::warn!(path = %path.display(), error = %e, "document skipped");
                    report.failed.push((path.to_path_buf(), e));
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            converted = report.converted.len(),
            failed = report.failed.len(),
            tables = self.model.tables.len(),
            rows = self.model.row_count(),
            "batch finished"
        );
        Ok(report)
    }
}
