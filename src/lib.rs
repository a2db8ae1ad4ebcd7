//! # gmlas
//!
//! A schema-driven compiler from GML/XSD application-schema documents to a
//! relational model.
//!
//! Given the XSD closure of an application schema and feature documents
//! conforming to it, gmlas derives a set of tables (typed columns,
//! foreign-key links, back-links and geometry columns) and the rows that
//! populate them, so that SQL databases and desktop GIS can consume
//! arbitrarily nested XML without a hand-written mapping.
//!
//! ## Pipeline
//!
//! 1. [`schema::SchemaCatalog`] loads the import/include closure through an
//!    injected [`loaders::SchemaFetcher`].
//! 2. [`resolver::resolve`] binds every document node to its declaration.
//! 3. [`model::ModelBuilder`] decides, once per node, whether it roots a
//!    table, is inlined into its parent's table, or is a geometry.
//! 4. [`model::InstancePopulator`] emits rows along those decisions.
//! 5. [`sql::to_sql`] renders the result; [`cache::ModelCache`] can keep it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gmlas::{config::Config, pipeline::Converter, sql};
//!
//! let config = Config::from_file("gmlas.json")?;
//! let mut converter = Converter::from_config(&config)?;
//! converter.convert_file("features.gml")?;
//! println!("{}", sql::to_sql(converter.model()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names, locations and documents
pub mod namespaces;
pub mod locations;
pub mod documents;

// Resource loading
pub mod catalog;
pub mod loaders;

// Schemas and binding
pub mod schema;
pub mod resolver;

// Relational model
pub mod geometry;
pub mod model;

// Outputs and orchestration
pub mod cache;
pub mod config;
pub mod pipeline;
pub mod sql;

// Re-exports for convenience
pub use config::{BuildOptions, Config};
pub use error::{Error, Result};
pub use model::Model;
pub use pipeline::Converter;
pub use schema::SchemaCatalog;

/// Version of the gmlas library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
