//! Command-line interface for gmlas

#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use gmlas::config::Config;
#[cfg(feature = "cli")]
use gmlas::model::{Field, Model};
#[cfg(feature = "cli")]
use gmlas::pipeline::Converter;
#[cfg(feature = "cli")]
use gmlas::sql;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "gmlas")]
#[command(author, version, about = "Convert GML application-schema documents to a relational model", long_about = None)]
struct Cli {
    /// Log debug output (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Args, Debug)]
struct Source {
    /// Schema locations (paths or URLs)
    #[arg(short, long = "schema", value_name = "SCHEMA")]
    schemas: Vec<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// XML catalog for offline schema copies
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Maximum nesting depth of inlined children (0 = never inline complex children)
    #[arg(long)]
    merge_max_depth: Option<usize>,

    /// Model cache directory
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Refuse to download remote schemas
    #[arg(long)]
    offline: bool,

    /// Documents to convert
    #[arg(value_name = "DOC", required = true)]
    documents: Vec<PathBuf>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert documents and write SQL
    Convert {
        #[command(flatten)]
        source: Source,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the tables derived from documents
    Inspect {
        #[command(flatten)]
        source: Source,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Convert { source, output } => cmd_convert(source, output),
        Commands::Inspect { source, json } => cmd_inspect(source, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Configuration file overlaid with command-line flags
#[cfg(feature = "cli")]
fn load_config(source: &Source) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &source.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if !source.schemas.is_empty() {
        config.schemas = source.schemas.clone();
    }
    if source.catalog.is_some() {
        config.catalog = source.catalog.clone();
    }
    if let Some(depth) = source.merge_max_depth {
        config.build.merge_max_depth = depth;
    }
    if source.cache.is_some() {
        config.cache_dir = source.cache.clone();
    }
    if source.offline {
        config.allow_remote = false;
    }
    Ok(config)
}

#[cfg(feature = "cli")]
fn convert(source: &Source) -> Result<Model, Box<dyn std::error::Error>> {
    let config = load_config(source)?;
    let mut converter = Converter::from_config(&config)?;
    let report = converter.convert_files(&source.documents)?;

    for (path, error) in &report.failed {
        eprintln!("Skipped {}: {}", path.display(), error);
    }
    if report.converted.is_empty() {
        return Err("no document was converted".into());
    }
    Ok(converter.into_model())
}

#[cfg(feature = "cli")]
fn cmd_convert(source: Source, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let model = convert(&source)?;
    let script = sql::to_sql(&model);

    match output {
        Some(path) => {
            fs::write(&path, script)?;
            eprintln!(
                "Wrote {} tables and {} rows to {}",
                model.tables.len(),
                model.row_count(),
                path.display()
            );
        }
        None => print!("{}", script),
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_inspect(source: Source, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let model = convert(&source)?;

    if json {
        let tables: Vec<_> = model
            .tables
            .values()
            .map(|table| {
                serde_json::json!({
                    "name": table.name,
                    "uid": table.uid_name(),
                    "rows": model.rows(&table.name).len(),
                    "fields": table.fields.values().collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    println!("Root table: {}", model.root_table.as_deref().unwrap_or("-"));
    for table in model.tables.values() {
        println!();
        println!("{} ({} rows)", table.name, model.rows(&table.name).len());
        for (key, field) in &table.fields {
            let column = table.column_name(key).unwrap_or_else(|| "-".to_string());
            let detail = match field {
                Field::Column(c) if *key == table.uid => format!("{} uid", c.sql_type),
                Field::Column(c) => c.sql_type.to_string(),
                Field::Link(l) if l.is_many() => format!("many -> {}", l.table),
                Field::Link(l) => format!("link -> {}", l.table),
                Field::BackLink(b) => format!("back-link -> {}", b.table),
                Field::Geometry(g) => format!("{} srid={} dim={}", g.geometry_type, g.srid, g.dimension),
            };
            let optional = if field.is_optional() { "" } else { " not null" };
            println!("  {:<24} {:<32} {}{}", column, key, detail, optional);
        }
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
