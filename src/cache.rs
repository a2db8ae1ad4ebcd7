//! Model cache files
//!
//! A built model can be stored next to the documents it was built from and
//! reloaded instead of rebuilding. The file is a small text envelope:
//!
//! ```text
//! GMLAS-MODEL
//! 1
//! <source key>
//! <model as JSON>
//! ```
//!
//! The cache is advisory. A file with the wrong magic, a newer format
//! version, another source key or a corrupt payload is an
//! [`Error::ModelCache`], which callers answer by rebuilding.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::model::Model;

/// First line of every cache file
pub const MAGIC: &str = "GMLAS-MODEL";

/// Format version written by this crate
pub const FORMAT_VERSION: u32 = 1;

/// Write `model` for `key` to `writer`
pub fn write_model<W: Write>(mut writer: W, key: &str, model: &Model) -> Result<()> {
    writeln!(writer, "{}", MAGIC)?;
    writeln!(writer, "{}", FORMAT_VERSION)?;
    writeln!(writer, "{}", key.replace('\n', " "))?;
    serde_json::to_writer(&mut writer, model)?;
    writer.flush()?;
    Ok(())
}

/// Read a model written for `key`
pub fn read_model<R: Read>(reader: R, key: &str) -> Result<Model> {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader.read_line(&mut line)?;
    if line.trim_end() != MAGIC {
        return Err(Error::ModelCache("invalid model file: bad magic".to_string()));
    }

    line.clear();
    reader.read_line(&mut line)?;
    let version: u32 = line
        .trim()
        .parse()
        .map_err(|_| Error::ModelCache(format!("invalid model file: bad version '{}'", line.trim())))?;
    if version > FORMAT_VERSION {
        return Err(Error::ModelCache(format!(
            "invalid model file: version {} is newer than {}",
            version, FORMAT_VERSION
        )));
    }

    line.clear();
    reader.read_line(&mut line)?;
    if line.trim_end_matches(['\r', '\n']) != key.replace('\n', " ") {
        return Err(Error::ModelCache(format!(
            "model file was written for '{}'",
            line.trim_end()
        )));
    }

    serde_json::from_reader(reader).map_err(|e| Error::ModelCache(format!("invalid model file: {}", e)))
}

/// Directory of model cache files, one per source key
#[derive(Debug, Clone)]
pub struct ModelCache {
    dir: PathBuf,
}

impl ModelCache {
    /// Cache rooted at `dir`; the directory is created on first store
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the model for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:x}.gmlas", Sha256::digest(key.as_bytes())))
    }

    /// Cached model for `key`, `None` when there is none
    pub fn load(&self, key: &str) -> Result<Option<Model>> {
        let path = self.path_for(key);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let model = read_model(file, key)?;
        tracing::debug!(key = %key, path = %path.display(), tables = model.tables.len(), "model cache hit");
        Ok(Some(model))
    }

    /// Store `model` for `key`
    pub fn store(&self, key: &str, model: &Model) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let file = fs::File::create(&path)?;
        write_model(std::io::BufWriter::new(file), key, model)?;
        tracing::debug!(key = %key, path = %path.display(), "model cached");
        Ok(path)
    }
}
