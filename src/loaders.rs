//! Resource loading utilities
//!
//! Schema bytes come from an injected [`SchemaFetcher`]. The default
//! [`Loader`] reads local files, downloads `http(s)` URLs with a timeout
//! and a bounded number of retries, honours an optional XML catalog for
//! offline copies, and can be cancelled from another thread.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::catalog::XmlCatalog;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;

/// Source of raw schema bytes
pub trait SchemaFetcher: Send + Sync {
    /// Fetch the resource at `location`
    fn fetch(&self, location: &Location) -> Result<Vec<u8>>;
}

impl<F> SchemaFetcher for F
where
    F: Fn(&Location) -> Result<Vec<u8>> + Send + Sync,
{
    fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        self(location)
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-memory fetcher, for tests and pre-bundled schema archives
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    /// Create an empty fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under a location string
    pub fn with(mut self, location: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(location, content);
        self
    }

    /// Register a resource under a location string
    pub fn insert(&mut self, location: &str, content: impl Into<Vec<u8>>) {
        let key = Location::parse(location)
            .map(|l| l.key())
            .unwrap_or_else(|_| location.to_string());
        self.resources.insert(key, content.into());
    }
}

impl SchemaFetcher for MemoryFetcher {
    fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        self.resources
            .get(&location.key())
            .cloned()
            .ok_or_else(|| Error::Resource(format!("No in-memory resource for '{}'", location)))
    }
}

/// Resource loader for schemas and documents
#[derive(Debug)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
    /// Whether to allow remote resources
    allow_remote: bool,
    /// Optional catalog consulted before fetching
    catalog: Option<XmlCatalog>,
    /// HTTP timeout per attempt
    timeout: Duration,
    /// Additional attempts after a failed download
    retries: u32,
    /// Cancellation flag checked between attempts
    cancel: CancelToken,
    client: OnceCell<reqwest::blocking::Client>,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            allow_remote: true,
            catalog: None,
            timeout: Duration::from_secs(30),
            retries: 2,
            cancel: CancelToken::new(),
            client: OnceCell::new(),
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set whether to allow remote resources
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Use an XML catalog to rewrite locations before fetching
    pub fn with_catalog(mut self, catalog: XmlCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the per-attempt HTTP timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries after a failed download
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Share a cancellation token with this loader
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Load a resource as a string
    pub fn load(&self, location: &Location) -> Result<String> {
        let bytes = self.load_bytes(location)?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Resource(format!("'{}' is not valid UTF-8: {}", location, e)))
    }

    /// Load a resource as bytes
    pub fn load_bytes(&self, location: &Location) -> Result<Vec<u8>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(rewritten) = self.catalog.as_ref().and_then(|c| c.resolve(&location.to_string())) {
            tracing::debug!(from = %location, to = %rewritten, "catalog rewrite");
            return self.load_direct(&rewritten);
        }
        self.load_direct(location)
    }

    fn load_direct(&self, location: &Location) -> Result<Vec<u8>> {
        let content = match location {
            Location::Path(path) => fs::read(path).map_err(|e| {
                Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
            })?,
            Location::Url(url) => {
                if !self.allow_remote {
                    return Err(Error::Resource(format!(
                        "Remote resources are not allowed: {}",
                        url
                    )));
                }
                self.download(url)?
            }
            Location::String(s) => {
                return Err(Error::Resource(format!(
                    "No loader for in-memory resource '{}'",
                    s
                )))
            }
        };

        self.limits.check_xml_size(content.len())?;
        Ok(content)
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Resource(format!("Failed to create HTTP client: {}", e)))
        })
    }

    fn download(&self, url: &url::Url) -> Result<Vec<u8>> {
        let client = self.client()?;
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let result = client
                .get(url.clone())
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes());
            match result {
                Ok(bytes) => {
                    tracing::debug!(%url, size = bytes.len(), "downloaded schema");
                    return Ok(bytes.to_vec());
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(%url, attempt, error = %e, "download failed, retrying");
                    std::thread::sleep(Duration::from_millis(200 * u64::from(attempt)));
                }
                Err(e) => {
                    return Err(Error::Resource(format!(
                        "Failed to download '{}' after {} attempts: {}",
                        url,
                        attempt + 1,
                        e
                    )))
                }
            }
        }
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaFetcher for Loader {
    fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        self.load_bytes(location)
    }
}
