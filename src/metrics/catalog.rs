//! Operation catalog sources.
//!
//! The catalog is derived from the cloud API's OpenAPI document: one entry per
//! path/method carrying an `operationId`. Loading it is the only external call
//! a report build makes, and a failure degrades to an empty catalog.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Public OpenAPI document of the Meraki dashboard API (v1-beta branch)
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/meraki/openapi/v1-beta/openapi/spec3.json";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Catalog request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Catalog request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("Invalid catalog document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Catalog document has no `paths` object")]
    MissingPaths,
}

/// One operation described by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationCatalogEntry {
    pub operation_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

impl OperationCatalogEntry {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            description: String::new(),
            deprecated: false,
            tags: Vec::new(),
            path: None,
            method: None,
        }
    }

    pub fn is_beta(&self) -> bool {
        self.tags.iter().any(|t| t == "beta")
    }
}

/// Lookup table of catalog entries keyed by operation id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationCatalog {
    entries: Vec<OperationCatalogEntry>,
    by_id: HashMap<String, usize>,
}

impl OperationCatalog {
    /// Build from entries; the first entry wins when an id repeats.
    pub fn new(entries: Vec<OperationCatalogEntry>) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            by_id.entry(entry.operation_id.clone()).or_insert(idx);
        }
        Self { entries, by_id }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, operation_id: &str) -> Option<&OperationCatalogEntry> {
        self.by_id.get(operation_id).map(|&idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[OperationCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the catalog comes from.
pub trait CatalogSource {
    /// Human-readable origin, for logs
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<Vec<OperationCatalogEntry>, CatalogError>;
}

/// Catalog lookups disabled; every operation gets default metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCatalog;

impl CatalogSource for NoCatalog {
    fn describe(&self) -> String {
        "disabled".to_string()
    }

    fn fetch(&self) -> Result<Vec<OperationCatalogEntry>, CatalogError> {
        Ok(Vec::new())
    }
}

/// Entries already in memory
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog(pub Vec<OperationCatalogEntry>);

impl CatalogSource for StaticCatalog {
    fn describe(&self) -> String {
        format!("{} in-memory entries", self.0.len())
    }

    fn fetch(&self) -> Result<Vec<OperationCatalogEntry>, CatalogError> {
        Ok(self.0.clone())
    }
}

/// OpenAPI document on disk
#[derive(Debug, Clone)]
pub struct FileCatalog {
    pub path: PathBuf,
}

impl CatalogSource for FileCatalog {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<Vec<OperationCatalogEntry>, CatalogError> {
        let content = fs::read_to_string(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        let doc: Value = serde_json::from_str(&content)?;
        parse_openapi_spec(&doc)
    }
}

/// OpenAPI document fetched over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    pub url: String,
    pub timeout: Duration,
}

impl CatalogSource for HttpCatalog {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<Vec<OperationCatalogEntry>, CatalogError> {
        let http_err = |source| CatalogError::Http {
            url: self.url.clone(),
            source,
        };
        let client = Client::builder().timeout(self.timeout).build().map_err(http_err)?;
        let resp = client.get(&self.url).send().map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(CatalogError::Status {
                url: self.url.clone(),
                status: resp.status().as_u16(),
            });
        }
        let doc = resp.json::<Value>().map_err(http_err)?;
        parse_openapi_spec(&doc)
    }
}

/// Extract one entry per `paths.<path>.<method>` object that has an `operationId`.
pub fn parse_openapi_spec(doc: &Value) -> Result<Vec<OperationCatalogEntry>, CatalogError> {
    let paths = doc
        .get("paths")
        .and_then(|v| v.as_object())
        .ok_or(CatalogError::MissingPaths)?;

    let mut entries = Vec::new();
    for (path, path_item) in paths {
        let Some(methods) = path_item.as_object() else {
            continue;
        };
        for (method, operation) in methods {
            let Some(operation_id) = operation.get("operationId").and_then(|v| v.as_str()) else {
                continue;
            };
            let description = operation
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let deprecated = operation
                .get("deprecated")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let tags = operation
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();

            entries.push(OperationCatalogEntry {
                operation_id: operation_id.to_string(),
                description,
                deprecated,
                tags,
                path: Some(path.clone()),
                method: Some(method.clone()),
            });
        }
    }

    Ok(entries)
}

/// Fetch the catalog once, degrading to an empty catalog on any failure.
pub fn load_catalog(source: &dyn CatalogSource) -> OperationCatalog {
    match source.fetch() {
        Ok(entries) => {
            log::info!("Loaded {} catalog operations from {}", entries.len(), source.describe());
            OperationCatalog::new(entries)
        }
        Err(e) => {
            log::warn!(
                "Operation catalog unavailable ({}): {}; continuing with an empty catalog",
                source.describe(),
                e
            );
            OperationCatalog::empty()
        }
    }
}
