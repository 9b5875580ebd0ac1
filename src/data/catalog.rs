//! Static district catalog
//!
//! The catalog is a JSON array of district descriptors kept next to the
//! binary (`data/districts.json`). It is read on every `/api/districts`
//! request and passed through to the client; the resolver never consults it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read district catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse district catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One district descriptor
///
/// Fields beyond `id` and the two display names are preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub id: String,
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub name_hi: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reads the catalog at `path`
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<District>, CatalogError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
