//! Workload specs document.
//!
//! The specs file declares the indexes and fields a run works against. Its raw bytes
//! are hashed into the workload fingerprint, so two invocations only pair up when they
//! were given byte-identical specs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DxError, DxResult};

fn default_columns() -> u64 {
    1_000_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Smallest row id queried or ingested.
    #[serde(default)]
    pub min: u64,
    /// Largest row id, inclusive.
    pub max: u64,
    /// Number of bits an ingest run sets in this field.
    #[serde(default)]
    pub cardinality: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    /// Column ids used by ingest fall in `[0, columns)`.
    #[serde(default = "default_columns")]
    pub columns: u64,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct SpecsDocument {
    #[serde(default)]
    indexes: Vec<IndexSpec>,
}

/// A parsed specs document together with the bytes it was parsed from.
#[derive(Debug, Clone)]
pub struct Specs {
    raw: Vec<u8>,
    indexes: Vec<IndexSpec>,
}

impl Specs {
    pub fn load(path: &Path) -> DxResult<Self> {
        let raw = std::fs::read(path).map_err(|e| {
            DxError::Config(format!("cannot read specs file {}: {}", path.display(), e))
        })?;
        Self::parse(raw)
    }

    pub fn parse(raw: Vec<u8>) -> DxResult<Self> {
        let text = std::str::from_utf8(&raw)
            .map_err(|e| DxError::Config(format!("specs file is not valid UTF-8: {}", e)))?;
        let doc: SpecsDocument = toml::from_str(text)?;
        let specs = Self {
            raw,
            indexes: doc.indexes,
        };
        specs.validate()?;
        Ok(specs)
    }

    fn validate(&self) -> DxResult<()> {
        if self.indexes.is_empty() {
            return Err(DxError::Config("specs declare no indexes".to_string()));
        }
        for index in &self.indexes {
            if index.name.is_empty() {
                return Err(DxError::Config("index with empty name in specs".to_string()));
            }
            if index.columns == 0 {
                return Err(DxError::Config(format!(
                    "index {} must declare a positive column range",
                    index.name
                )));
            }
            for field in &index.fields {
                if field.name.is_empty() {
                    return Err(DxError::Config(format!(
                        "index {} has a field with an empty name",
                        index.name
                    )));
                }
                if field.min > field.max {
                    return Err(DxError::Config(format!(
                        "field {}/{}: min row {} exceeds max row {}",
                        index.name, field.name, field.min, field.max
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Hex SHA-256 of the raw document.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.raw)
    }
}

pub fn fingerprint(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}
