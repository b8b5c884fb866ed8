use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Result of a single PQL call.
///
/// Bitmap queries come back as a column set; `Count(...)` wrappers, and some servers
/// answering a bare intersect, come back as a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResult {
    ColumnSet { columns: Vec<u64> },
    Count(u64),
}

/// Request encoding used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// MessagePack envelope, `application/x-msgpack`.
    #[default]
    Binary,
    /// Raw PQL text, `text/plain`.
    Textual,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Binary => "application/x-msgpack",
            ContentType::Textual => "text/plain",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Binary => write!(f, "binary"),
            ContentType::Textual => write!(f, "textual"),
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            // legacy spellings from the old zipf tool
            "binary" | "protobuf" | "msgpack" => Ok(ContentType::Binary),
            "textual" | "pql" | "text" => Ok(ContentType::Textual),
            other => Err(format!(
                "invalid content type '{}', expected 'binary' or 'textual'",
                other
            )),
        }
    }
}

/// Body of a binary-encoded query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Options sent when creating a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOptions {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(rename = "cacheType", skip_serializing_if = "Option::is_none")]
    pub cache_type: Option<String>,
    #[serde(rename = "cacheSize", skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<u32>,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            field_type: "set".to_string(),
            cache_type: None,
            cache_size: None,
        }
    }
}

/// A single (row, column) bit to set or clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bit {
    pub row: u64,
    pub column: u64,
}
