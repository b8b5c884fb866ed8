use super::error::DriverError;
use super::QueryResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope returned by the query endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn from_json(bytes: &[u8]) -> Result<Self, DriverError> {
        serde_json::from_slice(bytes)
            .map_err(|e| DriverError::ProtocolError(format!("Failed to parse response: {}", e)))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, DriverError> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| DriverError::ProtocolError(format!("Failed to decode response: {}", e)))
    }

    /// First result of the response, interpreted as a bitmap or a count.
    pub fn first_result(&self) -> Result<QueryResult, DriverError> {
        if let Some(err) = &self.error {
            return Err(DriverError::QueryError(err.clone()));
        }
        let value = self
            .results
            .first()
            .ok_or_else(|| DriverError::ProtocolError("Response has no results".to_string()))?;
        parse_result(value)
    }

    pub fn check(&self) -> Result<(), DriverError> {
        match &self.error {
            Some(err) => Err(DriverError::QueryError(err.clone())),
            None => Ok(()),
        }
    }
}

fn parse_result(value: &Value) -> Result<QueryResult, DriverError> {
    if let Some(n) = value.as_u64() {
        return Ok(QueryResult::Count(n));
    }
    if let Some(obj) = value.as_object() {
        if let Some(n) = obj.get("count").and_then(|c| c.as_u64()) {
            return Ok(QueryResult::Count(n));
        }
        if let Some(cols) = obj.get("columns").and_then(|c| c.as_array()) {
            let columns = cols
                .iter()
                .map(|c| {
                    c.as_u64().ok_or_else(|| {
                        DriverError::ProtocolError(format!("Invalid column id: {}", c))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(QueryResult::ColumnSet { columns });
        }
    }
    Err(DriverError::ProtocolError(format!(
        "Unexpected result shape: {}",
        value
    )))
}
