use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

use crate::protocol::{
    render_mutations, Bit, ContentType, DriverError, FieldOptions, QueryRequest, QueryResponse,
    QueryResult,
};

pub struct HttpClient {
    base_url: String,
    content_type: ContentType,
    client: reqwest::Client,
}

impl HttpClient {
    pub(crate) fn from_parts(base_url: &str, content_type: ContentType, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            content_type,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Create `index` unless it already exists.
    pub async fn ensure_index(&self, index: &str) -> Result<(), DriverError> {
        validate_name(index)?;
        let path = format!("/index/{}", index);
        self.create(&path, serde_json::json!({ "options": {} })).await
    }

    /// Create `field` in `index` unless it already exists.
    pub async fn ensure_field(
        &self,
        index: &str,
        field: &str,
        options: &FieldOptions,
    ) -> Result<(), DriverError> {
        validate_name(field)?;
        let path = format!("/index/{}/field/{}", index, field);
        self.create(&path, serde_json::json!({ "options": options })).await
    }

    async fn create(&self, path: &str, body: Value) -> Result<(), DriverError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await?;

        // 409 means somebody (possibly an earlier run) already created it.
        if response.status() == StatusCode::CONFLICT {
            tracing::debug!("{} already exists", path);
            return Ok(());
        }
        Self::check_status(response, path).await?;
        Ok(())
    }

    /// Run a PQL query and interpret its first result.
    pub async fn query(&self, index: &str, pql: &str) -> Result<QueryResult, DriverError> {
        self.execute(index, pql).await?.first_result()
    }

    /// Run a PQL request and return the raw response envelope.
    pub async fn execute(&self, index: &str, pql: &str) -> Result<QueryResponse, DriverError> {
        let path = format!("/index/{}/query", index);
        let url = format!("{}{}", self.base_url, path);

        let request = match self.content_type {
            ContentType::Textual => self.client.post(&url).body(pql.to_string()),
            ContentType::Binary => {
                let envelope = QueryRequest {
                    query: pql.to_string(),
                };
                let body = rmp_serde::to_vec_named(&envelope).map_err(|e| {
                    DriverError::ProtocolError(format!("Failed to encode request: {}", e))
                })?;
                self.client.post(&url).body(body)
            }
        };

        let response = request
            .header(CONTENT_TYPE, self.content_type.mime())
            .header(ACCEPT, self.content_type.mime())
            .send()
            .await?;
        let response = Self::check_status(response, &path).await?;

        let is_msgpack = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("msgpack"))
            .unwrap_or(false);
        let bytes = response.bytes().await?;

        if is_msgpack {
            QueryResponse::from_msgpack(&bytes)
        } else {
            QueryResponse::from_json(&bytes)
        }
    }

    /// Apply a batch of bit mutations to `field`.
    pub async fn import(
        &self,
        index: &str,
        field: &str,
        bits: &[Bit],
        clear: bool,
    ) -> Result<(), DriverError> {
        if bits.is_empty() {
            return Ok(());
        }
        let pql = render_mutations(field, bits, clear);
        self.execute(index, &pql).await?.check()
    }

    async fn check_status(
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response, DriverError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(DriverError::ServerError {
            status: status.as_u16(),
            message: format!("{}: {}", path, error_text.trim()),
        })
    }
}

fn validate_name(name: &str) -> Result<(), DriverError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DriverError::InvalidArgument(format!(
            "invalid index or field name '{}'",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexClientBuilder;

    #[test]
    fn test_base_url_trimmed() {
        let client = IndexClientBuilder::new("http://localhost:10101/").build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:10101");
        assert_eq!(client.content_type(), ContentType::Binary);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("i1").is_ok());
        assert!(validate_name("bench_index-2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("Upper").is_err());
        assert!(validate_name("has space").is_err());
    }

    #[tokio::test]
    async fn test_import_empty_batch_is_noop() {
        // No server listens here; an empty batch must not touch the network.
        let client = IndexClientBuilder::new("127.0.0.1:1").build().unwrap();
        assert!(client.import("i", "f", &[], false).await.is_ok());
    }
}
