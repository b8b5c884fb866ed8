use std::time::Duration;

use super::HttpClient;
use crate::protocol::{ContentType, DriverError};

pub struct IndexClientBuilder {
    addr: String,
    timeout_ms: Option<u64>,
    pool_size: Option<usize>,
    content_type: ContentType,
}

impl IndexClientBuilder {
    /// `addr` may be `host:port` or a full `http(s)://` URL.
    pub fn new(addr: &str) -> Self {
        let addr = addr.trim().to_string();
        let addr = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr
        } else {
            format!("http://{}", addr)
        };

        Self {
            addr,
            timeout_ms: None,
            pool_size: None,
            content_type: ContentType::default(),
        }
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn build(self) -> Result<HttpClient, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.timeout_ms.unwrap_or(30_000)))
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(self.pool_size.unwrap_or(16))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DriverError::ConnectionError(format!("Failed to build client: {}", e)))?;

        Ok(HttpClient::from_parts(&self.addr, self.content_type, client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_adds_scheme() {
        assert_eq!(IndexClientBuilder::new("localhost:10101").addr(), "http://localhost:10101");
        assert_eq!(
            IndexClientBuilder::new("https://db.example:443").addr(),
            "https://db.example:443"
        );
    }

    #[test]
    fn test_builder_chained() {
        let client = IndexClientBuilder::new("127.0.0.1:10101")
            .timeout_ms(5_000)
            .pool_size(4)
            .content_type(ContentType::Textual)
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:10101");
        assert_eq!(client.content_type(), ContentType::Textual);
    }
}
