//! Remote client adapter.
//!
//! The core talks to the database only through [`IndexClient`]. [`HostPool`] is the
//! production implementation: it fans calls out over one or more hosts, enforces the
//! per-call deadline and measures elapsed time at this boundary.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use index_client::{Bit, ContentType, DriverError, FieldOptions, HttpClient, IndexClientBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{DxError, DxResult};

pub use index_client::QueryResult;

/// A batch of bit mutations against one field.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestBatch {
    pub index: String,
    pub field: String,
    pub bits: Vec<Bit>,
    pub clear: bool,
}

#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Create `index` if missing.
    async fn ensure_index(&self, index: &str) -> DxResult<()>;

    /// Create `field` in `index` if missing.
    async fn ensure_field(&self, index: &str, field: &str, options: &FieldOptions)
        -> DxResult<()>;

    /// Run `pql` against `index`, returning the result and wall-clock time spent.
    async fn execute_query(&self, index: &str, pql: &str) -> DxResult<(QueryResult, Duration)>;

    /// Apply `batch`, returning wall-clock time spent.
    async fn ingest_batch(&self, batch: &IngestBatch) -> DxResult<Duration>;
}

/// How workers spread their calls over the configured hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Every call goes to the first host.
    #[default]
    Single,
    /// Calls rotate over all hosts.
    RoundRobin,
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientType::Single => write!(f, "single"),
            ClientType::RoundRobin => write!(f, "round_robin"),
        }
    }
}

impl FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(ClientType::Single),
            "round_robin" | "round-robin" => Ok(ClientType::RoundRobin),
            other => Err(format!(
                "invalid client type '{}', expected 'single' or 'round_robin'",
                other
            )),
        }
    }
}

/// Knobs shared by every [`HostPool`].
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub client_type: ClientType,
    pub content_type: ContentType,
    pub timeout: Duration,
    /// Consecutive failures tolerated before calls turn into permanent errors.
    pub max_failures: usize,
    pub pool_size: usize,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            client_type: ClientType::Single,
            content_type: ContentType::Binary,
            timeout: Duration::from_secs(30),
            max_failures: 10,
            pool_size: 16,
        }
    }
}

pub struct HostPool {
    clients: Vec<HttpClient>,
    policy: ClientType,
    next: AtomicUsize,
    timeout: Duration,
    max_failures: usize,
    consecutive_failures: AtomicUsize,
}

impl HostPool {
    /// Build one HTTP client per host. Hosts without an explicit port get `port`.
    pub fn connect(hosts: &[String], port: u16, options: &AdapterOptions) -> DxResult<Self> {
        if hosts.is_empty() {
            return Err(DxError::Config("no hosts configured for instance".to_string()));
        }
        let clients = hosts
            .iter()
            .map(|host| {
                IndexClientBuilder::new(&host_with_port(host, port))
                    .timeout_ms(options.timeout.as_millis() as u64)
                    .pool_size(options.pool_size)
                    .content_type(options.content_type)
                    .build()
                    .map_err(|e| DxError::Config(format!("invalid host {}: {}", host, e)))
            })
            .collect::<DxResult<Vec<_>>>()?;

        Ok(Self {
            clients,
            policy: options.client_type,
            next: AtomicUsize::new(0),
            timeout: options.timeout,
            max_failures: options.max_failures,
            consecutive_failures: AtomicUsize::new(0),
        })
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.base_url()).collect()
    }

    fn pick(&self) -> &HttpClient {
        match self.policy {
            ClientType::Single => &self.clients[0],
            ClientType::RoundRobin => {
                let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
                &self.clients[idx]
            }
        }
    }

    /// Clients that schema changes must reach under the current policy.
    fn schema_targets(&self) -> &[HttpClient] {
        match self.policy {
            ClientType::Single => &self.clients[..1],
            ClientType::RoundRobin => &self.clients,
        }
    }

    async fn timed<T, Fut>(&self, fut: Fut) -> DxResult<(T, Duration)>
    where
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout(format!(
                "no response within {:?}",
                self.timeout
            ))),
        };
        let elapsed = start.elapsed();

        match outcome {
            Ok(value) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok((value, elapsed))
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    /// Non-transient driver errors (bad request, query error) are permanent at once;
    /// transient ones only past `max_failures` in a row.
    fn record_failure(&self, err: DriverError) -> DxError {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if !err.is_transient() {
            return DxError::from(err);
        }
        if failures > self.max_failures {
            DxError::permanent(format!(
                "{} consecutive failures, last: {}",
                failures, err
            ))
        } else {
            DxError::transient(err.to_string())
        }
    }
}

#[async_trait]
impl IndexClient for HostPool {
    async fn ensure_index(&self, index: &str) -> DxResult<()> {
        for client in self.schema_targets() {
            client.ensure_index(index).await.map_err(|e| {
                DxError::Schema(format!(
                    "cannot create index {} on {}: {}",
                    index,
                    client.base_url(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    async fn ensure_field(
        &self,
        index: &str,
        field: &str,
        options: &FieldOptions,
    ) -> DxResult<()> {
        for client in self.schema_targets() {
            client.ensure_field(index, field, options).await.map_err(|e| {
                DxError::Schema(format!(
                    "cannot create field {}/{} on {}: {}",
                    index,
                    field,
                    client.base_url(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    async fn execute_query(&self, index: &str, pql: &str) -> DxResult<(QueryResult, Duration)> {
        let client = self.pick();
        self.timed(client.query(index, pql)).await
    }

    async fn ingest_batch(&self, batch: &IngestBatch) -> DxResult<Duration> {
        let client = self.pick();
        let ((), elapsed) = self
            .timed(client.import(&batch.index, &batch.field, &batch.bits, batch.clear))
            .await?;
        Ok(elapsed)
    }
}

fn host_with_port(host: &str, port: u16) -> String {
    let host = host.trim();
    let bare = host
        .strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host);
    if bare.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}
