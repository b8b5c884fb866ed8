//! In-memory bitmap index used by unit and integration tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use index_client::FieldOptions;

use crate::adapter::{IndexClient, IngestBatch, QueryResult};
use crate::error::{DxError, DxResult};

type Hook = Box<dyn FnOnce() + Send>;

/// Deterministic in-memory bitmap index.
#[derive(Default)]
pub struct MockIndex {
    schema: Mutex<HashMap<String, HashSet<String>>>,
    bits: Mutex<HashMap<(String, String, u64), BTreeSet<u64>>>,
    /// Answer queries with a count instead of a column set.
    pub count_results: AtomicBool,
    /// Number of upcoming query calls that fail transiently.
    pub fail_next_queries: AtomicUsize,
    /// Number of upcoming calls that fail permanently.
    pub fail_permanently: AtomicUsize,
    latency: Duration,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub queries_served: AtomicUsize,
    pub batches_ingested: AtomicUsize,
    received: Mutex<Vec<(String, String)>>,
    before_next_query: Mutex<Option<Hook>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn has_field(&self, index: &str, field: &str) -> bool {
        lock(&self.schema)
            .get(index)
            .map(|f| f.contains(field))
            .unwrap_or(false)
    }

    pub fn set_bit(&self, index: &str, field: &str, row: u64, column: u64) {
        lock(&self.bits)
            .entry((index.to_string(), field.to_string(), row))
            .or_default()
            .insert(column);
    }

    /// Fill every row of `field` in `[0, rows)` with a few columns.
    pub fn seed_rows(&self, index: &str, field: &str, rows: u64) {
        for row in 0..rows {
            for col in 0..8 {
                self.set_bit(index, field, row, (row * 7 + col * 3) % 32);
            }
        }
    }

    /// Total number of set bits.
    pub fn bit_count(&self) -> usize {
        lock(&self.bits).values().map(|s| s.len()).sum()
    }

    pub fn snapshot(&self) -> HashMap<(String, String, u64), BTreeSet<u64>> {
        lock(&self.bits).clone()
    }

    /// Every `(index, pql)` handed to `execute_query`, failed calls included, in
    /// arrival order.
    pub fn received_queries(&self) -> Vec<(String, String)> {
        lock(&self.received).clone()
    }

    pub fn clear_received(&self) {
        lock(&self.received).clear();
    }

    /// Run `hook` once, at the start of the next query call.
    pub fn before_next_query(&self, hook: impl FnOnce() + Send + 'static) {
        *lock(&self.before_next_query) = Some(Box::new(hook));
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        InFlight(&self.in_flight)
    }

    fn intersect(&self, index: &str, pql: &str) -> DxResult<Vec<u64>> {
        let bits = lock(&self.bits);
        let mut acc: Option<BTreeSet<u64>> = None;
        for call in pql.split("Row(").skip(1) {
            let body = call.split(')').next().unwrap_or_default();
            let (field, row) = body
                .split_once('=')
                .ok_or_else(|| DxError::permanent(format!("bad pql {}", pql)))?;
            let row: u64 = row
                .parse()
                .map_err(|_| DxError::permanent(format!("bad row in {}", pql)))?;
            let cols = bits
                .get(&(index.to_string(), field.to_string(), row))
                .cloned()
                .unwrap_or_default();
            acc = Some(match acc {
                Some(prev) => prev.intersection(&cols).copied().collect(),
                None => cols,
            });
        }
        Ok(acc.unwrap_or_default().into_iter().collect())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl IndexClient for MockIndex {
    async fn ensure_index(&self, index: &str) -> DxResult<()> {
        lock(&self.schema).entry(index.to_string()).or_default();
        Ok(())
    }

    async fn ensure_field(&self, index: &str, field: &str, _options: &FieldOptions) -> DxResult<()> {
        let mut schema = lock(&self.schema);
        let fields = schema
            .get_mut(index)
            .ok_or_else(|| DxError::Schema(format!("index {} not found", index)))?;
        fields.insert(field.to_string());
        Ok(())
    }

    async fn execute_query(&self, index: &str, pql: &str) -> DxResult<(QueryResult, Duration)> {
        let hook = lock(&self.before_next_query).take();
        if let Some(hook) = hook {
            hook();
        }
        lock(&self.received).push((index.to_string(), pql.to_string()));

        let _guard = self.enter().await;
        if Self::take(&self.fail_permanently) {
            return Err(DxError::permanent("too many failures"));
        }
        if Self::take(&self.fail_next_queries) {
            return Err(DxError::transient("connection reset by peer"));
        }
        let columns = self.intersect(index, pql)?;
        self.queries_served.fetch_add(1, Ordering::SeqCst);
        let result = if self.count_results.load(Ordering::SeqCst) {
            QueryResult::Count(columns.len() as u64)
        } else {
            QueryResult::ColumnSet { columns }
        };
        Ok((result, Duration::from_micros(100 + pql.len() as u64)))
    }

    async fn ingest_batch(&self, batch: &IngestBatch) -> DxResult<Duration> {
        let _guard = self.enter().await;
        if Self::take(&self.fail_permanently) {
            return Err(DxError::permanent("too many failures"));
        }
        let mut bits = lock(&self.bits);
        for bit in &batch.bits {
            let entry = bits
                .entry((batch.index.clone(), batch.field.clone(), bit.row))
                .or_default();
            if batch.clear {
                entry.remove(&bit.column);
            } else {
                entry.insert(bit.column);
            }
        }
        self.batches_ingested.fetch_add(1, Ordering::SeqCst);
        Ok(Duration::from_micros(50))
    }
}
