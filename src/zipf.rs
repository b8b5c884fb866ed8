//! Legacy `zipf` load generator: concurrent agents each set (or clear) a run of
//! Zipf-distributed bits, with no record/replay.

use std::sync::Arc;
use std::time::{Duration, Instant};

use index_client::{ContentType, FieldOptions};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::adapter::{ClientType, IndexClient};
use crate::error::DxResult;
use crate::pool::WorkerPool;
use crate::rng::{derive_seed, seeded};
use crate::workload::{IngestSpec, Operation, ZipfParams};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipfConfig {
    pub hosts: Vec<String>,
    pub agent_num: usize,
    pub base_row_id: u64,
    pub row_id_range: u64,
    pub base_column_id: u64,
    pub column_id_range: u64,
    pub iterations: usize,
    pub seed: u64,
    pub index: String,
    pub field: String,
    pub rows: ZipfParams,
    pub columns: ZipfParams,
    pub client_type: ClientType,
    pub operation: Operation,
    pub content_type: ContentType,
}

impl Default for ZipfConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost:10101".to_string()],
            agent_num: 1,
            base_row_id: 0,
            row_id_range: 100_000,
            base_column_id: 0,
            column_id_range: 100_000,
            iterations: 100,
            seed: 1,
            index: "benchindex".to_string(),
            field: "zipf".to_string(),
            rows: ZipfParams::default(),
            columns: ZipfParams::default(),
            client_type: ClientType::Single,
            operation: Operation::Set,
            content_type: ContentType::Binary,
        }
    }
}

impl ZipfConfig {
    fn ingest_spec(&self) -> IngestSpec {
        IngestSpec {
            index: self.index.clone(),
            field: self.field.clone(),
            base_row: self.base_row_id,
            row_range: self.row_id_range,
            base_column: self.base_column_id,
            column_range: self.column_id_range,
            iterations: self.iterations,
            rows: self.rows,
            columns: self.columns,
            operation: self.operation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub agent: usize,
    pub seed: u64,
    pub bits: usize,
    #[serde(with = "crate::duration::as_text")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZipfReport {
    pub config: ZipfConfig,
    pub agents: Vec<AgentResult>,
    #[serde(with = "crate::duration::as_text")]
    pub duration: Duration,
}

/// Run `config.agent_num` agents against `client`. Agent `k` draws from a generator
/// seeded with `seed + k` and applies its bits as a single batch.
pub async fn run_zipf(
    client: Arc<dyn IndexClient>,
    config: &ZipfConfig,
    cancel: CancellationToken,
) -> DxResult<ZipfReport> {
    let spec = config.ingest_spec();
    spec.validate()?;
    client.ensure_index(&config.index).await?;
    client
        .ensure_field(&config.index, &config.field, &FieldOptions::default())
        .await?;

    let spec = Arc::new(spec);
    let base_seed = config.seed;
    let started = Instant::now();
    let pool = WorkerPool::new(config.agent_num, cancel);
    let mut run = pool.run(0..config.agent_num.max(1), move |agent: usize| {
        let client = client.clone();
        let spec = spec.clone();
        let seed = derive_seed(base_seed, agent as u64);
        async move { run_agent(client.as_ref(), &spec, agent, seed).await }
    });

    let mut agents = Vec::new();
    while let Some((_, result)) = run.recv().await {
        agents.push(result);
    }
    run.finish().await?;
    agents.sort_by_key(|a| a.agent);

    Ok(ZipfReport {
        config: config.clone(),
        agents,
        duration: started.elapsed(),
    })
}

async fn run_agent(
    client: &dyn IndexClient,
    spec: &IngestSpec,
    agent: usize,
    seed: u64,
) -> DxResult<AgentResult> {
    let mut rng = seeded(seed);
    let mut batches = spec.batches(&mut rng, spec.iterations.max(1))?;
    let mut result = AgentResult {
        agent,
        seed,
        bits: spec.iterations,
        duration: Duration::ZERO,
        error: None,
    };
    let Some(batch) = batches.pop() else {
        return Ok(result);
    };
    match client.ingest_batch(&batch).await {
        Ok(elapsed) => result.duration = elapsed,
        Err(e) if e.is_transient() => {
            tracing::warn!(agent, "zipf agent failed: {}", e);
            result.error = Some(e.to_string());
        }
        Err(e) => return Err(e),
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockIndex;

    #[tokio::test]
    async fn test_agents_set_bits() {
        let index = MockIndex::new();
        let config = ZipfConfig {
            agent_num: 3,
            iterations: 20,
            row_id_range: 10,
            column_id_range: 10,
            ..Default::default()
        };
        let report = run_zipf(index.clone(), &config, CancellationToken::new())
            .await
            .unwrap();
        assert!(index.has_field("benchindex", "zipf"));
        assert_eq!(report.agents.len(), 3);
        let seeds: Vec<u64> = report.agents.iter().map(|a| a.seed).collect();
        assert_eq!(seeds, vec![1, 2, 3]);
        assert!(report.agents.iter().all(|a| a.bits == 20 && a.error.is_none()));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["config"]["agentNum"], 3);
        assert_eq!(json["config"]["operation"], "set");
    }

    #[tokio::test]
    async fn test_invalid_exponent_fails() {
        let config = ZipfConfig {
            rows: ZipfParams {
                exponent: 0.5,
                ratio: 0.25,
            },
            ..Default::default()
        };
        let err = run_zipf(MockIndex::new(), &config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::DxError::Config(_)));
    }

    #[tokio::test]
    async fn test_overflowing_id_range_fails_before_schema() {
        let index = MockIndex::new();
        let config = ZipfConfig {
            base_row_id: u64::MAX - 5,
            row_id_range: 100,
            ..Default::default()
        };
        let err = run_zipf(index.clone(), &config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::DxError::Config(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(!index.has_field("benchindex", "zipf"));
    }
}
