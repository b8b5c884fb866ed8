//! Workload synthesis: Zipf-distributed bit mutations and random intersect queries.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use index_client::Bit;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::adapter::IngestBatch;
use crate::error::{DxError, DxResult};
use crate::holder::Holder;
use crate::rng::{derive_seed, seeded, uniform, Zipf};
use crate::specs::Specs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Set,
    Clear,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Set => write!(f, "set"),
            Operation::Clear => write!(f, "clear"),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(Operation::Set),
            "clear" => Ok(Operation::Clear),
            other => Err(format!("invalid operation '{}', expected 'set' or 'clear'", other)),
        }
    }
}

/// Exponent and ratio of one Zipf axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZipfParams {
    pub exponent: f64,
    pub ratio: f64,
}

impl Default for ZipfParams {
    fn default() -> Self {
        Self {
            exponent: 1.01,
            ratio: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSpec {
    pub index: String,
    pub field: String,
    pub base_row: u64,
    pub row_range: u64,
    pub base_column: u64,
    pub column_range: u64,
    pub iterations: usize,
    pub rows: ZipfParams,
    pub columns: ZipfParams,
    pub operation: Operation,
}

impl IngestSpec {
    /// Reject empty ranges and ranges whose last id does not fit in a `u64`.
    pub fn validate(&self) -> DxResult<()> {
        if self.row_range == 0 || self.column_range == 0 {
            return Err(DxError::Config(format!(
                "ingest into {}/{} needs non-empty row and column ranges",
                self.index, self.field
            )));
        }
        let axes = [
            ("row", self.base_row, self.row_range),
            ("column", self.base_column, self.column_range),
        ];
        for (axis, base, range) in axes {
            if base.checked_add(range - 1).is_none() {
                return Err(DxError::Config(format!(
                    "{} ids of {}/{} overflow: base {} + range {}",
                    axis, self.index, self.field, base, range
                )));
            }
        }
        Ok(())
    }

    fn samplers(&self) -> DxResult<(Zipf, Zipf)> {
        self.validate()?;
        let rows = Zipf::new(self.rows.exponent, self.rows.ratio, 0, self.row_range - 1)?;
        let columns = Zipf::new(
            self.columns.exponent,
            self.columns.ratio,
            0,
            self.column_range - 1,
        )?;
        Ok((rows, columns))
    }

    /// `iterations` bits at `(base_row + zipf, base_column + zipf)`.
    pub fn mutations<R: Rng + ?Sized>(&self, rng: &mut R) -> DxResult<Vec<Bit>> {
        let (rows, columns) = self.samplers()?;
        Ok((0..self.iterations)
            .map(|_| Bit {
                row: self.base_row + rows.sample(rng),
                column: self.base_column + columns.sample(rng),
            })
            .collect())
    }

    /// Mutations chunked into batches of at most `batch_size` bits.
    pub fn batches<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        batch_size: usize,
    ) -> DxResult<Vec<IngestBatch>> {
        let bits = self.mutations(rng)?;
        Ok(bits
            .chunks(batch_size.max(1))
            .map(|chunk| IngestBatch {
                index: self.index.clone(),
                field: self.field.clone(),
                bits: chunk.to_vec(),
                clear: self.operation == Operation::Clear,
            })
            .collect())
    }

    /// Same bits as [`IngestSpec::batches`], drawn one batch at a time.
    pub fn stream(self, rng: StdRng, batch_size: usize) -> DxResult<BatchStream> {
        let (rows, columns) = self.samplers()?;
        Ok(BatchStream {
            remaining: self.iterations,
            spec: self,
            rows,
            columns,
            rng,
            batch_size: batch_size.max(1),
        })
    }
}

/// Lazily generated batches of one [`IngestSpec`].
pub struct BatchStream {
    spec: IngestSpec,
    rows: Zipf,
    columns: Zipf,
    rng: StdRng,
    remaining: usize,
    batch_size: usize,
}

impl BatchStream {
    fn batch_count(&self) -> usize {
        self.remaining.div_ceil(self.batch_size)
    }
}

impl Iterator for BatchStream {
    type Item = IngestBatch;

    fn next(&mut self) -> Option<IngestBatch> {
        if self.remaining == 0 {
            return None;
        }
        let n = self.remaining.min(self.batch_size);
        self.remaining -= n;
        let bits = (0..n)
            .map(|_| Bit {
                row: self.spec.base_row + self.rows.sample(&mut self.rng),
                column: self.spec.base_column + self.columns.sample(&mut self.rng),
            })
            .collect();
        Some(IngestBatch {
            index: self.spec.index.clone(),
            field: self.spec.field.clone(),
            bits,
            clear: self.spec.operation == Operation::Clear,
        })
    }
}

/// How a solo ingest run shapes its mutations. Recorded with the artifact so the
/// replay generates the same workload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestParams {
    pub rows: ZipfParams,
    pub columns: ZipfParams,
    pub operation: Operation,
    pub batch_size: usize,
}

impl Default for IngestParams {
    fn default() -> Self {
        Self {
            rows: ZipfParams::default(),
            columns: ZipfParams::default(),
            operation: Operation::Set,
            batch_size: 1000,
        }
    }
}

/// Ingest workload implied by a specs document: every field receives `cardinality`
/// bits over its row range and the index's column range.
///
/// Field `k` (in document order) draws from its own generator seeded with `seed + k`,
/// so the workload is identical across invocations with the same specs and seed.
/// Every field is validated up front; bits are drawn as the iterator is consumed.
pub fn specs_ingest(specs: &Specs, seed: u64, params: &IngestParams) -> DxResult<SpecsIngest> {
    let mut streams = VecDeque::new();
    let mut stream = 0u64;
    for index in specs.indexes() {
        for field in &index.fields {
            let spec = IngestSpec {
                index: index.name.clone(),
                field: field.name.clone(),
                base_row: field.min,
                row_range: field.max - field.min + 1,
                base_column: 0,
                column_range: index.columns,
                iterations: field.cardinality as usize,
                rows: params.rows,
                columns: params.columns,
                operation: params.operation,
            };
            let rng = seeded(derive_seed(seed, stream));
            streams.push_back(spec.stream(rng, params.batch_size)?);
            stream += 1;
        }
    }
    Ok(SpecsIngest { streams })
}

/// Batches of every field in a specs document, field by field.
pub struct SpecsIngest {
    streams: VecDeque<BatchStream>,
}

impl SpecsIngest {
    /// Bits still to be generated.
    pub fn total_bits(&self) -> usize {
        self.streams.iter().map(|s| s.remaining).sum()
    }

    /// Batches still to be generated.
    pub fn batch_count(&self) -> usize {
        self.streams.iter().map(BatchStream::batch_count).sum()
    }
}

impl Iterator for SpecsIngest {
    type Item = IngestBatch;

    fn next(&mut self) -> Option<IngestBatch> {
        while let Some(stream) = self.streams.front_mut() {
            if let Some(batch) = stream.next() {
                return Some(batch);
            }
            self.streams.pop_front();
        }
        None
    }
}

/// One intersect query to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTask {
    pub index: String,
    pub field: String,
    pub rows: Vec<u64>,
}

impl QueryTask {
    pub fn pql(&self) -> String {
        index_client::render_intersect(&self.field, &self.rows)
    }
}

/// `count` row ids drawn uniformly from `[min, max]`; repeats are allowed.
pub fn random_rows<R: Rng + ?Sized>(rng: &mut R, min: u64, max: u64, count: usize) -> Vec<u64> {
    (0..count).map(|_| uniform(rng, min, max)).collect()
}

/// Endless stream of random intersect queries over a holder's catalog.
pub struct QueryGenerator {
    holder: Arc<Holder>,
    rng: StdRng,
    num_rows: usize,
}

impl QueryGenerator {
    pub fn new(holder: Arc<Holder>, seed: u64, num_rows: usize) -> DxResult<Self> {
        if holder.is_empty() {
            return Err(DxError::Schema(format!(
                "{} holder has no fields to query",
                holder.instance()
            )));
        }
        if num_rows == 0 {
            return Err(DxError::Config(
                "rows per intersect must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            holder,
            rng: seeded(seed),
            num_rows,
        })
    }

    fn generate(&mut self) -> DxResult<QueryTask> {
        let (index, field) = self.holder.random_if(&mut self.rng)?;
        let cif = self.holder.new_cif(&index, &field)?;
        let rows = random_rows(&mut self.rng, cif.min, cif.max, self.num_rows);
        Ok(QueryTask { index, field, rows })
    }
}

impl Iterator for QueryGenerator {
    type Item = QueryTask;

    fn next(&mut self) -> Option<QueryTask> {
        match self.generate() {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::error!("could not generate query: {}", e);
                None
            }
        }
    }
}
