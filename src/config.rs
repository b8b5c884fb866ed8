//! Command line and environment configuration.
//!
//! ## Environment Variables
//!
//! The following variables supply defaults for flags that are not given:
//!
//! - `DX_CANDIDATE_HOSTS` - comma separated candidate hosts
//! - `DX_PRIMARY_HOSTS` - comma separated primary hosts
//! - `DX_DATA_DIR` - directory holding recorded runs
//! - `DX_SPECS` - path to the specs document
//!
//! These can be set in a `.env` file in the working directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use index_client::ContentType;

use crate::adapter::{AdapterOptions, ClientType};
use crate::engine::EngineConfig;
use crate::error::{DxError, DxResult};
use crate::holder::Instance;
use crate::report::ReportFormat;
use crate::workload::{IngestParams, Operation, ZipfParams};
use crate::zipf::ZipfConfig;

pub const ENV_CANDIDATE_HOSTS: &str = "DX_CANDIDATE_HOSTS";
pub const ENV_PRIMARY_HOSTS: &str = "DX_PRIMARY_HOSTS";
pub const ENV_DATA_DIR: &str = "DX_DATA_DIR";
pub const ENV_SPECS: &str = "DX_SPECS";

/// Environment file read before parsing.
pub const ENV_FILE: &str = ".env";

pub const DEFAULT_PORT: u16 = 10101;

/// Load `.env` from `dir` if present.
pub fn load_env(dir: &Path) {
    let env_path = dir.join(ENV_FILE);
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
}

#[derive(Parser, Debug)]
#[command(name = "dxbench", version)]
#[command(about = "Differential benchmark for two bitmap-index deployments", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Candidate hosts, comma separated
    #[arg(long, env = ENV_CANDIDATE_HOSTS, value_delimiter = ',')]
    pub candidate_hosts: Vec<String>,

    /// Port for candidate hosts given without one
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub candidate_port: u16,

    /// Primary hosts, comma separated
    #[arg(long, env = ENV_PRIMARY_HOSTS, value_delimiter = ',')]
    pub primary_hosts: Vec<String>,

    /// Port for primary hosts given without one
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub primary_port: u16,

    /// Directory holding recorded runs
    #[arg(long, env = ENV_DATA_DIR, default_value = ".")]
    pub data_dir: PathBuf,

    /// Specs document describing indexes and fields
    #[arg(long, env = ENV_SPECS)]
    pub specs: Option<PathBuf>,

    /// Concurrent workers
    #[arg(short = 't', long, default_value_t = 1)]
    pub threads: usize,

    /// RNG seed
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// `single` or `round_robin`
    #[arg(long, default_value = "single")]
    pub client_type: ClientType,

    /// `binary` or `textual`
    #[arg(long, default_value = "binary")]
    pub content_type: ContentType,

    /// Per-call deadline in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub timeout_ms: u64,

    /// Consecutive adapter failures tolerated before the run aborts
    #[arg(long, default_value_t = 10)]
    pub max_failures: usize,

    /// Run against the candidate instance
    #[arg(long, conflicts_with = "primary")]
    pub candidate: bool,

    /// Run against the primary instance
    #[arg(long)]
    pub primary: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
}

impl GlobalArgs {
    pub fn instance(&self) -> DxResult<Instance> {
        match (self.candidate, self.primary) {
            (true, false) => Ok(Instance::Candidate),
            (false, true) => Ok(Instance::Primary),
            _ => Err(DxError::Config(
                "exactly one of --candidate or --primary is required".to_string(),
            )),
        }
    }

    /// Hosts and default port configured for `instance`.
    pub fn hosts_for(&self, instance: Instance) -> DxResult<(&[String], u16)> {
        let (hosts, port) = match instance {
            Instance::Candidate => (&self.candidate_hosts, self.candidate_port),
            Instance::Primary => (&self.primary_hosts, self.primary_port),
        };
        if hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(DxError::Config(format!(
                "no {} hosts configured (--{}-hosts)",
                instance, instance
            )));
        }
        Ok((hosts.as_slice(), port))
    }

    pub fn specs_path(&self) -> DxResult<&Path> {
        self.specs
            .as_deref()
            .ok_or_else(|| DxError::Config("a specs file is required (--specs)".to_string()))
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            client_type: self.client_type,
            content_type: self.content_type,
            timeout: Duration::from_millis(self.timeout_ms),
            max_failures: self.max_failures,
            pool_size: self.threads.max(1),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            data_dir: self.data_dir.clone(),
            threads: self.threads.max(1),
            seed: self.seed,
            format: self.format,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest the specs workload, or replay a recorded ingest on the other instance
    Ingest(IngestArgs),
    /// Run random intersect queries, or replay recorded ones on the other instance
    Query(QueryArgs),
    /// Compare two recorded runs
    Compare(CompareArgs),
    /// Set random bits following a Zipf distribution
    Zipf(ZipfArgs),
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Batch sizes; one benchmark is recorded per entry
    #[arg(short = 'q', long = "queries", value_delimiter = ',', default_values_t = [100, 1000])]
    pub queries: Vec<usize>,

    /// Rows per intersect query
    #[arg(short = 'r', long, default_value_t = 2)]
    pub rows: usize,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Mutations per ingest batch
    #[arg(long, default_value_t = 1000)]
    pub batch_size: usize,

    /// `set` or `clear`
    #[arg(long, default_value = "set")]
    pub operation: Operation,

    #[arg(long, default_value_t = 1.01)]
    pub row_exponent: f64,

    #[arg(long, default_value_t = 0.25)]
    pub row_ratio: f64,

    #[arg(long, default_value_t = 1.01)]
    pub column_exponent: f64,

    #[arg(long, default_value_t = 0.25)]
    pub column_ratio: f64,
}

impl IngestArgs {
    pub fn params(&self) -> IngestParams {
        IngestParams {
            rows: ZipfParams {
                exponent: self.row_exponent,
                ratio: self.row_ratio,
            },
            columns: ZipfParams {
                exponent: self.column_exponent,
                ratio: self.column_ratio,
            },
            operation: self.operation,
            batch_size: self.batch_size.max(1),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    pub file1: PathBuf,
    pub file2: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ZipfArgs {
    /// Hosts to send bits to
    #[arg(long, value_delimiter = ',', default_value = "localhost:10101")]
    pub hosts: Vec<String>,

    /// Number of concurrent agents
    #[arg(long, default_value_t = 1)]
    pub agent_num: usize,

    /// Rows being set will all be at least this
    #[arg(long, alias = "base-bitmap-id", default_value_t = 0)]
    pub base_row_id: u64,

    /// Number of possible row ids
    #[arg(long, alias = "bitmap-id-range", default_value_t = 100_000)]
    pub row_id_range: u64,

    /// Column id to start from
    #[arg(long, alias = "base-profile-id", default_value_t = 0)]
    pub base_column_id: u64,

    /// Number of possible column ids
    #[arg(long, alias = "profile-id-range", default_value_t = 100_000)]
    pub column_id_range: u64,

    /// Bits per agent
    #[arg(long, default_value_t = 100)]
    pub iterations: usize,

    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    #[arg(long, default_value = "benchindex")]
    pub index: String,

    #[arg(long, alias = "frame", default_value = "zipf")]
    pub field: String,

    #[arg(long, alias = "bitmap-exponent", default_value_t = 1.01)]
    pub row_exponent: f64,

    #[arg(long, alias = "bitmap-ratio", default_value_t = 0.25)]
    pub row_ratio: f64,

    #[arg(long, alias = "profile-exponent", default_value_t = 1.01)]
    pub column_exponent: f64,

    #[arg(long, alias = "profile-ratio", default_value_t = 0.25)]
    pub column_ratio: f64,

    /// `single` (every agent hits the first host) or `round_robin`
    #[arg(long, default_value = "single")]
    pub client_type: ClientType,

    /// `set` or `clear`
    #[arg(long, default_value = "set")]
    pub operation: Operation,

    /// `binary` or `textual`
    #[arg(long, default_value = "binary")]
    pub content_type: ContentType,
}

impl ZipfArgs {
    pub fn config(&self) -> ZipfConfig {
        ZipfConfig {
            hosts: self.hosts.clone(),
            agent_num: self.agent_num.max(1),
            base_row_id: self.base_row_id,
            row_id_range: self.row_id_range,
            base_column_id: self.base_column_id,
            column_id_range: self.column_id_range,
            iterations: self.iterations,
            seed: self.seed,
            index: self.index.clone(),
            field: self.field.clone(),
            rows: ZipfParams {
                exponent: self.row_exponent,
                ratio: self.row_ratio,
            },
            columns: ZipfParams {
                exponent: self.column_exponent,
                ratio: self.column_ratio,
            },
            client_type: self.client_type,
            operation: self.operation,
            content_type: self.content_type,
        }
    }

    /// Connection settings for the zipf agents; `global` supplies the deadline and
    /// failure threshold.
    pub fn adapter_options(&self, global: &GlobalArgs) -> AdapterOptions {
        AdapterOptions {
            client_type: self.client_type,
            content_type: self.content_type,
            pool_size: self.agent_num.max(1),
            ..global.adapter_options()
        }
    }
}
