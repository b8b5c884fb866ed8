use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use index_client::FieldOptions;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterOptions, HostPool, IndexClient};
use crate::error::{DxError, DxResult};
use crate::specs::Specs;

/// Which of the two compared deployments a run is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instance {
    Candidate,
    Primary,
}

impl Instance {
    pub fn other(self) -> Instance {
        match self {
            Instance::Candidate => Instance::Primary,
            Instance::Primary => Instance::Candidate,
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Candidate => write!(f, "candidate"),
            Instance::Primary => write!(f, "primary"),
        }
    }
}

impl FromStr for Instance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "candidate" => Ok(Instance::Candidate),
            "primary" => Ok(Instance::Primary),
            other => Err(format!("invalid instance type: {}", other)),
        }
    }
}

/// Query context: one field of one index with its row-id range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cif {
    pub index: String,
    pub field: String,
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RowRange {
    min: u64,
    max: u64,
}

/// Schema catalog of one instance. Immutable once built.
pub struct Holder {
    instance: Instance,
    client: Arc<dyn IndexClient>,
    catalog: BTreeMap<String, BTreeMap<String, RowRange>>,
    pairs: Vec<(String, String)>,
}

impl Holder {
    /// Connect to `hosts` and build the catalog declared by `specs`.
    pub async fn connect(
        instance: Instance,
        hosts: &[String],
        port: u16,
        specs: &Specs,
        options: &AdapterOptions,
    ) -> DxResult<Self> {
        let pool = HostPool::connect(hosts, port, options)?;
        tracing::info!("Building {} holder on {}", instance, pool.hosts().join(", "));
        Self::build(instance, Arc::new(pool), specs).await
    }

    /// Ensure every index and field in `specs` exists through `client`.
    pub async fn build(
        instance: Instance,
        client: Arc<dyn IndexClient>,
        specs: &Specs,
    ) -> DxResult<Self> {
        let mut catalog: BTreeMap<String, BTreeMap<String, RowRange>> = BTreeMap::new();
        let options = FieldOptions::default();

        for index in specs.indexes() {
            client.ensure_index(&index.name).await.map_err(into_schema)?;
            let fields = catalog.entry(index.name.clone()).or_default();
            for field in &index.fields {
                client
                    .ensure_field(&index.name, &field.name, &options)
                    .await
                    .map_err(into_schema)?;
                fields.insert(
                    field.name.clone(),
                    RowRange {
                        min: field.min,
                        max: field.max,
                    },
                );
            }
        }

        let pairs = catalog
            .iter()
            .flat_map(|(index, fields)| fields.keys().map(move |f| (index.clone(), f.clone())))
            .collect::<Vec<_>>();
        tracing::debug!(
            "{} holder ready: {} indexes, {} fields",
            instance,
            catalog.len(),
            pairs.len()
        );

        Ok(Self {
            instance,
            client,
            catalog,
            pairs,
        })
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    pub fn client(&self) -> &Arc<dyn IndexClient> {
        &self.client
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Uniformly chosen `(index, field)` pair.
    pub fn random_if<R: Rng + ?Sized>(&self, rng: &mut R) -> DxResult<(String, String)> {
        if self.pairs.is_empty() {
            return Err(DxError::Schema(format!(
                "{} holder has no fields to query",
                self.instance
            )));
        }
        let pair = &self.pairs[rng.gen_range(0..self.pairs.len())];
        Ok(pair.clone())
    }

    pub fn new_cif(&self, index: &str, field: &str) -> DxResult<Cif> {
        let range = self
            .catalog
            .get(index)
            .and_then(|fields| fields.get(field))
            .ok_or_else(|| {
                DxError::Schema(format!(
                    "index {} and field {} not found in {} holder",
                    index, field, self.instance
                ))
            })?;
        Ok(Cif {
            index: index.to_string(),
            field: field.to_string(),
            min: range.min,
            max: range.max,
        })
    }
}

fn into_schema(err: DxError) -> DxError {
    match err {
        DxError::Schema(_) => err,
        other => DxError::Schema(other.to_string()),
    }
}
