use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{LoaderError, Result};

/// Position of a vector in the source dataset.
pub type Identifier = u64;

/// A dataset row: its coordinates plus its 0-based dataset position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVector {
    pub identifier: Identifier,
    pub values: Vec<f32>,
}

impl DatasetVector {
    pub fn new(identifier: Identifier, values: Vec<f32>) -> Self {
        Self { identifier, values }
    }

    /// Number each row by its position in `rows`.
    pub fn enumerate(rows: Vec<Vec<f32>>) -> Vec<DatasetVector> {
        rows.into_iter()
            .enumerate()
            .map(|(i, values)| DatasetVector::new(i as Identifier, values))
            .collect()
    }
}

/// Benchmark-side metric names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Euclidean,
    Angular,
}

impl FromStr for Metric {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "euclidean" => Ok(Metric::Euclidean),
            "angular" => Ok(Metric::Angular),
            other => Err(LoaderError::UnsupportedMetric {
                metric: other.to_string(),
            }),
        }
    }
}

impl Metric {
    /// The database distance function used to rank neighbors for this metric.
    pub fn distance(self) -> DistanceMetric {
        match self {
            Metric::Euclidean => DistanceMetric::L2Squared,
            Metric::Angular => DistanceMetric::Cosine,
        }
    }
}

/// Distance function identifiers understood by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    #[serde(rename = "l2-squared")]
    L2Squared,
    #[serde(rename = "cosine")]
    Cosine,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::L2Squared => write!(f, "l2-squared"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

/// Index parameters supplied by the caller before the metric is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    pub class_name: String,
    pub ef_construction: u32,
    pub max_connections: u32,
    pub ef: u32,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            class_name: "Index".to_string(),
            ef_construction: 128,
            max_connections: 16,
            ef: 64,
        }
    }
}

impl IndexParams {
    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    /// Resolve `metric` and freeze the parameters into an [`IndexConfig`].
    pub fn resolve(self, metric: &str) -> Result<IndexConfig> {
        let metric: Metric = metric.parse()?;
        for (name, value) in [
            ("efConstruction", self.ef_construction),
            ("maxConnections", self.max_connections),
            ("ef", self.ef),
        ] {
            if value == 0 {
                return Err(LoaderError::Config(format!("{name} must be positive")));
            }
        }
        if !is_valid_class_name(&self.class_name) {
            return Err(LoaderError::Config(format!(
                "invalid class name {:?}: must start with an uppercase letter and contain only letters, digits or '_'",
                self.class_name
            )));
        }
        Ok(IndexConfig {
            class_name: self.class_name,
            distance_metric: metric.distance(),
            ef_construction: self.ef_construction,
            max_connections: self.max_connections,
            ef: self.ef,
        })
    }
}

/// Weaviate class names: an uppercase ASCII letter followed by ASCII
/// letters, digits or underscores. The server capitalizes anything else,
/// after which GraphQL lookups by the original name no longer match.
pub fn is_valid_class_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Fully resolved collection configuration. Fields are read-only after
/// resolution; the class name is the only thing `with_class_name` may swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexConfig {
    class_name: String,
    distance_metric: DistanceMetric,
    ef_construction: u32,
    max_connections: u32,
    ef: u32,
}

impl IndexConfig {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn distance_metric(&self) -> DistanceMetric {
        self.distance_metric
    }

    pub fn ef_construction(&self) -> u32 {
        self.ef_construction
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn ef(&self) -> u32 {
        self.ef
    }

    pub(crate) fn with_class_name(&self, class_name: &str) -> IndexConfig {
        IndexConfig {
            class_name: class_name.to_string(),
            ..self.clone()
        }
    }

    /// The `vectorIndexConfig` object sent at class creation.
    pub fn vector_index_config(&self) -> serde_json::Value {
        serde_json::json!({
            "distance": self.distance_metric,
            "ef": self.ef,
            "efConstruction": self.ef_construction,
            "maxConnections": self.max_connections,
        })
    }
}

/// Index parameters that can be changed on an existing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryParameter {
    Ef,
    DynamicEfMin,
    DynamicEfMax,
    DynamicEfFactor,
    FlatSearchCutoff,
}

impl QueryParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryParameter::Ef => "ef",
            QueryParameter::DynamicEfMin => "dynamicEfMin",
            QueryParameter::DynamicEfMax => "dynamicEfMax",
            QueryParameter::DynamicEfFactor => "dynamicEfFactor",
            QueryParameter::FlatSearchCutoff => "flatSearchCutoff",
        }
    }

    /// Parse a parameter name, rejecting build-time and unknown parameters.
    pub fn parse(class: &str, name: &str) -> Result<Self> {
        match name {
            "ef" => Ok(QueryParameter::Ef),
            "dynamicEfMin" => Ok(QueryParameter::DynamicEfMin),
            "dynamicEfMax" => Ok(QueryParameter::DynamicEfMax),
            "dynamicEfFactor" => Ok(QueryParameter::DynamicEfFactor),
            "flatSearchCutoff" => Ok(QueryParameter::FlatSearchCutoff),
            "efConstruction" | "maxConnections" | "distance" => Err(LoaderError::schema(
                class,
                format!("{name} is fixed at creation time"),
            )),
            other => Err(LoaderError::schema(
                class,
                format!("unknown index parameter: {other}"),
            )),
        }
    }
}

impl std::fmt::Display for QueryParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One permanently failed vector and the reason reported for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub identifier: Identifier,
    pub message: String,
}

/// Outcome of [`crate::loader::IndexLoader::upload_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub succeeded: usize,
    pub failed: Vec<UploadFailure>,
    pub chunks: usize,
    pub retries: usize,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_identifiers(&self) -> Vec<Identifier> {
        self.failed.iter().map(|f| f.identifier).collect()
    }
}
