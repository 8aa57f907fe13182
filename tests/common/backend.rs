use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use index_loader::backend::{ItemStatus, VectorBackend};
use index_loader::error::{LoaderError, Result};
use index_loader::types::{DatasetVector, DistanceMetric, IndexConfig, QueryParameter};

/// A class held in memory.
#[derive(Debug, Clone)]
pub struct MemClass {
    pub config: IndexConfig,
    pub objects: BTreeMap<u64, Vec<f32>>,
    pub params: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct Inner {
    classes: HashMap<String, MemClass>,
    unreachable: bool,
    not_ready: bool,
    reject_create: Option<String>,
    /// Classes whose deletion fails with a server error.
    undeletable: HashSet<String>,
    parameter_updates: usize,
    /// Identifier -> remaining transport failures for the chunk holding it.
    transport_faults: HashMap<u64, usize>,
    /// Identifier -> HTTP status returned for the chunk holding it, every time.
    chunk_rejections: HashMap<u64, u16>,
    rejected_items: HashSet<u64>,
    batch_delay: Option<Duration>,
    batch_attempts: Vec<Vec<u64>>,
    create_calls: usize,
}

/// In-memory `VectorBackend` with fault injection. Clones share state, so a
/// test keeps one clone to inspect what the loader did.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn VectorBackend> {
        Box::new(self.clone())
    }

    pub fn set_unreachable(&self) {
        self.inner.lock().unwrap().unreachable = true;
    }

    pub fn set_not_ready(&self, not_ready: bool) {
        self.inner.lock().unwrap().not_ready = not_ready;
    }

    pub fn reject_create(&self, reason: &str) {
        self.inner.lock().unwrap().reject_create = Some(reason.to_string());
    }

    pub fn fail_delete(&self, class: &str, failing: bool) {
        let mut inner = self.inner.lock().unwrap();
        if failing {
            inner.undeletable.insert(class.to_string());
        } else {
            inner.undeletable.remove(class);
        }
    }

    /// Remove a class without going through the loader.
    pub fn drop_class(&self, class: &str) {
        self.inner.lock().unwrap().classes.remove(class);
    }

    pub fn parameter_updates(&self) -> usize {
        self.inner.lock().unwrap().parameter_updates
    }

    /// Fail the chunk containing `identifier` at the transport level
    /// `times` times (use `usize::MAX` for a permanent failure).
    pub fn fail_chunk_with(&self, identifier: u64, times: usize) {
        self.inner
            .lock()
            .unwrap()
            .transport_faults
            .insert(identifier, times);
    }

    /// Reject the whole chunk containing `identifier` with `status`.
    pub fn reject_chunk_with(&self, identifier: u64, status: u16) {
        self.inner
            .lock()
            .unwrap()
            .chunk_rejections
            .insert(identifier, status);
    }

    pub fn reject_item(&self, identifier: u64) {
        self.inner.lock().unwrap().rejected_items.insert(identifier);
    }

    pub fn delay_batches(&self, delay: Duration) {
        self.inner.lock().unwrap().batch_delay = Some(delay);
    }

    pub fn insert_class(&self, config: IndexConfig) {
        self.inner.lock().unwrap().classes.insert(
            config.class_name().to_string(),
            MemClass {
                config,
                objects: BTreeMap::new(),
                params: HashMap::new(),
            },
        );
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().unwrap().classes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn class(&self, name: &str) -> Option<MemClass> {
        self.inner.lock().unwrap().classes.get(name).cloned()
    }

    /// Identifiers of every batch request, in order, including failed attempts.
    pub fn batch_attempts(&self) -> Vec<Vec<u64>> {
        self.inner.lock().unwrap().batch_attempts.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.inner.lock().unwrap().create_calls
    }
}

fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::L2Squared => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        DistanceMetric::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if na == 0.0 || nb == 0.0 {
                1.0
            } else {
                1.0 - dot / (na * nb)
            }
        }
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn ready(&self) -> Result<()> {
        if self.inner.lock().unwrap().unreachable {
            return Err(LoaderError::Connection {
                url: "memory://".into(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn delete_class(&self, class: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.undeletable.contains(class) {
            return Err(LoaderError::Status {
                status: 500,
                body: format!("cannot delete {class}"),
            });
        }
        inner.classes.remove(class);
        Ok(())
    }

    async fn create_class(&self, config: &IndexConfig) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls += 1;
        if let Some(reason) = &inner.reject_create {
            return Err(LoaderError::Status {
                status: 422,
                body: reason.clone(),
            });
        }
        if inner.classes.contains_key(config.class_name()) {
            return Err(LoaderError::Status {
                status: 422,
                body: format!("class {} already exists", config.class_name()),
            });
        }
        inner.classes.insert(
            config.class_name().to_string(),
            MemClass {
                config: config.clone(),
                objects: BTreeMap::new(),
                params: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn class_exists(&self, class: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().classes.contains_key(class))
    }

    async fn batch_insert(
        &self,
        class: &str,
        vectors: &[DatasetVector],
    ) -> Result<Vec<ItemStatus>> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .batch_attempts
                .push(vectors.iter().map(|v| v.identifier).collect());
            inner.batch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        for v in vectors {
            if let Some(status) = inner.chunk_rejections.get(&v.identifier) {
                return Err(LoaderError::Status {
                    status: *status,
                    body: "batch rejected".into(),
                });
            }
            if let Some(remaining) = inner.transport_faults.get_mut(&v.identifier) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(LoaderError::Status {
                        status: 503,
                        body: "upstream unavailable".into(),
                    });
                }
            }
        }

        let rejected = inner.rejected_items.clone();
        let Some(target) = inner.classes.get_mut(class) else {
            return Err(LoaderError::Status {
                status: 422,
                body: format!("class {class} not found"),
            });
        };

        Ok(vectors
            .iter()
            .map(|v| {
                if rejected.contains(&v.identifier) {
                    ItemStatus::rejected(v.identifier, format!("invalid vector {}", v.identifier))
                } else {
                    target.objects.insert(v.identifier, v.values.clone());
                    ItemStatus::ok(v.identifier)
                }
            })
            .collect())
    }

    async fn update_index_parameter(
        &self,
        class: &str,
        parameter: QueryParameter,
        value: u64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.parameter_updates += 1;
        let Some(target) = inner.classes.get_mut(class) else {
            return Err(LoaderError::Status {
                status: 404,
                body: format!("class {class} not found"),
            });
        };
        target.params.insert(parameter.as_str().to_string(), value);
        Ok(())
    }

    async fn near_vector(&self, class: &str, vector: &[f32], limit: usize) -> Result<Vec<u64>> {
        let inner = self.inner.lock().unwrap();
        if inner.not_ready {
            return Err(LoaderError::NotReady {
                class: class.to_string(),
            });
        }
        let Some(target) = inner.classes.get(class) else {
            return Err(LoaderError::Query(format!("class {class} not found")));
        };

        let metric = target.config.distance_metric();
        let mut scored: Vec<(f32, u64)> = target
            .objects
            .iter()
            .map(|(id, values)| (distance(metric, vector, values), *id))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(scored.into_iter().take(limit).map(|(_, id)| id).collect())
    }

    async fn delete_all(&self) -> Result<()> {
        self.inner.lock().unwrap().classes.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "Memory"
    }

    fn endpoint(&self) -> &str {
        "memory://"
    }
}
