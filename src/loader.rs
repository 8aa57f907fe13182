//! The benchmark-facing `IndexLoader`.
//!
//! Lifecycle: `configure` -> `provision` -> `upload_all` -> any number of
//! `set_query_parameter` / `query` rounds -> `teardown`. One loader owns one
//! database handle. Calls on a single loader must be serialized by the
//! caller; mutating operations take `&mut self` so the borrow checker
//! enforces this within a task.

use std::time::Duration;

use backon::ExponentialBuilder;
use futures::future::BoxFuture;
use tracing::{debug, info, instrument, warn};

use crate::backend::{VectorBackend, WeaviateBackend};
use crate::config::{Config, LoaderOptions};
use crate::error::{LoaderError, Result};
use crate::types::{
    is_valid_class_name, DatasetVector, Identifier, IndexConfig, IndexParams, QueryParameter,
    UploadReport,
};
use crate::upload::{upload_chunks, BatchUploadState};

/// Where a loader is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoaderState {
    /// Connected, no collection.
    Configured,
    /// Collection created, nothing uploaded yet.
    Provisioned,
    /// Collection created and at least one upload has run.
    Queryable,
}

pub struct IndexLoader {
    backend: Box<dyn VectorBackend>,
    index: IndexConfig,
    batch_size: usize,
    options: LoaderOptions,
    retry_policy: ExponentialBuilder,
    state: LoaderState,
    collection: Option<String>,
    ef: u64,
}

impl IndexLoader {
    /// Resolve `metric`, connect to the Weaviate instance at `url` and probe
    /// that it is ready. No schema operation is issued.
    pub async fn configure(
        metric: &str,
        url: &str,
        batch_size: usize,
        params: IndexParams,
    ) -> Result<Self> {
        Self::configure_with_options(metric, url, batch_size, params, LoaderOptions::default())
            .await
    }

    pub async fn configure_with_options(
        metric: &str,
        url: &str,
        batch_size: usize,
        params: IndexParams,
        options: LoaderOptions,
    ) -> Result<Self> {
        let index = params.resolve(metric)?;
        let backend = WeaviateBackend::new(url, options.request_timeout, options.connect_timeout)?;
        Self::with_backend(index, Box::new(backend), batch_size, options).await
    }

    /// Configure from a loaded [`Config`]; the metric is supplied per run.
    pub async fn from_config(metric: &str, config: &Config) -> Result<Self> {
        Self::configure_with_options(
            metric,
            &config.database.url,
            config.upload.batch_size,
            config.index_params(),
            config.loader_options(),
        )
        .await
    }

    /// Open a loader over an arbitrary backend.
    #[instrument(skip_all, fields(backend = backend.name(), endpoint = backend.endpoint()))]
    pub async fn with_backend(
        index: IndexConfig,
        backend: Box<dyn VectorBackend>,
        batch_size: usize,
        options: LoaderOptions,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(LoaderError::Config("batch size must be positive".into()));
        }

        match tokio::time::timeout(options.connect_timeout, backend.ready()).await {
            Ok(Ok(())) => {}
            Ok(Err(LoaderError::Connection { url, reason })) => {
                return Err(LoaderError::Connection { url, reason })
            }
            Ok(Err(other)) => {
                return Err(LoaderError::Connection {
                    url: backend.endpoint().to_string(),
                    reason: other.to_string(),
                })
            }
            Err(_) => {
                return Err(LoaderError::Connection {
                    url: backend.endpoint().to_string(),
                    reason: format!("readiness probe timed out after {:?}", options.connect_timeout),
                })
            }
        }

        info!(
            distance = %index.distance_metric(),
            batch_size,
            "loader configured"
        );

        let retry_policy = ExponentialBuilder::from(&options.retry);
        let ef = u64::from(index.ef());
        Ok(Self {
            backend,
            index,
            batch_size,
            options,
            retry_policy,
            state: LoaderState::Configured,
            collection: None,
            ef,
        })
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn index_config(&self) -> &IndexConfig {
        &self.index
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Name of the provisioned collection, if any.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Current query-time search breadth.
    pub fn ef(&self) -> u64 {
        self.ef
    }

    fn request_timeout(&self) -> Duration {
        self.options.request_timeout
    }

    /// Bound a backend call by the request timeout.
    async fn bounded<T>(&self, fut: BoxFuture<'_, Result<T>>) -> Result<T> {
        let timeout = self.request_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LoaderError::Timeout(timeout)),
        }
    }

    /// Replace any collection named `class_name` with a fresh, empty one.
    ///
    /// If creation fails the collection is deleted again, so a failed
    /// provision never leaves a half-configured class behind.
    #[instrument(skip(self))]
    pub async fn provision(&mut self, class_name: &str) -> Result<()> {
        if !is_valid_class_name(class_name) {
            return Err(LoaderError::schema(
                class_name,
                "class names must start with an uppercase letter and contain only letters, digits or '_'",
            ));
        }
        let config = self.index.with_class_name(class_name);

        // The loader keeps tracking a class until the server confirms it is gone.
        if let Some(previous) = self.collection.clone() {
            if previous != class_name {
                debug!(previous = %previous, "dropping previously provisioned class");
                self.bounded(self.backend.delete_class(&previous))
                    .await
                    .map_err(|e| as_schema_error(&previous, e))?;
                self.collection = None;
                self.state = LoaderState::Configured;
            }
        }

        self.bounded(self.backend.delete_class(class_name))
            .await
            .map_err(|e| as_schema_error(class_name, e))?;
        self.collection = None;
        self.state = LoaderState::Configured;

        if let Err(e) = self.bounded(self.backend.create_class(&config)).await {
            if let Err(cleanup) = self.bounded(self.backend.delete_class(class_name)).await {
                warn!(error = %cleanup, "cleanup after failed create also failed");
            }
            return Err(as_schema_error(class_name, e));
        }

        info!(
            distance = %config.distance_metric(),
            ef_construction = config.ef_construction(),
            max_connections = config.max_connections(),
            ef = config.ef(),
            "class provisioned"
        );
        self.ef = u64::from(config.ef());
        self.index = config;
        self.collection = Some(class_name.to_string());
        self.state = LoaderState::Provisioned;
        Ok(())
    }

    /// Upload `vectors` in chunks of at most `batch_size`.
    ///
    /// Always returns a full report once a collection exists, even when
    /// every chunk failed; callers inspect the report to decide success.
    pub async fn upload_all(&mut self, vectors: &[DatasetVector]) -> Result<UploadReport> {
        let class = match &self.collection {
            Some(c) => c.clone(),
            None => {
                return Err(LoaderError::schema(
                    self.index.class_name(),
                    "collection has not been provisioned",
                ))
            }
        };

        let report = upload_chunks(
            self.backend.as_ref(),
            &class,
            vectors,
            self.request_timeout(),
            self.retry_policy,
            BatchUploadState::new(self.batch_size),
        )
        .await;

        self.state = LoaderState::Queryable;
        Ok(report)
    }

    /// Change a query-time index parameter such as `ef` on the collection.
    #[instrument(skip(self))]
    pub async fn set_query_parameter(&mut self, name: &str, value: u64) -> Result<()> {
        let class = match &self.collection {
            Some(c) => c.clone(),
            None => {
                return Err(LoaderError::schema(
                    self.index.class_name(),
                    "collection does not exist yet",
                ))
            }
        };

        let parameter = QueryParameter::parse(&class, name)?;
        if value == 0 {
            return Err(LoaderError::schema(&class, format!("{parameter} must be positive")));
        }

        let exists = self
            .bounded(self.backend.class_exists(&class))
            .await
            .map_err(|e| as_schema_error(&class, e))?;
        if !exists {
            return Err(LoaderError::schema(&class, "class does not exist on the server"));
        }

        self.bounded(self.backend.update_index_parameter(&class, parameter, value))
            .await
            .map_err(|e| as_schema_error(&class, e))?;

        if parameter == QueryParameter::Ef {
            self.ef = value;
        }
        debug!(%parameter, value, "index parameter updated");
        Ok(())
    }

    /// The `top_k` nearest identifiers to `vector`, in the database's rank
    /// order.
    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Identifier>> {
        let Some(class) = self.collection.as_deref() else {
            return Err(LoaderError::Query("no collection has been provisioned".into()));
        };
        if top_k == 0 {
            return Err(LoaderError::Query("top_k must be positive".into()));
        }

        let timer = crate::metrics::QUERY_DURATION
            .with_label_values(&[class])
            .start_timer();
        let result = self
            .bounded(self.backend.near_vector(class, vector, top_k))
            .await;
        timer.observe_duration();

        let status = if result.is_ok() { "ok" } else { "error" };
        crate::metrics::QUERIES_TOTAL
            .with_label_values(&[class, status])
            .inc();

        result.map_err(|e| match e {
            LoaderError::NotReady { .. } | LoaderError::Query(_) => e,
            other => LoaderError::Query(other.to_string()),
        })
    }

    /// Delete the collection. Calling this with no collection is a no-op.
    #[instrument(skip(self))]
    pub async fn teardown(&mut self) -> Result<()> {
        if let Some(class) = self.collection.clone() {
            self.bounded(self.backend.delete_class(&class))
                .await
                .map_err(|e| as_schema_error(&class, e))?;
            self.collection = None;
            info!(class = %class, "class deleted");
        }
        self.state = LoaderState::Configured;
        Ok(())
    }

    /// Delete every class in the database, not only the one this loader
    /// provisioned.
    #[instrument(skip(self))]
    pub async fn purge_all(&mut self) -> Result<()> {
        self.bounded(self.backend.delete_all()).await?;
        self.collection = None;
        self.state = LoaderState::Configured;
        warn!("all classes deleted");
        Ok(())
    }

    /// Tear down and release the database handle.
    pub async fn close(mut self) -> Result<()> {
        self.teardown().await
    }

    /// Run `f` against this loader, then close it whether or not `f`
    /// succeeded. The first error wins.
    pub async fn session<T, F>(mut self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut IndexLoader) -> BoxFuture<'a, Result<T>>,
    {
        let result = f(&mut self).await;
        let closed = self.close().await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "close after failed session also failed");
                Err(e)
            }
        }
    }
}

fn as_schema_error(class: &str, err: LoaderError) -> LoaderError {
    match err {
        LoaderError::Schema { .. } => err,
        other => LoaderError::schema(class, other.to_string()),
    }
}

impl std::fmt::Display for IndexLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(url={}, batch={})",
            self.backend.name(),
            self.backend.endpoint(),
            self.batch_size
        )
    }
}

impl std::fmt::Debug for IndexLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLoader")
            .field("backend", &self.backend.name())
            .field("endpoint", &self.backend.endpoint())
            .field("index", &self.index)
            .field("batch_size", &self.batch_size)
            .field("state", &self.state)
            .field("collection", &self.collection)
            .finish()
    }
}
