//! Chunked batch upload with per-chunk retry and per-item failure isolation.

use std::collections::HashMap;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, info, instrument, warn};

use crate::backend::{ItemStatus, VectorBackend};
use crate::error::{LoaderError, Result};
use crate::types::{DatasetVector, Identifier, UploadFailure, UploadReport};

/// Bookkeeping for one `upload_all` call.
#[derive(Debug)]
pub(crate) struct BatchUploadState {
    batch_size: usize,
    succeeded: usize,
    errors: Vec<UploadFailure>,
    chunks: usize,
    retries: usize,
}

impl BatchUploadState {
    pub(crate) fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            succeeded: 0,
            errors: Vec::new(),
            chunks: 0,
            retries: 0,
        }
    }

    /// Fold the per-item statuses of an acknowledged chunk into the state.
    /// Objects the database did not report on count as failed.
    fn record_statuses(&mut self, chunk: &[DatasetVector], statuses: Vec<ItemStatus>) -> usize {
        let by_id: HashMap<Identifier, Vec<String>> = statuses
            .into_iter()
            .map(|s| (s.identifier, s.errors))
            .collect();

        let before = self.errors.len();
        for vector in chunk {
            match by_id.get(&vector.identifier) {
                Some(errors) if errors.is_empty() => self.succeeded += 1,
                Some(errors) => self.reject(vector.identifier, errors.join("; ")),
                None => self.reject(vector.identifier, "no status returned for object".into()),
            }
        }
        self.errors.len() - before
    }

    /// Mark every item of a chunk failed with the same cause.
    fn record_chunk_failure(&mut self, chunk: &[DatasetVector], cause: &LoaderError) {
        let message = cause.to_string();
        for vector in chunk {
            self.errors.push(UploadFailure {
                identifier: vector.identifier,
                message: message.clone(),
            });
        }
    }

    fn reject(&mut self, identifier: Identifier, message: String) {
        let err = LoaderError::UploadItem {
            identifier,
            message: message.clone(),
        };
        warn!(error = %err, "object rejected");
        self.errors.push(UploadFailure {
            identifier,
            message,
        });
    }

    pub(crate) fn into_report(self) -> UploadReport {
        UploadReport {
            succeeded: self.succeeded,
            failed: self.errors,
            chunks: self.chunks,
            retries: self.retries,
        }
    }
}

/// Issue one batch request, bounded by `timeout`.
async fn write_chunk(
    backend: &dyn VectorBackend,
    class: &str,
    chunk: &[DatasetVector],
    timeout: Duration,
) -> Result<Vec<ItemStatus>> {
    match tokio::time::timeout(timeout, backend.batch_insert(class, chunk)).await {
        Ok(result) => result,
        Err(_) => Err(LoaderError::Timeout(timeout)),
    }
}

/// Upload `vectors` in consecutive chunks of at most `state.batch_size`.
///
/// Transport failures are retried under `retry_policy`; once exhausted, the
/// whole chunk is reported failed and the next chunk is attempted. This
/// never returns early: the report accounts for every vector.
#[instrument(skip(backend, class, vectors, retry_policy, state), fields(class = class, vectors = vectors.len()))]
pub(crate) async fn upload_chunks(
    backend: &dyn VectorBackend,
    class: &str,
    vectors: &[DatasetVector],
    request_timeout: Duration,
    retry_policy: ExponentialBuilder,
    mut state: BatchUploadState,
) -> UploadReport {
    for (index, chunk) in vectors.chunks(state.batch_size).enumerate() {
        state.chunks += 1;
        let mut retries = 0usize;

        let outcome = (|| write_chunk(backend, class, chunk, request_timeout))
            .retry(retry_policy)
            .when(LoaderError::is_transient)
            .notify(|err: &LoaderError, after: Duration| {
                retries += 1;
                crate::metrics::CHUNK_RETRIES_TOTAL.inc();
                warn!(chunk = index, error = %err, ?after, "chunk write failed, retrying");
            })
            .await;
        state.retries += retries;

        match outcome {
            Ok(statuses) => {
                let rejected = state.record_statuses(chunk, statuses);
                crate::metrics::CHUNKS_TOTAL
                    .with_label_values(&[class, "ok"])
                    .inc();
                crate::metrics::UPLOADED_ITEMS_TOTAL
                    .with_label_values(&[class, "ok"])
                    .inc_by((chunk.len() - rejected) as u64);
                crate::metrics::UPLOADED_ITEMS_TOTAL
                    .with_label_values(&[class, "rejected"])
                    .inc_by(rejected as u64);
                debug!(chunk = index, size = chunk.len(), rejected, retries, "chunk written");
            }
            Err(err) => {
                warn!(chunk = index, size = chunk.len(), error = %err, retries, "chunk failed permanently");
                state.record_chunk_failure(chunk, &err);
                crate::metrics::CHUNKS_TOTAL
                    .with_label_values(&[class, "failed"])
                    .inc();
                crate::metrics::UPLOADED_ITEMS_TOTAL
                    .with_label_values(&[class, "failed"])
                    .inc_by(chunk.len() as u64);
            }
        }
    }

    let report = state.into_report();
    info!(
        succeeded = report.succeeded,
        failed = report.failed.len(),
        chunks = report.chunks,
        retries = report.retries,
        "upload finished"
    );
    report
}
