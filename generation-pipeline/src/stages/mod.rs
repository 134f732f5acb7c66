pub mod cf_answers;
pub mod cf_contexts;
pub mod clean_cf;
pub mod clean_para;
pub mod paraphrase;
pub mod postprocess;
pub mod preprocess;

#[cfg(test)]
mod tests;

use std::{future::Future, sync::Arc};

use common::error::AppError;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::error;

/// Shape and concurrency knobs shared by the generation stages.
#[derive(Debug, Clone)]
pub struct StageTuning {
    /// Counterfactual answers generated per question.
    pub num_cf_answers: usize,
    /// Passages generated per counterfactual answer.
    pub top_k: usize,
    /// Paraphrases requested per model call; each record gets two calls.
    pub num_pairs: usize,
    /// Concurrency within one record; `None` uses the stage default.
    pub inner_workers: Option<usize>,
    /// Concurrency across records.
    pub outer_workers: usize,
    /// How often a well-formed reply with the wrong item count is re-queried
    /// before the record is given up on.
    pub max_shape_retries: usize,
}

impl Default for StageTuning {
    fn default() -> Self {
        Self {
            num_cf_answers: 9,
            top_k: 3,
            num_pairs: 5,
            inner_workers: None,
            outer_workers: 64,
            max_shape_retries: 10,
        }
    }
}

impl StageTuning {
    pub(crate) fn inner_or(&self, stage_default: usize) -> usize {
        self.inner_workers.unwrap_or(stage_default).max(1)
    }
}

/// Runs `handler` over every record with bounded concurrency. Failed records
/// are logged and dropped; survivors come back in their input order.
pub(crate) async fn for_each_record<T, U, F, Fut>(
    records: Vec<T>,
    workers: usize,
    stage: &'static str,
    handler: F,
) -> Vec<U>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<U, AppError>>,
{
    let workers = workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));

    let raw_results = stream::iter(records.into_iter().enumerate())
        .map(|(idx, record)| {
            let semaphore = Arc::clone(&semaphore);
            let fut = handler(record);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| AppError::Processing("stage semaphore closed".to_string()))?;
                fut.await.map(|value| (idx, value))
            }
        })
        .buffer_unordered(workers)
        .collect::<Vec<_>>()
        .await;

    let mut ordered = Vec::with_capacity(raw_results.len());
    for result in raw_results {
        match result {
            Ok(value) => ordered.push(value),
            Err(err) => {
                error!(stage, error = %err, "record processing failed; dropping record");
            }
        }
    }

    ordered.sort_by_key(|(idx, _)| *idx);
    ordered.into_iter().map(|(_, value)| value).collect()
}
