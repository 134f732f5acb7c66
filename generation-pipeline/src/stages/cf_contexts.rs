//! Generates supporting passages for every counterfactual answer.
//!
//! Each record fans out over its answer set with inner concurrency; a record
//! is dropped as a whole when any of its answers fails to produce a full
//! passage set.

use std::sync::Arc;

use common::{
    error::AppError,
    storage::types::qa_record::{CfAnswersRecord, CfPassages, CounterfactualRecord},
};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use super::{for_each_record, StageTuning};
use crate::service::GenerationService;

pub async fn run(
    records: Vec<CfAnswersRecord>,
    service: Arc<dyn GenerationService>,
    tuning: &StageTuning,
) -> Vec<CounterfactualRecord> {
    let total = records.len();
    let inner_workers = tuning.inner_or(tuning.num_cf_answers);

    let mut out = for_each_record(records, tuning.outer_workers, "gen-cf", |record| {
        let service = Arc::clone(&service);
        let top_k = tuning.top_k;
        let max_retries = tuning.max_shape_retries;
        async move {
            let counterfactual = generate_passages(
                service.as_ref(),
                &record.question,
                &record.counterfactual_answers,
                top_k,
                inner_workers,
                max_retries,
            )
            .await?;

            Ok(CounterfactualRecord {
                index: record.index,
                question: record.question,
                answers: record.answers,
                counterfactual_answers: record.counterfactual_answers,
                counterfactual,
                ctxs: record.ctxs,
            })
        }
    })
    .await;

    for (idx, record) in out.iter_mut().enumerate() {
        record.index = idx;
    }

    info!(
        produced = out.len(),
        dropped = total - out.len(),
        "generated counterfactual passages"
    );
    out
}

/// One passage set per counterfactual answer, preserving answer order.
async fn generate_passages(
    service: &dyn GenerationService,
    question: &str,
    answers: &[String],
    top_k: usize,
    inner_workers: usize,
    max_retries: usize,
) -> Result<Vec<CfPassages>, AppError> {
    let mut passages: Vec<(usize, CfPassages)> =
        stream::iter(answers.iter().cloned().enumerate())
            .map(|(pos, answer)| async move {
                let contexts =
                    generate_context_set(service, question, &answer, top_k, max_retries).await?;
                Ok::<_, AppError>((
                    pos,
                    CfPassages {
                        answers: vec![answer],
                        contexts,
                    },
                ))
            })
            .buffer_unordered(inner_workers)
            .try_collect()
            .await?;

    passages.sort_by_key(|(pos, _)| *pos);
    Ok(passages.into_iter().map(|(_, p)| p).collect())
}

/// Re-queries until the model returns exactly `top_k` passages.
async fn generate_context_set(
    service: &dyn GenerationService,
    question: &str,
    answer: &str,
    top_k: usize,
    max_retries: usize,
) -> Result<Vec<String>, AppError> {
    for attempt in 0..=max_retries {
        let set = service
            .counterfactual_passages(question, answer, top_k)
            .await?;
        if set.contexts.len() == top_k {
            return Ok(set.contexts);
        }
        debug!(
            answer,
            attempt,
            got = set.contexts.len(),
            wanted = top_k,
            "passage count mismatch; re-querying"
        );
    }

    Err(AppError::Processing(format!(
        "counterfactual answer '{answer}' never produced {top_k} passages"
    )))
}
