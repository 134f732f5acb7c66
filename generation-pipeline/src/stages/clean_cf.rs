//! Optional repair pass over generated counterfactual passages: flips
//! passages that deny the counterfactual answer, normalizes tone, and strips
//! traces of the true answer.

use std::sync::Arc;

use common::{
    error::AppError,
    storage::types::qa_record::{CfPassages, CounterfactualRecord},
};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use super::{for_each_record, StageTuning};
use crate::service::GenerationService;

pub async fn run(
    records: Vec<CounterfactualRecord>,
    service: Arc<dyn GenerationService>,
    tuning: &StageTuning,
) -> Vec<CounterfactualRecord> {
    let total = records.len();
    let inner_workers = tuning.inner_or(tuning.num_cf_answers);

    let mut out = for_each_record(records, tuning.outer_workers, "clean-cf", |record| {
        let service = Arc::clone(&service);
        let top_k = tuning.top_k;
        let max_retries = tuning.max_shape_retries;
        async move {
            let question = record.question.clone();
            let counterfactual = repair_all(
                service.as_ref(),
                &question,
                record.counterfactual,
                top_k,
                inner_workers,
                max_retries,
            )
            .await?;

            Ok(CounterfactualRecord {
                counterfactual,
                ..record
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
        "cleaned counterfactual passages"
    );
    out
}

async fn repair_all(
    service: &dyn GenerationService,
    question: &str,
    passages: Vec<CfPassages>,
    top_k: usize,
    inner_workers: usize,
    max_retries: usize,
) -> Result<Vec<CfPassages>, AppError> {
    let mut repaired: Vec<(usize, CfPassages)> = stream::iter(passages.into_iter().enumerate())
        .map(|(pos, cf)| async move {
            let answer = cf
                .answers
                .first()
                .cloned()
                .ok_or_else(|| AppError::Validation("counterfactual entry without answer".into()))?;
            let contexts =
                repair_context_set(service, question, &answer, &cf.contexts, top_k, max_retries)
                    .await?;
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

    repaired.sort_by_key(|(pos, _)| *pos);
    Ok(repaired.into_iter().map(|(_, p)| p).collect())
}

/// Re-queries until the repair reply carries exactly `top_k` texts.
async fn repair_context_set(
    service: &dyn GenerationService,
    question: &str,
    answer: &str,
    texts: &[String],
    top_k: usize,
    max_retries: usize,
) -> Result<Vec<String>, AppError> {
    for attempt in 0..=max_retries {
        let repair = service.repair_counterfactual(question, answer, texts).await?;
        if repair.texts.len() == top_k {
            return Ok(repair.texts);
        }
        debug!(
            answer,
            attempt,
            got = repair.texts.len(),
            wanted = top_k,
            "repair text count mismatch; re-querying"
        );
    }

    Err(AppError::Processing(format!(
        "repair for counterfactual answer '{answer}' never produced {top_k} texts"
    )))
}
