//! Optional repair pass over paraphrases: batches of `num_pairs` texts are
//! checked for the answer, trimmed to length, and rewritten where needed.

use std::sync::Arc;

use common::{error::AppError, storage::types::qa_record::ParaphraseRecord};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use super::{for_each_record, StageTuning};
use crate::service::GenerationService;

const REPAIR_CALLS: usize = 2;

pub async fn run(
    records: Vec<ParaphraseRecord>,
    service: Arc<dyn GenerationService>,
    tuning: &StageTuning,
) -> Vec<ParaphraseRecord> {
    let total = records.len();
    let inner_workers = tuning.inner_or(REPAIR_CALLS);

    let mut out = for_each_record(records, tuning.outer_workers, "clean-para", |record| {
        let service = Arc::clone(&service);
        let num_pairs = tuning.num_pairs;
        let max_retries = tuning.max_shape_retries;
        async move {
            let paraphrase = repair_paraphrases(
                service.as_ref(),
                &record.question,
                &record.answers,
                &record.paraphrase,
                num_pairs,
                inner_workers,
                max_retries,
            )
            .await?;

            if paraphrase.len() != REPAIR_CALLS * num_pairs {
                warn!(
                    index = record.index,
                    got = paraphrase.len(),
                    wanted = REPAIR_CALLS * num_pairs,
                    "record kept with short repaired paraphrase set"
                );
            }

            Ok(ParaphraseRecord {
                paraphrase,
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
        "cleaned paraphrases"
    );
    out
}

/// Splits the paraphrases into two batches of `num_pairs` and repairs each
/// batch independently.
async fn repair_paraphrases(
    service: &dyn GenerationService,
    question: &str,
    answers: &[String],
    paraphrases: &[String],
    num_pairs: usize,
    inner_workers: usize,
    max_retries: usize,
) -> Result<Vec<String>, AppError> {
    let split = num_pairs.min(paraphrases.len());
    let batches = [&paraphrases[..split], &paraphrases[split..]];

    let repaired: Vec<Vec<String>> = stream::iter(batches.into_iter().enumerate())
        .map(|(batch_idx, batch)| async move {
            let mut last = Vec::new();
            for attempt in 0..=max_retries {
                let set = service.repair_paraphrases(question, answers, batch).await?;
                if set.contexts.len() >= num_pairs {
                    let mut contexts = set.contexts;
                    contexts.truncate(num_pairs);
                    return Ok::<_, AppError>(contexts);
                }
                debug!(
                    batch = batch_idx,
                    attempt,
                    got = set.contexts.len(),
                    wanted = num_pairs,
                    "repaired paraphrase count mismatch; re-querying"
                );
                last = set.contexts;
            }
            Ok(last)
        })
        .buffered(inner_workers)
        .try_collect()
        .await?;

    Ok(repaired.into_iter().flatten().collect())
}
