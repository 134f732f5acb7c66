//! Paraphrases one answer-bearing context per question. Two model calls of
//! `num_pairs` paraphrases each give every record `2 * num_pairs` entries.

use std::sync::Arc;

use common::{
    error::AppError,
    storage::types::qa_record::{CounterfactualRecord, ParaphraseRecord},
};
use futures::stream::{self, StreamExt, TryStreamExt};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::{for_each_record, StageTuning};
use crate::service::GenerationService;

const PARAPHRASE_CALLS: usize = 2;

pub async fn run(
    records: Vec<CounterfactualRecord>,
    service: Arc<dyn GenerationService>,
    tuning: &StageTuning,
) -> Vec<ParaphraseRecord> {
    let total = records.len();
    let inner_workers = tuning.inner_or(PARAPHRASE_CALLS);

    let mut out = for_each_record(records, tuning.outer_workers, "gen-para", |record| {
        let service = Arc::clone(&service);
        let num_pairs = tuning.num_pairs;
        let max_retries = tuning.max_shape_retries;
        async move {
            let answer = record
                .answers
                .first()
                .cloned()
                .ok_or_else(|| AppError::Validation("record without answers".into()))?;
            let context = {
                let mut rng = rand::thread_rng();
                record
                    .ctxs
                    .choose(&mut rng)
                    .cloned()
                    .ok_or_else(|| AppError::Validation("record without contexts".into()))?
            };

            let paraphrase = generate_paraphrases(
                service.as_ref(),
                &record.question,
                &answer,
                &context,
                num_pairs,
                inner_workers,
                max_retries,
            )
            .await?;

            if paraphrase.len() != PARAPHRASE_CALLS * num_pairs {
                warn!(
                    index = record.index,
                    got = paraphrase.len(),
                    wanted = PARAPHRASE_CALLS * num_pairs,
                    "record kept with short paraphrase set"
                );
            }

            Ok(ParaphraseRecord {
                index: record.index,
                question: record.question,
                answers: record.answers,
                paraphrase,
                counterfactual: record.counterfactual,
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
        "generated paraphrases"
    );
    out
}

async fn generate_paraphrases(
    service: &dyn GenerationService,
    question: &str,
    answer: &str,
    context: &str,
    num_pairs: usize,
    inner_workers: usize,
    max_retries: usize,
) -> Result<Vec<String>, AppError> {
    let batches: Vec<Vec<String>> = stream::iter(0..PARAPHRASE_CALLS)
        .map(|call| async move {
            let mut last = Vec::new();
            for attempt in 0..=max_retries {
                let set = service
                    .paraphrases(question, answer, context, num_pairs)
                    .await?;
                if set.contexts.len() >= num_pairs {
                    let mut contexts = set.contexts;
                    contexts.truncate(num_pairs);
                    return Ok::<_, AppError>(contexts);
                }
                debug!(
                    call,
                    attempt,
                    got = set.contexts.len(),
                    wanted = num_pairs,
                    "paraphrase count mismatch; re-querying"
                );
                last = set.contexts;
            }
            // Short sets are kept; postprocess validation reports them.
            Ok(last)
        })
        .buffered(inner_workers)
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}
