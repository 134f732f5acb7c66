//! Generates the counterfactual answer set for every preprocessed question.

use std::sync::Arc;

use common::{
    error::AppError,
    storage::types::qa_record::{CfAnswersRecord, PreprocessedRecord},
};
use tracing::{debug, info};

use super::{for_each_record, StageTuning};
use crate::service::GenerationService;

pub async fn run(
    records: Vec<PreprocessedRecord>,
    service: Arc<dyn GenerationService>,
    tuning: &StageTuning,
) -> Vec<CfAnswersRecord> {
    let total = records.len();

    let mut out = for_each_record(records, tuning.outer_workers, "gen-cf-answers", |record| {
        let service = Arc::clone(&service);
        let num_answers = tuning.num_cf_answers;
        let max_retries = tuning.max_shape_retries;
        async move {
            let counterfactual_answers =
                generate_answer_set(service.as_ref(), &record, num_answers, max_retries).await?;
            Ok(CfAnswersRecord {
                index: record.index,
                question: record.question,
                answers: record.answers,
                counterfactual_answers,
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
        "generated counterfactual answer sets"
    );
    out
}

/// Re-queries until the model returns exactly `num_answers` answers.
async fn generate_answer_set(
    service: &dyn GenerationService,
    record: &PreprocessedRecord,
    num_answers: usize,
    max_retries: usize,
) -> Result<Vec<String>, AppError> {
    for attempt in 0..=max_retries {
        let set = service
            .counterfactual_answers(&record.question, &record.answers, num_answers)
            .await?;
        if set.answers.len() == num_answers {
            return Ok(set.answers);
        }
        debug!(
            index = record.index,
            attempt,
            got = set.answers.len(),
            wanted = num_answers,
            "counterfactual answer count mismatch; re-querying"
        );
    }

    Err(AppError::Processing(format!(
        "question {} never produced {} counterfactual answers",
        record.index, num_answers
    )))
}
