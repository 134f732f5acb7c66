use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::qa_record::{
        CfAnswersRecord, CfPassages, CounterfactualRecord, PreprocessedRecord,
    },
};
use tokio::sync::Mutex;

use super::{cf_answers, cf_contexts, clean_cf, clean_para, paraphrase, StageTuning};
use crate::{
    service::GenerationService,
    types::llm_outputs::{CfAnswerSet, CfContextSet, CfRepair, ParaphraseSet},
};

/// Deterministic stand-in for the OpenAI-backed service. Records every call
/// and can be configured to reply short or to fail for specific questions.
#[derive(Default)]
struct MockService {
    /// Number of answer-set replies with the wrong count before a full one.
    short_answer_replies: AtomicUsize,
    /// Number of passage-set replies with the wrong count before a full one.
    short_passage_replies: AtomicUsize,
    /// Number of repair replies with the wrong count before a full one.
    short_repair_replies: AtomicUsize,
    /// Questions whose calls always error.
    failing_questions: HashSet<String>,
    /// Paraphrase replies always come back one entry short.
    short_paraphrases: bool,
    calls: Mutex<Vec<String>>,
}

/// Atomically consumes one short reply from `counter` if any remain.
fn take_short(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MockService {
    fn failing(questions: &[&str]) -> Self {
        Self {
            failing_questions: questions.iter().map(|q| q.to_string()).collect(),
            ..Self::default()
        }
    }

    async fn record(&self, call: String) -> Result<(), AppError> {
        self.calls.lock().await.push(call);
        Ok(())
    }

    fn check(&self, question: &str) -> Result<(), AppError> {
        if self.failing_questions.contains(question) {
            return Err(AppError::Processing(format!("mock failure for {question}")));
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationService for MockService {
    async fn counterfactual_answers(
        &self,
        question: &str,
        _answers: &[String],
        num_answers: usize,
    ) -> Result<CfAnswerSet, AppError> {
        self.record(format!("cf_answers:{question}")).await?;
        self.check(question)?;

        if take_short(&self.short_answer_replies) {
            return Ok(CfAnswerSet {
                answers: vec!["lonely".to_string()],
            });
        }

        Ok(CfAnswerSet {
            answers: (0..num_answers).map(|i| format!("cf-{i}")).collect(),
        })
    }

    async fn counterfactual_passages(
        &self,
        question: &str,
        answer: &str,
        top_k: usize,
    ) -> Result<CfContextSet, AppError> {
        self.record(format!("cf_passages:{question}:{answer}")).await?;
        self.check(question)?;

        if take_short(&self.short_passage_replies) {
            return Ok(CfContextSet {
                contexts: vec![format!("{answer} stub")],
            });
        }

        Ok(CfContextSet {
            contexts: (0..top_k)
                .map(|i| format!("{answer} passage {i}"))
                .collect(),
        })
    }

    async fn repair_counterfactual(
        &self,
        question: &str,
        _answer: &str,
        texts: &[String],
    ) -> Result<CfRepair, AppError> {
        self.record(format!("repair_cf:{question}")).await?;
        self.check(question)?;

        if take_short(&self.short_repair_replies) {
            return Ok(CfRepair {
                steps: "lost a text".to_string(),
                texts: vec!["stub".to_string()],
            });
        }

        Ok(CfRepair {
            steps: "no edits needed".to_string(),
            texts: texts.iter().map(|t| format!("{t} (repaired)")).collect(),
        })
    }

    async fn paraphrases(
        &self,
        question: &str,
        _answer: &str,
        context: &str,
        num_pairs: usize,
    ) -> Result<ParaphraseSet, AppError> {
        self.record(format!("paraphrases:{question}")).await?;
        self.check(question)?;

        let count = if self.short_paraphrases {
            num_pairs.saturating_sub(1)
        } else {
            num_pairs
        };
        Ok(ParaphraseSet {
            contexts: (0..count)
                .map(|i| format!("{context} (reworded {i})"))
                .collect(),
        })
    }

    async fn repair_paraphrases(
        &self,
        question: &str,
        _answers: &[String],
        texts: &[String],
    ) -> Result<ParaphraseSet, AppError> {
        self.record(format!("repair_paraphrases:{question}")).await?;
        self.check(question)?;

        Ok(ParaphraseSet {
            contexts: texts.iter().map(|t| format!("{t} (tidied)")).collect(),
        })
    }
}

fn tuning() -> StageTuning {
    StageTuning {
        num_cf_answers: 3,
        top_k: 2,
        num_pairs: 2,
        inner_workers: None,
        outer_workers: 4,
        max_shape_retries: 5,
    }
}

fn preprocessed(index: usize, question: &str) -> PreprocessedRecord {
    PreprocessedRecord {
        index,
        question: question.to_string(),
        answers: vec!["true answer".to_string()],
        ctxs: vec!["the true answer appears here".to_string()],
    }
}

#[tokio::test]
async fn cf_answers_retries_until_the_count_matches() {
    let service = Arc::new(MockService {
        short_answer_replies: AtomicUsize::new(2),
        ..MockService::default()
    });
    let records = vec![preprocessed(0, "who?")];

    let as_dyn: Arc<dyn GenerationService> = service.clone();
    let out = cf_answers::run(records, as_dyn, &tuning()).await;

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].counterfactual_answers.len(), 3);
    // two short replies plus the final full one
    assert_eq!(service.calls.lock().await.len(), 3);
}

#[tokio::test]
async fn cf_answers_drops_failing_records_and_reindexes() {
    let service = Arc::new(MockService::failing(&["broken?"]));
    let records = vec![
        preprocessed(0, "first?"),
        preprocessed(1, "broken?"),
        preprocessed(2, "third?"),
    ];

    let out = cf_answers::run(records, service, &tuning()).await;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].question, "first?");
    assert_eq!(out[1].question, "third?");
    assert_eq!(out[0].index, 0);
    assert_eq!(out[1].index, 1);
}

#[tokio::test]
async fn cf_contexts_keeps_answers_in_order_with_full_passage_sets() {
    let service = Arc::new(MockService::default());
    let tuning = tuning();
    let records = vec![preprocessed(0, "who?")];
    let as_dyn: Arc<dyn GenerationService> = service.clone();
    let with_answers = cf_answers::run(records, as_dyn, &tuning).await;

    let out = cf_contexts::run(with_answers, service, &tuning).await;

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].counterfactual.len(), tuning.num_cf_answers);
    for (i, cf) in out[0].counterfactual.iter().enumerate() {
        assert_eq!(cf.answers, vec![format!("cf-{i}")]);
        assert_eq!(cf.contexts.len(), tuning.top_k);
        assert!(cf.contexts[0].starts_with(&format!("cf-{i}")));
    }
}

#[tokio::test]
async fn cf_contexts_retries_short_passage_sets_until_full() {
    let service = Arc::new(MockService {
        short_passage_replies: AtomicUsize::new(2),
        ..MockService::default()
    });
    let tuning = tuning();
    let records = vec![cf_answers_record(0, "who?", &tuning)];

    let as_dyn: Arc<dyn GenerationService> = service.clone();
    let out = cf_contexts::run(records, as_dyn, &tuning).await;

    assert_eq!(out.len(), 1);
    for cf in &out[0].counterfactual {
        assert_eq!(cf.contexts.len(), tuning.top_k);
    }
    // one call per answer plus the two short replies
    let calls = service.calls.lock().await;
    assert_eq!(calls.len(), tuning.num_cf_answers + 2);
}

#[tokio::test]
async fn cf_contexts_drops_records_whose_passages_never_fill() {
    let service = Arc::new(MockService {
        short_passage_replies: AtomicUsize::new(usize::MAX),
        ..MockService::default()
    });
    let tuning = tuning();
    let records = vec![cf_answers_record(0, "who?", &tuning)];

    let out = cf_contexts::run(records, service, &tuning).await;

    assert!(out.is_empty());
}

#[tokio::test]
async fn clean_cf_retries_short_repairs_and_keeps_passages_full() {
    let service = Arc::new(MockService {
        short_repair_replies: AtomicUsize::new(1),
        ..MockService::default()
    });
    let tuning = tuning();
    let records = vec![counterfactual_record(0, "who?", &tuning)];

    let as_dyn: Arc<dyn GenerationService> = service.clone();
    let out = clean_cf::run(records, as_dyn, &tuning).await;

    assert_eq!(out.len(), 1);
    for (i, cf) in out[0].counterfactual.iter().enumerate() {
        assert_eq!(cf.answers, vec![format!("cf-{i}")]);
        assert_eq!(cf.contexts.len(), tuning.top_k);
        assert!(cf.contexts[0].ends_with("(repaired)"));
    }
    // one call per counterfactual entry plus the short reply
    let calls = service.calls.lock().await;
    assert_eq!(calls.len(), tuning.num_cf_answers + 1);
}

fn cf_answers_record(index: usize, question: &str, tuning: &StageTuning) -> CfAnswersRecord {
    CfAnswersRecord {
        index,
        question: question.to_string(),
        answers: vec!["true answer".to_string()],
        counterfactual_answers: (0..tuning.num_cf_answers).map(|i| format!("cf-{i}")).collect(),
        ctxs: vec!["the true answer appears here".to_string()],
    }
}

fn counterfactual_record(index: usize, question: &str, tuning: &StageTuning) -> CounterfactualRecord {
    CounterfactualRecord {
        index,
        question: question.to_string(),
        answers: vec!["true answer".to_string()],
        counterfactual_answers: (0..tuning.num_cf_answers).map(|i| format!("cf-{i}")).collect(),
        counterfactual: (0..tuning.num_cf_answers)
            .map(|i| CfPassages {
                answers: vec![format!("cf-{i}")],
                contexts: (0..tuning.top_k).map(|j| format!("cf-{i} passage {j}")).collect(),
            })
            .collect(),
        ctxs: vec!["the true answer appears here".to_string()],
    }
}

#[tokio::test]
async fn paraphrase_produces_two_batches_per_record() {
    let service = Arc::new(MockService::default());
    let tuning = tuning();
    let records = vec![counterfactual_record(0, "who?", &tuning)];

    let out = paraphrase::run(records, service, &tuning).await;

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].paraphrase.len(), 2 * tuning.num_pairs);
    assert!(out[0].paraphrase[0].contains("reworded"));
}

#[tokio::test]
async fn paraphrase_keeps_records_with_short_sets_after_retries() {
    let service = Arc::new(MockService {
        short_paraphrases: true,
        ..MockService::default()
    });
    let tuning = tuning();
    let records = vec![counterfactual_record(0, "who?", &tuning)];

    let as_dyn: Arc<dyn GenerationService> = service.clone();
    let out = paraphrase::run(records, as_dyn, &tuning).await;

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].paraphrase.len(), 2 * (tuning.num_pairs - 1));
    // retries were exhausted for both calls
    let calls = service.calls.lock().await;
    assert_eq!(calls.len(), 2 * (tuning.max_shape_retries + 1));
}

#[tokio::test]
async fn clean_para_repairs_both_batches_in_order() {
    let service = Arc::new(MockService::default());
    let tuning = tuning();
    let record = counterfactual_record(0, "who?", &tuning);
    let records = vec![common::storage::types::qa_record::ParaphraseRecord {
        index: record.index,
        question: record.question,
        answers: record.answers,
        paraphrase: (0..2 * tuning.num_pairs).map(|i| format!("p-{i}")).collect(),
        counterfactual: record.counterfactual,
    }];

    let out = clean_para::run(records, service, &tuning).await;

    assert_eq!(out.len(), 1);
    assert_eq!(
        out[0].paraphrase,
        vec![
            "p-0 (tidied)".to_string(),
            "p-1 (tidied)".to_string(),
            "p-2 (tidied)".to_string(),
            "p-3 (tidied)".to_string(),
        ]
    );
}

mod pipeline_end_to_end {
    use super::*;
    use crate::{dataset::DatasetKind, pipeline::GenerationPipeline};
    use serde_json::json;

    #[tokio::test]
    async fn run_writes_the_final_artifact_and_removes_intermediates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path();
        let dataset = DatasetKind::Hotpot;

        let raw = json!([
            {
                "question": "where was the painter of Starry Night born",
                "answer": "Zundert",
                "level": "easy",
                "supporting_facts": [["Vincent van Gogh", 0]],
                "context": [
                    ["Vincent van Gogh", ["Van Gogh was born in Zundert.", "He painted Starry Night."]],
                    ["Unrelated", ["Nothing here."]]
                ]
            },
            {
                "question": "too hard to keep",
                "answer": "n/a",
                "level": "hard",
                "supporting_facts": [],
                "context": []
            }
        ]);
        let raw_path = data_dir.join(dataset.sample_name());
        std::fs::write(&raw_path, raw.to_string()).expect("write raw sample");

        let service = Arc::new(MockService::default());
        let pipeline = GenerationPipeline::new(service, tuning(), data_dir);

        let produced = pipeline
            .run(dataset, None, true)
            .await
            .expect("full pipeline run");
        assert_eq!(produced, 1);

        assert!(dataset.postprocessed_path(data_dir).exists());
        for intermediate in dataset.intermediate_paths(data_dir) {
            assert!(!intermediate.exists(), "{} should be gone", intermediate.display());
        }

        let final_records: Vec<common::storage::types::qa_record::ParaphraseRecord> =
            common::storage::json::load_json(&dataset.postprocessed_path(data_dir))
                .expect("load final artifact");
        assert_eq!(final_records.len(), 1);
        let record = &final_records[0];
        assert_eq!(record.paraphrase.len(), 2 * tuning().num_pairs);
        assert_eq!(record.counterfactual.len(), tuning().num_cf_answers);
        for cf in &record.counterfactual {
            assert_eq!(cf.contexts.len(), tuning().top_k);
            for text in &cf.contexts {
                assert!(text.starts_with(&record.question));
            }
        }
    }

    #[tokio::test]
    async fn postprocess_leaves_intermediates_when_validation_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path();
        let dataset = DatasetKind::Nq;
        let tuning = tuning();

        // One paraphrase short of the expected 2 * num_pairs.
        let malformed = vec![common::storage::types::qa_record::ParaphraseRecord {
            index: 0,
            question: "who?".to_string(),
            answers: vec!["true answer".to_string()],
            paraphrase: vec!["only one".to_string()],
            counterfactual: (0..tuning.num_cf_answers)
                .map(|i| CfPassages {
                    answers: vec![format!("cf-{i}")],
                    contexts: vec!["text".to_string(); tuning.top_k],
                })
                .collect(),
        }];
        common::storage::json::save_json(&dataset.paraphrases_path(data_dir), &malformed)
            .expect("seed paraphrases artifact");

        let service = Arc::new(MockService::default());
        let pipeline = GenerationPipeline::new(service, tuning.clone(), data_dir);

        let err = pipeline.postprocess(dataset).expect_err("validation failure");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!dataset.postprocessed_path(data_dir).exists());
        assert!(dataset.paraphrases_path(data_dir).exists());
    }
}
