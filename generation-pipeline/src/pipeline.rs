//! Orchestrates the generation stages over their on-disk JSON artifacts.
//!
//! Every stage loads its input artifact, transforms the records, and writes
//! its output artifact under `<data_dir>/<dataset>/`. Stages can therefore be
//! run one at a time or end to end with [`GenerationPipeline::run`].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use common::{
    error::AppError,
    storage::{
        json::{load_json, remove_if_exists, save_json},
        types::qa_record::{
            CfAnswersRecord, CounterfactualRecord, ParaphraseRecord, PreprocessedRecord,
        },
    },
};
use tracing::{info, instrument};

use crate::{
    dataset::DatasetKind,
    service::GenerationService,
    stages::{
        self,
        preprocess::{preprocess_hotpot, preprocess_open_qa},
        StageTuning,
    },
};

pub struct GenerationPipeline {
    service: Arc<dyn GenerationService>,
    tuning: StageTuning,
    data_dir: PathBuf,
}

impl GenerationPipeline {
    pub fn new(
        service: Arc<dyn GenerationService>,
        tuning: StageTuning,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service,
            tuning,
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Converts a raw dataset file into the preprocessed artifact. When
    /// `raw_path` is `None` the dataset's default sample file under the data
    /// directory is used.
    #[instrument(skip(self, raw_path), fields(dataset = %dataset))]
    pub fn preprocess(
        &self,
        dataset: DatasetKind,
        raw_path: Option<&Path>,
    ) -> Result<usize, AppError> {
        let default_path = self.data_dir.join(dataset.sample_name());
        let raw_path = raw_path.unwrap_or(&default_path);

        let records = match dataset {
            DatasetKind::Hotpot => preprocess_hotpot(load_json(raw_path)?),
            DatasetKind::Nq | DatasetKind::TriviaQa => preprocess_open_qa(load_json(raw_path)?),
        };

        let out_path = dataset.preprocessed_path(&self.data_dir);
        save_json(&out_path, &records)?;
        info!(
            records = records.len(),
            path = %out_path.display(),
            "wrote preprocessed artifact"
        );
        Ok(records.len())
    }

    #[instrument(skip(self), fields(dataset = %dataset))]
    pub async fn generate_cf_answers(&self, dataset: DatasetKind) -> Result<usize, AppError> {
        let records: Vec<PreprocessedRecord> =
            load_json(&dataset.preprocessed_path(&self.data_dir))?;
        let out = stages::cf_answers::run(records, Arc::clone(&self.service), &self.tuning).await;

        let out_path = dataset.cf_answers_path(&self.data_dir);
        save_json(&out_path, &out)?;
        info!(
            records = out.len(),
            path = %out_path.display(),
            "wrote counterfactual answers artifact"
        );
        Ok(out.len())
    }

    #[instrument(skip(self), fields(dataset = %dataset))]
    pub async fn generate_cf_contexts(&self, dataset: DatasetKind) -> Result<usize, AppError> {
        let records: Vec<CfAnswersRecord> = load_json(&dataset.cf_answers_path(&self.data_dir))?;
        let out = stages::cf_contexts::run(records, Arc::clone(&self.service), &self.tuning).await;

        let out_path = dataset.cf_contexts_path(&self.data_dir);
        save_json(&out_path, &out)?;
        info!(
            records = out.len(),
            path = %out_path.display(),
            "wrote counterfactual passages artifact"
        );
        Ok(out.len())
    }

    /// Optional repair pass; rewrites the counterfactual passages artifact in
    /// place.
    #[instrument(skip(self), fields(dataset = %dataset))]
    pub async fn clean_counterfactuals(&self, dataset: DatasetKind) -> Result<usize, AppError> {
        let path = dataset.cf_contexts_path(&self.data_dir);
        let records: Vec<CounterfactualRecord> = load_json(&path)?;
        let out = stages::clean_cf::run(records, Arc::clone(&self.service), &self.tuning).await;

        save_json(&path, &out)?;
        info!(
            records = out.len(),
            path = %path.display(),
            "rewrote counterfactual passages artifact"
        );
        Ok(out.len())
    }

    #[instrument(skip(self), fields(dataset = %dataset))]
    pub async fn generate_paraphrases(&self, dataset: DatasetKind) -> Result<usize, AppError> {
        let records: Vec<CounterfactualRecord> =
            load_json(&dataset.cf_contexts_path(&self.data_dir))?;
        let out = stages::paraphrase::run(records, Arc::clone(&self.service), &self.tuning).await;

        let out_path = dataset.paraphrases_path(&self.data_dir);
        save_json(&out_path, &out)?;
        info!(
            records = out.len(),
            path = %out_path.display(),
            "wrote paraphrases artifact"
        );
        Ok(out.len())
    }

    /// Optional repair pass; rewrites the paraphrases artifact in place.
    #[instrument(skip(self), fields(dataset = %dataset))]
    pub async fn clean_paraphrases(&self, dataset: DatasetKind) -> Result<usize, AppError> {
        let path = dataset.paraphrases_path(&self.data_dir);
        let records: Vec<ParaphraseRecord> = load_json(&path)?;
        let out = stages::clean_para::run(records, Arc::clone(&self.service), &self.tuning).await;

        save_json(&path, &out)?;
        info!(
            records = out.len(),
            path = %path.display(),
            "rewrote paraphrases artifact"
        );
        Ok(out.len())
    }

    /// Normalizes the final texts and, once every record validates, writes
    /// the postprocessed artifact and removes the intermediates.
    #[instrument(skip(self), fields(dataset = %dataset))]
    pub fn postprocess(&self, dataset: DatasetKind) -> Result<usize, AppError> {
        let mut records: Vec<ParaphraseRecord> =
            load_json(&dataset.paraphrases_path(&self.data_dir))?;
        stages::postprocess::run(&mut records, &self.tuning)?;

        let out_path = dataset.postprocessed_path(&self.data_dir);
        save_json(&out_path, &records)?;
        for intermediate in dataset.intermediate_paths(&self.data_dir) {
            remove_if_exists(&intermediate)?;
        }
        info!(
            records = records.len(),
            path = %out_path.display(),
            "wrote postprocessed artifact and removed intermediates"
        );
        Ok(records.len())
    }

    /// Runs every stage in order. `clean` enables the two repair passes.
    #[instrument(skip(self, raw_path), fields(dataset = %dataset))]
    pub async fn run(
        &self,
        dataset: DatasetKind,
        raw_path: Option<&Path>,
        clean: bool,
    ) -> Result<usize, AppError> {
        self.preprocess(dataset, raw_path)?;
        self.generate_cf_answers(dataset).await?;
        self.generate_cf_contexts(dataset).await?;
        if clean {
            self.clean_counterfactuals(dataset).await?;
        }
        self.generate_paraphrases(dataset).await?;
        if clean {
            self.clean_paraphrases(dataset).await?;
        }
        self.postprocess(dataset)
    }
}
