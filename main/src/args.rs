use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use generation_pipeline::{DatasetKind, GenerationOptions, StageTuning};

#[derive(Debug, Parser)]
#[command(name = "cfqa", about = "Counterfactual QA dataset generation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a raw dataset file into the preprocessed artifact
    Preprocess(StageArgs),
    /// Generate the counterfactual answer set for every question
    GenCfAnswers(StageArgs),
    /// Generate supporting passages for every counterfactual answer
    GenCf(StageArgs),
    /// Repair the generated counterfactual passages in place
    CleanCf(StageArgs),
    /// Paraphrase one answer-bearing context per question
    GenPara(StageArgs),
    /// Repair the generated paraphrases in place
    CleanPara(StageArgs),
    /// Normalize the final texts and remove the intermediate artifacts
    Postprocess(StageArgs),
    /// Run every stage in order
    Run(RunArgs),
}

impl Command {
    pub fn stage_args(&self) -> &StageArgs {
        match self {
            Self::Preprocess(stage)
            | Self::GenCfAnswers(stage)
            | Self::GenCf(stage)
            | Self::CleanCf(stage)
            | Self::GenPara(stage)
            | Self::CleanPara(stage)
            | Self::Postprocess(stage) => stage,
            Self::Run(run) => &run.stage,
        }
    }

    /// Whether this command issues model calls and therefore needs an API key.
    pub fn needs_api_key(&self) -> bool {
        !matches!(self, Self::Preprocess(_) | Self::Postprocess(_))
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Also run the two repair passes
    #[arg(long)]
    pub clean: bool,
}

#[derive(Debug, Args)]
pub struct StageArgs {
    /// Dataset to process
    #[arg(long, value_enum, default_value_t = DatasetKind::Hotpot)]
    pub dataset: DatasetKind,

    /// Raw input file for the preprocess stage, absolute or relative to the
    /// data directory; defaults to `<dataset>_sample.json`
    #[arg(long)]
    pub data_name: Option<PathBuf>,

    /// Overrides the data directory from the configuration
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Overrides the generation model from the configuration
    #[arg(long)]
    pub model: Option<String>,

    /// Overrides the per-stage reply token budget
    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long, default_value_t = 0.9)]
    pub temperature: f32,

    #[arg(long, default_value_t = 1.0)]
    pub top_p: f32,

    /// Counterfactual answers generated per question
    #[arg(long, default_value_t = 9)]
    pub num_cf_answers: usize,

    /// Passages generated per counterfactual answer
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,

    /// Paraphrases requested per model call
    #[arg(long, default_value_t = 5)]
    pub num_pairs: usize,

    /// Model calls in flight within one record; defaults per stage
    #[arg(long)]
    pub inner_max_workers: Option<usize>,

    /// Records processed concurrently
    #[arg(long, default_value_t = 64)]
    pub outer_max_workers: usize,

    /// Transport/parse retries per model call
    #[arg(long, default_value_t = 30)]
    pub max_attempts: u32,

    /// Re-queries allowed when a reply has the wrong item count
    #[arg(long, default_value_t = 10)]
    pub max_shape_retries: usize,
}

impl StageArgs {
    pub fn finalize(&self) -> Result<()> {
        if self.num_cf_answers == 0 {
            return Err(anyhow!("--num-cf-answers must be at least 1"));
        }
        if self.top_k == 0 {
            return Err(anyhow!("--top-k must be at least 1"));
        }
        if self.num_pairs == 0 {
            return Err(anyhow!("--num-pairs must be at least 1"));
        }
        if self.outer_max_workers == 0 {
            return Err(anyhow!("--outer-max-workers must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("--max-attempts must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!("--temperature must be between 0.0 and 2.0"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(anyhow!("--top-p must be between 0.0 and 1.0"));
        }
        Ok(())
    }

    pub fn tuning(&self) -> StageTuning {
        StageTuning {
            num_cf_answers: self.num_cf_answers,
            top_k: self.top_k,
            num_pairs: self.num_pairs,
            inner_workers: self.inner_max_workers,
            outer_workers: self.outer_max_workers,
            max_shape_retries: self.max_shape_retries,
        }
    }

    pub fn generation_options(&self, default_model: &str) -> GenerationOptions {
        GenerationOptions {
            model: self
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            max_attempts: self.max_attempts,
        }
    }

    /// The raw input file for preprocessing, resolved against the data
    /// directory when given as a relative path.
    pub fn raw_path(&self, data_dir: &Path) -> Option<PathBuf> {
        self.data_name.as_ref().map(|name| {
            if name.is_absolute() {
                name.clone()
            } else {
                data_dir.join(name)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn finalize_rejects_zero_counts() {
        let cli = Cli::parse_from(["cfqa", "gen-cf-answers", "--num-cf-answers", "0"]);
        assert!(cli.command.stage_args().finalize().is_err());
    }

    #[test]
    fn run_accepts_the_clean_flag() {
        let cli = Cli::parse_from(["cfqa", "run", "--dataset", "nq", "--clean"]);
        match cli.command {
            Command::Run(run) => {
                assert!(run.clean);
                assert_eq!(run.stage.dataset, DatasetKind::Nq);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn relative_data_name_resolves_against_the_data_dir() {
        let cli = Cli::parse_from(["cfqa", "preprocess", "--data-name", "custom.json"]);
        let stage = cli.command.stage_args();
        assert_eq!(
            stage.raw_path(Path::new("/data")),
            Some(PathBuf::from("/data/custom.json"))
        );
    }
}
