use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::Parser;
use common::{
    openai::build_client,
    utils::config::{get_config, AppConfig},
};
use generation_pipeline::{GenerationPipeline, OpenAiGenerationService};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod args;

use args::{Cli, Command, StageArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let stage = cli.command.stage_args();
    stage.finalize()?;
    if cli.command.needs_api_key() && config.openai_api_key.trim().is_empty() {
        return Err(anyhow!(
            "OPENAI_API_KEY must be set for stages that call the model"
        ));
    }

    let pipeline = build_pipeline(&config, stage);
    let dataset = stage.dataset;
    info!(%dataset, data_dir = %pipeline.data_dir().display(), "starting stage");

    match &cli.command {
        Command::Preprocess(stage) => {
            let raw = stage.raw_path(pipeline.data_dir());
            pipeline.preprocess(dataset, raw.as_deref())?;
        }
        Command::GenCfAnswers(_) => {
            pipeline.generate_cf_answers(dataset).await?;
        }
        Command::GenCf(_) => {
            pipeline.generate_cf_contexts(dataset).await?;
        }
        Command::CleanCf(_) => {
            pipeline.clean_counterfactuals(dataset).await?;
        }
        Command::GenPara(_) => {
            pipeline.generate_paraphrases(dataset).await?;
        }
        Command::CleanPara(_) => {
            pipeline.clean_paraphrases(dataset).await?;
        }
        Command::Postprocess(_) => {
            pipeline.postprocess(dataset)?;
        }
        Command::Run(run) => {
            let raw = run.stage.raw_path(pipeline.data_dir());
            pipeline.run(dataset, raw.as_deref(), run.clean).await?;
        }
    }

    Ok(())
}

fn build_pipeline(config: &AppConfig, stage: &StageArgs) -> GenerationPipeline {
    let client = Arc::new(build_client(config));
    let service = Arc::new(OpenAiGenerationService::new(
        client,
        stage.generation_options(&config.generation_model),
    ));
    let data_dir = stage
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.data_dir));
    GenerationPipeline::new(service, stage.tuning(), data_dir)
}
