use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::{
    error::AppError,
    openai::{query_structured, ChatOptions},
};

use crate::{
    prompts,
    types::llm_outputs::{CfAnswerSet, CfContextSet, CfRepair, ParaphraseSet},
};

// Token budgets per stage, sized to the expected reply shapes.
const CF_ANSWERS_MAX_TOKENS: u32 = 256;
const CF_CONTEXTS_MAX_TOKENS: u32 = 2500;
const CF_REPAIR_MAX_TOKENS: u32 = 1200;
const PARAPHRASE_MAX_TOKENS: u32 = 2000;

/// Sampling knobs shared by every generation call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Overrides the per-stage token budget when set.
    pub max_tokens: Option<u32>,
    pub max_attempts: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.9,
            top_p: 1.0,
            max_tokens: None,
            max_attempts: 30,
        }
    }
}

/// The LLM calls the pipeline stages depend on. Implemented against the
/// OpenAI API in production and mocked in pipeline tests.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn counterfactual_answers(
        &self,
        question: &str,
        answers: &[String],
        num_answers: usize,
    ) -> Result<CfAnswerSet, AppError>;

    async fn counterfactual_passages(
        &self,
        question: &str,
        answer: &str,
        top_k: usize,
    ) -> Result<CfContextSet, AppError>;

    async fn repair_counterfactual(
        &self,
        question: &str,
        answer: &str,
        texts: &[String],
    ) -> Result<CfRepair, AppError>;

    async fn paraphrases(
        &self,
        question: &str,
        answer: &str,
        context: &str,
        num_pairs: usize,
    ) -> Result<ParaphraseSet, AppError>;

    async fn repair_paraphrases(
        &self,
        question: &str,
        answers: &[String],
        texts: &[String],
    ) -> Result<ParaphraseSet, AppError>;
}

pub struct OpenAiGenerationService {
    client: Arc<Client<OpenAIConfig>>,
    options: GenerationOptions,
}

impl OpenAiGenerationService {
    pub fn new(client: Arc<Client<OpenAIConfig>>, options: GenerationOptions) -> Self {
        Self { client, options }
    }

    fn chat_options(&self, stage_max_tokens: u32) -> ChatOptions {
        ChatOptions {
            model: self.options.model.clone(),
            max_tokens: self.options.max_tokens.unwrap_or(stage_max_tokens),
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            max_attempts: self.options.max_attempts,
            ..ChatOptions::default()
        }
    }
}

#[async_trait]
impl GenerationService for OpenAiGenerationService {
    async fn counterfactual_answers(
        &self,
        question: &str,
        answers: &[String],
        num_answers: usize,
    ) -> Result<CfAnswerSet, AppError> {
        query_structured(
            &self.client,
            &self.chat_options(CF_ANSWERS_MAX_TOKENS),
            &prompts::cf_answers_schema(),
            &prompts::cf_answers_system(num_answers),
            &prompts::cf_answers_user(question, answers),
        )
        .await
    }

    async fn counterfactual_passages(
        &self,
        question: &str,
        answer: &str,
        top_k: usize,
    ) -> Result<CfContextSet, AppError> {
        query_structured(
            &self.client,
            &self.chat_options(CF_CONTEXTS_MAX_TOKENS),
            &prompts::cf_contexts_schema(),
            &prompts::cf_contexts_system(question, answer, top_k),
            &prompts::cf_contexts_user(question, answer),
        )
        .await
    }

    async fn repair_counterfactual(
        &self,
        question: &str,
        answer: &str,
        texts: &[String],
    ) -> Result<CfRepair, AppError> {
        query_structured(
            &self.client,
            &self.chat_options(CF_REPAIR_MAX_TOKENS),
            &prompts::cf_repair_schema(),
            &prompts::clean_cf_system(),
            &prompts::clean_cf_user(question, answer, texts),
        )
        .await
    }

    async fn paraphrases(
        &self,
        question: &str,
        answer: &str,
        context: &str,
        num_pairs: usize,
    ) -> Result<ParaphraseSet, AppError> {
        query_structured(
            &self.client,
            &self.chat_options(PARAPHRASE_MAX_TOKENS),
            &prompts::paraphrase_schema(),
            &prompts::paraphrase_system(num_pairs),
            &prompts::paraphrase_user(context, question, answer),
        )
        .await
    }

    async fn repair_paraphrases(
        &self,
        question: &str,
        answers: &[String],
        texts: &[String],
    ) -> Result<ParaphraseSet, AppError> {
        query_structured(
            &self.client,
            &self.chat_options(PARAPHRASE_MAX_TOKENS),
            &prompts::paraphrase_schema(),
            &prompts::clean_para_system(texts.len()),
            &prompts::clean_para_user(question, answers, texts),
        )
        .await
    }
}
