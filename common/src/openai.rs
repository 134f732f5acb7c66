use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::{error::AppError, utils::config::AppConfig};

pub fn build_client(config: &AppConfig) -> Client<OpenAIConfig> {
    Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    )
}

/// Sampling parameters for a single structured chat completion.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_attempts: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4000,
            temperature: 0.8,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_attempts: 30,
        }
    }
}

/// JSON schema the model reply has to satisfy.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: serde_json::Value,
}

/// Sends a system + user message pair and deserializes the schema-constrained
/// reply. Transport failures and malformed replies are retried up to
/// `max_attempts` before the last error is surfaced.
pub async fn query_structured<T: DeserializeOwned>(
    client: &Client<OpenAIConfig>,
    options: &ChatOptions,
    output: &OutputSchema,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<T, AppError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some(output.description.into()),
            name: output.name.into(),
            schema: Some(output.schema.clone()),
            strict: Some(true),
        },
    };

    let request = CreateChatCompletionRequestArgs::default()
        .model(&options.model)
        .messages([
            ChatCompletionRequestSystemMessage::from(system_prompt).into(),
            ChatCompletionRequestUserMessage::from(user_prompt).into(),
        ])
        .max_tokens(options.max_tokens)
        .temperature(options.temperature)
        .top_p(options.top_p)
        .frequency_penalty(options.frequency_penalty)
        .presence_penalty(options.presence_penalty)
        .response_format(response_format)
        .build()?;

    let max_attempts = options.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match client.chat().create(request.clone()).await {
            Ok(response) => {
                let content = response
                    .choices
                    .first()
                    .and_then(|choice| choice.message.content.as_ref())
                    .ok_or(AppError::LLMParsing(
                        "No content found in LLM response".into(),
                    ));

                match content {
                    Ok(content) => match serde_json::from_str::<T>(content) {
                        Ok(parsed) => return Ok(parsed),
                        Err(err) => {
                            warn!(
                                schema = output.name,
                                attempt,
                                error = %err,
                                "LLM reply did not match schema; retrying"
                            );
                            last_error = Some(AppError::LLMParsing(format!(
                                "Failed to parse LLM response into {}: {}",
                                output.name, err
                            )));
                        }
                    },
                    Err(err) => last_error = Some(err),
                }
            }
            Err(err) => {
                warn!(
                    schema = output.name,
                    attempt,
                    error = %err,
                    "chat completion request failed; retrying"
                );
                last_error = Some(AppError::OpenAI(err));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        AppError::LLMParsing(format!("no attempts were made for {}", output.name))
    }))
}
