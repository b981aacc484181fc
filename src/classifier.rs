//! Language-model email classification
//!
//! The model is asked to answer with exactly one category token. Anything
//! else it says is mapped to the fallback category instead of failing the
//! message: an ambiguous answer means "no action needed", not "abort".

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::time::Duration;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::error::{Result, TriageError};
use crate::models::{EmailCategory, MessageMetadata};

/// Fixed instruction listing every category token with its definition
static SYSTEM_PROMPT: Lazy<String> = Lazy::new(build_system_prompt);

/// Preview text beyond this many characters adds cost without helping the model
const MAX_PREVIEW_CHARS: usize = 500;

/// Maps a message to exactly one category
#[async_trait]
pub trait MessageClassifier: Send + Sync {
    async fn classify(&self, message: &MessageMetadata) -> Result<EmailCategory>;
}

/// Build the fixed system instruction
pub fn build_system_prompt() -> String {
    let mut prompt = String::from(
        "You triage email. Classify the email into exactly one of these categories:\n\n",
    );
    for category in EmailCategory::ALL {
        prompt.push_str(&format!("{}: {}\n", category.as_token(), category.description()));
    }
    prompt.push_str("\nReply with the category name only, for example TO_REPLY. Do not explain.");
    prompt
}

/// Build the per-message user turn from the sender, subject and preview
pub fn build_user_prompt(message: &MessageMetadata) -> String {
    let preview: String = message.snippet.chars().take(MAX_PREVIEW_CHARS).collect();
    format!(
        "From: {}\nSubject: {}\nPreview: {}",
        message.sender, message.subject, preview
    )
}

/// Map the model's reply to a category
///
/// The reply is trimmed and upper-cased and must then equal a category token
/// exactly. Prose, partial tokens and unknown labels all yield `fallback`.
pub fn parse_category(reply: &str, fallback: EmailCategory) -> EmailCategory {
    reply.parse().unwrap_or(fallback)
}

fn service_error(error: OpenAIError) -> TriageError {
    TriageError::ClassificationError(error.to_string())
}

/// Classifier backed by an OpenAI-compatible chat completions endpoint
pub struct LlmClassifier {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u16,
    timeout: Duration,
    fallback: EmailCategory,
}

impl LlmClassifier {
    pub fn new(config: &ClassifierConfig, api_key: String) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(config.api_base.trim_end_matches('/'));

        // The client's own backoff would retry rate-limited calls; failures surface immediately instead
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Ok(Self {
            client: Client::with_config(openai_config).with_backoff(no_retry),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
            fallback: config.fallback()?,
        })
    }

    /// Build a classifier reading the API key from the configured environment variable
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(config, api_key)
    }

    async fn complete(&self, message: &MessageMetadata) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT.as_str())
                .build()
                .map_err(service_error)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(build_user_prompt(message))
                .build()
                .map_err(service_error)?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .max_tokens(self.max_tokens)
            .temperature(0.0_f32)
            .messages(messages)
            .build()
            .map_err(service_error)?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| TriageError::Timeout {
                operation: "classification".to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(service_error)?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl MessageClassifier for LlmClassifier {
    async fn classify(&self, message: &MessageMetadata) -> Result<EmailCategory> {
        let reply = self.complete(message).await?;
        let category = parse_category(&reply, self.fallback);

        if category.as_token() != reply.trim().to_uppercase() {
            debug!(
                "Unrecognized classification '{}' for message {}, using {}",
                reply.trim(),
                message.id,
                category
            );
        }

        Ok(category)
    }
}
