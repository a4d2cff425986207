//! OpenAI-compatible provider client.
//!
//! Serves chat completions, embeddings, and audio transcription against any
//! OpenAI-compatible API (including Azure deployments fronted by a
//! compatible gateway). Transient failures are
//! retried here with exponential backoff; whatever escapes is terminal for
//! the current message delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::error::ProcessError;
use crate::domain::models::ProviderConfig;
use crate::domain::ports::{ChatOutcome, CompletionApi, EmbeddingApi, EmbeddingOutcome, TranscriptionApi};

use super::error::ProviderApiError;
use super::retry::RetryPolicy;

/// HTTP client for the provider API.
pub struct OpenAiClient {
    config: ProviderConfig,
    http: ReqwestClient,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build provider HTTP client: {e}"))?;
        let retry = RetryPolicy::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        );
        Ok(Self {
            config,
            http,
            retry,
        })
    }

    fn api_key(&self) -> Result<String, ProviderApiError> {
        self.config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or(ProviderApiError::InvalidApiKey)
    }

    async fn chat_request(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ChatCompletionResponse, ProviderApiError> {
        let api_key = self.api_key()?;
        let body = ChatCompletionRequest {
            model: self.config.chat_deployment.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
        };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderApiError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn embeddings_request(
        &self,
        texts: &[String],
    ) -> Result<EmbeddingsResponse, ProviderApiError> {
        let api_key = self.api_key()?;
        let body = EmbeddingsRequest {
            model: self.config.embedding_deployment.clone(),
            input: texts.to_vec(),
        };
        let response = self
            .http
            .post(format!("{}/embeddings", self.config.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderApiError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn fetch_audio(&self, audio_url: &str) -> Result<Vec<u8>, ProviderApiError> {
        let response = self
            .http
            .get(audio_url)
            .send()
            .await
            .map_err(|e| ProviderApiError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderApiError::from_status(status, body));
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| ProviderApiError::Network(e.to_string()))
    }

    async fn transcription_request(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResponse, ProviderApiError> {
        let api_key = self.api_key()?;
        let mut form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(audio).file_name(file_name.to_string()),
            )
            .text("model", self.config.transcription_deployment.clone());
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }
        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderApiError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<R, ProviderApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            return Err(ProviderApiError::from_status(status, body));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CompletionApi for OpenAiClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<ChatOutcome, ProcessError> {
        let response = self
            .retry
            .execute(|| self.chat_request(prompt, max_tokens))
            .await
            .map_err(|e| ProcessError::Provider(e.to_string()))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProcessError::Provider("empty choices in response".to_string()))?;
        Ok(ChatOutcome {
            text,
            prompt_tokens: response.usage.prompt_tokens,
            completion_tokens: response.usage.completion_tokens,
        })
    }
}

#[async_trait]
impl EmbeddingApi for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingOutcome, ProcessError> {
        let response = self
            .retry
            .execute(|| self.embeddings_request(texts))
            .await
            .map_err(|e| ProcessError::Provider(e.to_string()))?;

        // Sort by index to maintain input order
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(EmbeddingOutcome {
            vectors: data.into_iter().map(|d| d.embedding).collect(),
            prompt_tokens: response.usage.prompt_tokens,
        })
    }
}

#[async_trait]
impl TranscriptionApi for OpenAiClient {
    async fn transcribe(
        &self,
        audio_url: &str,
        language: Option<&str>,
    ) -> Result<String, ProcessError> {
        let audio = self
            .retry
            .execute(|| self.fetch_audio(audio_url))
            .await
            .map_err(|e| ProcessError::Provider(format!("audio fetch failed: {e}")))?;
        let file_name = audio_url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("audio.wav")
            .to_string();

        let response = self
            .retry
            .execute(|| self.transcription_request(audio.clone(), &file_name, language))
            .await
            .map_err(|e| ProcessError::Provider(e.to_string()))?;
        Ok(response.text)
    }
}

// -- Provider API request/response types --

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
    usage: EmbeddingsUsage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsUsage {
    prompt_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}
