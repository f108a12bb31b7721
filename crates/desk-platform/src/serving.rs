//! Model-serving endpoints: text embeddings and chat completions.

use std::time::Duration;

use async_trait::async_trait;
use desk_core::ToolError;
use desk_tools::{EmbeddingTool, TextGenerationTool};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::DatabricksConfig;
use crate::http::{build_client, read_json};

const EMBEDDING_SERVICE: &str = "embedding";
const GENERATION_SERVICE: &str = "generation";
const MAX_COMPLETION_TOKENS: u32 = 1_000;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    api_key: String,
    url: Option<String>,
}

impl EmbeddingClient {
    pub fn new(config: &DatabricksConfig) -> Result<Self, ToolError> {
        Ok(Self {
            client: build_client(EMBEDDING_SERVICE, Duration::from_secs(60))?,
            api_key: config.api_key.clone(),
            url: config.embedding_url.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingTool for EmbeddingClient {
    #[instrument(skip_all, fields(chars = text.chars().count()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ToolError> {
        let url = self
            .url
            .as_deref()
            .ok_or(ToolError::NotConfigured("DATABRICKS_EMBEDDING_URL"))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "input": text }))
            .send()
            .await
            .map_err(|err| ToolError::transport(EMBEDDING_SERVICE, err))?;
        let body: EmbeddingResponse = read_json(EMBEDDING_SERVICE, response).await?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .unwrap_or_default();
        if embedding.is_empty() {
            return Err(ToolError::EmptyEmbedding);
        }
        debug!(dimensions = embedding.len(), "embedding generated");
        Ok(embedding)
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    api_key: String,
    url: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(config: &DatabricksConfig) -> Result<Self, ToolError> {
        Ok(Self {
            client: build_client(GENERATION_SERVICE, Duration::from_secs(120))?,
            api_key: config.api_key.clone(),
            url: config.chat_url.clone(),
        })
    }
}

#[async_trait]
impl TextGenerationTool for ChatCompletionClient {
    #[instrument(skip_all, fields(prompt_chars = prompt.chars().count()))]
    async fn complete(&self, prompt: &str) -> Result<String, ToolError> {
        let url = self
            .url
            .as_deref()
            .ok_or(ToolError::NotConfigured("DATABRICKS_CHAT_URL"))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": MAX_COMPLETION_TOKENS,
            }))
            .send()
            .await
            .map_err(|err| ToolError::transport(GENERATION_SERVICE, err))?;
        let body: ChatResponse = read_json(GENERATION_SERVICE, response).await?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ToolError::decode(GENERATION_SERVICE, "response has no message content"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer) -> DatabricksConfig {
        DatabricksConfig {
            api_key: "dapi-test".to_string(),
            server_hostname: "unused".to_string(),
            http_path: "/sql/1.0/warehouses/wh42".to_string(),
            embedding_url: Some(format!("{}/serving-endpoints/embed/invocations", server.uri())),
            chat_url: Some(format!("{}/serving-endpoints/chat/invocations", server.uri())),
        }
    }

    #[tokio::test]
    async fn embedding_reads_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/serving-endpoints/embed/invocations"))
            .and(header("authorization", "Bearer dapi-test"))
            .and(body_json(json!({ "input": "printer jam" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [0.5, -0.25, 1.0] }]
            })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&config(&server)).unwrap();
        assert_eq!(client.embed("printer jam").await.unwrap(), vec![0.5, -0.25, 1.0]);
    }

    #[tokio::test]
    async fn missing_embedding_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&config(&server)).unwrap();
        assert_eq!(client.embed("x").await, Err(ToolError::EmptyEmbedding));
    }

    #[tokio::test]
    async fn completion_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/serving-endpoints/chat/invocations"))
            .and(body_json(json!({
                "messages": [{ "role": "user", "content": "route this" }],
                "max_tokens": 1000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"ok\": true}" } }]
            })))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(&config(&server)).unwrap();
        assert_eq!(client.complete("route this").await.unwrap(), "{\"ok\": true}");
    }

    #[tokio::test]
    async fn error_statuses_carry_code_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/serving-endpoints/chat/invocations"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/serving-endpoints/embed/invocations"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .mount(&server)
            .await;

        let chat = ChatCompletionClient::new(&config(&server)).unwrap();
        assert_eq!(
            chat.complete("x").await,
            Err(ToolError::Status {
                service: "generation",
                status: 429,
                body: "slow down".to_string()
            })
        );

        let embed = EmbeddingClient::new(&config(&server)).unwrap();
        assert_eq!(
            embed.embed("x").await,
            Err(ToolError::Status {
                service: "embedding",
                status: 400,
                body: "bad input".to_string()
            })
        );
    }

    #[tokio::test]
    async fn unconfigured_endpoints_fail_fast() {
        let config = DatabricksConfig {
            api_key: String::new(),
            server_hostname: String::new(),
            http_path: String::new(),
            embedding_url: None,
            chat_url: None,
        };
        let chat = ChatCompletionClient::new(&config).unwrap();
        assert_eq!(
            chat.complete("x").await,
            Err(ToolError::NotConfigured("DATABRICKS_CHAT_URL"))
        );
    }
}
