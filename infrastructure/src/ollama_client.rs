use crate::config::Config;
use domain::error::{EmbeddingError, GenerationError};
use domain::models::{ChatMessage, EmbeddingVector};
use domain::ports::{Embedder, Generator};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    done: bool,
}

/// HTTP client for a local Ollama server. Serves both as the embedding
/// provider (`/api/embed`) and the language model (`/api/chat`).
#[derive(Clone)]
pub struct OllamaClient {
    client: Arc<Client>,
    base_url: String,
    embed_model: String,
    chat_model: String,
    temperature: f32,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client: Arc::new(client),
            base_url: config.ollama_base_url.clone(),
            embed_model: config.embed_model.clone(),
            chat_model: config.chat_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn generate_embeddings(
        &self,
        texts: &[String],
    ) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.embed_model,
            input: texts,
        };
        let (status, body) = self
            .post_json(&url, &request)
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(EmbeddingError::Provider(format!("{status}: {body}")));
        }
        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| EmbeddingError::Provider(format!("unexpected response: {e}")))?;
        Ok(parsed.embeddings.into_iter().map(EmbeddingVector::from).collect())
    }

    pub async fn generate_response(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };
        let (status, body) = self
            .post_json(&url, &request)
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Provider(format!("{status}: {body}")));
        }
        parse_chat_body(&body)
    }

    /// POST a JSON body, retrying transport failures and 5xx answers with
    /// exponential backoff (1s, 2s, 4s, ...).
    async fn post_json<T>(&self, url: &str, body: &T) -> Result<(StatusCode, String), reqwest::Error>
    where
        T: Serialize + Sync + ?Sized,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = self.post_once(url, body).await;
            let retryable = match &result {
                Ok((status, _)) => status.is_server_error(),
                Err(err) => err.is_timeout() || err.is_connect(),
            };
            if !retryable || attempt >= self.max_retries {
                return result;
            }
            let delay = Duration::from_secs(1u64 << attempt.min(6));
            tracing::warn!(
                "Request to {url} failed (attempt {}/{}), retrying in {delay:?}",
                attempt + 1,
                self.max_retries + 1
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn post_once<T>(&self, url: &str, body: &T) -> Result<(StatusCode, String), reqwest::Error>
    where
        T: Serialize + Sync + ?Sized,
    {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }
}

impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let input = [text.to_string()];
        let mut vectors = self.generate_embeddings(&input).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        vectors.pop().ok_or(EmbeddingError::Empty)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.generate_embeddings(texts).await
    }
}

impl Generator for OllamaClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        self.generate_response(messages).await
    }
}

/// Accept both a single JSON object and newline-delimited streaming chunks.
fn parse_chat_body(body: &str) -> Result<String, GenerationError> {
    if let Ok(response) = serde_json::from_str::<ChatResponse>(body) {
        return Ok(response.message.content);
    }

    let mut full_content = String::new();
    let mut chunks = 0usize;
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let chunk: ChatResponse = serde_json::from_str(line)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        full_content.push_str(&chunk.message.content);
        chunks += 1;
        if chunk.done {
            break;
        }
    }
    if chunks == 0 {
        return Err(GenerationError::InvalidResponse("empty response body".into()));
    }
    Ok(full_content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_chat_object() {
        let body = r#"{"model":"llama3.2","message":{"role":"assistant","content":"- buy milk"},"done":true}"#;
        assert_eq!(parse_chat_body(body).unwrap(), "- buy milk");
    }

    #[test]
    fn joins_streamed_chat_chunks() {
        let body = concat!(
            r#"{"message":{"role":"assistant","content":"buy "},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":"milk"},"done":true}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":" ignored"},"done":false}"#,
        );
        assert_eq!(parse_chat_body(body).unwrap(), "buy milk");
    }

    #[test]
    fn rejects_garbage_and_empty_bodies() {
        assert!(matches!(
            parse_chat_body("<html>bad gateway</html>"),
            Err(GenerationError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_chat_body("  \n"),
            Err(GenerationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn request_payloads_match_the_ollama_api() {
        let input = vec!["note one".to_string()];
        let embed = serde_json::to_value(EmbedRequest {
            model: "nomic-embed-text",
            input: &input,
        })
        .unwrap();
        assert_eq!(embed["input"][0], "note one");

        let messages = [ChatMessage::system("rules"), ChatMessage::user("question")];
        let chat = serde_json::to_value(ChatRequest {
            model: "llama3.2",
            messages: &messages,
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        })
        .unwrap();
        assert_eq!(chat["messages"][1]["role"], "user");
        assert_eq!(chat["stream"], false);
        assert_eq!(chat["options"]["temperature"], 0.0);
    }

    #[tokio::test]
    async fn unreachable_server_is_reported_as_unavailable() {
        let config = Config {
            ollama_base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            request_timeout: Duration::from_secs(2),
            ..Config::default()
        };
        let client = OllamaClient::new(&config).unwrap();

        let err = client.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_)));

        let err = client
            .generate(&[ChatMessage::user("hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
        assert!(!client.health_check().await);
    }
}
