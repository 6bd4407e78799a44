//! Client for a hosted text-generation endpoint (Hugging Face inference API shape)

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{AnalysisError, TextGenerator};

pub const DEFAULT_INFERENCE_URL: &str =
    "https://api-inference.huggingface.co/models/meta-llama/Llama-3.2-1B-Instruct";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_length: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Messages of context kept per user
    pub max_history: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_INFERENCE_URL.to_string(),
            api_key: None,
            max_length: 300,
            temperature: 0.7,
            timeout_secs: 30,
            max_history: 20,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_length: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Batch(Vec<Generation>),
    Single(Generation),
    Failure { error: String },
}

pub struct InferenceClient {
    client: Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

fn provider_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("error")
            .and_then(|error| {
                error
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| error.get("message").and_then(|m| m.as_str()).map(str::to_string))
            })
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16())),
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            format!("request failed with status {}: {}", status.as_u16(), snippet)
        }
    }
}

#[async_trait]
impl TextGenerator for InferenceClient {
    async fn generate(&self, prompt: &str) -> Result<String, AnalysisError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(AnalysisError::MissingApiKey)?;

        let request = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_length: self.config.max_length,
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;
        debug!("Inference response ({}): {} bytes", status, body.len());

        if !status.is_success() {
            let message = provider_message(status, &body);
            warn!("Inference endpoint returned {}: {}", status, message);
            return Err(AnalysisError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerationResponse =
            serde_json::from_str(&body).map_err(|e| AnalysisError::Decode(e.to_string()))?;

        match parsed {
            GenerationResponse::Batch(generations) => generations
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .ok_or(AnalysisError::EmptyReply),
            GenerationResponse::Single(generation) => Ok(generation.generated_text),
            GenerationResponse::Failure { error } => Err(AnalysisError::Provider {
                status: status.as_u16(),
                message: error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_skips_network() {
        let client = InferenceClient::new(InferenceConfig {
            // Unroutable; the call must fail before any request is attempted
            endpoint: "http://127.0.0.1:9/unused".to_string(),
            api_key: None,
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(
            client.generate("prompt").await,
            Err(AnalysisError::MissingApiKey)
        ));
    }

    #[test]
    fn test_provider_message() {
        assert_eq!(
            provider_message(StatusCode::SERVICE_UNAVAILABLE, r#"{"error":"Model is loading","estimated_time":20.0}"#),
            "Model is loading"
        );
        assert_eq!(
            provider_message(StatusCode::UNAUTHORIZED, r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(
            provider_message(StatusCode::BAD_GATEWAY, "<html>oops</html>"),
            "request failed with status 502: <html>oops</html>"
        );
    }

    #[test]
    fn test_response_shapes() {
        let batch: GenerationResponse =
            serde_json::from_str(r#"[{"generated_text":"hi"}]"#).unwrap();
        assert!(matches!(batch, GenerationResponse::Batch(ref v) if v.len() == 1));

        let single: GenerationResponse = serde_json::from_str(r#"{"generated_text":"hi"}"#).unwrap();
        assert!(matches!(single, GenerationResponse::Single(_)));

        let failure: GenerationResponse = serde_json::from_str(r#"{"error":"busy"}"#).unwrap();
        assert!(matches!(failure, GenerationResponse::Failure { .. }));
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerationRequest {
            inputs: "hello",
            parameters: GenerationParameters {
                max_length: 300,
                temperature: 0.5,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["inputs"], "hello");
        assert_eq!(value["parameters"]["max_length"], 300);
        assert_eq!(value["parameters"]["temperature"], 0.5);
    }
}
