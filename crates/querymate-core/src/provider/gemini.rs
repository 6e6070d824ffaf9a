use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::util::http;

use super::TextGenerator;

/// Google Gemini API provider.
pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    max_output_tokens: u32,
    temperature: f64,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        api_base: Option<String>,
        max_output_tokens: u32,
        temperature: f64,
    ) -> Self {
        let base = api_base
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self {
            api_key,
            api_base: base.trim_end_matches('/').to_string(),
            max_output_tokens,
            temperature,
        }
    }

    fn parse_response(&self, data: &serde_json::Value) -> Result<String, ProviderError> {
        let parts = data
            .get("candidates")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.get("parts"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::Parse("No candidates in response".to_string()))?;

        let mut text = String::new();
        for part in parts {
            if let Some(t) = part.get("text").and_then(|v| v.as_str()) {
                text.push_str(t);
            }
        }

        if text.is_empty() {
            return Err(ProviderError::Parse("Empty text in response".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, model, self.api_key
        );

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens,
                "temperature": self.temperature,
            },
        });

        debug!("Gemini request with model {}", model);

        let response = http::client()
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let data: serde_json::Value = response.json().await?;
        self.parse_response(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new("key".to_string(), None, 2048, 0.7)
    }

    #[test]
    fn test_parse_response_concatenates_parts() {
        let data = json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": "Hello "}, {"text": "world"}]
                }
            }]
        });
        assert_eq!(provider().parse_response(&data).unwrap(), "Hello world");
    }

    #[test]
    fn test_parse_response_missing_candidates() {
        let err = provider().parse_response(&json!({})).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn test_parse_response_empty_text() {
        let data = json!({
            "candidates": [{"content": {"parts": []}}]
        });
        let err = provider().parse_response(&data).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[tokio::test]
    async fn test_generate_requires_api_key() {
        let p = GeminiProvider::new(String::new(), None, 2048, 0.7);
        let err = p.generate("hi", "gemini-pro").await.unwrap_err();
        assert!(matches!(err, ProviderError::NoApiKey));
    }

    #[test]
    fn test_api_base_trailing_slash_stripped() {
        let p = GeminiProvider::new("k".into(), Some("http://localhost:9/".into()), 10, 0.0);
        assert_eq!(p.api_base, "http://localhost:9");
    }
}
