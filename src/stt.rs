// 🎤 Transcription Client - Voice participant entry via OpenAI Whisper
// One fixed timeout per request; the transcript is tokenized into names

use std::time::Duration;
use thiserror::Error;

/// Production endpoint base. Tests point the client at a mock server.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";

/// Single client-side timeout; an overrun is surfaced as a timeout error,
/// not retried.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SttError {
    #[error("request timeout")]
    Timeout,

    #[error("speech recognition failed: {0}")]
    Service(String),

    #[error("transcription request failed: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for SttError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SttError::Timeout
        } else {
            SttError::Http(err)
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
}

pub struct TranscriptionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TranscriptionClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        TranscriptionClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Transcribe one audio clip to free text.
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String, SttError> {
        let part = reqwest::multipart::Part::bytes(audio).file_name("audio.wav");
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", "whisper-1");

        let response = self
            .http
            .post(format!("{}{}", self.base_url, TRANSCRIPTIONS_PATH))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Service(format!(
                "status {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| SttError::Service(format!("malformed response: {}", e)))?;

        Ok(parsed.text)
    }
}

/// Split a transcript into candidate participant names: comma/whitespace
/// separated tokens, single characters dropped, each capitalized
/// (first letter upper, remainder lower).
pub fn candidate_names(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| token.chars().count() > 1)
        .map(capitalize)
        .collect()
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_candidate_names_commas_and_whitespace() {
        assert_eq!(candidate_names("ali, sara  bob"), vec!["Ali", "Sara", "Bob"]);
    }

    #[test]
    fn test_candidate_names_drops_short_tokens() {
        assert_eq!(candidate_names("a ali b"), vec!["Ali"]);
        assert!(candidate_names("a, b").is_empty());
        assert!(candidate_names("   ").is_empty());
    }

    #[test]
    fn test_candidate_names_normalizes_case() {
        assert_eq!(candidate_names("ALI sArA"), vec!["Ali", "Sara"]);
    }

    #[tokio::test]
    async fn test_transcribe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS_PATH))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "text": "ali, sara bob" })),
            )
            .mount(&server)
            .await;

        let client = TranscriptionClient::with_base_url("test-key", &server.uri());
        let text = client.transcribe(vec![0, 1, 2]).await.unwrap();

        assert_eq!(text, "ali, sara bob");
        assert_eq!(candidate_names(&text), vec!["Ali", "Sara", "Bob"]);
    }

    #[tokio::test]
    async fn test_transcribe_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let client = TranscriptionClient::with_base_url("k", &server.uri());
        let result = client.transcribe(vec![0]).await;

        let err = result.unwrap_err();
        assert!(matches!(err, SttError::Service(_)));
        // The upstream status and body are carried in the logged message
        let message = err.to_string();
        assert!(message.contains("500"), "missing status in: {}", message);
        assert!(message.contains("upstream down"), "missing body in: {}", message);
    }

    #[tokio::test]
    async fn test_transcribe_empty_text_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = TranscriptionClient::with_base_url("k", &server.uri());
        let text = client.transcribe(vec![0]).await.unwrap();

        assert_eq!(text, "");
    }
}
