//! Google Gemini `generateContent` driver.
//!
//! Implements [`ChatModel`] by replaying the conversation's prior turns
//! followed by the new user message on each request.

use serde::{Deserialize, Serialize};

use super::{ChatModel, ConversationHandle, GeminiSettings, GenerationConfig, LlmError, TurnRole};

/// Driver for the Gemini REST API.
#[derive(Clone)]
pub struct GeminiDriver {
    http: reqwest::Client,
    settings: GeminiSettings,
}

impl std::fmt::Debug for GeminiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiDriver {
    /// Create a new Gemini driver with the given settings.
    #[must_use]
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait::async_trait]
impl ChatModel for GeminiDriver {
    async fn send_message(
        &self,
        conversation: &mut ConversationHandle,
        text: &str,
    ) -> Result<String, LlmError> {
        tracing::debug!(
            model = %self.settings.model,
            prior_turns = conversation.len(),
            "Gemini API request"
        );

        let resp = {
            let body = GenerateContentRequest::new(conversation, text, &self.settings.generation);
            self.http
                .post(self.endpoint())
                .header("x-goog-api-key", &self.settings.api_key)
                .json(&body)
                .send()
                .await?
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        let reply = parsed.into_reply()?;

        conversation.push_exchange(text, reply.as_str());
        Ok(reply)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationConfig,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(
        conversation: &'a ConversationHandle,
        text: &'a str,
        generation_config: &'a GenerationConfig,
    ) -> Self {
        let mut contents: Vec<Content<'a>> = conversation
            .turns()
            .iter()
            .map(|turn| Content::new(turn.role, &turn.text))
            .collect();
        contents.push(Content::new(TurnRole::User, text));

        Self {
            contents,
            generation_config,
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: TurnRole,
    parts: [Part<'a>; 1],
}

impl<'a> Content<'a> {
    fn new(role: TurnRole, text: &'a str) -> Self {
        Self {
            role,
            parts: [Part { text }],
        }
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_reply(self) -> Result<String, LlmError> {
        let texts: Vec<String> = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if texts.is_empty() {
            return Err(match self.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => LlmError::Blocked(reason),
                None => LlmError::EmptyResponse,
            });
        }

        Ok(texts.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode, Uri},
    };
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured {
        paths: Arc<Mutex<Vec<String>>>,
        keys: Arc<Mutex<Vec<String>>>,
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    /// Serve a fixed reply for every request and record what was sent.
    async fn spawn_mock(status: StatusCode, reply: Value) -> (String, Captured) {
        let captured = Captured::default();
        let recorder = captured.clone();

        let app = Router::new().fallback(
            move |uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
                let recorder = recorder.clone();
                let reply = reply.clone();
                async move {
                    recorder.paths.lock().unwrap().push(uri.path().to_string());
                    recorder.keys.lock().unwrap().push(
                        headers
                            .get("x-goog-api-key")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string(),
                    );
                    recorder.bodies.lock().unwrap().push(body);
                    (status, Json(reply))
                }
            },
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), captured)
    }

    fn driver_for(base_url: String) -> GeminiDriver {
        let mut settings = GeminiSettings::new("test-key");
        settings.base_url = base_url;
        GeminiDriver::new(settings)
    }

    fn text_reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn test_sends_key_model_and_generation_config() {
        let (base_url, captured) = spawn_mock(StatusCode::OK, text_reply("hi!")).await;
        let driver = driver_for(base_url);
        let mut conversation = ConversationHandle::new();

        let reply = driver.send_message(&mut conversation, "hello").await.unwrap();

        assert_eq!(reply, "hi!");
        assert_eq!(
            captured.paths.lock().unwrap()[0],
            "/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(captured.keys.lock().unwrap()[0], "test-key");

        let body = &captured.bodies.lock().unwrap()[0];
        assert_eq!(body["generationConfig"]["topK"], 64);
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_follow_up_replays_prior_turns() {
        let (base_url, captured) = spawn_mock(StatusCode::OK, text_reply("sure")).await;
        let driver = driver_for(base_url);
        let mut conversation = ConversationHandle::new();

        driver.send_message(&mut conversation, "first").await.unwrap();
        driver.send_message(&mut conversation, "second").await.unwrap();

        assert_eq!(conversation.len(), 4);

        let bodies = captured.bodies.lock().unwrap();
        let contents = bodies[1]["contents"].as_array().unwrap();
        let roles: Vec<&str> = contents.iter().map(|c| c["role"].as_str().unwrap()).collect();
        assert_eq!(roles, ["user", "model", "user"]);
        assert_eq!(contents[0]["parts"][0]["text"], "first");
        assert_eq!(contents[1]["parts"][0]["text"], "sure");
        assert_eq!(contents[2]["parts"][0]["text"], "second");
    }

    #[tokio::test]
    async fn test_error_status_leaves_conversation_untouched() {
        let (base_url, _) = spawn_mock(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": { "code": 429, "message": "quota" } }),
        )
        .await;
        let driver = driver_for(base_url);
        let mut conversation = ConversationHandle::new();

        let err = driver.send_message(&mut conversation, "hello").await.unwrap_err();

        assert!(matches!(err, LlmError::Status { status: 429, .. }));
        assert!(conversation.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let (base_url, _) = spawn_mock(
            StatusCode::OK,
            json!({ "promptFeedback": { "blockReason": "SAFETY" } }),
        )
        .await;
        let driver = driver_for(base_url);
        let mut conversation = ConversationHandle::new();

        let err = driver.send_message(&mut conversation, "hello").await.unwrap_err();

        assert!(matches!(err, LlmError::Blocked(reason) if reason == "SAFETY"));
        assert!(conversation.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_request_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let driver = driver_for(format!("http://{addr}"));
        let mut conversation = ConversationHandle::new();

        let err = driver.send_message(&mut conversation, "hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Request(_)));
    }

    #[test]
    fn test_reply_concatenates_parts() {
        let parsed: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hel" }, { "text": "lo" }] } }]
        }))
        .unwrap();
        assert_eq!(parsed.into_reply().unwrap(), "Hello");
    }

    #[test]
    fn test_reply_without_candidates_is_empty() {
        let parsed: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(parsed.into_reply(), Err(LlmError::EmptyResponse)));
    }
}
