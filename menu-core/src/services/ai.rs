use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::{MODEL, TEMPERATURE};
use crate::error::StructureError;
use crate::model::schema::SampleSchema;
use crate::services::ai_types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat};

const ERROR_SNIPPET_CHARS: usize = 400;

/// One chat-completion round trip.
pub trait ChatCompletion: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, StructureError>;
}

pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    /// No request timeout: a slow completion is waited out.
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(None::<Duration>).build()?;

        Ok(OpenAiClient {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    /// Talks to a loopback server directly, ignoring any proxy settings.
    #[cfg(test)]
    pub fn direct(endpoint: &str, api_key: &str) -> Self {
        OpenAiClient {
            client: Client::builder().no_proxy().build().unwrap(),
            endpoint: endpoint.to_string(),
            api_key: Some(api_key.to_string()),
        }
    }
}

impl ChatCompletion for OpenAiClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, StructureError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(StructureError::MissingApiKey)?;

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()?;

        let status = resp.status();

        // Read as text first so an error body is not lost when it is not JSON.
        let text = resp.text()?;

        if !status.is_success() {
            return Err(StructureError::Api {
                status: status.as_u16(),
                message: extract_error_message(status, &text),
            });
        }

        serde_json::from_str(&text).map_err(|e| StructureError::Envelope(e.to_string()))
    }
}

fn extract_error_message(status: StatusCode, body_text: &str) -> String {
    // { "error": { "message": "..." } } or { "message": "..." }
    if let Ok(v) = serde_json::from_str::<Value>(body_text) {
        if let Some(msg) = v
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(msg) = v.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }

    let trimmed = body_text.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("empty response body")
            .to_string();
    }

    if trimmed.chars().count() > ERROR_SNIPPET_CHARS {
        let snippet: String = trimmed.chars().take(ERROR_SNIPPET_CHARS).collect();
        format!("{snippet}...")
    } else {
        trimmed.to_string()
    }
}

fn system_prompt(schema: &SampleSchema) -> Result<String, StructureError> {
    let schema_json = schema
        .to_prompt_json()
        .map_err(|e| StructureError::Prompt(e.to_string()))?;

    Ok(format!(
        "Return an array of JSON objects ONLY using the raw menu text that is incoming \
         from OCR of images of a Chinese restaurant menu.\nHere is an example schema: {schema_json}"
    ))
}

pub fn build_request(raw_text: &str) -> Result<ChatRequest, StructureError> {
    Ok(ChatRequest {
        model: MODEL.to_string(),
        temperature: TEMPERATURE,
        response_format: ResponseFormat::json_object(),
        messages: vec![
            ChatMessage::system(system_prompt(&SampleSchema::sample())?),
            ChatMessage::user(format!("OCR raw text: {raw_text}")),
        ],
    })
}

/// Asks the model to turn OCR text into menu JSON. Whatever valid JSON comes
/// back is returned as is.
pub fn structure(client: &dyn ChatCompletion, raw_text: &str) -> Result<Value, StructureError> {
    let request = build_request(raw_text)?;
    let response = client.complete(&request)?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(StructureError::EmptyChoices)?;

    let content = choice
        .message
        .content
        .ok_or(StructureError::MissingContent)?;

    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::record::FailureStage;
    use crate::services::ai_types::{ChatChoice, ChoiceMessage};
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::thread::{self, JoinHandle};

    pub fn response_with(content: Option<&str>) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: ChoiceMessage {
                    content: content.map(str::to_string),
                },
            }],
        }
    }

    /// Replies with a fixed content string and remembers the last request.
    pub struct StubChat {
        pub content: String,
        pub last: Mutex<Option<ChatRequest>>,
    }

    impl StubChat {
        pub fn new(content: &str) -> Self {
            StubChat {
                content: content.to_string(),
                last: Mutex::new(None),
            }
        }
    }

    impl ChatCompletion for StubChat {
        fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, StructureError> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(response_with(Some(&self.content)))
        }
    }

    struct NoChoices;

    impl ChatCompletion for NoChoices {
        fn complete(&self, _: &ChatRequest) -> Result<ChatResponse, StructureError> {
            Ok(ChatResponse { choices: vec![] })
        }
    }

    const EGG_ROLL: &str = r#"{"categories": [], "products": [{"title": "Egg Roll", "price_excl_tax": "3.00", "price_incl_tax": "3.00", "category": "Appetizers", "description": "", "is_active": true}]}"#;

    #[test]
    fn model_json_is_returned_unchanged() {
        let stub = StubChat::new(EGG_ROLL);
        let value = structure(&stub, "EGG ROLL 3.00").unwrap();

        assert_eq!(
            value,
            json!({
                "categories": [],
                "products": [{
                    "title": "Egg Roll",
                    "price_excl_tax": "3.00",
                    "price_incl_tax": "3.00",
                    "category": "Appetizers",
                    "description": "",
                    "is_active": true
                }]
            })
        );
    }

    #[test]
    fn request_is_fixed_and_carries_schema_and_text() {
        let stub = StubChat::new("[]");
        structure(&stub, "HOT AND SOUR SOUP 4.25").unwrap();

        let req = stub.last.lock().unwrap().clone().unwrap();
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.response_format, ResponseFormat::json_object());
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
        assert!(req.messages[0].content.contains("chefs-specialties"));
        assert!(req.messages[0].content.contains("Shrimp with Broccoli"));
        assert_eq!(req.messages[1].role, "user");
        assert_eq!(req.messages[1].content, "OCR raw text: HOT AND SOUR SOUP 4.25");
    }

    #[test]
    fn request_serializes_response_format_type() {
        let v = serde_json::to_value(build_request("x").unwrap()).unwrap();
        assert_eq!(v["response_format"], json!({ "type": "json_object" }));
        assert_eq!(v["temperature"], json!(0.0));
    }

    #[test]
    fn non_json_content_is_a_response_error() {
        let err = structure(&StubChat::new("Sure! Here is your menu:"), "x").unwrap_err();
        assert!(matches!(err, StructureError::InvalidJson(_)));
        assert_eq!(err.stage(), FailureStage::Response);
    }

    #[test]
    fn empty_choices_is_an_error() {
        let err = structure(&NoChoices, "x").unwrap_err();
        assert!(matches!(err, StructureError::EmptyChoices));
    }

    /// Answers one HTTP request with the given status and body; the handle
    /// yields the raw request it received.
    fn serve_once(status: &str, content_type: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            loop {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);

                let text = String::from_utf8_lossy(&buf);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }

            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        });

        (url, handle)
    }

    #[test]
    fn http_success_decodes_completion_body() {
        let body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "{\"a\": 1}", "refusal": null },
                "logprobs": null,
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
        .to_string();
        let (url, server) = serve_once("200 OK", "application/json", &body);

        let client = OpenAiClient::direct(&url, "sk-test");
        let value = structure(&client, "MENU").unwrap();
        assert_eq!(value, json!({ "a": 1 }));

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer sk-test"));
        assert!(request.contains("\"response_format\":{\"type\":\"json_object\"}"));
        assert!(request.contains("OCR raw text: MENU"));
    }

    #[test]
    fn http_error_carries_provider_message() {
        let body = r#"{"error": {"message": "Incorrect API key", "type": "invalid_request_error"}}"#;
        let (url, server) = serve_once("401 Unauthorized", "application/json", body);

        let client = OpenAiClient::direct(&url, "sk-bad");
        let err = structure(&client, "MENU").unwrap_err();
        server.join().unwrap();

        match &err {
            StructureError::Api { status, message } => {
                assert_eq!(*status, 401);
                assert_eq!(message, "Incorrect API key");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(err.stage(), FailureStage::Request);
        assert_eq!(err.to_string(), "HTTP 401: Incorrect API key");
    }

    #[test]
    fn http_non_json_body_is_an_envelope_error() {
        let (url, server) = serve_once("200 OK", "text/html", "<html><body>gateway</body></html>");

        let client = OpenAiClient::direct(&url, "sk-test");
        let err = structure(&client, "MENU").unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, StructureError::Envelope(_)));
        assert_eq!(err.stage(), FailureStage::Response);
    }

    #[test]
    fn system_prompt_embeds_spaced_schema() {
        let req = build_request("x").unwrap();
        assert!(req.messages[0]
            .content
            .contains(r#"Here is an example schema: {"categories": [{"name": "Seafood""#));
    }

    #[test]
    fn missing_api_key_fails_before_sending() {
        let client = OpenAiClient::new("http://127.0.0.1:9/v1/chat/completions", None).unwrap();
        let err = structure(&client, "x").unwrap_err();
        assert!(matches!(err, StructureError::MissingApiKey));
        assert_eq!(err.stage(), FailureStage::Request);
    }

    #[test]
    fn error_message_prefers_provider_message() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(
            extract_error_message(StatusCode::UNAUTHORIZED, body),
            "Incorrect API key provided"
        );
        assert_eq!(
            extract_error_message(StatusCode::BAD_GATEWAY, ""),
            "Bad Gateway"
        );

        let long = "x".repeat(1000);
        let msg = extract_error_message(StatusCode::INTERNAL_SERVER_ERROR, &long);
        assert_eq!(msg.len(), ERROR_SNIPPET_CHARS + 3);
    }
}
