use serde::{Deserialize, Serialize};

use verse_core::ChatMessage;

/// Request body for the chat completions endpoint.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_wire_shape() {
        let messages = vec![ChatMessage::system("persona"), ChatMessage::user("hi")];
        let req = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.6,
            max_tokens: 256,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 256);
    }

    #[test]
    fn chat_response_parses_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello!"}}]}"#;
        let resp: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("hello!"));
    }

    #[test]
    fn chat_response_tolerates_null_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let resp: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.choices[0].message.content.is_none());
    }

    #[test]
    fn transcription_response_parses() {
        let raw = r#"{"text":"hello world"}"#;
        let resp: TranscriptionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.text, "hello world");
    }
}
