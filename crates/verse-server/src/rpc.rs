use serde::{Deserialize, Serialize};

/// Request sent by clients over the WebSocket.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// Response envelope: `{ id, success, result?, error?: { code, message } }`
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: &'static str,
    pub message: String,
}

pub mod code {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
    pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, code::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, code::INVALID_PARAMS, msg)
    }

    pub fn internal_error(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, code::INTERNAL_ERROR, msg)
    }

    pub fn unauthenticated(id: Option<serde_json::Value>) -> Self {
        Self::error(id, code::UNAUTHENTICATED, "Not logged in")
    }

    pub fn parse_error() -> Self {
        Self::error(None, code::PARSE_ERROR, "Parse error")
    }
}

/// Extract a required string param from the RPC params object.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// Extract an optional string param.
pub fn optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rpc_request() {
        let json = r#"{"method":"chat.send","params":{"text":"hello"},"id":1}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "chat.send");
        assert!(req.params.is_some());
        assert_eq!(req.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn success_response_serializes() {
        let resp = RpcResponse::success(Some(serde_json::json!(1)), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
        assert!(json.contains("\"success\":true"));
    }

    #[test]
    fn error_response_serializes() {
        let resp = RpcResponse::method_not_found(Some(serde_json::json!(1)), "foo.bar");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("METHOD_NOT_FOUND"));
        assert!(json.contains("foo.bar"));
        assert!(!json.contains("\"result\""));
        assert!(json.contains("\"success\":false"));
    }

    #[test]
    fn unauthenticated_response_code() {
        let resp = RpcResponse::unauthenticated(Some(serde_json::json!(7)));
        assert!(!resp.success);
        assert_eq!(resp.error.as_ref().unwrap().code, code::UNAUTHENTICATED);
    }

    #[test]
    fn parse_error_has_no_id() {
        let resp = RpcResponse::parse_error();
        assert!(resp.id.is_none());
        assert_eq!(resp.error.as_ref().unwrap().code, code::PARSE_ERROR);
    }

    #[test]
    fn require_str_extracts() {
        let params = serde_json::json!({"name": "alice", "count": 5});
        assert_eq!(require_str(&params, "name").unwrap(), "alice");
        assert!(require_str(&params, "missing").is_err());
        assert!(require_str(&params, "count").is_err()); // not a string
    }

    #[test]
    fn optional_str_extracts() {
        let params = serde_json::json!({"name": "alice"});
        assert_eq!(optional_str(&params, "name"), Some("alice"));
        assert_eq!(optional_str(&params, "missing"), None);
    }
}
