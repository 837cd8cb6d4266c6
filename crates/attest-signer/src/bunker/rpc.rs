//! NIP-46 request/response bodies and relay framing

use attest_core::Event;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, SignerError};

pub const METHOD_CONNECT: &str = "connect";
pub const METHOD_GET_PUBLIC_KEY: &str = "get_public_key";
pub const METHOD_SIGN_EVENT: &str = "sign_event";

/// Result value announcing that the user must approve at the URL in `error`
pub const AUTH_URL_RESULT: &str = "auth_url";

/// Encrypted request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    pub params: Vec<String>,
}

impl RpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Encrypted response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn success(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn auth_url(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Some(AUTH_URL_RESULT.to_string()),
            error: Some(url.into()),
        }
    }

    /// The approval URL, if this is an auth challenge
    pub fn auth_challenge(&self) -> Option<&str> {
        match (self.result.as_deref(), self.error.as_deref()) {
            (Some(AUTH_URL_RESULT), Some(url)) => Some(url),
            _ => None,
        }
    }

    /// Collapse into the result string or a rejection
    pub fn into_result(self) -> Result<String> {
        match self.error.filter(|e| !e.is_empty()) {
            Some(error) => Err(SignerError::Rejected(error)),
            None => Ok(self.result.unwrap_or_default()),
        }
    }
}

/// Messages a relay sends to a client
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event { subscription_id: String, event: Box<Event> },
    Ok { event_id: String, accepted: bool, message: String },
    Eose { subscription_id: String },
    Closed { subscription_id: String, message: String },
    Notice { message: String },
}

impl RelayMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let items = value
            .as_array()
            .ok_or_else(|| SignerError::ProtocolViolation("relay message is not an array".to_string()))?;
        let str_at = |i: usize| items.get(i).and_then(Value::as_str).unwrap_or_default().to_string();

        match items.first().and_then(Value::as_str) {
            Some("EVENT") => {
                let event = items
                    .get(2)
                    .cloned()
                    .ok_or_else(|| SignerError::ProtocolViolation("EVENT without event".to_string()))?;
                Ok(RelayMessage::Event {
                    subscription_id: str_at(1),
                    event: Box::new(serde_json::from_value(event)?),
                })
            }
            Some("OK") => Ok(RelayMessage::Ok {
                event_id: str_at(1),
                accepted: items.get(2).and_then(Value::as_bool).unwrap_or(false),
                message: str_at(3),
            }),
            Some("EOSE") => Ok(RelayMessage::Eose {
                subscription_id: str_at(1),
            }),
            Some("CLOSED") => Ok(RelayMessage::Closed {
                subscription_id: str_at(1),
                message: str_at(2),
            }),
            Some("NOTICE") => Ok(RelayMessage::Notice { message: str_at(1) }),
            other => Err(SignerError::ProtocolViolation(format!(
                "unknown relay message type {:?}",
                other
            ))),
        }
    }
}

/// `["EVENT", <event>]`
pub fn client_event(event: &Event) -> Result<String> {
    Ok(serde_json::to_string(&json!(["EVENT", event]))?)
}

/// `["REQ", <id>, <filter>]` for remote-signing events addressed to `pubkey`
pub fn client_subscribe(subscription_id: &str, kind: u16, pubkey: &str, since: u64) -> Result<String> {
    Ok(serde_json::to_string(&json!([
        "REQ",
        subscription_id,
        { "kinds": [kind], "#p": [pubkey], "since": since }
    ]))?)
}

/// `["CLOSE", <id>]`
pub fn client_close(subscription_id: &str) -> Result<String> {
    Ok(serde_json::to_string(&json!(["CLOSE", subscription_id]))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_challenge() {
        let response = RpcResponse::auth_url("1", "https://bunker.example/approve");
        assert_eq!(response.auth_challenge(), Some("https://bunker.example/approve"));
        assert!(RpcResponse::success("1", "ack").auth_challenge().is_none());
    }

    #[test]
    fn test_into_result() {
        assert_eq!(RpcResponse::success("1", "ack").into_result().unwrap(), "ack");
        assert!(matches!(
            RpcResponse::failure("1", "denied").into_result(),
            Err(SignerError::Rejected(_))
        ));
        let empty_error = RpcResponse {
            id: "1".into(),
            result: Some("ok".into()),
            error: Some(String::new()),
        };
        assert_eq!(empty_error.into_result().unwrap(), "ok");
    }

    #[test]
    fn test_response_without_error_field() {
        let response: RpcResponse = serde_json::from_str(r#"{"id":"7","result":"abc"}"#).unwrap();
        assert_eq!(response.error, None);
    }

    #[test]
    fn test_parse_relay_messages() {
        assert_eq!(
            RelayMessage::from_json(r#"["OK","abc",true,""]"#).unwrap(),
            RelayMessage::Ok {
                event_id: "abc".into(),
                accepted: true,
                message: String::new()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["EOSE","sub"]"#).unwrap(),
            RelayMessage::Eose {
                subscription_id: "sub".into()
            }
        );
        let event = RelayMessage::from_json(r#"["EVENT","sub",{"kind":24133,"content":"x"}]"#).unwrap();
        assert!(matches!(event, RelayMessage::Event { event, .. } if event.kind == 24133));
        assert!(RelayMessage::from_json(r#"{"not":"array"}"#).is_err());
        assert!(RelayMessage::from_json(r#"["AUTH","challenge"]"#).is_err());
    }

    #[test]
    fn test_subscribe_filter() {
        let req = client_subscribe("s1", 24133, "ab", 10).unwrap();
        let value: Value = serde_json::from_str(&req).unwrap();
        assert_eq!(value[0], "REQ");
        assert_eq!(value[2]["#p"][0], "ab");
        assert_eq!(value[2]["kinds"][0], 24133);
    }
}
