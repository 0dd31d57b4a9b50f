//! Messages exchanged between execution contexts.
//!
//! Every message is a closed tagged union. Payloads are parsed at the boundary
//! of the receiving context and anything unrecognized is rejected there.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{LaError, Result};
use crate::session::Session;

/// Broadcast notification that the shared session changed.
///
/// `payload: None` means "signed out".
///
/// A non-null payload that is not session-shaped still produces an event,
/// carrying [`Session::unreadable`], so the receiver can reject it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub payload: Option<Session>,
}

impl<'de> Deserialize<'de> for ChangeEvent {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            payload: Value,
        }

        let payload = match Wire::deserialize(deserializer)?.payload {
            Value::Null => None,
            value => Some(serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::debug!("[Message] Unreadable session payload: {}", e);
                Session::unreadable()
            })),
        };
        Ok(Self { payload })
    }
}

impl ChangeEvent {
    pub fn updated(session: Session) -> Self {
        Self {
            payload: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self { payload: None }
    }
}

/// Enrichment data returned by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
}

/// A chat turn proxied through the background context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub token: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub text: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Every message a context can receive over the runtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeMessage {
    /// Broadcast; never answered.
    #[serde(rename = "LA_SESSION_UPDATED")]
    SessionUpdated(ChangeEvent),
    /// Point-to-point; answered exactly once.
    #[serde(rename = "LA_CHECK_STATUS")]
    CheckStatus { token: String },
    /// Point-to-point; answered exactly once.
    #[serde(rename = "LA_CHAT_REQUEST")]
    ChatRequest(ChatRequest),
}

impl RuntimeMessage {
    /// Parses an untyped payload, rejecting unknown `type` tags and shapes.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| LaError::InvalidMessage(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdated(_) => "LA_SESSION_UPDATED",
            Self::CheckStatus { .. } => "LA_CHECK_STATUS",
            Self::ChatRequest(_) => "LA_CHAT_REQUEST",
        }
    }

    pub fn expects_reply(&self) -> bool {
        !matches!(self, Self::SessionUpdated(_))
    }
}

/// `{ok:true, data}` or `{ok:false, error, status}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl RuntimeResponse {
    pub fn success<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                ok: true,
                data: Some(value),
                error: None,
                status: None,
            },
            Err(err) => Self::failure(&LaError::from(err)),
        }
    }

    pub fn failure(err: &LaError) -> Self {
        let message = match err {
            LaError::NetworkFailure { message, .. } => message.clone(),
            LaError::AccessDenied(message) => message.clone(),
            other => other.to_string(),
        };
        Self {
            ok: false,
            data: None,
            error: Some(message),
            status: err.status(),
        }
    }

    pub fn from_result<T: Serialize>(result: &Result<T>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::failure(err),
        }
    }

    /// Converts back into a typed result on the requesting side.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if !self.ok {
            let message = self.error.unwrap_or_else(|| "Request failed".to_string());
            return Err(LaError::from_response(message, self.status));
        }
        let data = self
            .data
            .ok_or_else(|| LaError::InvalidMessage("Response is missing data".to_string()))?;
        serde_json::from_value(data).map_err(|e| LaError::InvalidMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_known_messages() {
        let msg = RuntimeMessage::from_value(json!({
            "type": "LA_CHECK_STATUS",
            "token": "abc"
        }))
        .unwrap();
        assert_eq!(
            msg,
            RuntimeMessage::CheckStatus {
                token: "abc".into()
            }
        );
        assert!(msg.expects_reply());

        let msg = RuntimeMessage::from_value(json!({
            "type": "LA_SESSION_UPDATED",
            "payload": null
        }))
        .unwrap();
        assert_eq!(
            msg,
            RuntimeMessage::SessionUpdated(ChangeEvent::signed_out())
        );
        assert!(!msg.expects_reply());

        let msg = RuntimeMessage::from_value(json!({
            "type": "LA_CHAT_REQUEST",
            "token": "abc",
            "organizationId": "org1",
            "text": "hello",
            "threadId": "t-1"
        }))
        .unwrap();
        assert_eq!(msg.kind(), "LA_CHAT_REQUEST");
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        let err = RuntimeMessage::from_value(json!({ "type": "LA_SOMETHING_ELSE" })).unwrap_err();
        assert!(matches!(err, LaError::InvalidMessage(_)));

        let err = RuntimeMessage::from_value(json!({ "token": "abc" })).unwrap_err();
        assert!(matches!(err, LaError::InvalidMessage(_)));

        let err = RuntimeMessage::from_value(json!({
            "type": "LA_CHECK_STATUS",
            "token": 42
        }))
        .unwrap_err();
        assert!(matches!(err, LaError::InvalidMessage(_)));
    }

    #[test]
    fn test_session_update_with_odd_payload_still_parses() {
        for payload in [
            json!({ "token": "mock-token", "user": null }),
            json!({ "token": null, "validated": true }),
            json!({ "token": 42 }),
            json!("not a session"),
        ] {
            let msg = RuntimeMessage::from_value(json!({
                "type": "LA_SESSION_UPDATED",
                "payload": payload
            }))
            .unwrap();
            let RuntimeMessage::SessionUpdated(event) = msg else {
                panic!("expected a session update");
            };
            assert!(event.payload.unwrap().is_rejected_for_relay());
        }

        let msg = RuntimeMessage::from_value(json!({ "type": "LA_SESSION_UPDATED" })).unwrap();
        assert_eq!(msg, RuntimeMessage::SessionUpdated(ChangeEvent::signed_out()));
    }

    #[test]
    fn test_change_event_wire_shape() {
        let value = serde_json::to_value(RuntimeMessage::SessionUpdated(
            ChangeEvent::signed_out(),
        ))
        .unwrap();
        assert_eq!(value, json!({ "type": "LA_SESSION_UPDATED", "payload": null }));
    }

    #[test]
    fn test_response_success_and_failure() {
        let info = StatusInfo {
            organization_id: Some("org1".into()),
            role: Some("STUDENT".into()),
            tier: Some("BASIC".into()),
            organization_name: None,
        };
        let response = RuntimeResponse::success(&info);
        assert!(response.ok);
        assert_eq!(response.data.as_ref().unwrap()["organizationId"], "org1");
        assert_eq!(response.clone().into_result::<StatusInfo>().unwrap(), info);

        let response = RuntimeResponse::failure(&LaError::network(Some(500), "boom"));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "ok": false, "error": "boom", "status": 500 })
        );
        let err = response.into_result::<StatusInfo>().unwrap_err();
        assert_eq!(err, LaError::network(Some(500), "boom"));
    }

    #[test]
    fn test_failure_keeps_access_denied() {
        let response = RuntimeResponse::failure(&LaError::AccessDenied("not a member".into()));
        assert_eq!(response.status, Some(403));
        let err = response.into_result::<ChatReply>().unwrap_err();
        assert_eq!(err, LaError::AccessDenied("not a member".into()));
    }
}
