use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::*;

/// Declared `type` of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    IdentifySoftware,
    RegistrationAck,
    RequestSoftwareList,
    SoftwareListResponse,
    RequestSoftwareCapabilities,
    SoftwareCapabilitiesResponse,
    ExecuteSolutionPlan,
    ActionStatusUpdate,
    FormRequest,
    FormDataResponse,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        Self::IdentifySoftware,
        Self::RegistrationAck,
        Self::RequestSoftwareList,
        Self::SoftwareListResponse,
        Self::RequestSoftwareCapabilities,
        Self::SoftwareCapabilitiesResponse,
        Self::ExecuteSolutionPlan,
        Self::ActionStatusUpdate,
        Self::FormRequest,
        Self::FormDataResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentifySoftware => "IDENTIFY_SOFTWARE",
            Self::RegistrationAck => "REGISTRATION_ACK",
            Self::RequestSoftwareList => "REQUEST_SOFTWARE_LIST",
            Self::SoftwareListResponse => "SOFTWARE_LIST_RESPONSE",
            Self::RequestSoftwareCapabilities => "REQUEST_SOFTWARE_CAPABILITIES",
            Self::SoftwareCapabilitiesResponse => "SOFTWARE_CAPABILITIES_RESPONSE",
            Self::ExecuteSolutionPlan => "EXECUTE_SOLUTION_PLAN",
            Self::ActionStatusUpdate => "ACTION_STATUS_UPDATE",
            Self::FormRequest => "FORM_REQUEST",
            Self::FormDataResponse => "FORM_DATA_RESPONSE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded protocol message, one variant per declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    IdentifySoftware(ApplicationRecord),
    RegistrationAck(RegistrationAck),
    RequestSoftwareList,
    SoftwareListResponse(Vec<ApplicationRecord>),
    RequestSoftwareCapabilities(CapabilityRequest),
    /// The snapshot is the payload; the application id travels top-level.
    SoftwareCapabilitiesResponse {
        software_id: String,
        capabilities: CapabilitySnapshot,
    },
    ExecuteSolutionPlan(ExecutePlan),
    ActionStatusUpdate(StatusUpdate),
    FormRequest(FormRequest),
    FormDataResponse(FormDataResponse),
    /// A `type` this build does not know. Kept so callers can log it.
    Unknown { kind: String, payload: Value },
}

impl Message {
    /// `None` for `Unknown`.
    pub fn message_type(&self) -> Option<MessageType> {
        let t = match self {
            Self::IdentifySoftware(_) => MessageType::IdentifySoftware,
            Self::RegistrationAck(_) => MessageType::RegistrationAck,
            Self::RequestSoftwareList => MessageType::RequestSoftwareList,
            Self::SoftwareListResponse(_) => MessageType::SoftwareListResponse,
            Self::RequestSoftwareCapabilities(_) => MessageType::RequestSoftwareCapabilities,
            Self::SoftwareCapabilitiesResponse { .. } => MessageType::SoftwareCapabilitiesResponse,
            Self::ExecuteSolutionPlan(_) => MessageType::ExecuteSolutionPlan,
            Self::ActionStatusUpdate(_) => MessageType::ActionStatusUpdate,
            Self::FormRequest(_) => MessageType::FormRequest,
            Self::FormDataResponse(_) => MessageType::FormDataResponse,
            Self::Unknown { .. } => return None,
        };
        Some(t)
    }

    /// The declared `type` string, including unknown ones.
    pub fn kind(&self) -> &str {
        match self {
            Self::Unknown { kind, .. } => kind,
            other => other.message_type().map(|t| t.as_str()).unwrap_or("UNKNOWN"),
        }
    }

    /// The application a message is about, where the type carries one.
    pub fn software_id(&self) -> Option<&str> {
        match self {
            Self::IdentifySoftware(r) => Some(&r.software_id),
            Self::RequestSoftwareCapabilities(r) => Some(&r.software_id),
            Self::SoftwareCapabilitiesResponse { software_id, .. } => Some(software_id),
            Self::ExecuteSolutionPlan(p) => Some(&p.software_id),
            Self::ActionStatusUpdate(s) => Some(&s.software_id),
            Self::FormRequest(f) => Some(&f.software_id),
            Self::FormDataResponse(f) => Some(&f.software_id),
            Self::RegistrationAck(_) | Self::RequestSoftwareList | Self::SoftwareListResponse(_) => None,
            Self::Unknown { payload, .. } => payload.get("software_id").and_then(Value::as_str),
        }
    }

    /// Capability snapshot carried by the message, if any.
    pub fn capabilities(&self) -> Option<&CapabilitySnapshot> {
        match self {
            Self::SoftwareCapabilitiesResponse { capabilities, .. } => Some(capabilities),
            Self::ActionStatusUpdate(s) => s.current_capabilities.as_ref(),
            _ => None,
        }
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::IdentifySoftware(r) => serde_json::to_value(r),
            Self::RegistrationAck(a) => serde_json::to_value(a),
            Self::RequestSoftwareList => Ok(Value::Object(Default::default())),
            Self::SoftwareListResponse(list) => serde_json::to_value(list),
            Self::RequestSoftwareCapabilities(r) => serde_json::to_value(r),
            Self::SoftwareCapabilitiesResponse { capabilities, .. } => {
                serde_json::to_value(capabilities)
            }
            Self::ExecuteSolutionPlan(p) => serde_json::to_value(p),
            Self::ActionStatusUpdate(s) => serde_json::to_value(s),
            Self::FormRequest(f) => serde_json::to_value(f),
            Self::FormDataResponse(f) => serde_json::to_value(f),
            Self::Unknown { payload, .. } => Ok(payload.clone()),
        }
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    software_id: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
}

/// A message plus its transport-level correlation token.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message: Message,
    pub correlation_id: Option<String>,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Two-stage decode: the envelope first, then the payload by its `type`.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope =
            serde_json::from_value(value).map_err(|e| ProtocolError::schema("message", e))?;

        let kind = raw.kind;
        let payload = raw.payload;
        let Some(message_type) = MessageType::parse(&kind) else {
            return Ok(Self {
                message: Message::Unknown { kind, payload },
                correlation_id: raw.correlation_id,
            });
        };

        fn typed<T: serde::de::DeserializeOwned>(
            kind: MessageType,
            payload: Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(payload).map_err(|e| ProtocolError::schema(kind.as_str(), e))
        }

        let message = match message_type {
            MessageType::IdentifySoftware => Message::IdentifySoftware(typed(message_type, payload)?),
            MessageType::RegistrationAck => Message::RegistrationAck(typed(message_type, payload)?),
            MessageType::RequestSoftwareList => Message::RequestSoftwareList,
            MessageType::SoftwareListResponse => {
                Message::SoftwareListResponse(typed(message_type, payload)?)
            }
            MessageType::RequestSoftwareCapabilities => {
                Message::RequestSoftwareCapabilities(typed(message_type, payload)?)
            }
            MessageType::SoftwareCapabilitiesResponse => {
                let software_id = raw
                    .software_id
                    .or_else(|| {
                        payload
                            .get("software_id")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .ok_or_else(|| {
                        ProtocolError::schema(message_type.as_str(), "missing field `software_id`")
                    })?;
                Message::SoftwareCapabilitiesResponse {
                    software_id,
                    capabilities: typed(message_type, payload)?,
                }
            }
            MessageType::ExecuteSolutionPlan => {
                Message::ExecuteSolutionPlan(typed(message_type, payload)?)
            }
            MessageType::ActionStatusUpdate => {
                Message::ActionStatusUpdate(typed(message_type, payload)?)
            }
            MessageType::FormRequest => Message::FormRequest(typed(message_type, payload)?),
            MessageType::FormDataResponse => {
                Message::FormDataResponse(typed(message_type, payload)?)
            }
        };

        Ok(Self {
            message,
            correlation_id: raw.correlation_id,
        })
    }

    pub fn to_value(&self) -> Result<Value, ProtocolError> {
        let payload = self
            .message
            .payload()
            .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), Value::String(self.message.kind().to_string()));
        obj.insert("payload".into(), payload);
        if let Message::SoftwareCapabilitiesResponse { software_id, .. } = &self.message {
            obj.insert("software_id".into(), Value::String(software_id.clone()));
        }
        if let Some(id) = &self.correlation_id {
            obj.insert("correlation_id".into(), Value::String(id.clone()));
        }
        Ok(Value::Object(obj))
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let value = self.to_value()?;
        serde_json::to_string(&value).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}

/// Fresh correlation token for a request.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Error object the relay sends instead of a protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorReply {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            correlation_id: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

impl From<&ProtocolError> for ErrorReply {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidJson(_) => ErrorReply::new(err.label()),
            _ => ErrorReply::new(err.label()).with_details(err.details()),
        }
    }
}

/// Anything a client can receive from the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(Envelope),
    Error(ErrorReply),
}

impl Frame {
    /// An object with `error` and no `type` is an error reply.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        if value.get("type").is_none() && value.get("error").is_some() {
            let reply: ErrorReply =
                serde_json::from_value(value).map_err(|e| ProtocolError::schema("error", e))?;
            return Ok(Self::Error(reply));
        }
        Envelope::from_value(value).map(Self::Message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_names_roundtrip() {
        for t in MessageType::ALL {
            assert_eq!(MessageType::parse(t.as_str()), Some(t));
            let via_serde: MessageType =
                serde_json::from_value(json!(t.as_str())).expect("serde name should match");
            assert_eq!(via_serde, t);
        }
        assert_eq!(MessageType::parse("SOMETHING_ELSE"), None);
    }

    #[test]
    fn test_decode_capabilities_response_top_level_id() {
        let text = json!({
            "type": "SOFTWARE_CAPABILITIES_RESPONSE",
            "software_id": "shop-1",
            "correlation_id": "c-1",
            "payload": {
                "current_view": "homepage",
                "elements": [{"id": "hp_delivery_button", "type": "button", "label": "Delivery", "description": ""}]
            }
        })
        .to_string();

        let env = Envelope::decode(&text).unwrap();
        assert_eq!(env.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(env.message.software_id(), Some("shop-1"));
        let snapshot = env.message.capabilities().expect("snapshot");
        assert!(snapshot.contains_element("hp_delivery_button"));
    }

    #[test]
    fn test_decode_capabilities_response_without_id_is_schema_error() {
        let text = json!({
            "type": "SOFTWARE_CAPABILITIES_RESPONSE",
            "payload": {"current_view": "homepage", "elements": []}
        })
        .to_string();
        let err = Envelope::decode(&text).unwrap_err();
        assert!(matches!(err, ProtocolError::Schema { .. }), "got {err:?}");
    }

    #[test]
    fn test_encode_places_software_id_top_level_for_capabilities() {
        let env = Envelope::new(Message::SoftwareCapabilitiesResponse {
            software_id: "shop-1".into(),
            capabilities: CapabilitySnapshot::new("homepage", vec![]),
        });
        let value = env.to_value().unwrap();
        assert_eq!(value["software_id"], "shop-1");
        assert_eq!(value["payload"]["current_view"], "homepage");
        assert!(value.get("correlation_id").is_none());
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let env = Envelope::decode(r#"{"type":"PING","payload":{"software_id":"a"}}"#).unwrap();
        assert_eq!(env.message.kind(), "PING");
        assert_eq!(env.message.message_type(), None);
        assert_eq!(env.message.software_id(), Some("a"));
    }

    #[test]
    fn test_invalid_json_and_schema_errors() {
        let err = Envelope::decode("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
        assert_eq!(ErrorReply::from(&err).error, "Invalid JSON format");

        let err = Envelope::decode(r#"{"payload":{}}"#).unwrap_err();
        assert_eq!(err.label(), "Invalid message format");

        let err = Envelope::decode(r#"{"type":"EXECUTE_SOLUTION_PLAN","payload":{"software_id":"x"}}"#)
            .unwrap_err();
        let reply = ErrorReply::from(&err);
        assert_eq!(reply.error, "Invalid EXECUTE_SOLUTION_PLAN format");
        assert!(reply.details.is_some());
    }

    #[test]
    fn test_request_list_tolerates_missing_payload() {
        let env = Envelope::decode(r#"{"type":"REQUEST_SOFTWARE_LIST"}"#).unwrap();
        assert_eq!(env.message, Message::RequestSoftwareList);
    }

    #[test]
    fn test_frame_distinguishes_error_replies() {
        let frame = Frame::decode(r#"{"error":"Software not connected","correlation_id":"c-9"}"#).unwrap();
        match frame {
            Frame::Error(reply) => {
                assert_eq!(reply.error, "Software not connected");
                assert_eq!(reply.correlation_id.as_deref(), Some("c-9"));
            }
            other => panic!("expected error frame, got {other:?}"),
        }

        let frame = Frame::decode(r#"{"type":"REQUEST_SOFTWARE_LIST","payload":{}}"#).unwrap();
        assert!(matches!(frame, Frame::Message(_)));
    }

    #[test]
    fn test_execute_plan_wire_shape() {
        let env = Envelope::new(Message::ExecuteSolutionPlan(ExecutePlan {
            software_id: "shop-1".into(),
            solution: SolutionPlan {
                actions: vec![Action::type_text("wm_search_food_input", "noodles")],
            },
        }))
        .with_correlation("c-2");
        let value = env.to_value().unwrap();
        assert_eq!(value["type"], "EXECUTE_SOLUTION_PLAN");
        assert_eq!(value["payload"]["solution"]["actions"][0]["command"], "TYPE_TEXT");
        assert_eq!(value["correlation_id"], "c-2");

        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back, env);
    }
}
