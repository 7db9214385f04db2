use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constants::REGISTRATION_STATUS_SUCCESS;

/// Which side of the relay a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A controlled application exposing capabilities.
    Application,
    /// An agent driving applications.
    Controller,
}

impl Role {
    /// Parse the role segment of `/ws/{role}/{client_id}`.
    ///
    /// Accepts the historical `software` / `agent` names as well.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "software" | "application" => Some(Self::Application),
            "agent" | "controller" => Some(Self::Controller),
            _ => None,
        }
    }

    /// Path segment clients use when dialing the relay.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Application => "software",
            Self::Controller => "agent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Application => "application",
            Self::Controller => "controller",
        };
        write!(f, "{s}")
    }
}

/// Declared metadata of a controlled application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub software_id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ApplicationRecord {
    pub fn new(
        software_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            software_id: software_id.into(),
            name: name.into(),
            description: description.into(),
            keywords,
        }
    }

    /// Case-insensitive match of `text` against name, description and keywords.
    pub fn matches(&self, text: &str) -> usize {
        let haystack = text.to_lowercase();
        let mut hits = 0;
        for keyword in &self.keywords {
            if !keyword.is_empty() && haystack.contains(&keyword.to_lowercase()) {
                hits += 2;
            }
        }
        if !self.name.is_empty() && haystack.contains(&self.name.to_lowercase()) {
            hits += 1;
        }
        hits
    }
}

/// Acknowledgement sent back to an application after `IDENTIFY_SOFTWARE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationAck {
    pub status: String,
    pub message: String,
}

impl Default for RegistrationAck {
    fn default() -> Self {
        Self {
            status: REGISTRATION_STATUS_SUCCESS.to_string(),
            message: "Software registered successfully.".to_string(),
        }
    }
}

/// One addressable UI element of a capability snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<serde_json::Value>,
}

impl Element {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            label: label.into(),
            description: description.into(),
            current_value: None,
        }
    }
}

/// The interactive state a controlled application currently exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub current_view: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_context: Option<serde_json::Value>,
}

impl CapabilitySnapshot {
    pub fn new(current_view: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            current_view: current_view.into(),
            elements,
            item_context: None,
        }
    }

    /// Ids of all elements that declare one.
    pub fn element_ids(&self) -> HashSet<&str> {
        self.elements
            .iter()
            .filter(|e| !e.id.is_empty())
            .map(|e| e.id.as_str())
            .collect()
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn contains_element(&self, id: &str) -> bool {
        self.element(id).is_some()
    }
}

/// The fixed action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Click,
    TypeText,
}

impl Command {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLICK" => Some(Self::Click),
            "TYPE_TEXT" => Some(Self::TypeText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "CLICK",
            Self::TypeText => "TYPE_TEXT",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Action {
    pub fn click(element_id: impl Into<String>) -> Self {
        Self {
            command: Command::Click,
            element_id: Some(element_id.into()),
            text: None,
            description: None,
        }
    }

    pub fn type_text(element_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            command: Command::TypeText,
            element_id: Some(element_id.into()),
            text: Some(text.into()),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Human-readable summary used in status messages.
    pub fn summary(&self) -> String {
        match &self.description {
            Some(d) if !d.is_empty() => d.clone(),
            _ => format!(
                "{} on {}",
                self.command,
                self.element_id.as_deref().unwrap_or("<none>")
            ),
        }
    }
}

/// Action list carried by `EXECUTE_SOLUTION_PLAN`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionPlan {
    pub actions: Vec<Action>,
}

/// Outcome reported by an application in `ACTION_STATUS_UPDATE`.
///
/// Unrecognised values are preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionStatus {
    Success,
    Failure,
    FailureFormProcessing,
    SuccessFormFilled,
    UserModifiedState,
    TaskCompletedBySoftware,
    Other(String),
}

impl ActionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::FailureFormProcessing => "FAILURE_FORM_PROCESSING",
            Self::SuccessFormFilled => "SUCCESS_FORM_FILLED",
            Self::UserModifiedState => "USER_MODIFIED_STATE",
            Self::TaskCompletedBySoftware => "TASK_COMPLETED_BY_SOFTWARE",
            Self::Other(s) => s,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::FailureFormProcessing)
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Self::TaskCompletedBySoftware)
    }
}

impl From<String> for ActionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            "FAILURE_FORM_PROCESSING" => Self::FailureFormProcessing,
            "SUCCESS_FORM_FILLED" => Self::SuccessFormFilled,
            "USER_MODIFIED_STATE" => Self::UserModifiedState,
            "TASK_COMPLETED_BY_SOFTWARE" => Self::TaskCompletedBySoftware,
            _ => Self::Other(s),
        }
    }
}

impl From<ActionStatus> for String {
    fn from(status: ActionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `REQUEST_SOFTWARE_CAPABILITIES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub software_id: String,
}

/// Payload of `EXECUTE_SOLUTION_PLAN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutePlan {
    pub software_id: String,
    pub solution: SolutionPlan,
}

/// Payload of `ACTION_STATUS_UPDATE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub software_id: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_capabilities: Option<CapabilitySnapshot>,
}

/// One input of a form request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FormField {
    /// The field default rendered the way an operator would have typed it.
    pub fn default_text(&self) -> String {
        match &self.default {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Payload of `FORM_REQUEST`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRequest {
    pub software_id: String,
    pub form_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_context: Option<serde_json::Value>,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

impl FormRequest {
    /// Build `form_data` from operator answers keyed by field id.
    ///
    /// Blank or missing answers fall back to the field default.
    pub fn fill(&self, answers: &HashMap<String, String>) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .iter()
            .map(|field| {
                let value = match answers.get(&field.id).map(|a| a.trim()) {
                    Some(a) if !a.is_empty() => a.to_string(),
                    _ => field.default_text(),
                };
                (field.id.clone(), serde_json::Value::String(value))
            })
            .collect()
    }

    /// Name of the item the form is about, if the context carries one.
    pub fn item_name(&self) -> Option<&str> {
        self.item_context
            .as_ref()
            .and_then(|ctx| ctx.get("name"))
            .and_then(|v| v.as_str())
    }
}

/// Payload of `FORM_DATA_RESPONSE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDataResponse {
    pub software_id: String,
    pub form_data: serde_json::Map<String, serde_json::Value>,
}
