//! Plan validation, run before any action list leaves the controller.
//!
//! Algorithm:
//! 1. A missing or `null` action field is zero actions, not an error.
//! 2. Anything other than a JSON array is a structural error and rejects
//!    the whole plan.
//! 3. Each entry must be an object with `command` in {CLICK, TYPE_TEXT};
//!    a non-empty `element_id` must name an element of the snapshot.
//! 4. Individually valid actions are returned in order together with the
//!    rejections. The plan is valid only if nothing was rejected.
//!
//! A partially valid plan is never executed.

use ccp_protocol::{Action, CapabilitySnapshot, Command};
use serde_json::Value;

/// Why a single entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Not an object, or fields of the wrong JSON type.
    Malformed(String),
    UnknownCommand(String),
    UnknownElement(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(why) => write!(f, "malformed action: {why}"),
            Self::UnknownCommand(c) => write!(f, "unknown command {c:?}"),
            Self::UnknownElement(id) => write!(f, "element {id:?} not in current view"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedAction {
    pub index: usize,
    pub reason: Rejection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanValidation {
    pub valid_actions: Vec<Action>,
    pub rejected: Vec<RejectedAction>,
    pub structural_error: Option<String>,
    pub is_valid: bool,
}

impl PlanValidation {
    /// One-line description of what went wrong, for history entries.
    pub fn problems(&self) -> String {
        if let Some(err) = &self.structural_error {
            return err.clone();
        }
        self.rejected
            .iter()
            .map(|r| format!("action {}: {}", r.index, r.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn validate_plan(actions: Option<&Value>, snapshot: &CapabilitySnapshot) -> PlanValidation {
    let entries = match actions {
        None | Some(Value::Null) => {
            return PlanValidation {
                is_valid: true,
                ..Default::default()
            }
        }
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return PlanValidation {
                structural_error: Some(format!(
                    "'actions' must be a list or null, got {}",
                    json_kind(other)
                )),
                is_valid: false,
                ..Default::default()
            }
        }
    };

    let known = snapshot.element_ids();
    let mut result = PlanValidation::default();

    for (index, entry) in entries.iter().enumerate() {
        match check_action(entry, |id| known.contains(id)) {
            Ok(action) => result.valid_actions.push(action),
            Err(reason) => {
                tracing::debug!(index, %reason, "Rejected planned action");
                result.rejected.push(RejectedAction { index, reason });
            }
        }
    }

    result.is_valid = result.rejected.is_empty();
    result
}

fn check_action(entry: &Value, element_exists: impl Fn(&str) -> bool) -> Result<Action, Rejection> {
    let obj = entry
        .as_object()
        .ok_or_else(|| Rejection::Malformed(format!("expected an object, got {}", json_kind(entry))))?;

    let command = match obj.get("command") {
        Some(Value::String(c)) => {
            Command::parse(c).ok_or_else(|| Rejection::UnknownCommand(c.clone()))?
        }
        Some(other) => return Err(Rejection::UnknownCommand(other.to_string())),
        None => return Err(Rejection::UnknownCommand(String::new())),
    };

    let element_id = optional_string(obj.get("element_id"), "element_id")?;
    if let Some(id) = element_id.as_deref() {
        if !id.is_empty() && !element_exists(id) {
            return Err(Rejection::UnknownElement(id.to_string()));
        }
    }

    Ok(Action {
        command,
        element_id,
        text: optional_string(obj.get("text"), "text")?,
        description: optional_string(obj.get("description"), "description")?,
    })
}

fn optional_string(value: Option<&Value>, field: &str) -> Result<Option<String>, Rejection> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) if field == "text" => Ok(Some(n.to_string())),
        Some(other) => Err(Rejection::Malformed(format!(
            "{field} must be a string, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccp_protocol::Element;
    use serde_json::json;

    fn snapshot() -> CapabilitySnapshot {
        CapabilitySnapshot::new(
            "delivery_page",
            vec![
                Element::new("wm_search_food_input", "input", "Search", ""),
                Element::new("wm_search_food_button", "button", "Go", ""),
            ],
        )
    }

    #[test]
    fn test_null_and_empty_are_zero_actions() {
        let v = validate_plan(None, &snapshot());
        assert!(v.is_valid && v.valid_actions.is_empty());

        let v = validate_plan(Some(&Value::Null), &snapshot());
        assert!(v.is_valid && v.valid_actions.is_empty());

        let v = validate_plan(Some(&json!([])), &snapshot());
        assert!(v.is_valid && v.valid_actions.is_empty());
        assert!(v.structural_error.is_none());
    }

    #[test]
    fn test_non_list_is_structural_error() {
        let v = validate_plan(Some(&json!({"command": "CLICK"})), &snapshot());
        assert!(!v.is_valid);
        assert!(v.structural_error.is_some());
        assert!(v.valid_actions.is_empty());
    }

    #[test]
    fn test_ghost_element_rejected() {
        let plan = json!([{"command": "CLICK", "element_id": "ghost_button"}]);
        let v = validate_plan(Some(&plan), &snapshot());
        assert!(!v.is_valid);
        assert!(v.valid_actions.is_empty());
        assert_eq!(
            v.rejected,
            vec![RejectedAction {
                index: 0,
                reason: Rejection::UnknownElement("ghost_button".into())
            }]
        );
    }

    #[test]
    fn test_mixed_plan_reports_valid_subset() {
        let plan = json!([
            {"command": "TYPE_TEXT", "element_id": "wm_search_food_input", "text": "noodles"},
            {"command": "SCROLL", "element_id": "wm_search_food_button"},
            "click it",
            {"command": "CLICK", "element_id": "wm_search_food_button"}
        ]);
        let v = validate_plan(Some(&plan), &snapshot());
        assert!(!v.is_valid);
        assert_eq!(v.valid_actions.len(), 2);
        assert_eq!(v.valid_actions[0].text.as_deref(), Some("noodles"));
        let indices: Vec<_> = v.rejected.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(matches!(v.rejected[0].reason, Rejection::UnknownCommand(_)));
        assert!(matches!(v.rejected[1].reason, Rejection::Malformed(_)));
    }

    #[test]
    fn test_validity_independent_of_order() {
        let a = json!({"command": "CLICK", "element_id": "wm_search_food_button"});
        let b = json!({"command": "TYPE_TEXT", "element_id": "wm_search_food_input", "text": "x"});
        let forward = validate_plan(Some(&json!([a.clone(), b.clone()])), &snapshot());
        let backward = validate_plan(Some(&json!([b, a])), &snapshot());
        assert!(forward.is_valid);
        assert!(backward.is_valid);
    }

    #[test]
    fn test_empty_element_id_is_allowed() {
        let plan = json!([{"command": "CLICK", "element_id": ""}, {"command": "CLICK"}]);
        let v = validate_plan(Some(&plan), &snapshot());
        assert!(v.is_valid);
        assert_eq!(v.valid_actions.len(), 2);
    }

    #[test]
    fn test_problems_summary() {
        let plan = json!([{"command": "CLICK", "element_id": "ghost_button"}]);
        let v = validate_plan(Some(&plan), &snapshot());
        assert!(v.problems().contains("ghost_button"));
    }
}
