//! The contract a controlled application implements.

use ccp_protocol::{Action, ApplicationRecord, CapabilitySnapshot, FormRequest};
use serde_json::{Map, Value};

/// Result of performing a single action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Done(String),
    Failed(String),
    /// The action needs input before it can continue.
    NeedsForm(FormRequest),
}

/// Result of running an action list.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Every action ran. `message` describes the last one.
    Completed { executed: usize, message: String },
    Failed { executed: usize, message: String },
    /// Execution stopped at an action that raised a form.
    FormRequested { executed: usize, form: FormRequest },
}

impl ExecutionOutcome {
    pub fn executed(&self) -> usize {
        match self {
            Self::Completed { executed, .. }
            | Self::Failed { executed, .. }
            | Self::FormRequested { executed, .. } => *executed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    Accepted(String),
    Rejected(String),
}

/// An application that exposes its UI as capability snapshots and accepts
/// `CLICK` / `TYPE_TEXT` actions.
pub trait ControlledApplication: Send {
    /// Metadata sent in `IDENTIFY_SOFTWARE`.
    fn identity(&self) -> ApplicationRecord;

    /// The current view and its addressable elements.
    fn capabilities(&self) -> CapabilitySnapshot;

    fn perform(&mut self, action: &Action) -> ActionOutcome;

    /// Apply `form_data` answering a form this application raised.
    fn submit_form(&mut self, form_data: &Map<String, Value>) -> FormOutcome;

    /// A controller pushed a form to this application.
    fn receive_form(&mut self, form: &FormRequest) {
        tracing::info!(description = %form.form_description, "Form pushed by controller");
    }

    /// Whether the application considers the user's task finished.
    fn task_complete(&self) -> bool {
        false
    }

    /// Run actions in order, stopping at the first failure or form.
    fn execute(&mut self, actions: &[Action]) -> ExecutionOutcome {
        let mut executed = 0;
        let mut message = String::from("No actions executed.");
        for action in actions {
            match self.perform(action) {
                ActionOutcome::Done(done) => {
                    executed += 1;
                    message = done;
                }
                ActionOutcome::Failed(reason) => {
                    return ExecutionOutcome::Failed {
                        executed,
                        message: reason,
                    };
                }
                ActionOutcome::NeedsForm(form) => {
                    return ExecutionOutcome::FormRequested {
                        executed: executed + 1,
                        form,
                    };
                }
            }
        }
        ExecutionOutcome::Completed { executed, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts clicks; fails on "broken", asks for a form on "form".
    struct Counter {
        clicks: usize,
    }

    impl ControlledApplication for Counter {
        fn identity(&self) -> ApplicationRecord {
            ApplicationRecord::new("counter", "Counter", "Counts clicks", vec![])
        }

        fn capabilities(&self) -> CapabilitySnapshot {
            CapabilitySnapshot::new("main", vec![])
        }

        fn perform(&mut self, action: &Action) -> ActionOutcome {
            match action.element_id.as_deref() {
                Some("broken") => ActionOutcome::Failed("broken button".into()),
                Some("form") => ActionOutcome::NeedsForm(FormRequest {
                    software_id: "counter".into(),
                    form_description: "how many?".into(),
                    item_context: None,
                    fields: vec![],
                }),
                _ => {
                    self.clicks += 1;
                    ActionOutcome::Done(format!("click {}", self.clicks))
                }
            }
        }

        fn submit_form(&mut self, _form_data: &Map<String, Value>) -> FormOutcome {
            FormOutcome::Accepted("ok".into())
        }
    }

    #[test]
    fn test_execute_runs_all_actions() {
        let mut app = Counter { clicks: 0 };
        let outcome = app.execute(&[Action::click("a"), Action::click("b")]);
        assert_eq!(
            outcome,
            ExecutionOutcome::Completed {
                executed: 2,
                message: "click 2".into()
            }
        );
    }

    #[test]
    fn test_execute_stops_at_first_failure() {
        let mut app = Counter { clicks: 0 };
        let outcome = app.execute(&[Action::click("a"), Action::click("broken"), Action::click("c")]);
        assert!(matches!(outcome, ExecutionOutcome::Failed { executed: 1, .. }));
        assert_eq!(app.clicks, 1);
    }

    #[test]
    fn test_execute_stops_at_form() {
        let mut app = Counter { clicks: 0 };
        let outcome = app.execute(&[Action::click("form"), Action::click("c")]);
        assert!(matches!(outcome, ExecutionOutcome::FormRequested { executed: 1, .. }));
        assert_eq!(app.clicks, 0);
    }

    #[test]
    fn test_empty_plan() {
        let mut app = Counter { clicks: 0 };
        assert_eq!(app.execute(&[]).executed(), 0);
    }
}
