//! CCP Controller - drives a task against a controlled application
//!
//! The controller asks the relay which applications are connected, lets
//! the operator pick one, fetches its capability snapshot and hands it to
//! a planner. Planned actions are validated against the snapshot before
//! anything is sent for execution; status updates and form requests feed
//! the next round until the application reports the task complete.

pub mod config;
pub mod error;
pub mod history;
pub mod operator;
pub mod pending;
pub mod planner;
pub mod runtime;
pub mod session;
pub mod validator;

pub use config::{ControllerConfig, PlannerConfig};
pub use error::ControllerError;
pub use history::{History, HistoryEntry, HistoryRole};
pub use operator::{AutoOperator, OperatorCommand, OperatorInput, StdinOperator};
pub use pending::{PendingRequest, PendingRequests};
pub use planner::{HttpPlanner, Planner, PlannerError, PlannerOutput, PlanningContext, ScriptedPlanner};
pub use runtime::{drive, run, RunSummary};
pub use session::{Controller, Outbox, Progress, Prompt, SessionConfig, SessionState};
pub use validator::{validate_plan, PlanValidation, RejectedAction, Rejection};
