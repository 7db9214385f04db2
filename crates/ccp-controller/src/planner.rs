//! Planner contract.
//!
//! The planner turns the task, the current capability snapshot and the
//! session history into a proposed action list. Its output is untrusted:
//! `actions` stays raw JSON until the validator has checked it.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use ccp_protocol::CapabilitySnapshot;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::history::History;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    #[error("planner transport failure: {0}")]
    Transport(String),

    #[error("planner did not answer within {0:?}")]
    Timeout(Duration),

    #[error("planner output does not conform: {0}")]
    NonConforming(String),

    #[error("scripted planner has no outputs left")]
    Exhausted,
}

/// Everything the planner sees.
#[derive(Debug, Clone, Serialize)]
pub struct PlanningContext {
    pub task: String,
    pub software_id: String,
    pub capabilities: CapabilitySnapshot,
    pub history: History,
}

/// What the planner proposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerOutput {
    #[serde(default, deserialize_with = "null_as_default")]
    pub thought: String,
    /// Raw action list; validated before use.
    #[serde(default)]
    pub actions: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_task_complete: bool,
    /// A question for the operator when no actions are proposed.
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_step_reasoning: String,
}

/// Planners send `null` for "nothing to say".
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PlannerOutput {
    pub fn with_actions(thought: impl Into<String>, actions: serde_json::Value) -> Self {
        Self {
            thought: thought.into(),
            actions: Some(actions),
            ..Default::default()
        }
    }

    pub fn clarify(question: impl Into<String>) -> Self {
        Self {
            actions: Some(serde_json::Value::Array(vec![])),
            next_step_reasoning: question.into(),
            ..Default::default()
        }
    }

    pub fn complete(thought: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            is_task_complete: true,
            ..Default::default()
        }
    }
}

/// Produces plans for a controller session.
pub trait Planner: Send + Sync {
    fn plan<'a>(
        &'a self,
        context: &'a PlanningContext,
    ) -> Pin<Box<dyn Future<Output = Result<PlannerOutput, PlannerError>> + Send + 'a>>;
}

/// Posts the planning context as JSON and parses a [`PlannerOutput`] reply.
pub struct HttpPlanner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPlanner {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Planner for HttpPlanner {
    fn plan<'a>(
        &'a self,
        context: &'a PlanningContext,
    ) -> Pin<Box<dyn Future<Output = Result<PlannerOutput, PlannerError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(context)
                .send()
                .await
                .map_err(|e| PlannerError::Transport(e.to_string()))?
                .error_for_status()
                .map_err(|e| PlannerError::Transport(e.to_string()))?;

            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| PlannerError::NonConforming(e.to_string()))?;
            if !body.is_object() {
                return Err(PlannerError::NonConforming(format!(
                    "expected a JSON object, got {body}"
                )));
            }
            let output: PlannerOutput = serde_json::from_value(body)
                .map_err(|e| PlannerError::NonConforming(e.to_string()))?;

            tracing::debug!(
                endpoint = %self.endpoint,
                software_id = %context.software_id,
                complete = output.is_task_complete,
                "Planner replied"
            );
            Ok(output)
        })
    }
}

/// Replays queued outputs in order and records every context it was given.
#[derive(Default)]
pub struct ScriptedPlanner {
    outputs: Mutex<VecDeque<Result<PlannerOutput, PlannerError>>>,
    seen: Mutex<Vec<PlanningContext>>,
}

impl ScriptedPlanner {
    pub fn new(outputs: Vec<PlannerOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(Ok).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, output: Result<PlannerOutput, PlannerError>) {
        self.outputs.lock().await.push_back(output);
    }

    /// Contexts passed to `plan`, oldest first.
    pub async fn seen(&self) -> Vec<PlanningContext> {
        self.seen.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.outputs.lock().await.len()
    }
}

impl Planner for ScriptedPlanner {
    fn plan<'a>(
        &'a self,
        context: &'a PlanningContext,
    ) -> Pin<Box<dyn Future<Output = Result<PlannerOutput, PlannerError>> + Send + 'a>> {
        Box::pin(async move {
            self.seen.lock().await.push(context.clone());
            self.outputs
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(PlannerError::Exhausted))
        })
    }
}
