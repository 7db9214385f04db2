//! Protocol state machine for one controller task session.
//!
//! A task moves through: directory listing -> application choice ->
//! capability request -> planning -> execution -> (forms / clarification)
//! -> completion. Planning is never retried on its own; every re-plan is
//! triggered by an inbound message or an explicit operator call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ccp_protocol::{
    ApplicationRecord, CapabilityRequest, CapabilitySnapshot, Envelope, ErrorReply,
    ExecutePlan, FormDataResponse, FormRequest, Message, MessageType, SolutionPlan, StatusUpdate,
    new_correlation_id, DEFAULT_PLANNER_TIMEOUT_SECS, DEFAULT_RESPONSE_TIMEOUT_SECS,
};
use tokio::sync::mpsc;

use crate::error::ControllerError;
use crate::history::History;
use crate::pending::PendingRequests;
use crate::planner::{Planner, PlannerError, PlanningContext};
use crate::validator::validate_plan;

/// Where outbound protocol messages go.
pub trait Outbox: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), ControllerError>;
}

impl Outbox for ccp_network::RelaySender {
    fn send(&self, envelope: Envelope) -> Result<(), ControllerError> {
        ccp_network::RelaySender::send(self, envelope).map_err(Into::into)
    }
}

impl Outbox for mpsc::UnboundedSender<Envelope> {
    fn send(&self, envelope: Envelope) -> Result<(), ControllerError> {
        mpsc::UnboundedSender::send(self, envelope)
            .map_err(|_| ccp_network::NetworkError::ChannelClosed.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    AwaitingSoftwareList,
    SoftwareSelected,
    AwaitingCapabilities,
    Planning,
    AwaitingExecutionResult,
    AwaitingFormResponse,
    AwaitingUserClarification,
    /// Parked until an operator or an inbound message moves it on.
    Stalled,
    Complete,
    Failed,
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::AwaitingSoftwareList => "AWAITING_SOFTWARE_LIST",
            Self::SoftwareSelected => "SOFTWARE_SELECTED",
            Self::AwaitingCapabilities => "AWAITING_CAPABILITIES",
            Self::Planning => "PLANNING",
            Self::AwaitingExecutionResult => "AWAITING_EXECUTION_RESULT",
            Self::AwaitingFormResponse => "AWAITING_FORM_RESPONSE",
            Self::AwaitingUserClarification => "AWAITING_USER_CLARIFICATION",
            Self::Stalled => "STALLED",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Aborted)
    }

    pub fn accepts_new_task(&self) -> bool {
        matches!(self, Self::Idle) || self.is_terminal()
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something only a human (or an automatic operator) can answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    ChooseApplication(Vec<ApplicationRecord>),
    Clarify(String),
    FillForm(FormRequest),
}

/// What happened as a result of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// The event did not change the session.
    Unchanged,
    /// A request is out; nothing to do until the relay answers.
    Waiting,
    Prompt(Prompt),
    /// Directory listing asked for outside a task.
    Listing(Vec<ApplicationRecord>),
    Stalled(String),
    Completed(String),
    Failed(String),
    Aborted,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub response_timeout: Duration,
    pub planner_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
            planner_timeout: Duration::from_secs(DEFAULT_PLANNER_TIMEOUT_SECS),
        }
    }
}

/// One controller's task session.
pub struct Controller {
    outbox: Box<dyn Outbox>,
    planner: Arc<dyn Planner>,
    planner_timeout: Duration,

    state: SessionState,
    task: Option<String>,
    listing: Option<Vec<ApplicationRecord>>,
    selected: Option<String>,
    snapshot: Option<CapabilitySnapshot>,
    form: Option<FormRequest>,
    question: Option<String>,
    stall_reason: Option<String>,
    history: History,
    pending: PendingRequests,
    /// Every correlation id this session has sent.
    issued: HashSet<String>,
    /// Listing requests that belong to no task.
    browsing: HashSet<String>,
}

impl Controller {
    pub fn new(outbox: Box<dyn Outbox>, planner: Arc<dyn Planner>, config: SessionConfig) -> Self {
        Self {
            outbox,
            planner,
            planner_timeout: config.planner_timeout,
            state: SessionState::Idle,
            task: None,
            listing: None,
            selected: None,
            snapshot: None,
            form: None,
            question: None,
            stall_reason: None,
            history: History::new(),
            pending: PendingRequests::new(config.response_timeout),
            issued: HashSet::new(),
            browsing: HashSet::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn selected_application(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn snapshot(&self) -> Option<&CapabilitySnapshot> {
        self.snapshot.as_ref()
    }

    pub fn listing(&self) -> Option<&[ApplicationRecord]> {
        self.listing.as_deref()
    }

    pub fn current_form(&self) -> Option<&FormRequest> {
        self.form.as_ref()
    }

    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn stall_reason(&self) -> Option<&str> {
        self.stall_reason.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    // -----------------------------------------------------------------------
    // Operator-driven transitions
    // -----------------------------------------------------------------------

    /// Accept a new task and ask the relay for the application listing.
    pub fn start_task(&mut self, task: &str) -> Result<Progress, ControllerError> {
        if !self.state.accepts_new_task() {
            return Err(self.invalid("start_task"));
        }
        let task = task.trim();
        if task.is_empty() {
            return Err(ControllerError::EmptyTask);
        }

        self.reset();
        self.task = Some(task.to_string());
        self.history.user(format!("My task is: {task}"));
        self.state = SessionState::AwaitingSoftwareList;
        self.send_request(
            Message::RequestSoftwareList,
            MessageType::SoftwareListResponse,
            None,
        )?;
        tracing::info!(task = %task, "Task accepted, requesting application list");
        Ok(Progress::Waiting)
    }

    /// Choose the target application from the received listing.
    pub fn select_application(&mut self, software_id: &str) -> Result<(), ControllerError> {
        if self.state != SessionState::AwaitingSoftwareList {
            return Err(self.invalid("select_application"));
        }
        let Some(listing) = &self.listing else {
            return Err(self.invalid("select_application"));
        };
        let Some(record) = listing.iter().find(|r| r.software_id == software_id) else {
            return Err(ControllerError::UnknownApplication(software_id.to_string()));
        };

        self.history.assistant(format!(
            "I selected the application '{}' ({}) for this task.",
            record.name, record.software_id
        ));
        tracing::info!(software_id = %software_id, "Application selected");
        self.selected = Some(software_id.to_string());
        self.state = SessionState::SoftwareSelected;
        Ok(())
    }

    /// Ask the selected application for its current capabilities.
    pub fn request_capabilities(&mut self) -> Result<Progress, ControllerError> {
        if !matches!(
            self.state,
            SessionState::SoftwareSelected
                | SessionState::Stalled
                | SessionState::AwaitingCapabilities
        ) {
            return Err(self.invalid("request_capabilities"));
        }
        let software_id = self.selected.clone().ok_or(ControllerError::NoSelection)?;

        self.send_request(
            Message::RequestSoftwareCapabilities(CapabilityRequest {
                software_id: software_id.clone(),
            }),
            MessageType::SoftwareCapabilitiesResponse,
            Some(software_id.as_str()),
        )?;
        self.stall_reason = None;
        self.state = SessionState::AwaitingCapabilities;
        tracing::debug!(software_id = %software_id, "Requested capabilities");
        Ok(Progress::Waiting)
    }

    /// Re-run the planner against the current snapshot from `STALLED`.
    pub async fn replan(&mut self) -> Result<Progress, ControllerError> {
        if self.state != SessionState::Stalled {
            return Err(self.invalid("replan"));
        }
        if self.snapshot.is_none() {
            return Err(ControllerError::NoSnapshot);
        }
        Ok(self.plan().await)
    }

    /// Answer the outstanding form. Blank answers take the field default.
    pub fn submit_form(
        &mut self,
        answers: &HashMap<String, String>,
    ) -> Result<Progress, ControllerError> {
        if self.state != SessionState::AwaitingFormResponse {
            return Err(self.invalid("submit_form"));
        }
        let Some(form) = self.form.take() else {
            return Err(self.invalid("submit_form"));
        };

        let form_data = form.fill(answers);
        let mut note = format!(
            "The software presented a form: '{}'. ",
            form.form_description
        );
        if let Some(item) = form.item_name() {
            note.push_str(&format!("The form was for item: '{item}'. "));
        }
        note.push_str(&format!(
            "User submitted the following data: {}. I have sent this data to the software and am now awaiting its status update.",
            serde_json::Value::Object(form_data.clone())
        ));
        self.history.assistant(note);

        let software_id = form.software_id.clone();
        let fields = form_data.len();
        if let Err(e) = self.send_request(
            Message::FormDataResponse(FormDataResponse {
                software_id: software_id.clone(),
                form_data,
            }),
            MessageType::ActionStatusUpdate,
            Some(software_id.as_str()),
        ) {
            self.form = Some(form);
            return Err(e);
        }
        tracing::info!(software_id = %software_id, fields, "Form submitted");
        self.state = SessionState::AwaitingExecutionResult;
        Ok(Progress::Waiting)
    }

    /// Feed the operator's answer back to the planner. An empty answer
    /// parks the session.
    pub async fn answer_clarification(&mut self, answer: &str) -> Result<Progress, ControllerError> {
        if self.state != SessionState::AwaitingUserClarification {
            return Err(self.invalid("answer_clarification"));
        }
        let answer = answer.trim();
        self.question = None;
        if answer.is_empty() {
            return Ok(self.stall("no clarification given"));
        }
        self.history.user(answer);
        Ok(self.plan().await)
    }

    /// Ask the relay for the application listing without touching the task.
    pub fn browse_applications(&mut self) -> Result<(), ControllerError> {
        let correlation_id = new_correlation_id();
        let envelope = Envelope::new(Message::RequestSoftwareList).with_correlation(correlation_id.clone());
        self.outbox.send(envelope)?;
        self.browsing.insert(correlation_id);
        tracing::debug!("Requested application list for display");
        Ok(())
    }

    pub fn abort(&mut self) -> Progress {
        tracing::info!(state = %self.state, "Task aborted");
        self.reset();
        self.state = SessionState::Aborted;
        Progress::Aborted
    }

    // -----------------------------------------------------------------------
    // Relay-driven transitions
    // -----------------------------------------------------------------------

    /// Apply one message received from the relay.
    pub async fn handle_envelope(&mut self, envelope: Envelope) -> Progress {
        if let Some(cid) = envelope.correlation_id.as_deref() {
            if self.browsing.remove(cid) {
                return match envelope.message {
                    Message::SoftwareListResponse(list) => {
                        tracing::info!(count = list.len(), "Application list received");
                        Progress::Listing(list)
                    }
                    other => {
                        tracing::debug!(kind = %other.kind(), "Ignoring unexpected reply to a listing request");
                        Progress::Unchanged
                    }
                };
            }
        }

        let resolved = self.pending.resolve(&envelope).is_some();
        let foreign = !resolved
            && envelope
                .correlation_id
                .as_deref()
                .is_some_and(|cid| !self.issued.contains(cid));
        if foreign {
            tracing::debug!(
                kind = %envelope.message.kind(),
                correlation_id = ?envelope.correlation_id,
                "Ignoring response to another controller's request"
            );
            return Progress::Unchanged;
        }
        // ours, but no longer awaited
        let stale = !resolved && envelope.correlation_id.is_some();

        match envelope.message {
            Message::SoftwareListResponse(list) => self.on_listing(list, stale),
            Message::SoftwareCapabilitiesResponse {
                software_id,
                capabilities,
            } => self.on_capabilities(software_id, capabilities, stale).await,
            Message::ActionStatusUpdate(update) => self.on_status(update).await,
            Message::FormRequest(form) => self.on_form_request(form),
            Message::Unknown { kind, .. } => {
                tracing::warn!(kind = %kind, "Ignoring unknown message type");
                Progress::Unchanged
            }
            other => {
                tracing::debug!(kind = %other.kind(), "Ignoring message not meant for a controller");
                Progress::Unchanged
            }
        }
    }

    /// Apply an `{error, details}` reply from the relay.
    pub fn handle_relay_error(&mut self, reply: &ErrorReply) -> Progress {
        if let Some(cid) = reply.correlation_id.as_deref() {
            self.browsing.remove(cid);
        }
        let entry = reply
            .correlation_id
            .as_deref()
            .and_then(|cid| self.pending.take(cid));
        match entry {
            Some(entry) => {
                let reason = format!(
                    "relay rejected request for {}: {}",
                    entry.software_id.as_deref().unwrap_or("the directory"),
                    reply.error
                );
                tracing::warn!(correlation_id = %entry.correlation_id, error = %reply.error, "Request failed at relay");
                self.fail(reason)
            }
            None => {
                tracing::warn!(error = %reply.error, details = ?reply.details, "Relay error");
                Progress::Unchanged
            }
        }
    }

    /// Expire overdue waits.
    pub fn poll_timeouts(&mut self, now: Instant) -> Progress {
        let expired = self.pending.expire(now);
        if expired.is_empty() {
            return Progress::Unchanged;
        }

        let mut progress = Progress::Unchanged;
        for entry in expired {
            tracing::warn!(
                correlation_id = %entry.correlation_id,
                expected = %entry.expected,
                software_id = ?entry.software_id,
                "Request timed out"
            );
            let waiting_on_it = match entry.expected {
                MessageType::SoftwareListResponse => {
                    self.state == SessionState::AwaitingSoftwareList
                }
                MessageType::SoftwareCapabilitiesResponse => {
                    self.state == SessionState::AwaitingCapabilities
                }
                MessageType::ActionStatusUpdate => {
                    self.state == SessionState::AwaitingExecutionResult
                }
                _ => false,
            };
            if !waiting_on_it || self.pending.is_waiting_for(entry.expected) {
                continue;
            }
            progress = if entry.expected == MessageType::SoftwareListResponse {
                self.fail("timed out waiting for the application list")
            } else {
                self.history.system(format!(
                    "No {} arrived from '{}' in time. The capabilities may need to be re-requested.",
                    entry.expected,
                    entry.software_id.as_deref().unwrap_or("?")
                ));
                self.stall(format!("timed out waiting for {}", entry.expected))
            };
        }
        progress
    }

    fn on_listing(&mut self, list: Vec<ApplicationRecord>, stale: bool) -> Progress {
        if stale || self.state != SessionState::AwaitingSoftwareList || self.listing.is_some() {
            tracing::debug!("Ignoring unexpected application list");
            return Progress::Unchanged;
        }
        if list.is_empty() {
            return self.fail("no applications are connected to the relay");
        }
        tracing::info!(count = list.len(), "Application list received");
        self.listing = Some(list.clone());
        Progress::Prompt(Prompt::ChooseApplication(list))
    }

    async fn on_capabilities(
        &mut self,
        software_id: String,
        capabilities: CapabilitySnapshot,
        stale: bool,
    ) -> Progress {
        if self.selected.as_deref() != Some(software_id.as_str()) {
            tracing::warn!(software_id = %software_id, "Discarding capabilities of unselected application");
            return Progress::Unchanged;
        }
        if stale {
            tracing::debug!(software_id = %software_id, "Discarding capabilities for an abandoned request");
            return Progress::Unchanged;
        }

        tracing::info!(
            software_id = %software_id,
            view = %capabilities.current_view,
            elements = capabilities.elements.len(),
            "Capabilities received"
        );
        self.snapshot = Some(capabilities);
        if self.state == SessionState::AwaitingCapabilities {
            self.plan().await
        } else {
            Progress::Unchanged
        }
    }

    async fn on_status(&mut self, update: StatusUpdate) -> Progress {
        if self.selected.as_deref() != Some(update.software_id.as_str()) {
            tracing::warn!(software_id = %update.software_id, status = %update.status, "Discarding status of unselected application");
            return Progress::Unchanged;
        }
        tracing::info!(
            software_id = %update.software_id,
            status = %update.status,
            message = %update.message,
            "Status update"
        );

        match self.state {
            SessionState::AwaitingExecutionResult
            | SessionState::AwaitingCapabilities
            | SessionState::SoftwareSelected
            | SessionState::Stalled => {
                self.pending.abandon_for(&update.software_id);
                self.apply_status(update).await
            }
            SessionState::AwaitingFormResponse | SessionState::AwaitingUserClarification => {
                if update.status.is_completion() {
                    return self.complete(update.message);
                }
                self.history.system(format!(
                    "While waiting for the user, the software reported '{}': {}",
                    update.status, update.message
                ));
                if let Some(caps) = update.current_capabilities {
                    self.snapshot = Some(caps);
                }
                Progress::Unchanged
            }
            _ => Progress::Unchanged,
        }
    }

    async fn apply_status(&mut self, update: StatusUpdate) -> Progress {
        if update.status.is_completion() {
            return self.complete(update.message);
        }

        if update.status.is_failure() {
            let mut context = format!(
                "The software '{}' reported an error after my last planned actions. Status: '{}', Message: '{}'. ",
                update.software_id, update.status, update.message
            );
            match &update.current_capabilities {
                Some(caps) => context.push_str(&format!(
                    "The current view at the time of failure is '{}'. ",
                    caps.current_view
                )),
                None => context.push_str(
                    "The software did not provide updated capabilities with this failure notice. ",
                ),
            }
            context.push_str("Analyze this failure and plan the next step accordingly.");
            self.history.system(context);
        }

        match update.current_capabilities {
            Some(caps) => {
                self.snapshot = Some(caps);
                self.plan().await
            }
            None if update.status.is_failure() => {
                self.stall(format!("{} without new capabilities", update.status))
            }
            None => self.stall(format!("status {} carried no capabilities", update.status)),
        }
    }

    fn on_form_request(&mut self, form: FormRequest) -> Progress {
        if self.selected.as_deref() != Some(form.software_id.as_str()) {
            tracing::warn!(software_id = %form.software_id, "Discarding form of unselected application");
            return Progress::Unchanged;
        }
        if !matches!(
            self.state,
            SessionState::SoftwareSelected
                | SessionState::AwaitingCapabilities
                | SessionState::AwaitingExecutionResult
                | SessionState::Stalled
        ) {
            tracing::warn!(state = %self.state, "Form request arrived in a state that cannot take it");
            return Progress::Unchanged;
        }

        let abandoned = self.pending.abandon_for(&form.software_id);
        tracing::info!(
            software_id = %form.software_id,
            fields = form.fields.len(),
            abandoned = abandoned.len(),
            "Form requested"
        );
        self.history.assistant(format!(
            "The software needs more information: {}",
            form.form_description
        ));
        self.form = Some(form.clone());
        self.stall_reason = None;
        self.state = SessionState::AwaitingFormResponse;
        Progress::Prompt(Prompt::FillForm(form))
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    async fn plan(&mut self) -> Progress {
        let (Some(task), Some(software_id), Some(snapshot)) =
            (self.task.clone(), self.selected.clone(), self.snapshot.clone())
        else {
            return self.stall("nothing to plan against");
        };
        self.state = SessionState::Planning;

        let context = PlanningContext {
            task,
            software_id: software_id.clone(),
            capabilities: snapshot,
            history: self.history.clone(),
        };
        let planner = self.planner.clone();
        let timeout = self.planner_timeout;
        let result = match tokio::time::timeout(timeout, planner.plan(&context)).await {
            Ok(result) => result,
            Err(_) => Err(PlannerError::Timeout(timeout)),
        };
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(software_id = %software_id, error = %e, "Planner failed");
                return self.stall(format!("planner error: {e}"));
            }
        };
        if !output.thought.is_empty() {
            self.history.assistant(output.thought.clone());
        }

        let validation = validate_plan(output.actions.as_ref(), &context.capabilities);
        if !validation.is_valid {
            let mut ids: Vec<&str> = context.capabilities.element_ids().into_iter().collect();
            ids.sort_unstable();
            self.history.system(format!(
                "My previous plan was problematic: {}. The problematic plan was: {}. \
                 Re-evaluate against the current view '{}' whose element ids are [{}]. \
                 Ensure all element_ids exist, commands are CLICK or TYPE_TEXT, and 'actions' is a list \
                 (empty if awaiting clarification).",
                validation.problems(),
                output
                    .actions
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "null".into()),
                context.capabilities.current_view,
                ids.join(", ")
            ));
            return self.stall(format!("plan rejected: {}", validation.problems()));
        }

        if !validation.valid_actions.is_empty() {
            let count = validation.valid_actions.len();
            let message = Message::ExecuteSolutionPlan(ExecutePlan {
                software_id: software_id.clone(),
                solution: SolutionPlan {
                    actions: validation.valid_actions,
                },
            });
            return match self.send_request(message, MessageType::ActionStatusUpdate, Some(software_id.as_str())) {
                Ok(_) => {
                    tracing::info!(software_id = %software_id, actions = count, "Plan dispatched");
                    self.state = SessionState::AwaitingExecutionResult;
                    Progress::Waiting
                }
                Err(e) => self.stall(format!("could not dispatch plan: {e}")),
            };
        }

        if output.is_task_complete {
            return self.stall("planner considers the task complete; awaiting confirmation from the application");
        }

        let question = output.next_step_reasoning.trim();
        if !question.is_empty() {
            self.history
                .assistant(format!("I need more information to proceed: {question}"));
            self.question = Some(question.to_string());
            self.state = SessionState::AwaitingUserClarification;
            return Progress::Prompt(Prompt::Clarify(question.to_string()));
        }

        self.stall("planner proposed no actions")
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn send_request(
        &mut self,
        message: Message,
        expected: MessageType,
        software_id: Option<&str>,
    ) -> Result<String, ControllerError> {
        let correlation_id = self.pending.register(expected, software_id);
        self.issued.insert(correlation_id.clone());
        let envelope = Envelope::new(message).with_correlation(correlation_id.clone());
        if let Err(e) = self.outbox.send(envelope) {
            self.pending.take(&correlation_id);
            return Err(e);
        }
        Ok(correlation_id)
    }

    fn stall(&mut self, reason: impl Into<String>) -> Progress {
        let reason = reason.into();
        tracing::info!(reason = %reason, "Session stalled");
        self.state = SessionState::Stalled;
        self.stall_reason = Some(reason.clone());
        Progress::Stalled(reason)
    }

    fn fail(&mut self, reason: impl Into<String>) -> Progress {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "Task failed");
        self.reset();
        self.state = SessionState::Failed;
        Progress::Failed(reason)
    }

    fn complete(&mut self, message: String) -> Progress {
        tracing::info!(task = ?self.task, message = %message, "Task completed by application");
        self.reset();
        self.state = SessionState::Complete;
        Progress::Completed(message)
    }

    fn reset(&mut self) {
        self.task = None;
        self.listing = None;
        self.selected = None;
        self.snapshot = None;
        self.form = None;
        self.question = None;
        self.stall_reason = None;
        self.history.clear();
        self.pending.clear();
        self.issued.clear();
    }

    fn invalid(&self, operation: &'static str) -> ControllerError {
        ControllerError::InvalidState {
            operation,
            state: self.state,
        }
    }
}
