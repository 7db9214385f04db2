//! Controller event loop.
//!
//! One `tokio::select!` loop multiplexes relay traffic, operator answers
//! and a timeout tick. Operator prompts run on their own task so inbound
//! messages keep flowing while a human types. Some prompt is always open:
//! a specific one (choice, clarification, form) when the session needs it,
//! otherwise a command reader, so `abort` is accepted in every state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ccp_network::{Endpoint, Inbound};
use ccp_protocol::{ApplicationRecord, FormRequest, Role};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ControllerConfig;
use crate::operator::{OperatorCommand, OperatorInput};
use crate::planner::Planner;
use crate::session::{Controller, Progress, SessionState};

const TIMEOUT_TICK: Duration = Duration::from_millis(250);

/// Outcome counts of a controller run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl RunSummary {
    fn record(&mut self, progress: &Progress) {
        match progress {
            Progress::Completed(_) => self.completed += 1,
            Progress::Failed(_) => self.failed += 1,
            Progress::Aborted => self.aborted += 1,
            _ => {}
        }
    }
}

enum Ask {
    Command(SessionState),
    Choose {
        task: String,
        applications: Vec<ApplicationRecord>,
    },
    Clarify(String),
    Form(FormRequest),
}

impl Ask {
    fn key(&self) -> AskKey {
        match self {
            Ask::Command(state) => AskKey::Command(*state),
            Ask::Choose { .. } => AskKey::Choose,
            Ask::Clarify(_) => AskKey::Clarify,
            Ask::Form(_) => AskKey::Form,
        }
    }
}

/// Identifies an open prompt; a change of key replaces the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AskKey {
    Command(SessionState),
    Choose,
    Clarify,
    Form,
}

enum Answer {
    Command(Option<OperatorCommand>),
    Application(Option<String>),
    Clarification(String),
    Form(HashMap<String, String>),
    Abort,
}

struct OpenAsk {
    key: AskKey,
    generation: u64,
    handle: JoinHandle<()>,
}

/// What the operator should be asked given the session's state.
fn next_ask(controller: &Controller) -> Ask {
    let state = controller.state();
    let specific = match state {
        SessionState::AwaitingSoftwareList => controller.listing().map(|apps| Ask::Choose {
            task: controller.task().unwrap_or_default().to_string(),
            applications: apps.to_vec(),
        }),
        SessionState::AwaitingUserClarification => {
            controller.question().map(|q| Ask::Clarify(q.to_string()))
        }
        SessionState::AwaitingFormResponse => controller.current_form().cloned().map(Ask::Form),
        _ => None,
    };
    specific.unwrap_or(Ask::Command(state))
}

fn spawn_ask(
    operator: Arc<dyn OperatorInput>,
    ask: Ask,
    generation: u64,
    answers: mpsc::UnboundedSender<(u64, Answer)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let answer = match ask {
            Ask::Command(state) => Answer::Command(operator.next_command(state).await),
            Ask::Choose { task, applications } => {
                Answer::Application(operator.choose_application(&task, &applications).await)
            }
            Ask::Clarify(question) => match operator.clarify(&question).await {
                Some(text) => Answer::Clarification(text),
                None => Answer::Abort,
            },
            Ask::Form(form) => match operator.fill_form(&form).await {
                Some(answers) => Answer::Form(answers),
                None => Answer::Abort,
            },
        };
        let _ = answers.send((generation, answer));
    })
}

/// Connect to the relay and run until the operator quits.
pub async fn run(
    config: &ControllerConfig,
    planner: Arc<dyn Planner>,
    operator: Arc<dyn OperatorInput>,
) -> anyhow::Result<RunSummary> {
    let endpoint = Endpoint::new(&config.relay_url, Role::Controller, &config.client_id);
    let connection = ccp_network::connect(&endpoint).await?;
    let (sender, inbound) = connection.split();

    let controller = Controller::new(Box::new(sender.clone()), planner, config.session());
    let result = drive(controller, inbound, operator).await;
    sender.close();
    result
}

/// The event loop proper, over an already connected session.
pub async fn drive(
    mut controller: Controller,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    operator: Arc<dyn OperatorInput>,
) -> anyhow::Result<RunSummary> {
    let (answer_tx, mut answer_rx) = mpsc::unbounded_channel::<(u64, Answer)>();
    let mut open: Option<OpenAsk> = None;
    let mut generation = 0u64;
    let mut tick = tokio::time::interval(TIMEOUT_TICK);
    let mut summary = RunSummary::default();

    let result = loop {
        let ask = next_ask(&controller);
        let key = ask.key();
        if open.as_ref().map(|o| o.key) != Some(key) {
            if let Some(stale) = open.take() {
                stale.handle.abort();
            }
            generation += 1;
            let handle = spawn_ask(operator.clone(), ask, generation, answer_tx.clone());
            open = Some(OpenAsk {
                key,
                generation,
                handle,
            });
        }

        let progress = tokio::select! {
            event = inbound.recv() => match event {
                Some(Inbound::Message(envelope)) => controller.handle_envelope(envelope).await,
                Some(Inbound::RelayError(reply)) => controller.handle_relay_error(&reply),
                Some(Inbound::Malformed { raw, error }) => {
                    tracing::warn!(error = %error, raw = %raw, "Undecodable frame from relay");
                    Progress::Unchanged
                }
                Some(Inbound::Closed(info)) => {
                    break Err(anyhow::anyhow!("relay closed the connection: {info:?}"));
                }
                None => break Err(anyhow::anyhow!("relay connection lost")),
            },
            Some((answered, answer)) = answer_rx.recv() => {
                if open.as_ref().map(|o| o.generation) != Some(answered) {
                    tracing::debug!("Discarding answer to a replaced prompt");
                    continue;
                }
                open = None;
                match apply_answer(&mut controller, answer).await {
                    Some(progress) => progress,
                    None => break Ok(()),
                }
            }
            _ = tick.tick() => controller.poll_timeouts(Instant::now()),
        };

        summary.record(&progress);
        if let Progress::Listing(applications) = &progress {
            operator.show_applications(applications);
        }
        report(&progress, controller.state());
    };

    if let Some(open) = open.take() {
        open.handle.abort();
    }
    result?;
    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        aborted = summary.aborted,
        "Controller finished"
    );
    Ok(summary)
}

/// `None` means quit.
async fn apply_answer(controller: &mut Controller, answer: Answer) -> Option<Progress> {
    let state = controller.state();
    if !answers_current_prompt(controller, &answer) {
        tracing::debug!(state = %state, "Discarding answer to a prompt that no longer applies");
        return Some(Progress::Unchanged);
    }
    let result = match answer {
        Answer::Command(None) | Answer::Command(Some(OperatorCommand::Quit)) => return None,
        Answer::Command(Some(OperatorCommand::Task(task))) => controller.start_task(&task),
        Answer::Command(Some(OperatorCommand::List)) => {
            controller.browse_applications().map(|()| Progress::Unchanged)
        }
        Answer::Command(Some(OperatorCommand::Abort)) | Answer::Abort => {
            if state.accepts_new_task() {
                Ok(Progress::Unchanged)
            } else {
                Ok(controller.abort())
            }
        }
        Answer::Command(Some(OperatorCommand::Replan)) => controller.replan().await,
        Answer::Command(Some(OperatorCommand::RequestCapabilities)) => {
            controller.request_capabilities()
        }
        Answer::Application(None) => Ok(controller.abort()),
        Answer::Application(Some(id)) => match controller.select_application(&id) {
            Ok(()) => controller.request_capabilities(),
            Err(e) => Err(e),
        },
        Answer::Clarification(text) => controller.answer_clarification(&text).await,
        Answer::Form(answers) => controller.submit_form(&answers),
    };

    Some(result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Operator action rejected");
        Progress::Unchanged
    }))
}

fn answers_current_prompt(controller: &Controller, answer: &Answer) -> bool {
    match answer {
        Answer::Application(_) => {
            controller.state() == SessionState::AwaitingSoftwareList && controller.listing().is_some()
        }
        Answer::Clarification(_) => controller.state() == SessionState::AwaitingUserClarification,
        Answer::Form(_) => controller.state() == SessionState::AwaitingFormResponse,
        Answer::Command(_) | Answer::Abort => true,
    }
}

fn report(progress: &Progress, state: SessionState) {
    match progress {
        Progress::Unchanged | Progress::Prompt(_) => {}
        Progress::Listing(applications) => {
            tracing::debug!(count = applications.len(), "Listing shown to operator")
        }
        Progress::Waiting => tracing::debug!(state = %state, "Waiting for relay"),
        Progress::Stalled(reason) => tracing::info!(reason = %reason, "Stalled; operator input needed"),
        Progress::Completed(message) => tracing::info!(message = %message, "Task complete"),
        Progress::Failed(reason) => tracing::warn!(reason = %reason, "Task failed"),
        Progress::Aborted => tracing::info!("Task aborted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{AutoOperator, OperatorFuture};
    use crate::planner::{PlannerOutput, ScriptedPlanner};
    use crate::session::SessionConfig;
    use ccp_protocol::{CapabilitySnapshot, Element, Envelope, Message};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::{Mutex, Notify};

    #[derive(Clone, Copy, PartialEq)]
    enum Behaviour {
        Answer,
        IgnoreCapabilities,
    }

    /// A fake relay + application answering on the controller's outbox.
    async fn fake_application(
        mut outbox: mpsc::UnboundedReceiver<Envelope>,
        inbound: mpsc::UnboundedSender<Inbound>,
        behaviour: Behaviour,
    ) {
        while let Some(env) = outbox.recv().await {
            let cid = env.correlation_id.clone();
            let reply = match env.message {
                Message::RequestSoftwareList => Message::SoftwareListResponse(vec![
                    ApplicationRecord::new("shop-1", "Shop", "Food", vec!["noodles".into()]),
                ]),
                Message::RequestSoftwareCapabilities(_) if behaviour == Behaviour::IgnoreCapabilities => {
                    continue
                }
                Message::RequestSoftwareCapabilities(_) => Message::SoftwareCapabilitiesResponse {
                    software_id: "shop-1".into(),
                    capabilities: CapabilitySnapshot::new(
                        "homepage",
                        vec![Element::new("hp_delivery_button", "button", "Delivery", "")],
                    ),
                },
                Message::ExecuteSolutionPlan(_) => {
                    Message::ActionStatusUpdate(ccp_protocol::StatusUpdate {
                        software_id: "shop-1".into(),
                        status: ccp_protocol::ActionStatus::TaskCompletedBySoftware,
                        message: "order placed".into(),
                        current_capabilities: None,
                    })
                }
                _ => continue,
            };
            let mut reply = Envelope::new(reply);
            reply.correlation_id = cid;
            if inbound.send(Inbound::Message(reply)).is_err() {
                break;
            }
        }
    }

    /// Operator that runs queued commands, aborts on request in one state
    /// and gives up on clarifications.
    #[derive(Default)]
    struct TestOperator {
        commands: Mutex<VecDeque<OperatorCommand>>,
        abort_in: Option<SessionState>,
        asked: Mutex<Vec<SessionState>>,
        shown: std::sync::Mutex<Vec<ApplicationRecord>>,
        awaiting_listing: AtomicBool,
        listed: Notify,
    }

    impl TestOperator {
        fn new(commands: Vec<OperatorCommand>, abort_in: Option<SessionState>) -> Self {
            Self {
                commands: Mutex::new(commands.into()),
                abort_in,
                ..Default::default()
            }
        }
    }

    impl OperatorInput for TestOperator {
        fn next_command<'a>(&'a self, state: SessionState) -> OperatorFuture<'a, Option<OperatorCommand>> {
            Box::pin(async move {
                self.asked.lock().await.push(state);
                if self.abort_in == Some(state) {
                    return Some(OperatorCommand::Abort);
                }
                if !state.accepts_new_task() {
                    return std::future::pending().await;
                }
                if self.awaiting_listing.swap(false, Ordering::SeqCst) {
                    self.listed.notified().await;
                }
                let next = self.commands.lock().await.pop_front().unwrap_or(OperatorCommand::Quit);
                if next == OperatorCommand::List {
                    self.awaiting_listing.store(true, Ordering::SeqCst);
                }
                Some(next)
            })
        }

        fn choose_application<'a>(
            &'a self,
            _task: &'a str,
            applications: &'a [ApplicationRecord],
        ) -> OperatorFuture<'a, Option<String>> {
            Box::pin(async move { applications.first().map(|a| a.software_id.clone()) })
        }

        fn clarify<'a>(&'a self, _question: &'a str) -> OperatorFuture<'a, Option<String>> {
            Box::pin(async { None })
        }

        fn fill_form<'a>(&'a self, _form: &'a FormRequest) -> OperatorFuture<'a, Option<HashMap<String, String>>> {
            Box::pin(async { Some(HashMap::new()) })
        }

        fn show_applications(&self, applications: &[ApplicationRecord]) {
            self.shown.lock().unwrap().extend_from_slice(applications);
            self.listed.notify_one();
        }
    }

    #[tokio::test]
    async fn test_abort_while_awaiting_capabilities() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_application(out_rx, in_tx, Behaviour::IgnoreCapabilities));

        let planner = Arc::new(ScriptedPlanner::new(vec![]));
        let session = SessionConfig {
            response_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let controller = Controller::new(Box::new(out_tx), planner, session);
        let operator = Arc::new(TestOperator::new(
            vec![OperatorCommand::Task("order noodles".into())],
            Some(SessionState::AwaitingCapabilities),
        ));

        // well inside the response timeout, so no stall came first
        let summary = tokio::time::timeout(Duration::from_secs(2), drive(controller, in_rx, operator.clone()))
            .await
            .expect("abort should not wait for the response timeout")
            .unwrap();
        assert_eq!(summary.aborted, 1);

        let asked = operator.asked.lock().await.clone();
        assert!(asked.contains(&SessionState::AwaitingCapabilities));
        assert!(!asked.contains(&SessionState::Stalled));
    }

    #[tokio::test]
    async fn test_abort_from_clarification_prompt() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_application(out_rx, in_tx, Behaviour::Answer));

        let planner = Arc::new(ScriptedPlanner::new(vec![PlannerOutput::clarify("Which dish?")]));
        let controller = Controller::new(Box::new(out_tx), planner, SessionConfig::default());
        let operator = Arc::new(TestOperator::new(vec![OperatorCommand::Task("order food".into())], None));

        let summary = tokio::time::timeout(Duration::from_secs(5), drive(controller, in_rx, operator))
            .await
            .expect("run should finish")
            .unwrap();
        assert_eq!(
            summary,
            RunSummary {
                completed: 0,
                failed: 0,
                aborted: 1
            }
        );
    }

    #[tokio::test]
    async fn test_list_shows_directory_without_a_task() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_application(out_rx, in_tx, Behaviour::Answer));

        let planner = Arc::new(ScriptedPlanner::new(vec![]));
        let controller = Controller::new(Box::new(out_tx), planner.clone(), SessionConfig::default());
        let operator = Arc::new(TestOperator::new(vec![OperatorCommand::List], None));

        let summary = tokio::time::timeout(Duration::from_secs(5), drive(controller, in_rx, operator.clone()))
            .await
            .expect("run should finish")
            .unwrap();
        assert_eq!(summary, RunSummary::default());

        let shown = operator.shown.lock().unwrap().clone();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].software_id, "shop-1");
        assert!(planner.seen().await.is_empty());
        assert!(operator.asked.lock().await.iter().all(|s| *s == SessionState::Idle));
    }

    #[tokio::test]
    async fn test_drive_completes_task_with_auto_operator() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_application(out_rx, in_tx, Behaviour::Answer));

        let planner = Arc::new(ScriptedPlanner::new(vec![PlannerOutput::with_actions(
            "go",
            json!([{"command": "CLICK", "element_id": "hp_delivery_button"}]),
        )]));
        let controller = Controller::new(Box::new(out_tx), planner, SessionConfig::default());
        let operator = Arc::new(AutoOperator::new(vec!["order noodles".into()]));

        let summary = tokio::time::timeout(Duration::from_secs(5), drive(controller, in_rx, operator))
            .await
            .expect("run should finish")
            .unwrap();
        assert_eq!(
            summary,
            RunSummary {
                completed: 1,
                failed: 0,
                aborted: 0
            }
        );
    }

    #[tokio::test]
    async fn test_drive_stops_when_relay_closes() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        in_tx.send(Inbound::Closed(None)).unwrap();

        let planner = Arc::new(ScriptedPlanner::new(vec![]));
        let controller = Controller::new(Box::new(out_tx), planner, SessionConfig::default());
        let operator = Arc::new(AutoOperator::new(vec!["order noodles".into()]));

        let result = drive(controller, in_rx, operator).await;
        assert!(result.is_err());
    }
}
