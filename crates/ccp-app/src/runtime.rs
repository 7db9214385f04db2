//! Relay session for a controlled application.
//!
//! [`AppRuntime::handle`] maps one inbound message to the replies it
//! produces; [`AppRuntime::serve`] and [`run`] wire it to the relay.
//! Replies echo the correlation id of the request they answer.

use std::time::Duration;

use ccp_network::{Connection, Endpoint, Inbound};
use ccp_protocol::{
    ActionStatus, CapabilitySnapshot, Envelope, FormDataResponse, Message, Role, StatusUpdate,
    REGISTRATION_STATUS_SUCCESS,
};

use crate::application::{ControlledApplication, ExecutionOutcome, FormOutcome};
use crate::config::AppConfig;
use crate::error::AppError;

pub struct AppRuntime<A> {
    app: A,
    registered: bool,
}

impl<A: ControlledApplication> AppRuntime<A> {
    pub fn new(app: A) -> Self {
        Self {
            app,
            registered: false,
        }
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn software_id(&self) -> String {
        self.app.identity().software_id
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn identify(&self) -> Envelope {
        Envelope::new(Message::IdentifySoftware(self.app.identity()))
    }

    /// Replies to send for one inbound message.
    pub fn handle(&mut self, envelope: Envelope) -> Result<Vec<Envelope>, AppError> {
        let correlation_id = envelope.correlation_id;
        let replies = match envelope.message {
            Message::RegistrationAck(ack) => {
                if ack.status != REGISTRATION_STATUS_SUCCESS {
                    return Err(AppError::Registration {
                        status: ack.status,
                        message: ack.message,
                    });
                }
                tracing::info!(software_id = %self.software_id(), message = %ack.message, "Registered with relay");
                self.registered = true;
                vec![]
            }
            Message::RequestSoftwareCapabilities(request) => {
                self.check_addressed(&request.software_id, "REQUEST_SOFTWARE_CAPABILITIES");
                vec![Message::SoftwareCapabilitiesResponse {
                    software_id: self.software_id(),
                    capabilities: self.app.capabilities(),
                }]
            }
            Message::ExecuteSolutionPlan(plan) => {
                self.check_addressed(&plan.software_id, "EXECUTE_SOLUTION_PLAN");
                let outcome = self.app.execute(&plan.solution.actions);
                tracing::info!(
                    software_id = %plan.software_id,
                    planned = plan.solution.actions.len(),
                    executed = outcome.executed(),
                    "Plan executed"
                );
                vec![self.report_execution(outcome)]
            }
            Message::FormDataResponse(FormDataResponse { software_id, form_data }) => {
                self.check_addressed(&software_id, "FORM_DATA_RESPONSE");
                let update = match self.app.submit_form(&form_data) {
                    FormOutcome::Accepted(message) => self.status(ActionStatus::SuccessFormFilled, message),
                    FormOutcome::Rejected(message) => {
                        tracing::warn!(reason = %message, "Form data rejected");
                        self.status(ActionStatus::FailureFormProcessing, message)
                    }
                };
                vec![update]
            }
            Message::FormRequest(form) => {
                self.app.receive_form(&form);
                vec![]
            }
            Message::Unknown { kind, .. } => {
                tracing::warn!(kind = %kind, "Ignoring unknown message type");
                vec![]
            }
            other => {
                tracing::debug!(kind = %other.kind(), "Ignoring message not meant for an application");
                vec![]
            }
        };

        Ok(replies
            .into_iter()
            .map(|message| Envelope {
                message,
                correlation_id: correlation_id.clone(),
            })
            .collect())
    }

    fn check_addressed(&self, software_id: &str, kind: &str) {
        let own = self.software_id();
        if software_id != own {
            tracing::warn!(expected = %own, got = %software_id, kind = %kind, "Message addressed to another application");
        }
    }

    fn snapshot(&self) -> CapabilitySnapshot {
        self.app.capabilities()
    }

    fn status(&self, status: ActionStatus, message: String) -> Message {
        Message::ActionStatusUpdate(StatusUpdate {
            software_id: self.software_id(),
            status,
            message,
            current_capabilities: Some(self.snapshot()),
        })
    }

    fn report_execution(&self, outcome: ExecutionOutcome) -> Message {
        match outcome {
            ExecutionOutcome::Completed { message, .. } => {
                let status = if self.app.task_complete() {
                    ActionStatus::TaskCompletedBySoftware
                } else {
                    ActionStatus::Success
                };
                self.status(status, message)
            }
            ExecutionOutcome::Failed { message, .. } => self.status(ActionStatus::Failure, message),
            ExecutionOutcome::FormRequested { form, .. } => Message::FormRequest(form),
        }
    }

    /// Identify and answer relay traffic until the connection closes.
    pub async fn serve(&mut self, connection: Connection) -> Result<(), AppError> {
        let (sender, mut inbound) = connection.split();
        sender.send(self.identify())?;

        while let Some(event) = inbound.recv().await {
            match event {
                Inbound::Message(envelope) => {
                    for reply in self.handle(envelope)? {
                        sender.send(reply)?;
                    }
                }
                Inbound::RelayError(reply) => {
                    tracing::warn!(error = %reply.error, details = ?reply.details, "Relay error");
                }
                Inbound::Malformed { raw, error } => {
                    tracing::warn!(error = %error, raw = %raw, "Undecodable frame from relay");
                }
                Inbound::Closed(info) => {
                    tracing::info!(close = ?info, "Relay closed the connection");
                    self.registered = false;
                    return Ok(());
                }
            }
        }
        self.registered = false;
        Err(AppError::Disconnected)
    }
}

/// Stay connected to the relay, reconnecting after a delay.
pub async fn run<A: ControlledApplication>(config: &AppConfig, app: A) -> anyhow::Result<()> {
    let mut runtime = AppRuntime::new(app);
    let endpoint = Endpoint::new(&config.relay_url, Role::Application, runtime.software_id());
    let delay = Duration::from_secs(config.reconnect_delay_secs);

    loop {
        match ccp_network::connect(&endpoint).await {
            Ok(connection) => {
                tracing::info!(url = %endpoint.url(), "Connected to relay");
                match runtime.serve(connection).await {
                    Err(AppError::Registration { status, message }) => {
                        anyhow::bail!("registration refused: {status}: {message}");
                    }
                    Err(e) => tracing::warn!(error = %e, "Relay session ended"),
                    Ok(()) => tracing::info!("Relay session closed"),
                }
            }
            Err(e) => tracing::warn!(error = %e, "Relay unreachable"),
        }
        tracing::info!(delay_secs = delay.as_secs(), "Reconnecting");
        tokio::time::sleep(delay).await;
    }
}
