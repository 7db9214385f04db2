//! Message routing.
//!
//! Each inbound frame is classified by its declared type and the sender's
//! role, then either:
//! 1. answered by the relay itself (directory listing, registration ack),
//! 2. forwarded verbatim to the addressed application, or
//! 3. delivered to the controller that issued the correlated request,
//!    falling back to a broadcast to all controllers.
//!
//! Malformed frames get an `{error, details}` reply and the loop continues.
//! The relay never interprets task semantics.

use ccp_protocol::{
    Envelope, ErrorReply, Message, ProtocolError, RegistrationAck, Role,
};
use serde_json::json;

use crate::registry::Outbound;
use crate::state::{Peer, RelayState, RouteTraceEvent};
use crate::{RegistryError, RelayError};

impl RelayState {
    /// Handle one text frame from `peer`.
    ///
    /// `Err` means the connection's loop must end.
    pub fn handle_inbound(&mut self, peer: &mut Peer, text: &str) -> Result<(), RelayError> {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(err @ (ProtocolError::InvalidJson(_) | ProtocolError::Schema { .. })) => {
                tracing::warn!(peer = %peer.label(), error = %err, "Rejected malformed message");
                let reply = ErrorReply::from(&err).with_correlation(raw_correlation_id(text));
                self.reply_error(peer, reply)?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        match peer.role {
            Role::Application => self.route_from_application(peer, envelope, text),
            Role::Controller => self.route_from_controller(peer, envelope, text),
        }
    }

    fn route_from_application(
        &mut self,
        peer: &mut Peer,
        envelope: Envelope,
        text: &str,
    ) -> Result<(), RelayError> {
        let correlation_id = envelope.correlation_id.clone();
        match envelope.message {
            Message::IdentifySoftware(record) => {
                let new_id = record.software_id.clone();
                if new_id != peer.id {
                    if self
                        .registry
                        .deregister_connection(Role::Application, &peer.id, peer.token)
                        && peer.identified
                    {
                        self.directory.unregister(&peer.id);
                    }
                    tracing::info!(old = %peer.id, new = %new_id, "Application re-keyed on identify");
                    peer.id = new_id.clone();
                }
                if let Some(replaced) =
                    self.registry
                        .register(Role::Application, new_id.clone(), peer.token, peer.tx.clone())
                {
                    tracing::warn!(software_id = %new_id, replaced, "Application id taken over");
                }
                peer.identified = true;
                tracing::info!(software_id = %new_id, name = %record.name, "Application identified");
                self.directory.register(record);

                let mut ack = Envelope::new(Message::RegistrationAck(RegistrationAck::default()));
                ack.correlation_id = correlation_id.clone();
                self.reply_message(peer, &ack)?;
                self.trace(peer, "relay", "IDENTIFY_SOFTWARE", Some(new_id), correlation_id, "registered");
                Ok(())
            }
            msg @ (Message::SoftwareCapabilitiesResponse { .. }
            | Message::ActionStatusUpdate(_)
            | Message::FormRequest(_)) => {
                let software_id = msg.software_id().map(str::to_string);
                self.deliver_to_controllers(peer, msg.kind(), software_id, correlation_id, text);
                Ok(())
            }
            Message::Unknown { kind, .. } => {
                tracing::warn!(peer = %peer.label(), kind = %kind, "Ignoring unknown message type");
                self.trace(peer, "relay", &kind, None, correlation_id, "ignored unknown type");
                Ok(())
            }
            other => {
                tracing::warn!(peer = %peer.label(), kind = %other.kind(), "Ignoring message not valid from an application");
                self.trace(peer, "relay", other.kind(), None, correlation_id, "ignored");
                Ok(())
            }
        }
    }

    fn route_from_controller(
        &mut self,
        peer: &mut Peer,
        envelope: Envelope,
        text: &str,
    ) -> Result<(), RelayError> {
        let correlation_id = envelope.correlation_id.clone();
        match &envelope.message {
            Message::RequestSoftwareList => {
                let list = self.directory.list();
                let count = list.len();
                let mut reply = Envelope::new(Message::SoftwareListResponse(list));
                reply.correlation_id = correlation_id.clone();
                self.reply_message(peer, &reply)?;
                tracing::debug!(controller = %peer.id, count, "Answered directory listing");
                self.trace(peer, "relay", "REQUEST_SOFTWARE_LIST", None, correlation_id, "answered");
                Ok(())
            }
            msg @ (Message::RequestSoftwareCapabilities(_)
            | Message::ExecuteSolutionPlan(_)
            | Message::FormDataResponse(_)
            | Message::FormRequest(_)) => {
                let kind = msg.kind().to_string();
                let target = msg.software_id().unwrap_or_default().to_string();
                if target.is_empty() {
                    let reply = ErrorReply::new("Missing software_id")
                        .with_details(json!({ "type": kind }))
                        .with_correlation(correlation_id.clone());
                    self.reply_error(peer, reply)?;
                    self.trace(peer, "relay", &kind, None, correlation_id, "rejected: no target");
                    return Ok(());
                }

                if let Some(cid) = &correlation_id {
                    self.routes.insert(cid.clone(), peer.id.clone());
                }

                let to = format!("{}:{}", Role::Application, target);
                match self
                    .registry
                    .send(Role::Application, &target, Outbound::Text(text.to_string()))
                {
                    Ok(()) => {
                        tracing::debug!(controller = %peer.id, software_id = %target, kind = %kind, "Forwarded to application");
                        self.trace(peer, &to, &kind, Some(target), correlation_id, "forwarded");
                    }
                    Err(err) => {
                        let error = match err {
                            RegistryError::NotFound { .. } => "Software not connected",
                            RegistryError::Closed { .. } => "Software connection closed",
                        };
                        tracing::warn!(controller = %peer.id, software_id = %target, error = %err, "Forward failed");
                        let reply = ErrorReply::new(error)
                            .with_details(json!({ "software_id": target, "type": kind }))
                            .with_correlation(correlation_id.clone());
                        self.reply_error(peer, reply)?;
                        self.trace(peer, &to, &kind, Some(target), correlation_id, error);
                    }
                }
                Ok(())
            }
            Message::Unknown { kind, .. } => {
                tracing::warn!(peer = %peer.label(), kind = %kind, "Ignoring unknown message type");
                self.trace(peer, "relay", kind, None, correlation_id, "ignored unknown type");
                Ok(())
            }
            other => {
                tracing::warn!(peer = %peer.label(), kind = %other.kind(), "Ignoring message not valid from a controller");
                self.trace(peer, "relay", other.kind(), None, correlation_id, "ignored");
                Ok(())
            }
        }
    }

    /// Point-to-point when the correlation id is known, otherwise broadcast.
    fn deliver_to_controllers(
        &mut self,
        peer: &Peer,
        kind: &str,
        software_id: Option<String>,
        correlation_id: Option<String>,
        text: &str,
    ) {
        let frame = Outbound::Text(text.to_string());
        let requester = correlation_id
            .as_deref()
            .and_then(|cid| self.routes.get(cid))
            .map(str::to_string);

        if let Some(controller) = requester {
            match self.registry.send(Role::Controller, &controller, frame.clone()) {
                Ok(()) => {
                    let to = format!("{}:{}", Role::Controller, controller);
                    self.trace(peer, &to, kind, software_id, correlation_id, "delivered");
                    return;
                }
                Err(err) => {
                    tracing::warn!(controller = %controller, error = %err, "Requester unreachable, broadcasting");
                }
            }
        }

        let report = self.registry.broadcast(Role::Controller, &frame);
        tracing::debug!(
            from = %peer.label(),
            kind = %kind,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast to controllers"
        );
        let outcome = format!("broadcast to {}", report.delivered.len());
        self.trace(peer, "broadcast", kind, software_id, correlation_id, &outcome);
    }

    fn reply_message(&self, peer: &Peer, envelope: &Envelope) -> Result<(), RelayError> {
        let text = envelope.encode()?;
        self.reply_text(peer, text)
    }

    fn reply_error(&self, peer: &Peer, reply: ErrorReply) -> Result<(), RelayError> {
        let text = reply.encode()?;
        self.reply_text(peer, text)
    }

    fn reply_text(&self, peer: &Peer, text: String) -> Result<(), RelayError> {
        if peer.reply(Outbound::Text(text)) {
            Ok(())
        } else {
            Err(RelayError::ConnectionClosed {
                role: peer.role,
                id: peer.id.clone(),
            })
        }
    }

    fn trace(
        &mut self,
        peer: &Peer,
        to: &str,
        kind: &str,
        software_id: Option<String>,
        correlation_id: Option<String>,
        outcome: &str,
    ) {
        self.push_trace(RouteTraceEvent {
            timestamp: chrono::Utc::now(),
            from: peer.label(),
            to: to.to_string(),
            message_type: kind.to_string(),
            software_id,
            correlation_id,
            outcome: outcome.to_string(),
        });
    }
}

/// Best-effort correlation id from a frame that failed to decode.
fn raw_correlation_id(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("correlation_id")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::registry::OutboundTx;
    use serde_json::Value;
    use tokio::sync::mpsc;

    struct Client {
        peer: Peer,
        rx: mpsc::UnboundedReceiver<Outbound>,
    }

    impl Client {
        fn next_json(&mut self) -> Value {
            match self.rx.try_recv().expect("expected a frame") {
                Outbound::Text(text) => serde_json::from_str(&text).unwrap(),
                other => panic!("unexpected frame {other:?}"),
            }
        }

        fn is_quiet(&mut self) -> bool {
            self.rx.try_recv().is_err()
        }
    }

    fn connect(state: &mut RelayState, role: Role, id: &str) -> Client {
        let (tx, rx): (OutboundTx, _) = mpsc::unbounded_channel();
        let peer = state.connect(role, id, tx);
        Client { peer, rx }
    }

    fn identify(state: &mut RelayState, app: &mut Client, id: &str) {
        let msg = json!({
            "type": "IDENTIFY_SOFTWARE",
            "payload": {"software_id": id, "name": "Shop", "description": "Food delivery", "keywords": ["food"]}
        });
        state.handle_inbound(&mut app.peer, &msg.to_string()).unwrap();
        let ack = app.next_json();
        assert_eq!(ack["type"], "REGISTRATION_ACK");
        assert_eq!(ack["payload"]["status"], "success");
    }

    fn state() -> RelayState {
        RelayState::new(&RelayConfig::default())
    }

    #[test]
    fn test_list_after_identify() {
        let mut st = state();
        let mut app = connect(&mut st, Role::Application, "shop-1");
        identify(&mut st, &mut app, "shop-1");

        let mut ctl = connect(&mut st, Role::Controller, "agent");
        st.handle_inbound(
            &mut ctl.peer,
            r#"{"type":"REQUEST_SOFTWARE_LIST","payload":{},"correlation_id":"c-1"}"#,
        )
        .unwrap();
        let reply = ctl.next_json();
        assert_eq!(reply["type"], "SOFTWARE_LIST_RESPONSE");
        assert_eq!(reply["correlation_id"], "c-1");
        assert_eq!(reply["payload"][0]["software_id"], "shop-1");
    }

    #[test]
    fn test_identify_with_new_id_rekeys_connection() {
        let mut st = state();
        let mut app = connect(&mut st, Role::Application, "tmp-42");
        identify(&mut st, &mut app, "shop-1");

        assert_eq!(app.peer.id, "shop-1");
        assert!(!st.registry.contains(Role::Application, "tmp-42"));
        assert!(st.registry.contains(Role::Application, "shop-1"));

        st.disconnect(&app.peer);
        assert!(st.directory.is_empty());
        assert_eq!(st.registry.count(Role::Application), 0);
    }

    #[test]
    fn test_capability_request_forwarded_verbatim() {
        let mut st = state();
        let mut app = connect(&mut st, Role::Application, "shop-1");
        identify(&mut st, &mut app, "shop-1");
        let mut ctl = connect(&mut st, Role::Controller, "agent");

        let raw = r#"{"type":"REQUEST_SOFTWARE_CAPABILITIES","payload":{"software_id":"shop-1"},"correlation_id":"c-7"}"#;
        st.handle_inbound(&mut ctl.peer, raw).unwrap();

        match app.rx.try_recv().unwrap() {
            Outbound::Text(text) => assert_eq!(text, raw),
            other => panic!("unexpected {other:?}"),
        }
        assert!(ctl.is_quiet());
    }

    #[test]
    fn test_forward_to_missing_application_replies_error() {
        let mut st = state();
        let mut ctl = connect(&mut st, Role::Controller, "agent");
        st.handle_inbound(
            &mut ctl.peer,
            r#"{"type":"REQUEST_SOFTWARE_CAPABILITIES","payload":{"software_id":"ghost"},"correlation_id":"c-2"}"#,
        )
        .unwrap();
        let reply = ctl.next_json();
        assert_eq!(reply["error"], "Software not connected");
        assert_eq!(reply["correlation_id"], "c-2");
        assert_eq!(reply["details"]["software_id"], "ghost");
    }

    #[test]
    fn test_correlated_response_goes_only_to_requester() {
        let mut st = state();
        let mut app = connect(&mut st, Role::Application, "shop-1");
        identify(&mut st, &mut app, "shop-1");
        let mut asker = connect(&mut st, Role::Controller, "agent");
        let mut bystander = connect(&mut st, Role::Controller, "agent");

        st.handle_inbound(
            &mut asker.peer,
            r#"{"type":"REQUEST_SOFTWARE_CAPABILITIES","payload":{"software_id":"shop-1"},"correlation_id":"c-9"}"#,
        )
        .unwrap();
        let _forwarded = app.rx.try_recv().unwrap();

        let response = json!({
            "type": "SOFTWARE_CAPABILITIES_RESPONSE",
            "software_id": "shop-1",
            "correlation_id": "c-9",
            "payload": {"current_view": "homepage", "elements": []}
        });
        st.handle_inbound(&mut app.peer, &response.to_string()).unwrap();

        assert_eq!(asker.next_json()["type"], "SOFTWARE_CAPABILITIES_RESPONSE");
        assert!(bystander.is_quiet());
    }

    #[test]
    fn test_uncorrelated_status_is_broadcast() {
        let mut st = state();
        let mut app = connect(&mut st, Role::Application, "shop-1");
        identify(&mut st, &mut app, "shop-1");
        let mut a = connect(&mut st, Role::Controller, "a");
        let mut b = connect(&mut st, Role::Controller, "b");

        let status = json!({
            "type": "ACTION_STATUS_UPDATE",
            "payload": {"software_id": "shop-1", "status": "USER_MODIFIED_STATE", "message": "user clicked"}
        });
        st.handle_inbound(&mut app.peer, &status.to_string()).unwrap();

        assert_eq!(a.next_json()["payload"]["status"], "USER_MODIFIED_STATE");
        assert_eq!(b.next_json()["payload"]["status"], "USER_MODIFIED_STATE");
        assert_eq!(st.trace.last().unwrap().to, "broadcast");
    }

    #[test]
    fn test_malformed_input_gets_error_reply_and_continues() {
        let mut st = state();
        let mut ctl = connect(&mut st, Role::Controller, "agent");

        st.handle_inbound(&mut ctl.peer, "not json").unwrap();
        assert_eq!(ctl.next_json()["error"], "Invalid JSON format");

        st.handle_inbound(
            &mut ctl.peer,
            r#"{"type":"EXECUTE_SOLUTION_PLAN","payload":{"software_id":"shop-1"},"correlation_id":"c-3"}"#,
        )
        .unwrap();
        let reply = ctl.next_json();
        assert_eq!(reply["error"], "Invalid EXECUTE_SOLUTION_PLAN format");
        assert_eq!(reply["correlation_id"], "c-3");
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let mut st = state();
        let mut ctl = connect(&mut st, Role::Controller, "agent");
        st.handle_inbound(&mut ctl.peer, r#"{"type":"PING","payload":{}}"#)
            .unwrap();
        assert!(ctl.is_quiet());
    }

    #[test]
    fn test_closed_own_channel_ends_loop() {
        let mut st = state();
        let Client { mut peer, rx } = connect(&mut st, Role::Controller, "agent");
        drop(rx);
        let err = st
            .handle_inbound(&mut peer, r#"{"type":"REQUEST_SOFTWARE_LIST"}"#)
            .unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed { .. }));
    }

    #[test]
    fn test_routes_dropped_when_controller_leaves() {
        let mut st = state();
        let mut app = connect(&mut st, Role::Application, "shop-1");
        identify(&mut st, &mut app, "shop-1");
        let mut ctl = connect(&mut st, Role::Controller, "agent");
        st.handle_inbound(
            &mut ctl.peer,
            r#"{"type":"REQUEST_SOFTWARE_CAPABILITIES","payload":{"software_id":"shop-1"},"correlation_id":"c-5"}"#,
        )
        .unwrap();
        assert_eq!(st.routes.len(), 1);

        st.disconnect(&ctl.peer);
        assert!(st.routes.is_empty());
    }
}
