use std::collections::HashMap;
use std::time::{Duration, Instant};

use ccp_protocol::{new_correlation_id, Envelope, MessageType};

/// An outstanding request awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub correlation_id: String,
    pub expected: MessageType,
    pub software_id: Option<String>,
    pub deadline: Instant,
}

/// Correlation-id keyed table of outstanding requests.
#[derive(Debug)]
pub struct PendingRequests {
    entries: HashMap<String, PendingRequest>,
    timeout: Duration,
}

impl PendingRequests {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
        }
    }

    /// Record a new request and return its correlation id.
    pub fn register(&mut self, expected: MessageType, software_id: Option<&str>) -> String {
        self.register_at(expected, software_id, Instant::now())
    }

    pub fn register_at(
        &mut self,
        expected: MessageType,
        software_id: Option<&str>,
        now: Instant,
    ) -> String {
        let correlation_id = new_correlation_id();
        self.entries.insert(
            correlation_id.clone(),
            PendingRequest {
                correlation_id: correlation_id.clone(),
                expected,
                software_id: software_id.map(str::to_string),
                deadline: now + self.timeout,
            },
        );
        correlation_id
    }

    /// Remove and return the entry answered by `envelope`, if any.
    ///
    /// Both the correlation id and the expected type must match.
    pub fn resolve(&mut self, envelope: &Envelope) -> Option<PendingRequest> {
        let cid = envelope.correlation_id.as_deref()?;
        let kind = envelope.message.message_type()?;
        match self.entries.get(cid) {
            Some(entry) if entry.expected == kind => self.entries.remove(cid),
            _ => None,
        }
    }

    /// Remove by correlation id regardless of type (e.g. a relay error reply).
    pub fn take(&mut self, correlation_id: &str) -> Option<PendingRequest> {
        self.entries.remove(correlation_id)
    }

    /// Drop every wait concerning `software_id`.
    pub fn abandon_for(&mut self, software_id: &str) -> Vec<PendingRequest> {
        let ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.software_id.as_deref() == Some(software_id))
            .map(|e| e.correlation_id.clone())
            .collect();
        ids.iter().filter_map(|id| self.entries.remove(id)).collect()
    }

    /// Remove and return entries whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingRequest> {
        let ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.deadline <= now)
            .map(|e| e.correlation_id.clone())
            .collect();
        let mut expired: Vec<PendingRequest> =
            ids.iter().filter_map(|id| self.entries.remove(id)).collect();
        expired.sort_by_key(|e| e.deadline);
        expired
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn owns(&self, correlation_id: &str) -> bool {
        self.entries.contains_key(correlation_id)
    }

    pub fn is_waiting_for(&self, expected: MessageType) -> bool {
        self.entries.values().any(|e| e.expected == expected)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
