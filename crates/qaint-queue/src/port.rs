//! The outbound port: the external issue tracker, consumed through a
//! narrow interface. Adapters (the real REST client, a test double) live
//! outside this crate; the coordinator only depends on this trait.

use std::collections::HashMap;
use std::future::Future;

/// What the external tracker handed back after a mutating call.
#[derive(Debug, Clone, Default)]
pub struct IssueDescriptor {
    pub id: String,
    pub key: String,
    pub project: String,
    pub fields: serde_json::Value,
}

/// An error surfaced by the port, shaped closely enough to an HTTP response
/// that the classifier in [`crate::classify`] can inspect it without the
/// port needing to know about our retry policy.
#[derive(Debug, Clone)]
pub struct PortError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
    pub headers: HashMap<String, String>,
}

impl PortError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            headers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into().to_lowercase(), value.into());
        self
    }

    /// The `Retry-After` header, if the port attached one.
    #[must_use]
    pub fn retry_after(&self) -> Option<&str> {
        self.headers.get("retry-after").map(String::as_str)
    }
}

impl std::fmt::Display for PortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PortError {}

/// The external issue tracker, abstracted to the five actions the queue
/// needs to dispatch on. The queue never parses `payload`; validating it
/// is the producer's job, rejecting a malformed one is the port's.
pub trait ExternalPort: Send + Sync {
    fn create_issue(
        &self,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<IssueDescriptor, PortError>> + Send;

    fn update_issue(
        &self,
        key: &str,
        updates: serde_json::Value,
    ) -> impl Future<Output = Result<IssueDescriptor, PortError>> + Send;

    fn add_comment(
        &self,
        key: &str,
        comment: serde_json::Value,
    ) -> impl Future<Output = Result<IssueDescriptor, PortError>> + Send;

    fn link(
        &self,
        inward: &str,
        outward: &str,
        link_type: &str,
    ) -> impl Future<Output = Result<(), PortError>> + Send;

    fn bulk_create(
        &self,
        items: Vec<serde_json::Value>,
    ) -> impl Future<Output = Result<Vec<IssueDescriptor>, PortError>> + Send;
}
