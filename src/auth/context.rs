//! Caller context passed to every store operation: who is calling, until when,
//! and whether the caller has given up.

use crate::errors::{Result, StrongboxError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Authenticated principal behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    subject: String,
    app: Option<String>,
}

impl Identity {
    pub fn new<S: Into<String>>(subject: S) -> Self {
        Self { subject: subject.into(), app: None }
    }

    /// Identity acting on behalf of a named API/app
    pub fn with_app<A: Into<String>>(mut self, app: A) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// True if the app (or, lacking one, the subject) is listed in `apis`.
    ///
    /// An empty list authorizes nobody.
    pub fn is_authorized_for(&self, apis: &[String]) -> bool {
        apis.iter().any(|api| match &self.app {
            Some(app) => api == app || api == &self.subject,
            None => api == &self.subject,
        })
    }
}

/// Per-request context: identity, deadline, cancellation
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity: Some(identity), ..Default::default() }
    }

    /// Context without an identity; every store operation rejects it
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The caller identity, or `Unauthenticated`
    pub fn require_identity(&self) -> Result<&Identity> {
        match &self.identity {
            Some(identity) if !identity.subject.trim().is_empty() => Ok(identity),
            _ => Err(StrongboxError::unauthenticated("no identity in request context")),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Drive `fut` until it completes, the deadline passes, or the caller cancels.
    ///
    /// `default_timeout` applies only when the context carries no deadline.
    /// Dropping `fut` on timeout/cancel rolls back any open transaction it holds.
    pub async fn run<F, T>(
        &self,
        operation: &'static str,
        default_timeout: Option<Duration>,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(StrongboxError::cancelled(operation));
        }

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Err(StrongboxError::cancelled(operation)),
                result = fut => result,
            }
        };

        let deadline = self.deadline.or_else(|| default_timeout.map(|d| Instant::now() + d));
        match deadline {
            Some(deadline) => {
                let budget = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout_at(deadline, guarded).await {
                    Ok(result) => result,
                    Err(_) => Err(StrongboxError::timeout(operation, budget.as_millis() as u64)),
                }
            }
            None => guarded.await,
        }
    }
}
