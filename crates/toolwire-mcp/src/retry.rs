//! Retry with exponential backoff
//!
//! [`retry_with_policy`] re-runs a fallible operation while its error looks
//! transient. Classification is a case-insensitive substring match on the
//! error text. [`RetryingClient`] applies one policy to every request-shaped
//! operation of a client.

use tokio_util::sync::CancellationToken;
use crate::client::{McpClient, ResourceWatch};
use crate::protocol::{
    CreateMessageParams, CreateMessageResult, ErrorKind, GetPromptResult, McpError, McpPrompt,
    McpResource, McpTool, McpToolResult, ReadResourceResult,
};
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

const DEFAULT_RETRYABLE: &[&str] = &[
    "connection refused",
    "connection reset",
    "broken pipe",
    "timeout",
    "timed out",
    "temporarily unavailable",
    "server not ready",
    "eof",
    "service unavailable",
    "bad gateway",
];

/// When and how often to retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Lowercase fragments marking an error as transient
    pub retryable_substrings: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            retryable_substrings: DEFAULT_RETRYABLE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RetryPolicy {
    /// Run once, never retry
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Growth factor per retry; values below 1 or not finite are treated as 1
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    pub fn with_retryable_substrings<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_substrings = substrings
            .into_iter()
            .map(|s| s.into().to_lowercase())
            .collect();
        self
    }

    /// Whether `err` is worth another attempt
    pub fn is_retryable(&self, err: &McpError) -> bool {
        if matches!(err.kind(), ErrorKind::Cancellation | ErrorKind::Config) {
            return false;
        }
        let text = err.root_cause().to_string().to_lowercase();
        self.retryable_substrings
            .iter()
            .any(|fragment| text.contains(fragment.as_str()))
    }
}

/// Delay sequence of one retry loop
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            delay: policy.initial_delay.min(policy.max_delay),
            max_delay: policy.max_delay,
            multiplier: policy.multiplier.max(1.0),
        }
    }

    /// Delay to wait now; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        let jitter = rand::thread_rng().gen_range(0.9..=1.1);
        let scaled = (current.as_secs_f64() * self.multiplier * jitter)
            .min(self.max_delay.as_secs_f64());
        self.delay = Duration::from_secs_f64(scaled)
            .max(current)
            .min(self.max_delay);
        current
    }
}

/// Run `operation` until it succeeds, fails permanently, exhausts the policy
/// or `cancel` fires. `label` names the operation in logs and errors.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, McpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, McpError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = Backoff::new(policy);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(McpError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(McpError::Cancelled),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !policy.is_retryable(&err) {
            return Err(err);
        }

        if attempt >= max_attempts {
            error!(operation = %label, attempts = attempt, error = %err, "Retries exhausted");
            return Err(McpError::RetryExhausted {
                operation: label.to_string(),
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = backoff.next_delay();
        warn!(
            operation = %label,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(McpError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

/// A client whose request operations retry under one policy
#[derive(Debug, Clone)]
pub struct RetryingClient {
    inner: Arc<McpClient>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingClient {
    pub fn new(inner: Arc<McpClient>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort retries and in-flight requests when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn inner(&self) -> &Arc<McpClient> {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn label(&self, operation: &str) -> String {
        format!("{} on '{}'", operation, self.inner.label())
    }

    pub async fn ping(&self) -> Result<(), McpError> {
        let client = &self.inner;
        retry_with_policy(&self.policy, &self.cancel, &self.label("ping"), move || {
            client.ping()
        })
        .await
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let client = &self.inner;
        retry_with_policy(&self.policy, &self.cancel, &self.label("tools/list"), move || {
            client.list_tools()
        })
        .await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        let client = &self.inner;
        let label = self.label(&format!("tools/call '{}'", name));
        retry_with_policy(&self.policy, &self.cancel, &label, move || {
            client.call_tool(name, arguments.clone())
        })
        .await
    }

    pub async fn list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        let client = &self.inner;
        retry_with_policy(&self.policy, &self.cancel, &self.label("resources/list"), move || {
            client.list_resources()
        })
        .await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let client = &self.inner;
        retry_with_policy(&self.policy, &self.cancel, &self.label("resources/read"), move || {
            client.read_resource(uri)
        })
        .await
    }

    pub async fn list_prompts(&self) -> Result<Vec<McpPrompt>, McpError> {
        let client = &self.inner;
        retry_with_policy(&self.policy, &self.cancel, &self.label("prompts/list"), move || {
            client.list_prompts()
        })
        .await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        let client = &self.inner;
        retry_with_policy(&self.policy, &self.cancel, &self.label("prompts/get"), move || {
            client.get_prompt(name, arguments.clone())
        })
        .await
    }

    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> Result<CreateMessageResult, McpError> {
        let client = &self.inner;
        retry_with_policy(
            &self.policy,
            &self.cancel,
            &self.label("sampling/createMessage"),
            move || client.create_message(params.clone()),
        )
        .await
    }

    /// Not retried
    pub async fn watch_resource(&self, uri: &str) -> Result<ResourceWatch, McpError> {
        self.inner.watch_resource(uri).await
    }

    /// Not retried
    pub async fn close(&self) -> Result<(), McpError> {
        self.inner.close().await
    }
}
