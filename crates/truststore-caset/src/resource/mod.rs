//! Host-facing lifecycle hooks
//!
//! Each resource exposes `create`, `read`, `update`, `delete` and `import`
//! over plain attribute bags. The hooks are thin: they decode the bag, call
//! the orchestration components and encode the authoritative remote state
//! back into a bag.

mod activation;
mod attributes;
mod ca_set;
mod timeouts;

pub use activation::CaSetActivationResource;
pub use attributes::{AttributeBag, Attributes};
pub use ca_set::CaSetResource;
pub use timeouts::{parse_duration, OperationTimeouts, TIMEOUTS_KEY};

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use truststore_common::polling::DEFAULT_OPERATION_TIMEOUT;
use truststore_common::{Deadline, PollConfig};

use crate::client::TrustStoreClient;

/// Dependencies shared by every lifecycle hook
#[derive(Clone)]
pub struct ResourceContext {
    /// Remote trust-store client
    pub client: Arc<dyn TrustStoreClient>,
    /// Cancels in-flight waits (host shutdown, Ctrl-C)
    pub cancel: CancellationToken,
    /// Intervals for activation polling
    pub activation_poll: PollConfig,
    /// Intervals for deletion polling
    pub deletion_poll: PollConfig,
}

impl ResourceContext {
    /// Context with default poll intervals and a fresh cancellation token
    pub fn new(client: Arc<dyn TrustStoreClient>) -> Self {
        Self {
            client,
            cancel: CancellationToken::new(),
            activation_poll: PollConfig::activation(),
            deletion_poll: PollConfig::deletion(),
        }
    }

    /// Use the given cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override both poll configurations
    pub fn with_poll_configs(mut self, activation: PollConfig, deletion: PollConfig) -> Self {
        self.activation_poll = activation;
        self.deletion_poll = deletion;
        self
    }
}

impl ResourceContext {
    /// Budget for refresh and import reads, which carry no host timeout
    fn read_deadline(&self, operation: impl Into<String>) -> Deadline {
        Deadline::new(operation, DEFAULT_OPERATION_TIMEOUT, self.cancel.clone())
    }
}

fn optional_string(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn optional_time(value: Option<DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |t| {
        Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true))
    })
}

/// Copy the host's `timeouts` object from `from` into `to`
fn carry_timeouts(from: &AttributeBag, to: &mut AttributeBag) {
    if let Some(timeouts) = from.get(TIMEOUTS_KEY) {
        to.insert(TIMEOUTS_KEY.to_string(), timeouts.clone());
    }
}
