//! Per-operation timeouts supplied by the host
//!
//! The host passes a `timeouts` object alongside the other attributes, e.g.
//! `{"create": "90m", "delete": "1h"}`. Missing keys default to one hour,
//! and nothing longer than thirty days is accepted.

use std::time::Duration;

use serde_json::Value;

use truststore_common::polling::{DEFAULT_OPERATION_TIMEOUT, MAX_OPERATION_TIMEOUT};
use truststore_common::{Error, Result};

use super::attributes::{AttributeBag, Attributes};

/// Attribute key holding the timeouts object
pub const TIMEOUTS_KEY: &str = "timeouts";

/// Budgets for the long-running lifecycle hooks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationTimeouts {
    /// Bound for create (including the initial activation)
    pub create: Duration,
    /// Bound for update
    pub update: Duration,
    /// Bound for delete (including deactivation or deletion polling)
    pub delete: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_OPERATION_TIMEOUT,
            update: DEFAULT_OPERATION_TIMEOUT,
            delete: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl OperationTimeouts {
    /// Read the `timeouts` object from a bag, defaulting what is absent
    pub fn from_bag(bag: &AttributeBag) -> Result<Self> {
        let mut timeouts = Self::default();
        let Some(raw) = Attributes::new(bag).get_object(TIMEOUTS_KEY)? else {
            return Ok(timeouts);
        };

        for (name, slot) in [
            ("create", &mut timeouts.create),
            ("update", &mut timeouts.update),
            ("delete", &mut timeouts.delete),
        ] {
            let key = format!("{}.{}", TIMEOUTS_KEY, name);
            match raw.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => {
                    let parsed = parse_components(s).ok_or_else(|| {
                        Error::configuration(&key, format!("invalid duration '{}'", s))
                    })?;
                    *slot = within_limit(parsed)
                        .ok_or_else(|| Error::configuration(&key, too_long(s)))?;
                }
                Some(Value::Number(n)) => {
                    let secs = n.as_u64().ok_or_else(|| {
                        Error::configuration(&key, format!("expected whole seconds, got {}", n))
                    })?;
                    *slot = within_limit(Duration::from_secs(secs))
                        .ok_or_else(|| Error::configuration(&key, too_long(&n.to_string())))?;
                }
                Some(_) => {
                    return Err(Error::configuration(
                        &key,
                        "expected a duration string or whole seconds",
                    ))
                }
            }
        }

        Ok(timeouts)
    }
}

/// Parse a duration such as `"1h30m"`, `"90m"`, `"45s"`, `"250ms"` or `"600"`.
///
/// A bare integer is seconds. Durations above thirty days are rejected.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let parsed =
        parse_components(raw).ok_or_else(|| Error::validation(format!("invalid duration '{}'", raw)))?;
    within_limit(parsed).ok_or_else(|| Error::validation(too_long(raw)))
}

fn within_limit(duration: Duration) -> Option<Duration> {
    (duration <= MAX_OPERATION_TIMEOUT).then_some(duration)
}

fn too_long(raw: &str) -> String {
    format!(
        "duration '{}' exceeds the maximum of {}s",
        raw,
        MAX_OPERATION_TIMEOUT.as_secs()
    )
}

fn parse_components(raw: &str) -> Option<Duration> {
    let input = raw.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "h" => Duration::from_secs(amount.saturating_mul(3600)),
            "m" => Duration::from_secs(amount.saturating_mul(60)),
            "s" => Duration::from_secs(amount),
            "ms" => Duration::from_millis(amount),
            _ => return None,
        };
        total = total.saturating_add(part);
        rest = &rest[unit_len..];
    }

    Some(total)
}
