//! In-flight operation detection
//!
//! The service allows at most one IN_PROGRESS activation per CA set and
//! network. Before submitting, the orchestrator inspects that slot: a matching
//! operation is adopted, anything else is a conflict.

use truststore_common::types::Activation;
use truststore_common::{Error, Result};

use super::ActivationRequest;

/// Find the in-flight operation the request should adopt, if any.
///
/// Returns `Ok(None)` when the network is idle, `Ok(Some(_))` when an
/// identical request is already running, and [`Error::Conflict`] when a
/// different version or the opposite type is in progress.
pub fn classify_in_flight(
    activations: &[Activation],
    request: &ActivationRequest,
) -> Result<Option<Activation>> {
    let Some(running) = activations
        .iter()
        .find(|a| a.is_in_progress_on(request.network))
    else {
        return Ok(None);
    };

    if running.version != request.version {
        return Err(Error::conflict(
            &request.ca_set_id,
            running.version,
            format!(
                "operation already in progress for version {}",
                running.version
            ),
        ));
    }

    if running.activation_type == request.activation_type.opposite() {
        return Err(Error::conflict(
            &request.ca_set_id,
            running.version,
            format!(
                "{} in progress for version {}, cannot proceed",
                running.activation_type.action_name(),
                running.version
            ),
        ));
    }

    Ok(Some(running.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use truststore_common::types::{ActivationStatus, ActivationType, Network};

    fn running(version: i64, network: Network, t: ActivationType) -> Activation {
        Activation {
            activation_id: 77,
            ca_set_id: "12345".to_string(),
            version,
            network,
            activation_type: t,
            activation_status: ActivationStatus::InProgress,
            created_by: None,
            created_date: None,
            modified_by: None,
            modified_date: None,
            retry_after: None,
        }
    }

    fn request(version: i64, t: ActivationType) -> ActivationRequest {
        ActivationRequest::new("12345", version, Network::Staging, t)
    }

    #[test]
    fn idle_network_has_nothing_to_adopt() {
        let history = vec![running(1, Network::Production, ActivationType::Activate)];
        assert!(classify_in_flight(&history, &request(1, ActivationType::Activate))
            .unwrap()
            .is_none());
    }

    #[test]
    fn identical_request_is_adopted() {
        let history = vec![running(1, Network::Staging, ActivationType::Activate)];
        let adopted = classify_in_flight(&history, &request(1, ActivationType::Activate))
            .unwrap()
            .unwrap();
        assert_eq!(adopted.activation_id, 77);
    }

    #[test]
    fn different_version_in_flight_is_a_conflict() {
        let history = vec![running(1, Network::Staging, ActivationType::Activate)];
        let err = classify_in_flight(&history, &request(2, ActivationType::Activate)).unwrap_err();
        match err {
            Error::Conflict { version, message, .. } => {
                assert_eq!(version, 1);
                assert_eq!(message, "operation already in progress for version 1");
            }
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn opposite_type_in_flight_is_a_conflict() {
        let history = vec![running(1, Network::Staging, ActivationType::Deactivate)];
        let err = classify_in_flight(&history, &request(1, ActivationType::Activate)).unwrap_err();
        assert!(err
            .to_string()
            .contains("deactivation in progress for version 1, cannot proceed"));
    }
}
