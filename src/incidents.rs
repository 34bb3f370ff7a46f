//! Incident state machine. Grounded on `checker::resolve_transition` plus
//! the teacher's acknowledge/resolve route bookkeeping, generalized to the
//! explicit `open -> acknowledged -> resolved` states (the teacher only has
//! open/resolved).

use crate::models::{now_str, Incident, IncidentEvent, IncidentEventType, IncidentStatus};
use crate::store::{Store, StoreError};
use uuid::Uuid;

#[derive(Debug)]
pub enum IncidentError {
    Store(StoreError),
    /// Transition attempted from a state that does not permit it.
    Conflict(&'static str),
}

impl std::fmt::Display for IncidentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentError::Store(e) => write!(f, "{e}"),
            IncidentError::Conflict(msg) => write!(f, "conflict: {msg}"),
        }
    }
}

impl From<StoreError> for IncidentError {
    fn from(e: StoreError) -> Self {
        IncidentError::Store(e)
    }
}

/// Create an incident if none is open for this monitor; append a `created`
/// event either way only when newly created.
pub async fn open(store: &dyn Store, monitor_id: &str, cause: &str) -> Result<Incident, IncidentError> {
    let (incident, created) = store.open_incident_if_none(monitor_id, cause).await?;
    if created {
        store
            .append_incident_event(&IncidentEvent {
                id: Uuid::new_v4().to_string(),
                incident_id: incident.id.clone(),
                event_type: IncidentEventType::Created,
                message: cause.to_string(),
                at: incident.started_at.clone(),
            })
            .await?;
    }
    Ok(incident)
}

/// Allowed only from `open`.
pub async fn acknowledge(store: &dyn Store, incident: &Incident, actor: &str) -> Result<(), IncidentError> {
    if incident.status != IncidentStatus::Open {
        return Err(IncidentError::Conflict("incident is not open"));
    }
    let at = now_str();
    store.transition_incident(&incident.id, IncidentStatus::Acknowledged, Some(actor), &at).await?;
    store
        .append_incident_event(&IncidentEvent {
            id: Uuid::new_v4().to_string(),
            incident_id: incident.id.clone(),
            event_type: IncidentEventType::Acknowledged,
            message: format!("acknowledged by {actor}"),
            at,
        })
        .await?;
    Ok(())
}

/// Allowed from `open` or `acknowledged`.
pub async fn resolve_manual(store: &dyn Store, incident: &Incident, actor: &str) -> Result<(), IncidentError> {
    if incident.status == IncidentStatus::Resolved {
        return Err(IncidentError::Conflict("incident already resolved"));
    }
    resolve(store, incident, actor).await
}

/// Invoked by the classifier on recovery; same as `resolve_manual` with
/// `actor = "system"`.
pub async fn resolve_auto(store: &dyn Store, incident: &Incident) -> Result<(), IncidentError> {
    resolve(store, incident, "system").await
}

async fn resolve(store: &dyn Store, incident: &Incident, actor: &str) -> Result<(), IncidentError> {
    let at = now_str();
    store.transition_incident(&incident.id, IncidentStatus::Resolved, Some(actor), &at).await?;
    store
        .append_incident_event(&IncidentEvent {
            id: Uuid::new_v4().to_string(),
            incident_id: incident.id.clone(),
            event_type: IncidentEventType::Resolved,
            message: format!("resolved by {actor}"),
            at,
        })
        .await?;
    Ok(())
}

/// Resend-policy key: `(incident_id, nth_send)`, so the notification
/// dispatcher can dedupe retries of the same resend.
pub fn resend_key(incident_id: &str, nth_send: u64) -> String {
    format!("{incident_id}:{nth_send}")
}

/// Which resend index is due at `elapsed_seconds` since the incident
/// started, given `resend_interval` (0 = never resend). `None` if no
/// resend has come due yet. The sweep that drives this runs on its own
/// tick, not in lockstep with `resend_interval`, so this floors
/// `elapsed / resend_interval` rather than requiring an exact multiple —
/// a late sweep still recognizes the resend it missed.
pub fn due_resend_nth(resend_interval_seconds: u32, elapsed_seconds: u64) -> Option<u64> {
    if resend_interval_seconds == 0 {
        return None;
    }
    let nth = elapsed_seconds / resend_interval_seconds as u64;
    if nth > 0 {
        Some(nth)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_resend_when_interval_is_zero() {
        assert_eq!(due_resend_nth(0, 10_000), None);
    }

    #[test]
    fn no_resend_before_first_interval_elapses() {
        assert_eq!(due_resend_nth(300, 299), None);
    }

    #[test]
    fn resend_nth_advances_with_elapsed_time() {
        assert_eq!(due_resend_nth(300, 300), Some(1));
        assert_eq!(due_resend_nth(300, 599), Some(1));
        assert_eq!(due_resend_nth(300, 600), Some(2));
    }

    #[test]
    fn resend_key_pairs_incident_and_nth() {
        assert_eq!(resend_key("inc-1", 3), "inc-1:3");
    }
}
