//! Membership update intake.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

use super::{error::ApiError, AppState};
use crate::engine::{MemberUpdate, RoleChangeEvent};

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    /// `None` when the update changed no roles.
    pub event_id: Option<Uuid>,
}

/// Queue a membership update for reconciliation.
///
/// `POST /events/member-update`
#[tracing::instrument(skip_all)]
pub async fn member_update(
    State(state): State<AppState>,
    Json(update): Json<MemberUpdate>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    update
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let event = RoleChangeEvent::from_update(update, Utc::now());
    if event.is_empty() {
        debug!("Update changed no roles");
        return Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { event_id: None })));
    }

    let (event_id, event_guild, event_member) = (event.event_id, event.guild_id, event.member_id);
    state.events.try_send(event).map_err(|e| match e {
        TrySendError::Full(_) => {
            warn!(event_id = %event_id, "Event queue full, rejecting update");
            ApiError::QueueFull
        }
        TrySendError::Closed(_) => ApiError::QueueClosed,
    })?;

    debug!(
        event_id = %event_id,
        guild_id = %event_guild,
        member_id = %event_member,
        "Event queued"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            event_id: Some(event_id),
        }),
    ))
}
