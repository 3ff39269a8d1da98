//! Config handlers: read the live config, patch the runtime-safe subset.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use cliplock_core::settings;

use crate::config::Config;
use crate::error::ApiError;
use crate::schema::config::{ConfigUpdate, ConfigUpdateResponse};
use crate::state::AppState;

/// The startup config with the live coordination values merged in.
fn live_config(state: &AppState) -> Config {
    let mut config = (*state.config).clone();
    config.coordination = settings::snapshot(&state.settings);
    config
}

/// `GET /config`
pub async fn get_config(State(state): State<AppState>) -> Json<Config> {
    Json(live_config(&state))
}

/// `PATCH /config`
///
/// Validation precedes mutation: the update is applied to a candidate
/// copy first, and only a valid candidate is committed.
pub async fn update_config(
    State(state): State<AppState>,
    payload: Result<Json<ConfigUpdate>, JsonRejection>,
) -> Result<Json<ConfigUpdateResponse>, ApiError> {
    let Json(update) =
        payload.map_err(|_| ApiError::InvalidRequest("invalid JSON body".to_string()))?;

    let mut candidate = settings::snapshot(&state.settings);
    update.apply_to(&mut candidate);
    candidate
        .validate()
        .map_err(|err| ApiError::InvalidConfig(err.to_string()))?;

    {
        let mut live = state
            .settings
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *live = candidate;
    }
    tracing::info!("runtime config updated");

    Ok(Json(ConfigUpdateResponse {
        status: "updated".to_string(),
        config: live_config(&state),
    }))
}
