//! Member profile updates.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::{Profile, ProfileUpdate};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ProfileResponse {
    pub profile: Profile,
}

/// Update the signed-in member's own profile. Absent fields are kept.
///
/// POST /api/profile/update
#[instrument(skip(state, user, update), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>> {
    if update.is_empty() {
        return Err(AppError::BadRequest("No profile fields to update".to_string()));
    }

    let rows: Vec<Profile> = state
        .supabase()
        .table("profiles")
        .eq("id", &user.id)
        .update(&update)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error updating profile");
            AppError::Failed("Failed to update profile".to_string())
        })?;

    let profile = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    tracing::info!("Profile updated");
    Ok(Json(ProfileResponse { profile }))
}
