use axum::extract::State;
use serde::Deserialize;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::models::{parse_subscriber_key, subscriber_key};
use crate::reconcile;
use crate::vip::VipStatus;

#[derive(Debug, Deserialize)]
pub struct CheckVipQuery {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn key_from_path(raw: &str) -> Result<String> {
    parse_subscriber_key(raw).ok_or_else(|| AppError::BadRequest("subscriber is required".into()))
}

pub async fn get_vip(
    State(state): State<AppState>,
    Path(subscriber): Path<String>,
) -> Result<Json<VipStatus>> {
    let key = key_from_path(&subscriber)?;
    Ok(Json(reconcile::vip_status(&state, &key).await?))
}

pub async fn check_vip(
    State(state): State<AppState>,
    Query(query): Query<CheckVipQuery>,
) -> Result<Json<VipStatus>> {
    let key = subscriber_key(query.user_id.as_deref(), query.email.as_deref())
        .ok_or_else(|| AppError::BadRequest("user_id or email is required".into()))?;
    Ok(Json(reconcile::vip_status(&state, &key).await?))
}

/// Pull the subscriber's recent payments from the provider before answering.
pub async fn sync_vip(
    State(state): State<AppState>,
    Path(subscriber): Path<String>,
) -> Result<Json<VipStatus>> {
    let key = key_from_path(&subscriber)?;
    reconcile::sync_subscriber(&state, &key).await?;
    Ok(Json(reconcile::vip_status(&state, &key).await?))
}
