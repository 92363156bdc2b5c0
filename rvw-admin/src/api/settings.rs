//! Runtime settings

use axum::{extract::State, Extension};
use rvw_common::db::settings as store;
use rvw_common::db::Setting;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::db::audit;
use crate::db::sessions::CurrentAdmin;
use crate::error::ApiResult;
use crate::extract::{Json, Path};
use crate::security::{require, Permission};
use crate::AppState;

/// GET /api/settings
pub async fn list_settings(State(state): State<AppState>) -> ApiResult<Json<Vec<Setting>>> {
    Ok(Json(store::list_settings(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: String,
}

/// PUT /api/settings/:key
pub async fn update_setting(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(key): Path<String>,
    Json(body): Json<UpdateSettingRequest>,
) -> ApiResult<Json<Setting>> {
    require(admin.role, Permission::ManageSettings)?;

    let mut tx = state.db.begin().await?;

    let previous = store::list_settings(&mut *tx)
        .await?
        .into_iter()
        .find(|s| s.key == key)
        .map(|s| s.value);
    let value = store::update_setting(&mut tx, &key, &body.value).await?;

    audit::record(
        &mut *tx,
        admin.id,
        "setting.update",
        "setting",
        None,
        json!({ "key": key, "previous": previous, "value": value }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, key = %key, value = %value, "Setting updated");
    Ok(Json(Setting { key, value }))
}
