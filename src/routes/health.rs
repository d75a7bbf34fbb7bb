use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::json;

use crate::db::connection::pool_stats;
use crate::state::AppState;

pub async fn healthcheck(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut body = json!({
        "status": "available",
        "system_info": {
            "environment": state.config.general.environment,
            "version": state.config.general.version,
        },
    });

    if let Some(stats) = pool_stats(state.pg_pool.as_ref()) {
        body["database"] = json!(stats);
    }

    Json(body)
}
