use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use super::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_health))
}

pub async fn get_health() -> Json<Value> {
    Json(json!({
        "ok": true,
        "name": "UniSaver Backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::Settings;
    use crate::routes::test_support::{get_json, state_with};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn health_names_the_service() {
        let Json(body) = get_health().await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["name"], "UniSaver Backend");
        assert!(!body["version"].as_str().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn root_route_is_health() {
        let (status, body) = get_json(state_with(Settings::default(), Vec::new()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }
}
