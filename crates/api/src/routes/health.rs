//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// GET /health — liveness probe for the placement service.
///
/// Reports the crate name and version so a fleet of instances can be
/// told apart from the probe alone.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_service_identity() {
        let Json(body) = check().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.service, env!("CARGO_PKG_NAME"));
        assert!(!body.version.is_empty());
    }
}
