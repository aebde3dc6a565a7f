use actix_web::{web, HttpResponse};

use crate::auth::AuthService;
use crate::error::AppError;

/// POST /api/admin/sessions/sweep
///
/// Delete expired refresh tokens now instead of waiting for the background
/// sweeper. Admin role only.
pub async fn sweep_sessions(auth: web::Data<AuthService>) -> Result<HttpResponse, AppError> {
    let removed = auth.sweep_expired().await?;

    tracing::info!(removed = removed, "Manual session sweep");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "removed": removed })))
}
