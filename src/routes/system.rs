//! Health and error-catcher endpoints (§4.1, §7).

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{get, Request, State};

use crate::db::Db;
use crate::errors::AppError;

#[get("/health")]
pub fn health(db: &State<Arc<Db>>) -> Json<serde_json::Value> {
    let conn = db.conn.lock().unwrap();
    let ok = conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).is_ok();
    Json(serde_json::json!({
        "status": if ok { "ok" } else { "degraded" },
        "service": "noteflow-core",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[rocket::catch(401)]
pub fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": false, "message": "unauthorized", "error": { "code": "UNAUTHORIZED" } }))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": false, "message": "not found", "error": { "code": "NOT_FOUND" } }))
}

#[rocket::catch(429)]
pub fn rate_limited() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": false, "message": "rate limited", "error": { "code": "RATE_LIMITED" } }))
}

#[rocket::catch(500)]
pub fn internal_server_error() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": false, "message": "internal error", "error": { "code": "INTERNAL_ERROR" } }))
}

#[allow(dead_code)]
fn _assert_types_used(_req: &Request<'_>) -> Option<AppError> {
    None
}
