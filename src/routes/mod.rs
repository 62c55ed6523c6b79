//! Route module decomposition — each domain area in its own file.
//! Shared types (request guards, response envelopes) live here.

mod admin;
mod auth;
mod chat;
mod folders;
mod notes;
mod sync;
mod system;
mod tasks;
mod users;

pub use admin::{
    admin_delete_user, admin_disable_2fa, admin_grant_admin, admin_list_users, admin_lock_user, admin_revoke_admin,
    admin_unlock_user,
};
pub use auth::{
    change_password, confirm_2fa, disable_2fa, enable_2fa, login, logout, oauth_callback, oauth_start, refresh,
    register, verify_2fa, whoami,
};
pub use chat::{
    create_direct_room, create_group_room, list_chat_users, list_pinned, list_rooms, mark_message_read, mark_read,
    page_messages, react, send_message, set_pinned, set_theme, unread_counts, unreact,
};
pub use folders::{
    create_folder, delete_folder, get_folder, get_folder_path, list_folders, move_folder, move_note, move_task,
    update_folder,
};
pub use notes::{create_note, delete_note, get_note, list_notes, share_note, unshare_note, update_note};
pub use sync::sync_batch;
pub use system::{health, internal_server_error, not_found, rate_limited, unauthorized};
pub use tasks::{create_task, delete_task, get_task, list_tasks, set_task_completed, share_task, unshare_task, update_task};
pub use users::search_users;

use std::sync::Arc;

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::identity::IdentityService;
use crate::models::User;
use crate::token::TokenService;

/// The caller's IP, used as the rate-limit key for unauthenticated endpoints
/// (login, register) where there's no user id yet to key on.
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// Resolves the bearer access token into the authenticated `User` row. Locked
/// accounts are rejected here so every handler downstream can assume an
/// active account.
pub struct AuthUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(tokens) = req.rocket().state::<Arc<TokenService>>() else {
            return Outcome::Error((Status::InternalServerError, AppError::internal("token service unavailable")));
        };
        let Some(identity) = req.rocket().state::<Arc<IdentityService>>() else {
            return Outcome::Error((Status::InternalServerError, AppError::internal("identity service unavailable")));
        };

        let Some(token) = req.headers().get_one("Authorization").and_then(|h| h.strip_prefix("Bearer ")) else {
            return Outcome::Error((Status::Unauthorized, AppError::unauthorized("missing bearer token")));
        };

        let claims = match tokens.verify_access(token) {
            Ok(c) => c,
            Err(e) => return Outcome::Error((Status::Unauthorized, e)),
        };

        match identity.find_by_id(&claims.sub) {
            Ok(Some(user)) if user.is_locked => {
                Outcome::Error((Status::Forbidden, AppError::forbidden("account is locked")))
            }
            Ok(Some(user)) => Outcome::Success(AuthUser(user)),
            Ok(None) => Outcome::Error((Status::Unauthorized, AppError::unauthorized("user no longer exists"))),
            Err(e) => Outcome::Error((Status::InternalServerError, e)),
        }
    }
}

/// Same as `AuthUser` but additionally requires `is_admin`.
pub struct AdminUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthUser::from_request(req).await {
            Outcome::Success(AuthUser(user)) if user.is_admin => Outcome::Success(AdminUser(user)),
            Outcome::Success(_) => Outcome::Error((Status::Forbidden, AppError::forbidden("admin privileges required"))),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}

/// `/api/v1/*` response shape: `{ "success": true, "data": ... }`.
pub struct Envelope<T>(pub T);

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope(data)
    }
}

impl<'r, 'o: 'r, T: Serialize> Responder<'r, 'o> for Envelope<T> {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let body = Json(serde_json::json!({
            "success": true,
            "message": "ok",
            "data": self.0,
            "meta": {
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "version": "v1",
                "requestId": crate::request_id::current(req),
            },
        }));
        let res = body.respond_to(req)?;
        Response::build_from(res).header(rocket::http::Header::new("X-API-Version", "v1")).ok()
    }
}

/// `/api/*` (legacy) response shape: the data flattened at the top level,
/// matching the pre-versioning contract that existing integrations rely on.
pub struct LegacyEnvelope<T>(pub T);

impl<'r, 'o: 'r, T: Serialize> Responder<'r, 'o> for LegacyEnvelope<T> {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let res = Json(self.0).respond_to(req)?;
        Response::build_from(res).header(rocket::http::Header::new("X-API-Version", "legacy")).ok()
    }
}

pub type ApiResult<T> = Result<Envelope<T>, AppError>;
pub type LegacyResult<T> = Result<LegacyEnvelope<T>, AppError>;
