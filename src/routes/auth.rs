//! Registration, login (with optional TOTP step-up), token refresh, OAuth,
//! and account-security endpoints (§4.2, §4.3).

use std::sync::Arc;

use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Db;
use crate::errors::AppError;
use crate::identity::IdentityService;
use crate::models::{
    ChangePasswordRequest, Confirm2FaRequest, Enable2FaResponse, LoginRequest, LoginResponse, RefreshRequest,
    RegisterRequest, TokenPairResponse, UserPublic, Verify2FaRequest,
};
use crate::oauth::{self, Provider};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::token::{hash_refresh_token, TokenService};

use super::{ApiResult, AuthUser, ClientIp, Envelope};

fn issue_token_pair(db: &Db, tokens: &TokenService, user_id: &str, username: &str, is_admin: bool) -> Result<(String, String), AppError> {
    let access = tokens.mint_access(user_id, username, is_admin)?;
    let refresh = tokens.mint_refresh();
    let conn = db.conn.lock().unwrap();
    conn.execute(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, expires_at, revoked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
        params![Uuid::new_v4().to_string(), user_id, &refresh.hash, Utc::now().to_rfc3339(), refresh.expires_at.to_rfc3339()],
    )?;
    Ok((access, refresh.raw))
}

fn rate_limit_ip(limiter: &RateLimiter, ip: &ClientIp, action: &str, max: usize, window_secs: u64) -> Result<(), AppError> {
    let key = format!("{action}:{}", ip.0);
    let info = limiter.check_with_info(&key, max, window_secs);
    if info.allowed {
        Ok(())
    } else {
        Err(AppError::RateLimited { retry_after_secs: info.retry_after_secs })
    }
}

#[post("/auth/register", data = "<body>")]
pub fn register(
    body: Json<RegisterRequest>,
    ip: ClientIp,
    identity: &State<Arc<IdentityService>>,
    limiter: &State<RateLimiter>,
    limits: &State<RateLimitConfig>,
) -> ApiResult<LoginResponse> {
    rate_limit_ip(limiter, &ip, "register", limits.register_max, limits.register_window_secs)?;
    let user = identity.register(&body.username, &body.password, body.email.as_deref())?;
    Ok(Envelope::ok(LoginResponse {
        need_2fa: false,
        access_token: None,
        refresh_token: None,
        user: Some(UserPublic::from(&user)),
    }))
}

#[post("/auth/login", data = "<body>")]
pub fn login(
    body: Json<LoginRequest>,
    ip: ClientIp,
    db: &State<Arc<Db>>,
    identity: &State<Arc<IdentityService>>,
    tokens: &State<Arc<TokenService>>,
    limiter: &State<RateLimiter>,
    limits: &State<RateLimitConfig>,
) -> ApiResult<LoginResponse> {
    rate_limit_ip(limiter, &ip, "login", limits.login_max, limits.login_window_secs)?;
    let user = identity.authenticate(&body.username_or_email, &body.password)?;
    if user.is_2fa_enabled {
        return Ok(Envelope::ok(LoginResponse { need_2fa: true, access_token: None, refresh_token: None, user: None }));
    }
    let (access_token, refresh_token) = issue_token_pair(db, tokens, &user.id, &user.username, user.is_admin)?;
    Ok(Envelope::ok(LoginResponse {
        need_2fa: false,
        access_token: Some(access_token),
        refresh_token: Some(refresh_token),
        user: Some(UserPublic::from(&user)),
    }))
}

#[post("/auth/verify-2fa", data = "<body>")]
pub fn verify_2fa(
    body: Json<Verify2FaRequest>,
    db: &State<Arc<Db>>,
    identity: &State<Arc<IdentityService>>,
    tokens: &State<Arc<TokenService>>,
) -> ApiResult<LoginResponse> {
    let user = identity
        .find_by_username_or_email(&body.username_or_email)?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;
    identity.verify_totp(&user, &body.code)?;
    let (access_token, refresh_token) = issue_token_pair(db, tokens, &user.id, &user.username, user.is_admin)?;
    Ok(Envelope::ok(LoginResponse {
        need_2fa: false,
        access_token: Some(access_token),
        refresh_token: Some(refresh_token),
        user: Some(UserPublic::from(&user)),
    }))
}

#[post("/auth/refresh", data = "<body>")]
pub fn refresh(body: Json<RefreshRequest>, db: &State<Arc<Db>>, identity: &State<Arc<IdentityService>>, tokens: &State<Arc<TokenService>>) -> ApiResult<TokenPairResponse> {
    let hash = hash_refresh_token(&body.refresh_token);
    let row: Option<(String, String, String, Option<String>)> = {
        let conn = db.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, expires_at, revoked_at FROM refresh_tokens WHERE token_hash = ?1",
            [&hash],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?
    };
    let (row_id, user_id, expires_at, revoked_at) = row.ok_or_else(|| AppError::unauthorized("invalid refresh token"))?;
    if revoked_at.is_some() {
        return Err(AppError::unauthorized("refresh token has been revoked"));
    }
    if expires_at < Utc::now().to_rfc3339() {
        return Err(AppError::unauthorized("refresh token has expired"));
    }
    let user = identity.find_by_id(&user_id)?.ok_or_else(|| AppError::unauthorized("user no longer exists"))?;
    {
        let conn = db.conn.lock().unwrap();
        conn.execute("UPDATE refresh_tokens SET revoked_at = ?1 WHERE id = ?2", params![Utc::now().to_rfc3339(), &row_id])?;
    }
    let (access_token, refresh_token) = issue_token_pair(db, tokens, &user.id, &user.username, user.is_admin)?;
    Ok(Envelope::ok(TokenPairResponse { access_token, refresh_token }))
}

#[post("/auth/logout", data = "<body>")]
pub fn logout(body: Json<RefreshRequest>, _auth: AuthUser, db: &State<Arc<Db>>) -> ApiResult<()> {
    let hash = hash_refresh_token(&body.refresh_token);
    let conn = db.conn.lock().unwrap();
    conn.execute(
        "UPDATE refresh_tokens SET revoked_at = ?1 WHERE token_hash = ?2 AND revoked_at IS NULL",
        params![Utc::now().to_rfc3339(), &hash],
    )?;
    Ok(Envelope::ok(()))
}

#[get("/auth/whoami")]
pub fn whoami(auth: AuthUser) -> ApiResult<UserPublic> {
    Ok(Envelope::ok(UserPublic::from(&auth.0)))
}

#[post("/auth/change-password", data = "<body>")]
pub fn change_password(body: Json<ChangePasswordRequest>, auth: AuthUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    identity.change_password(&auth.0, &body.old_password, &body.new_password)?;
    Ok(Envelope::ok(()))
}

#[post("/auth/2fa/enable")]
pub fn enable_2fa(auth: AuthUser, identity: &State<Arc<IdentityService>>) -> ApiResult<Enable2FaResponse> {
    let provisioning_uri = identity.begin_enable_2fa(&auth.0)?;
    Ok(Envelope::ok(Enable2FaResponse { provisioning_uri }))
}

#[post("/auth/2fa/confirm", data = "<body>")]
pub fn confirm_2fa(body: Json<Confirm2FaRequest>, auth: AuthUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    identity.confirm_2fa(&auth.0, &body.code)?;
    Ok(Envelope::ok(()))
}

#[post("/auth/2fa/disable", data = "<body>")]
pub fn disable_2fa(body: Json<Confirm2FaRequest>, auth: AuthUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    identity.disable_2fa(&auth.0, &body.code)?;
    Ok(Envelope::ok(()))
}

#[get("/auth/oauth/<provider>/start")]
pub fn oauth_start(provider: &str, config: &State<Arc<Config>>) -> Result<rocket::response::Redirect, AppError> {
    let (provider, client_config) = resolve_provider(provider, config.inner())?;
    let client = oauth::build_client(&provider, client_config)?;
    let (url, _csrf) = oauth::authorize_url(&client, &provider);
    Ok(rocket::response::Redirect::to(url))
}

#[get("/auth/oauth/<provider>/callback?<code>")]
pub async fn oauth_callback(
    provider: &str,
    code: String,
    config: &State<Arc<Config>>,
    db: &State<Arc<Db>>,
    identity: &State<Arc<IdentityService>>,
    tokens: &State<Arc<TokenService>>,
) -> ApiResult<LoginResponse> {
    let (provider, client_config) = resolve_provider(provider, config.inner())?;
    let client = oauth::build_client(&provider, client_config)?;
    let identity_result = oauth::exchange_code(&client, &provider, code).await?;
    let user = identity.link_oauth(
        provider.name(),
        &identity_result.provider_user_id,
        &identity_result.suggested_username,
        identity_result.email.as_deref(),
    )?;
    let (access_token, refresh_token) = issue_token_pair(db, tokens, &user.id, &user.username, user.is_admin)?;
    Ok(Envelope::ok(LoginResponse {
        need_2fa: false,
        access_token: Some(access_token),
        refresh_token: Some(refresh_token),
        user: Some(UserPublic::from(&user)),
    }))
}

fn resolve_provider<'a>(name: &str, config: &'a Config) -> Result<(Provider, &'a crate::config::OAuthClientConfig), AppError> {
    match name {
        "google" => config.google_oauth.as_ref().map(|c| (Provider::Google, c)).ok_or_else(|| AppError::not_found("google oauth is not configured")),
        "github" => config.github_oauth.as_ref().map(|c| (Provider::GitHub, c)).ok_or_else(|| AppError::not_found("github oauth is not configured")),
        _ => Err(AppError::not_found("unknown oauth provider")),
    }
}
