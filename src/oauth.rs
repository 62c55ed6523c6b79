//! OAuth2 login (§4.2 Non-goals lift: Google/GitHub). Each provider is a thin
//! driver around the `oauth2` crate producing a normalized identity that
//! `IdentityService::link_oauth` can attach to a local account.

use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};

use crate::config::OAuthClientConfig;
use crate::errors::AppError;

pub struct ExternalIdentity {
    pub provider_user_id: String,
    pub suggested_username: String,
    pub email: Option<String>,
}

pub enum Provider {
    Google,
    GitHub,
}

impl Provider {
    fn urls(&self) -> (&'static str, &'static str) {
        match self {
            Provider::Google => ("https://accounts.google.com/o/oauth2/v2/auth", "https://oauth2.googleapis.com/token"),
            Provider::GitHub => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }

    fn scope(&self) -> &'static str {
        match self {
            Provider::Google => "openid email profile",
            Provider::GitHub => "read:user user:email",
        }
    }

    fn userinfo_url(&self) -> &'static str {
        match self {
            Provider::Google => "https://www.googleapis.com/oauth2/v3/userinfo",
            Provider::GitHub => "https://api.github.com/user",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::GitHub => "github",
        }
    }
}

pub fn build_client(provider: &Provider, config: &OAuthClientConfig) -> Result<BasicClient, AppError> {
    let (auth_url, token_url) = provider.urls();
    Ok(BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(auth_url.to_string()).map_err(|e| AppError::internal(e.to_string()))?,
        Some(TokenUrl::new(token_url.to_string()).map_err(|e| AppError::internal(e.to_string()))?),
    )
    .set_redirect_uri(RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| AppError::internal(e.to_string()))?))
}

pub fn authorize_url(client: &BasicClient, provider: &Provider) -> (String, CsrfToken) {
    let (url, csrf) = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(provider.scope().to_string()))
        .url();
    (url.to_string(), csrf)
}

pub async fn exchange_code(client: &BasicClient, provider: &Provider, code: String) -> Result<ExternalIdentity, AppError> {
    let token = client
        .exchange_code(AuthorizationCode::new(code))
        .request_async(async_http_client)
        .await
        .map_err(|e| AppError::unauthorized(format!("oauth exchange failed: {e}")))?;

    let http = reqwest::Client::new();
    let userinfo: serde_json::Value = http
        .get(provider.userinfo_url())
        .bearer_auth(token.access_token().secret())
        .header("User-Agent", "noteflow-core")
        .send()
        .await
        .map_err(|e| AppError::internal(format!("oauth userinfo fetch failed: {e}")))?
        .json()
        .await
        .map_err(|e| AppError::internal(format!("oauth userinfo parse failed: {e}")))?;

    match provider {
        Provider::Google => Ok(ExternalIdentity {
            provider_user_id: userinfo["sub"].as_str().unwrap_or_default().to_string(),
            suggested_username: userinfo["email"]
                .as_str()
                .and_then(|e| e.split('@').next())
                .unwrap_or("google-user")
                .to_string(),
            email: userinfo["email"].as_str().map(str::to_string),
        }),
        Provider::GitHub => Ok(ExternalIdentity {
            provider_user_id: userinfo["id"].to_string(),
            suggested_username: userinfo["login"].as_str().unwrap_or("github-user").to_string(),
            email: userinfo["email"].as_str().map(str::to_string),
        }),
    }
}
