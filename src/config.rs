//! Process-wide configuration read once at boot from the environment.

use std::env;

/// Recognized environment variables, collected once so the rest of the
/// crate never calls `env::var` directly — centralizes tunables the same
/// way `RateLimitConfig::from_env` does for its own corner of config.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub jwt_secret: Vec<u8>,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,
    pub admin_username: String,
    pub admin_password: String,
    pub google_oauth: Option<OAuthClientConfig>,
    pub github_oauth: Option<OAuthClientConfig>,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Fatal configuration error; the process must exit non-zero on this (§6).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET is required and must decode (hex or base64) to at least 32 bytes")]
    MissingOrWeakJwtSecret,
    #[error("ADMIN_USERNAME and ADMIN_PASSWORD are required on first start")]
    MissingAdminBootstrap,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = decode_secret(&env::var("JWT_SECRET").map_err(|_| ConfigError::MissingOrWeakJwtSecret)?)
            .ok_or(ConfigError::MissingOrWeakJwtSecret)?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::MissingOrWeakJwtSecret);
        }

        let admin_username = env::var("ADMIN_USERNAME").map_err(|_| ConfigError::MissingAdminBootstrap)?;
        let admin_password = env::var("ADMIN_PASSWORD").map_err(|_| ConfigError::MissingAdminBootstrap)?;

        Ok(Config {
            database_path: env::var("DATABASE_PATH")
                .or_else(|_| env::var("DATABASE_URL"))
                .unwrap_or_else(|_| "data/noteflow.db".to_string()),
            jwt_secret,
            jwt_access_ttl_secs: env_i64("JWT_ACCESS_TTL_SECONDS", 3600),
            jwt_refresh_ttl_secs: env_i64("JWT_REFRESH_TTL_SECONDS", 30 * 24 * 3600),
            admin_username,
            admin_password,
            google_oauth: oauth_client("GOOGLE"),
            github_oauth: oauth_client("GITHUB"),
            cors_origins: env::var("CORS_ORIGIN")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "simple".to_string()),
        })
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn oauth_client(prefix: &str) -> Option<OAuthClientConfig> {
    let client_id = env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    let redirect_uri = env::var(format!("{prefix}_REDIRECT_URI")).ok()?;
    Some(OAuthClientConfig { client_id, client_secret, redirect_uri })
}

/// Accepts hex or base64 (standard or URL-safe) secrets, per §6.
fn decode_secret(raw: &str) -> Option<Vec<u8>> {
    if let Ok(bytes) = hex::decode(raw) {
        return Some(bytes);
    }
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(raw)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(raw))
        .ok()
}
