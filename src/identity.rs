//! User lifecycle: registration, authentication, 2FA, and admin bootstrap
//! protection (§4.2). Pure data operations: token minting lives in
//! `token.rs`, HTTP wiring lives in `routes::auth`.

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::db::Db;
use crate::errors::AppError;
use crate::models::{User, BOOTSTRAP_ADMIN_USERNAME};

pub struct IdentityService {
    db: Arc<Db>,
}

const DEFAULT_FOLDERS: &[(&str, &str, &str)] = &[
    ("Work", "briefcase", "#3B82F6"),
    ("Personal", "home", "#10B981"),
    ("Archive", "archive", "#6B7280"),
];

/// bcrypt work factor. Higher than the crate default to keep pace with
/// current offline cracking throughput.
const PASSWORD_HASH_COST: u32 = 12;

/// Enforces length >= 12 plus a representative from each character class.
/// Whitespace is rejected outright rather than silently trimmed, since a
/// trailing space a user can't see would otherwise change the password.
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < 12 {
        return Err(AppError::validation("password", "must be at least 12 characters"));
    }
    if password.chars().any(|c| c.is_whitespace()) {
        return Err(AppError::validation("password", "must not contain whitespace"));
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(has_lower && has_upper && has_digit && has_special) {
        return Err(AppError::validation(
            "password",
            "must contain a lowercase letter, an uppercase letter, a digit, and a special character",
        ));
    }
    Ok(())
}

impl IdentityService {
    pub fn new(db: Arc<Db>) -> Self {
        IdentityService { db }
    }

    /// Ensures the configured bootstrap admin account exists. Called once at
    /// startup; re-running it is a no-op once the row exists.
    pub fn ensure_bootstrap_admin(&self, username: &str, password: &str) -> Result<(), AppError> {
        let conn = self.db.conn.lock().unwrap();
        let exists: Option<String> = conn
            .query_row("SELECT id FROM users WHERE username = ?1 COLLATE NOCASE", [username], |r| r.get(0))
            .optional()?;
        if exists.is_some() {
            return Ok(());
        }
        drop(conn);
        validate_password_strength(password)?;
        let password_hash = hash(password, PASSWORD_HASH_COST).map_err(|e| AppError::internal(e.to_string()))?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, is_2fa_enabled, is_admin, is_locked, created_at)
             VALUES (?1, ?2, NULL, ?3, 0, 1, 0, ?4)",
            params![&id, username, &password_hash, &now],
        )?;
        drop(conn);
        self.seed_default_folders(&id)?;
        Ok(())
    }

    pub fn register(&self, username: &str, password: &str, email: Option<&str>) -> Result<User, AppError> {
        if username.trim().len() < 3 {
            return Err(AppError::validation("username", "must be at least 3 characters"));
        }
        validate_password_strength(password)?;
        let password_hash = hash(password, PASSWORD_HASH_COST).map_err(|e| AppError::internal(e.to_string()))?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO users (id, username, email, password_hash, is_2fa_enabled, is_admin, is_locked, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, 0, 0, ?5)",
                params![&id, username, email, &password_hash, &now],
            )?;
        }
        self.seed_default_folders(&id)?;
        self.find_by_id(&id)?.ok_or_else(|| AppError::internal("user vanished after insert"))
    }

    fn seed_default_folders(&self, user_id: &str) -> Result<(), AppError> {
        let conn = self.db.conn.lock().unwrap();
        for (position, (name, icon, color)) in DEFAULT_FOLDERS.iter().enumerate() {
            conn.execute(
                "INSERT INTO folders (id, user_id, parent_id, name, description, icon, color, position, is_expanded)
                 VALUES (?1, ?2, NULL, ?3, '', ?4, ?5, ?6, 1)",
                params![Uuid::new_v4().to_string(), user_id, name, icon, color, position as i64],
            )?;
        }
        Ok(())
    }

    /// Verifies credentials. Returns the user on success; callers must still
    /// check `is_2fa_enabled` before minting tokens.
    pub fn authenticate(&self, username_or_email: &str, password: &str) -> Result<User, AppError> {
        let user = self
            .find_by_username_or_email(username_or_email)?
            .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;
        if user.is_locked {
            return Err(AppError::forbidden("account is locked"));
        }
        let ok = verify(password, &user.password_hash).map_err(|e| AppError::internal(e.to_string()))?;
        if !ok {
            return Err(AppError::unauthorized("invalid credentials"));
        }
        Ok(user)
    }

    pub fn verify_totp(&self, user: &User, code: &str) -> Result<(), AppError> {
        let secret = user.totp_secret.as_ref().ok_or_else(|| AppError::internal("2FA not configured"))?;
        let totp = build_totp(secret)?;
        if totp.check_current(code).unwrap_or(false) {
            Ok(())
        } else {
            Err(AppError::unauthorized("invalid 2FA code"))
        }
    }

    /// Generates and stores a pending TOTP secret, returning its provisioning
    /// URI. The secret only takes effect once `confirm_2fa` validates a code
    /// against it.
    pub fn begin_enable_2fa(&self, user: &User) -> Result<String, AppError> {
        let secret = Secret::generate_secret();
        let encoded = secret.to_encoded().to_string();
        let totp = build_totp(&encoded)?;
        let uri = totp.get_url();
        let conn = self.db.conn.lock().unwrap();
        conn.execute("UPDATE users SET totp_secret = ?1 WHERE id = ?2", params![&encoded, &user.id])?;
        Ok(uri)
    }

    pub fn confirm_2fa(&self, user: &User, code: &str) -> Result<(), AppError> {
        self.verify_totp(user, code)?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute("UPDATE users SET is_2fa_enabled = 1 WHERE id = ?1", [&user.id])?;
        Ok(())
    }

    pub fn disable_2fa(&self, user: &User, code: &str) -> Result<(), AppError> {
        self.verify_totp(user, code)?;
        self.force_disable_2fa(user)
    }

    /// Admin-initiated 2FA reset: skips the TOTP code check entirely, for the
    /// case where a user has lost their authenticator and can't otherwise
    /// recover account access.
    pub fn force_disable_2fa(&self, user: &User) -> Result<(), AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE users SET is_2fa_enabled = 0, totp_secret = NULL WHERE id = ?1",
            [&user.id],
        )?;
        Ok(())
    }

    pub fn change_password(&self, user: &User, old_password: &str, new_password: &str) -> Result<(), AppError> {
        let ok = verify(old_password, &user.password_hash).map_err(|e| AppError::internal(e.to_string()))?;
        if !ok {
            return Err(AppError::unauthorized("current password is incorrect"));
        }
        validate_password_strength(new_password).map_err(|e| match e {
            AppError::Validation { mut fields } => {
                fields.iter_mut().for_each(|f| f.field = "new_password".to_string());
                AppError::Validation { fields }
            }
            other => other,
        })?;
        let new_hash = hash(new_password, PASSWORD_HASH_COST).map_err(|e| AppError::internal(e.to_string()))?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute("UPDATE users SET password_hash = ?1 WHERE id = ?2", params![&new_hash, &user.id])?;
        Ok(())
    }

    /// Links an external OAuth identity to a local account, keyed on
    /// `(provider, provider_user_id)`. A first-time sign-in always creates a
    /// fresh account rather than attaching to whatever local account happens
    /// to hold a matching username — that would let anyone claim another
    /// user's account just by signing up for a provider under their name.
    /// The new account gets a derived username: `suggested_username` if free,
    /// otherwise the same name with a numeric suffix appended until one is.
    pub fn link_oauth(&self, provider: &str, provider_user_id: &str, suggested_username: &str, email: Option<&str>) -> Result<User, AppError> {
        {
            let conn = self.db.conn.lock().unwrap();
            let existing_user_id: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM oauth_links WHERE provider = ?1 AND provider_user_id = ?2",
                    params![provider, provider_user_id],
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(user_id) = existing_user_id {
                drop(conn);
                return self.find_by_id(&user_id)?.ok_or_else(|| AppError::internal("linked user vanished"));
            }
        }

        let username = self.unique_username(suggested_username)?;
        let random_password = Uuid::new_v4().to_string();
        let user = self.register(&username, &random_password, email)?;

        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO oauth_links (id, user_id, provider, provider_user_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![Uuid::new_v4().to_string(), &user.id, provider, provider_user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(user)
    }

    /// Finds a username not yet taken, starting from `base` and appending
    /// `2`, `3`, ... until one is free.
    fn unique_username(&self, base: &str) -> Result<String, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let exists = |candidate: &str| -> Result<bool, AppError> {
            let found: Option<String> = conn
                .query_row("SELECT id FROM users WHERE username = ?1 COLLATE NOCASE", [candidate], |r| r.get(0))
                .optional()?;
            Ok(found.is_some())
        };
        if !exists(base)? {
            return Ok(base.to_string());
        }
        let mut suffix = 2u32;
        loop {
            let candidate = format!("{base}{suffix}");
            if !exists(&candidate)? {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", [id], row_to_user)
            .optional()
            .map_err(AppError::from)
    }

    pub fn find_by_username_or_email(&self, value: &str) -> Result<Option<User>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1 COLLATE NOCASE OR email = ?1 COLLATE NOCASE",
            [value],
            row_to_user,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn search_by_username(&self, query: &str, exclude_user_id: &str) -> Result<Vec<User>, AppError> {
        if query.trim().len() < 2 {
            return Ok(Vec::new());
        }
        let conn = self.db.conn.lock().unwrap();
        let pattern = format!("%{}%", query.trim());
        let mut stmt = conn.prepare(
            "SELECT * FROM users WHERE username LIKE ?1 COLLATE NOCASE AND id != ?2 ORDER BY username LIMIT 20",
        )?;
        let rows = stmt.query_map(params![pattern, exclude_user_id], row_to_user)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// All other active accounts, for populating a "start a chat with..."
    /// picker (§4.10 `GET /chat/users`) — unlike `search_by_username` this
    /// has no minimum query length since it's not search, but it does
    /// exclude locked accounts (nobody can usefully chat with them).
    pub fn list_other_users(&self, exclude_user_id: &str) -> Result<Vec<User>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM users WHERE id != ?1 AND is_locked = 0 ORDER BY username ASC")?;
        let rows = stmt.query_map([exclude_user_id], row_to_user)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn list_all(&self) -> Result<Vec<User>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn set_locked(&self, target: &User, locked: bool) -> Result<(), AppError> {
        guard_bootstrap_admin(target)?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute("UPDATE users SET is_locked = ?1 WHERE id = ?2", params![locked, &target.id])?;
        Ok(())
    }

    pub fn set_admin(&self, target: &User, is_admin: bool) -> Result<(), AppError> {
        guard_bootstrap_admin(target)?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute("UPDATE users SET is_admin = ?1 WHERE id = ?2", params![is_admin, &target.id])?;
        Ok(())
    }

    pub fn delete_user(&self, target: &User) -> Result<(), AppError> {
        guard_bootstrap_admin(target)?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute("DELETE FROM users WHERE id = ?1", [&target.id])?;
        Ok(())
    }
}

/// The bootstrap admin can never be locked, demoted, or deleted through the
/// admin API; it's the one guaranteed way back into a freshly installed
/// instance.
fn guard_bootstrap_admin(user: &User) -> Result<(), AppError> {
    if user.is_bootstrap_admin() {
        Err(AppError::ForbiddenProtected { message: "the bootstrap admin account cannot be modified".to_string() })
    } else {
        Ok(())
    }
}

fn build_totp(secret_base32: &str) -> Result<TOTP, AppError> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|_| AppError::internal("invalid TOTP secret"))?;
    TOTP::new(Algorithm::SHA1, 6, 1, 30, secret, Some("Noteflow".to_string()), "account".to_string())
        .map_err(|e| AppError::internal(e.to_string()))
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        totp_secret: row.get("totp_secret")?,
        is_2fa_enabled: row.get("is_2fa_enabled")?,
        is_admin: row.get("is_admin")?,
        is_locked: row.get("is_locked")?,
        created_at: row.get("created_at")?,
    })
}
