pub mod authz;
pub mod chat;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod folders;
pub mod identity;
pub mod models;
pub mod notes;
pub mod oauth;
pub mod presence;
pub mod rate_limit;
pub mod request_id;
pub mod routes;
pub mod socket;
pub mod sync;
pub mod tasks;
pub mod token;

use std::sync::Arc;

use rocket_cors::{AllowedOrigins, CorsOptions};

use chat::ChatService;
use config::Config;
use db::Db;
use events::EventBus;
use folders::FolderService;
use identity::IdentityService;
use notes::NoteService;
use presence::PresenceBroker;
use rate_limit::{RateLimitConfig, RateLimiter};
use sync::SyncReplayService;
use tasks::TaskService;
use token::TokenService;

/// Builds the configured `Rocket` instance. Exits non-zero on fatal
/// configuration errors (missing `JWT_SECRET`/admin bootstrap vars) since
/// those can only be fixed by the operator before the process is worth
/// running at all (§6).
pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let config = load_config_or_exit();
    build_rocket(config)
}

/// Same as `rocket()` but overrides the database path, for tests that need
/// an isolated on-disk database per case without touching `DATABASE_PATH`.
pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    let mut config = load_config_or_exit();
    config.database_path = db_path.to_string();
    build_rocket(config)
}

fn load_config_or_exit() -> Config {
    Config::from_env().unwrap_or_else(|e| {
        eprintln!("fatal configuration error: {e}");
        std::process::exit(1);
    })
}

fn build_rocket(config: Config) -> rocket::Rocket<rocket::Build> {
    let db = Arc::new(Db::new(&config.database_path));
    let config = Arc::new(config);
    let events = Arc::new(EventBus::new());
    let presence = Arc::new(PresenceBroker::new());

    let identity = Arc::new(IdentityService::new(db.clone()));
    let tokens = Arc::new(TokenService::new(&config));
    let folders = Arc::new(FolderService::new(db.clone()));
    let notes = Arc::new(NoteService::new(db.clone()));
    let tasks = Arc::new(TaskService::new(db.clone()));
    let chat = Arc::new(ChatService::new(db.clone()));
    let sync = Arc::new(SyncReplayService::new(db.clone()));

    let rate_limiter = RateLimiter::new();
    let rate_limits = RateLimitConfig::from_env();

    let cors = build_cors(&config.cors_origins);

    let bootstrap_username = config.admin_username.clone();
    let bootstrap_password = config.admin_password.clone();
    let bootstrap_identity = identity.clone();

    rocket::build()
        .manage(db)
        .manage(config)
        .manage(events)
        .manage(presence)
        .manage(identity)
        .manage(tokens)
        .manage(folders)
        .manage(notes)
        .manage(tasks)
        .manage(chat)
        .manage(sync)
        .manage(rate_limiter)
        .manage(rate_limits)
        .attach(cors)
        .attach(request_id::RequestId)
        .attach(rocket::fairing::AdHoc::on_liftoff("Bootstrap Admin", move |_rocket| {
            Box::pin(async move {
                match bootstrap_identity.ensure_bootstrap_admin(&bootstrap_username, &bootstrap_password) {
                    Ok(()) => log::info!("bootstrap admin '{bootstrap_username}' ready"),
                    Err(e) => log::error!("failed to bootstrap admin account: {e:?}"),
                }
            })
        }))
        .register(
            "/",
            rocket::catchers![
                routes::unauthorized,
                routes::not_found,
                routes::rate_limited,
                routes::internal_server_error,
            ],
        )
        .mount("/api/v1", v1_routes())
        .mount("/api", legacy_routes())
        .mount("/", rocket::routes![routes::health, socket::socket])
}

/// Every domain endpoint, mounted under `/api/v1`.
fn v1_routes() -> Vec<rocket::Route> {
    rocket::routes![
        routes::register,
        routes::login,
        routes::verify_2fa,
        routes::refresh,
        routes::logout,
        routes::whoami,
        routes::change_password,
        routes::enable_2fa,
        routes::confirm_2fa,
        routes::disable_2fa,
        routes::oauth_start,
        routes::oauth_callback,
        routes::create_folder,
        routes::list_folders,
        routes::get_folder,
        routes::get_folder_path,
        routes::update_folder,
        routes::move_folder,
        routes::delete_folder,
        routes::move_note,
        routes::move_task,
        routes::create_note,
        routes::list_notes,
        routes::get_note,
        routes::update_note,
        routes::delete_note,
        routes::share_note,
        routes::unshare_note,
        routes::create_task,
        routes::list_tasks,
        routes::get_task,
        routes::update_task,
        routes::set_task_completed,
        routes::delete_task,
        routes::share_task,
        routes::unshare_task,
        routes::create_direct_room,
        routes::create_group_room,
        routes::list_rooms,
        routes::set_theme,
        routes::send_message,
        routes::page_messages,
        routes::mark_read,
        routes::mark_message_read,
        routes::unread_counts,
        routes::set_pinned,
        routes::list_pinned,
        routes::react,
        routes::unreact,
        routes::list_chat_users,
        routes::sync_batch,
        routes::search_users,
        routes::admin_list_users,
        routes::admin_lock_user,
        routes::admin_unlock_user,
        routes::admin_grant_admin,
        routes::admin_revoke_admin,
        routes::admin_disable_2fa,
        routes::admin_delete_user,
    ]
}

/// A scoped-down alias of the highest-traffic v1 resources at the
/// pre-versioning `/api` prefix (auth, notes, tasks, folders), per
/// the versioning adapter's documented scoping decision.
fn legacy_routes() -> Vec<rocket::Route> {
    rocket::routes![
        routes::register,
        routes::login,
        routes::verify_2fa,
        routes::refresh,
        routes::logout,
        routes::whoami,
        routes::create_folder,
        routes::list_folders,
        routes::get_folder,
        routes::update_folder,
        routes::delete_folder,
        routes::create_note,
        routes::list_notes,
        routes::get_note,
        routes::update_note,
        routes::delete_note,
        routes::create_task,
        routes::list_tasks,
        routes::get_task,
        routes::update_task,
        routes::delete_task,
    ]
}

fn build_cors(origins: &[String]) -> rocket_cors::Cors {
    let allowed = if origins.is_empty() {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(origins)
    };
    CorsOptions::default()
        .allowed_origins(allowed)
        .allow_credentials(true)
        .to_cors()
        .expect("failed to build CORS configuration")
}
