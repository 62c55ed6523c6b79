//! Binary entry point. Fatal configuration errors (missing `JWT_SECRET`,
//! missing admin bootstrap vars) are surfaced by `noteflow_core::rocket()`
//! itself via `std::process::exit(1)` before ignition; anything that fails
//! during ignition (unreachable database path, port in use) is reported by
//! `launch()`'s `Err` below (§6).

#[rocket::main]
async fn main() {
    env_logger::init();

    if let Err(e) = noteflow_core::rocket().launch().await {
        log::error!("server failed to launch: {e}");
        std::process::exit(1);
    }
}
